/// A named output variable: sorted records with optional debounce
///
/// Every record change recomputes the sorted snapshot. Without a debounce
/// interval each recomputation is emitted. With interval D an emission goes
/// out immediately when nothing was emitted within the last D; otherwise a
/// single trailing emission is scheduled D after the recomputation and
/// carries whatever the snapshot is when it fires.
use super::object::{ObjectComposer, StructureItem};
use super::sort::{sanitize_sort_params, sort_records, SortKey, SortParam};
use crate::errors::BridgeResult;
use crate::logger::EventLogger;
use crate::observer::{ListenerId, Listeners};
use crate::utils::truncate_for_log;
use crate::subscriptions::SubscriptionRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Configuration of one variable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    #[serde(default)]
    pub structure: Vec<StructureItem>,
    #[serde(default)]
    pub sort: Vec<SortParam>,
    /// Minimum milliseconds between emissions, fractions allowed
    #[serde(default)]
    pub debounce: Option<f64>,
}

impl VariableConfig {
    /// Debounce interval to apply, if any
    ///
    /// A negative interval is always elapsed, so it behaves like no debounce.
    pub fn debounce_interval(&self) -> Option<Duration> {
        self.debounce
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| Duration::from_nanos((ms * 1_000_000.0).round() as u64))
    }
}

#[derive(Default)]
struct DebounceState {
    last_emission: Option<Instant>,
    pending: Option<JoinHandle<()>>,
}

pub struct VariableView {
    name: String,
    composers: Vec<Arc<ObjectComposer>>,
    sort: Vec<SortKey>,
    debounce: Option<Duration>,
    state: Mutex<DebounceState>,
    listeners: Listeners<Value>,
    logger: Arc<dyn EventLogger>,
}

impl VariableView {
    pub fn new(
        name: impl Into<String>,
        registry: &SubscriptionRegistry,
        config: &VariableConfig,
        logger: Arc<dyn EventLogger>,
    ) -> BridgeResult<Arc<Self>> {
        let sort = sanitize_sort_params(&config.sort)?;
        let composers = config
            .structure
            .iter()
            .map(|item| ObjectComposer::new(registry, item))
            .collect::<BridgeResult<Vec<_>>>()?;

        let view = Arc::new_cyclic(|weak: &Weak<Self>| {
            for composer in &composers {
                let weak = weak.clone();
                composer.on_data(move |_| {
                    if let Some(view) = weak.upgrade() {
                        view.recompute();
                    }
                });
            }

            Self {
                name: name.into(),
                composers,
                sort,
                debounce: config.debounce_interval(),
                state: Mutex::new(DebounceState::default()),
                listeners: Listeners::new(),
                logger,
            }
        });

        view.logger.debug(&format!(
            "Variable '{}' built with {} records",
            view.name,
            view.composers.len()
        ));
        Ok(view)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current sorted list of composed records, as a JSON array
    pub fn snapshot(&self) -> Value {
        let mut records: Vec<Value> = self.composers.iter().map(|c| c.value()).collect();
        sort_records(&mut records, &self.sort);
        Value::Array(records)
    }

    /// Register a listener for emitted snapshots
    pub fn on_data<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Instant of the most recent emission
    pub fn last_emission(&self) -> Option<Instant> {
        self.state.lock().last_emission
    }

    fn recompute(self: &Arc<Self>) {
        let Some(interval) = self.debounce else {
            self.emit();
            return;
        };

        let now = Instant::now();
        let emit_now = {
            let mut state = self.state.lock();
            let due = state
                .last_emission
                .map_or(true, |last| now.duration_since(last) > interval);

            if !due && state.pending.is_none() {
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        let weak = Arc::downgrade(self);
                        let deadline = now + interval;
                        state.pending = Some(runtime.spawn(async move {
                            tokio::time::sleep_until(deadline).await;
                            if let Some(view) = weak.upgrade() {
                                view.state.lock().pending = None;
                                view.emit();
                            }
                        }));
                    }
                    Err(_) => {
                        drop(state);
                        self.logger.warning(&format!(
                            "No runtime to schedule debounced emission of '{}', emitting now",
                            self.name
                        ));
                        self.emit();
                        return;
                    }
                }
            }
            due
        };

        if emit_now {
            self.emit();
        }
    }

    fn emit(&self) {
        let snapshot = self.snapshot();
        self.state.lock().last_emission = Some(Instant::now());
        self.logger
            .debug(&format!(
                "Variable '{}' emitting {}",
                self.name,
                truncate_for_log(&snapshot.to_string(), 300)
            ));
        self.listeners.notify(&snapshot);
    }
}

impl Drop for VariableView {
    fn drop(&mut self) {
        if let Some(pending) = self.state.get_mut().pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{BridgeError, ValidationError};
    use crate::logger::NoopLogger;
    use crate::subscriptions::testing::RecordingTransport;
    use serde_json::json;

    fn registry(transport: Arc<RecordingTransport>) -> SubscriptionRegistry {
        SubscriptionRegistry::new(transport, Some("quotes".to_string()), NoopLogger::shared())
    }

    fn config(value: Value) -> VariableConfig {
        serde_json::from_value(value).unwrap()
    }

    fn quotes_config(debounce: Option<f64>) -> VariableConfig {
        config(json!({
            "structure": [
                {"attach": {"name": "b"}, "subscriptions": {"bid": {"itemID": "B", "fieldID": "bid"}}},
                {"attach": {"name": "c"}, "subscriptions": {"bid": {"itemID": "C", "fieldID": "bid"}}},
                {"attach": {"name": "a"}, "subscriptions": {"bid": {"itemID": "A", "fieldID": "bid"}}}
            ],
            "sort": ["name"],
            "debounce": debounce
        }))
    }

    fn record(view: &VariableView) -> Arc<Mutex<Vec<(Instant, Value)>>> {
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let sink = emitted.clone();
        view.on_data(move |value| sink.lock().push((Instant::now(), value.clone())));
        emitted
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = registry(RecordingTransport::shared());
        let view = VariableView::new("fx", &registry, &quotes_config(None), NoopLogger::shared()).unwrap();

        let names: Vec<Value> = view.snapshot().as_array().unwrap().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_every_change_emits_without_debounce() {
        let transport = RecordingTransport::shared();
        let registry = registry(transport.clone());
        let view = VariableView::new("fx", &registry, &quotes_config(None), NoopLogger::shared()).unwrap();
        let emitted = record(&view);

        transport.push("quotes", "A", "bid", json!(1));
        transport.push("quotes", "B", "bid", json!(2));
        transport.push("quotes", "B", "bid", json!(2));

        let emitted = emitted.lock();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[1].1[1], json!({"name": "b", "bid": 2}));
        assert!(view.last_emission().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_into_trailing_emission() {
        let transport = RecordingTransport::shared();
        let registry = registry(transport.clone());
        let view = VariableView::new("fx", &registry, &quotes_config(Some(100.0)), NoopLogger::shared()).unwrap();
        let emitted = record(&view);
        let start = Instant::now();

        transport.push("quotes", "A", "bid", json!(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        transport.push("quotes", "A", "bid", json!(2));
        tokio::time::sleep(Duration::from_millis(30)).await;
        transport.push("quotes", "A", "bid", json!(3));

        assert_eq!(emitted.lock().len(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let emitted = emitted.lock();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].0 - start, Duration::ZERO);
        assert_eq!(emitted[0].1[0]["bid"], json!(1));
        let trailing = emitted[1].0 - start;
        assert!(trailing >= Duration::from_millis(130) && trailing < Duration::from_millis(140));
        assert_eq!(emitted[1].1[0]["bid"], json!(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_period_emits_immediately_again() {
        let transport = RecordingTransport::shared();
        let registry = registry(transport.clone());
        let view = VariableView::new("fx", &registry, &quotes_config(Some(100.0)), NoopLogger::shared()).unwrap();
        let emitted = record(&view);

        transport.push("quotes", "A", "bid", json!(1));
        tokio::time::sleep(Duration::from_millis(150)).await;
        transport.push("quotes", "A", "bid", json!(2));

        let emitted = emitted.lock();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[1].1[0]["bid"], json!(2));
    }

    #[test]
    fn test_debounce_interval_conversion() {
        let interval = |debounce: Value| config(json!({"debounce": debounce})).debounce_interval();

        assert_eq!(interval(json!(250)), Some(Duration::from_millis(250)));
        assert_eq!(interval(json!(12.5)), Some(Duration::from_micros(12_500)));
        assert_eq!(interval(json!(0)), Some(Duration::ZERO));
        assert_eq!(interval(json!(-5)), None);
        assert_eq!(interval(Value::Null), None);
    }

    #[test]
    fn test_negative_debounce_emits_every_change() {
        let transport = RecordingTransport::shared();
        let registry = registry(transport.clone());
        let view = VariableView::new("fx", &registry, &quotes_config(Some(-1.0)), NoopLogger::shared()).unwrap();
        let emitted = record(&view);

        transport.push("quotes", "A", "bid", json!(1));
        transport.push("quotes", "A", "bid", json!(2));

        assert_eq!(emitted.lock().len(), 2);
    }

    #[test]
    fn test_sort_key_without_name_fails() {
        let registry = registry(RecordingTransport::shared());
        let config = config(json!({"structure": [], "sort": [{"reverse": true}]}));

        assert!(matches!(
            VariableView::new("fx", &registry, &config, NoopLogger::shared()),
            Err(BridgeError::Validation(ValidationError::MissingSortName { index: 0 }))
        ));
    }
}
