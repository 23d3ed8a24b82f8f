/// Composition root
///
/// Builds one `VariableView` per configured variable on top of a shared
/// `SubscriptionRegistry` and forwards every emission to all output sinks.
/// Emissions happen synchronously inside subscription callbacks, so they are
/// queued on a channel and written by a single forwarding task. When a sink
/// (re)connects, the current snapshot of every variable is replayed to it.
use crate::compose::{VariableConfig, VariableView};
use crate::errors::BridgeResult;
use crate::logger::{EventLogger, LogTag, NoopLogger, TaggedLogger};
use crate::sink::{ConnectionState, StreamSink};
use crate::subscriptions::{SubscriptionRegistry, SubscriptionTransport};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Loggers handed to each layer of the bridge
#[derive(Clone)]
pub struct BridgeLoggers {
    pub subscriptions: Arc<dyn EventLogger>,
    pub compose: Arc<dyn EventLogger>,
    pub bridge: Arc<dyn EventLogger>,
}

impl BridgeLoggers {
    /// Forward to the global logger under per-layer tags
    pub fn tagged() -> Self {
        Self {
            subscriptions: TaggedLogger::shared(LogTag::Subscriptions),
            compose: TaggedLogger::shared(LogTag::Compose),
            bridge: TaggedLogger::shared(LogTag::Bridge),
        }
    }

    pub fn silent() -> Self {
        Self {
            subscriptions: NoopLogger::shared(),
            compose: NoopLogger::shared(),
            bridge: NoopLogger::shared(),
        }
    }
}

enum Outbound {
    Variable { name: String, value: Value },
    Replay { sink: usize },
}

pub struct Bridge {
    registry: Arc<SubscriptionRegistry>,
    views: Vec<Arc<VariableView>>,
    sinks: Vec<Arc<StreamSink>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    logger: Arc<dyn EventLogger>,
}

impl Bridge {
    /// Wire variables to sinks. Must be called inside a tokio runtime.
    pub fn start(
        transport: Arc<dyn SubscriptionTransport>,
        default_collection_id: Option<String>,
        variables: &[(String, VariableConfig)],
        sinks: Vec<Arc<StreamSink>>,
        loggers: BridgeLoggers,
    ) -> BridgeResult<Self> {
        let registry = Arc::new(SubscriptionRegistry::new(
            transport,
            default_collection_id,
            loggers.subscriptions.clone(),
        ));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let mut views = Vec::with_capacity(variables.len());
        for (name, config) in variables {
            let view = match VariableView::new(name.clone(), &registry, config, loggers.compose.clone()) {
                Ok(view) => view,
                Err(e) => {
                    registry.cancel_all();
                    return Err(e);
                }
            };

            let queue = outbound.clone();
            let variable = name.clone();
            view.on_data(move |value| {
                let _ = queue.send(Outbound::Variable {
                    name: variable.clone(),
                    value: value.clone(),
                });
            });
            views.push(view);
        }

        let mut tasks = Vec::with_capacity(sinks.len() + 1);
        tasks.push(tokio::spawn(forward(
            outbound_rx,
            views.clone(),
            sinks.clone(),
            loggers.bridge.clone(),
        )));

        for (index, sink) in sinks.iter().enumerate() {
            tasks.push(tokio::spawn(watch_connects(
                index,
                sink.subscribe_state(),
                outbound.clone(),
            )));
        }

        loggers.bridge.info(&format!(
            "Bridge started: {} variables, {} subscriptions, {} outputs",
            views.len(),
            registry.len(),
            sinks.len()
        ));

        Ok(Self {
            registry,
            views,
            sinks,
            tasks: Mutex::new(tasks),
            logger: loggers.bridge,
        })
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn views(&self) -> &[Arc<VariableView>] {
        &self.views
    }

    pub fn sinks(&self) -> &[Arc<StreamSink>] {
        &self.sinks
    }

    /// Current snapshot of every variable, in configuration order
    pub fn snapshots(&self) -> Vec<(String, Value)> {
        self.views
            .iter()
            .map(|view| (view.name().to_string(), view.snapshot()))
            .collect()
    }

    /// Cancel all subscriptions, stop forwarding and close every sink
    pub async fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        self.logger
            .info(&format!("Cancelled {} subscriptions", cancelled));

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }

        for sink in &self.sinks {
            sink.shutdown().await;
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn forward(
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    views: Vec<Arc<VariableView>>,
    sinks: Vec<Arc<StreamSink>>,
    logger: Arc<dyn EventLogger>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Variable { name, value } => {
                for sink in &sinks {
                    if let Err(e) = sink.send(&name, &value).await {
                        logger.warning(&format!(
                            "Failed to send '{}' to {}: {}",
                            name,
                            sink.config(),
                            e
                        ));
                    }
                }
            }
            Outbound::Replay { sink } => {
                let Some(sink) = sinks.get(sink) else {
                    continue;
                };
                logger.debug(&format!(
                    "Replaying {} variables to {}",
                    views.len(),
                    sink.config()
                ));
                for view in &views {
                    if let Err(e) = sink.send(view.name(), &view.snapshot()).await {
                        logger.warning(&format!(
                            "Failed to replay '{}' to {}: {}",
                            view.name(),
                            sink.config(),
                            e
                        ));
                        break;
                    }
                }
            }
        }
    }
}

/// Queue a replay every time the sink enters the connected state
async fn watch_connects(
    sink: usize,
    mut states: tokio::sync::watch::Receiver<ConnectionState>,
    outbound: mpsc::UnboundedSender<Outbound>,
) {
    let mut previous = ConnectionState::Disconnected;
    loop {
        let current = *states.borrow_and_update();
        if current == ConnectionState::Connected && previous != ConnectionState::Connected {
            if outbound.send(Outbound::Replay { sink }).is_err() {
                return;
            }
        }
        previous = current;

        if states.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{BridgeError, ValidationError};
    use crate::sink::{SinkProtocol, StreamSinkConfig};
    use crate::subscriptions::testing::RecordingTransport;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    fn variables(value: Value) -> Vec<(String, VariableConfig)> {
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(name, config)| (name.clone(), serde_json::from_value(config.clone()).unwrap()))
            .collect()
    }

    fn fx_variables() -> Vec<(String, VariableConfig)> {
        variables(json!({
            "fx": {
                "structure": [
                    {"attach": {"name": "EUR"}, "subscriptions": {"bid": {"itemID": "EURUSD", "fieldID": "bid"}}},
                    {"attach": {"name": "CHF"}, "subscriptions": {"bid": {"itemID": "USDCHF", "fieldID": "bid"}}}
                ],
                "sort": ["name"]
            }
        }))
    }

    async fn listening_sink() -> (TcpListener, Arc<StreamSink>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = StreamSinkConfig {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
            protocol: SinkProtocol::Tcp,
            command_interface: true,
            reconnect_timeout: Duration::from_millis(100),
        };
        let sink = Arc::new(StreamSink::connect(config, NoopLogger::shared()));
        (listener, sink)
    }

    async fn read_message(stream: &mut TcpStream) -> String {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.unwrap();
            if byte[0] == 0 {
                break;
            }
            bytes.push(byte[0]);
        }
        String::from_utf8(bytes).unwrap()
    }

    async fn read_until(stream: &mut TcpStream, expected: &str) {
        timeout(Duration::from_secs(5), async {
            loop {
                if read_message(stream).await == expected {
                    return;
                }
            }
        })
        .await
        .expect("expected message not received");
    }

    #[tokio::test]
    async fn test_replays_snapshot_on_connect() {
        let transport = RecordingTransport::shared();
        let (listener, sink) = listening_sink().await;

        let bridge = Bridge::start(
            transport.clone(),
            Some("quotes".to_string()),
            &fx_variables(),
            vec![sink],
            BridgeLoggers::silent(),
        )
        .unwrap();

        // Emitted before the sink is connected: dropped, then replayed
        transport.push("quotes", "EURUSD", "bid", json!("1.08"));

        let (mut peer, _) = timeout(Duration::from_secs(5), listener.accept()).await.unwrap().unwrap();
        assert_eq!(
            read_message(&mut peer).await,
            "send RENDERER*FUNCTION*DataPool*Data SET fx[0-1]={{name=CHF; bid=;}, {name=EUR; bid=1.08;}},"
        );

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_forwards_emissions() {
        let transport = RecordingTransport::shared();
        let (listener, sink) = listening_sink().await;
        let mut states = sink.subscribe_state();

        let bridge = Bridge::start(
            transport.clone(),
            Some("quotes".to_string()),
            &fx_variables(),
            vec![sink],
            BridgeLoggers::silent(),
        )
        .unwrap();

        let (mut peer, _) = timeout(Duration::from_secs(5), listener.accept()).await.unwrap().unwrap();
        timeout(Duration::from_secs(5), async {
            while *states.borrow_and_update() != ConnectionState::Connected {
                states.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        transport.push("quotes", "USDCHF", "bid", json!(0.91));
        read_until(
            &mut peer,
            "send RENDERER*FUNCTION*DataPool*Data SET fx[0-1]={{name=CHF; bid=0.91;}, {name=EUR; bid=;}},",
        )
        .await;

        assert_eq!(bridge.registry().len(), 2);
        assert_eq!(bridge.snapshots()[0].0, "fx");
        bridge.shutdown().await;
        assert!(bridge.registry().is_empty());
        assert_eq!(transport.unsubscribe_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_variable_cancels_created_subscriptions() {
        let transport = RecordingTransport::shared();
        let mut config = fx_variables();
        config.extend(variables(json!({"broken": {"structure": [], "sort": [{"number": true}]}})));

        let result = Bridge::start(transport.clone(), Some("quotes".to_string()), &config, Vec::new(), BridgeLoggers::silent());

        assert!(matches!(
            result,
            Err(BridgeError::Validation(ValidationError::MissingSortName { index: 0 }))
        ));
        assert_eq!(transport.unsubscribe_calls().len(), 2);
    }
}
