/// One composed output record
///
/// Static `attach` values come first, then one entry per dynamic field in
/// configuration order. Dynamic entries hold null until their subscription
/// reports a value; every change re-emits the whole record.
use crate::errors::BridgeResult;
use crate::observer::{ListenerId, Listeners};
use crate::subscriptions::{FieldSubscription, SubscriptionParams, SubscriptionRegistry};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};

/// Configuration of one record in a variable's structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureItem {
    #[serde(default)]
    pub attach: Map<String, Value>,
    #[serde(
        default,
        deserialize_with = "deserialize_field_params",
        serialize_with = "serialize_field_params"
    )]
    pub subscriptions: Vec<(String, SubscriptionParams)>,
}

fn deserialize_field_params<'de, D>(deserializer: D) -> Result<Vec<(String, SubscriptionParams)>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Map::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(field, params)| {
            serde_json::from_value(params)
                .map(|params| (field.clone(), params))
                .map_err(|e| serde::de::Error::custom(format!("subscription '{}': {}", field, e)))
        })
        .collect()
}

fn serialize_field_params<S>(fields: &[(String, SubscriptionParams)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (field, params) in fields {
        map.serialize_entry(field, params)?;
    }
    map.end()
}

struct DynamicField {
    subscription: Arc<FieldSubscription>,
    listener: ListenerId,
}

pub struct ObjectComposer {
    values: Mutex<Map<String, Value>>,
    fields: Vec<DynamicField>,
    listeners: Listeners<Value>,
}

impl ObjectComposer {
    /// Resolve every dynamic field through `registry` and start listening
    pub fn new(registry: &SubscriptionRegistry, item: &StructureItem) -> BridgeResult<Arc<Self>> {
        let mut values = item.attach.clone();
        let mut resolved = Vec::with_capacity(item.subscriptions.len());

        for (name, params) in &item.subscriptions {
            let subscription = registry.subscription(params)?;
            values.insert(name.clone(), Value::Null);
            resolved.push((name.clone(), subscription));
        }

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let fields = resolved
                .into_iter()
                .map(|(name, subscription)| {
                    let weak = weak.clone();
                    let listener = subscription.on_data(move |value| {
                        if let Some(composer) = weak.upgrade() {
                            composer.update(&name, value.clone());
                        }
                    });
                    DynamicField {
                        subscription,
                        listener,
                    }
                })
                .collect();

            Self {
                values: Mutex::new(values),
                fields,
                listeners: Listeners::new(),
            }
        }))
    }

    fn update(&self, name: &str, value: Value) {
        let composite = {
            let mut values = self.values.lock();
            values.insert(name.to_string(), value);
            Value::Object(values.clone())
        };
        self.listeners.notify(&composite);
    }

    /// Current composite record
    pub fn value(&self) -> Value {
        Value::Object(self.values.lock().clone())
    }

    pub fn on_data<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl Drop for ObjectComposer {
    fn drop(&mut self) {
        for field in &self.fields {
            field.subscription.remove_listener(field.listener);
        }
    }
}
