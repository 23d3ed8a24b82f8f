/// Seam between field subscriptions and the remote publish/subscribe service
///
/// A transport accepts hash-field subscriptions, pushes notifications to the
/// handler it was given, and cancels them on request. `GraphqlWsClient` is the
/// production implementation; tests use a recording transport.
use crate::errors::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Kind of change reported for a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MutationType {
    Insert,
    Update,
    Delete,
    Other(String),
}

impl From<String> for MutationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "INSERT" => MutationType::Insert,
            "UPDATE" => MutationType::Update,
            "DELETE" => MutationType::Delete,
            _ => MutationType::Other(value),
        }
    }
}

impl From<MutationType> for String {
    fn from(value: MutationType) -> Self {
        match value {
            MutationType::Insert => "INSERT".to_string(),
            MutationType::Update => "UPDATE".to_string(),
            MutationType::Delete => "DELETE".to_string(),
            MutationType::Other(other) => other,
        }
    }
}

/// One pushed change for a subscribed field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNotification {
    pub mutation_type: MutationType,
    pub value: Value,
}

impl FieldNotification {
    pub fn new(mutation_type: MutationType, value: Value) -> Self {
        Self { mutation_type, value }
    }

    /// Value the field holds after this change; deletions reset it to null
    pub fn effective_value(&self) -> Value {
        match self.mutation_type {
            MutationType::Delete => Value::Null,
            _ => self.value.clone(),
        }
    }
}

/// Receives notifications (or delivery errors) for one subscription
pub type FieldEventHandler = Arc<dyn Fn(Result<FieldNotification, TransportError>) + Send + Sync>;

/// Opaque token identifying an active transport subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection lifecycle of the transport, for status reporting only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Connecting,
    Connected,
    Reconnected,
    Disconnected,
}

pub trait SubscriptionTransport: Send + Sync {
    /// Start a hash-field subscription; notifications go to `handler`
    fn subscribe(
        &self,
        collection_id: &str,
        item_id: &str,
        field_id: &str,
        handler: FieldEventHandler,
    ) -> Result<SubscriptionHandle, TransportError>;

    /// Stop a subscription started by `subscribe`
    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError>;
}
