/// Recording transport for unit tests
///
/// Keeps every subscribe/unsubscribe call and lets tests push notifications
/// to the registered handlers as if they came from the server.
use super::transport::{
    FieldEventHandler, FieldNotification, MutationType, SubscriptionHandle, SubscriptionTransport,
};
use crate::errors::TransportError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct RecordingTransport {
    next_handle: AtomicU64,
    subscribed: Mutex<Vec<(String, String, String)>>,
    handlers: Mutex<HashMap<(String, String, String), (SubscriptionHandle, FieldEventHandler)>>,
    unsubscribed: Mutex<Vec<SubscriptionHandle>>,
    fail_unsubscribe: AtomicBool,
}

impl RecordingTransport {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe_calls(&self) -> Vec<(String, String, String)> {
        self.subscribed.lock().clone()
    }

    pub fn unsubscribe_calls(&self) -> Vec<SubscriptionHandle> {
        self.unsubscribed.lock().clone()
    }

    pub fn fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    fn handler(&self, collection_id: &str, item_id: &str, field_id: &str) -> FieldEventHandler {
        let key = (collection_id.to_string(), item_id.to_string(), field_id.to_string());
        self.handlers
            .lock()
            .get(&key)
            .map(|(_, handler)| handler.clone())
            .unwrap_or_else(|| panic!("no subscription for {:?}", key))
    }

    /// Deliver an UPDATE for the given field
    pub fn push(&self, collection_id: &str, item_id: &str, field_id: &str, value: Value) {
        let handler = self.handler(collection_id, item_id, field_id);
        handler(Ok(FieldNotification::new(MutationType::Update, value)));
    }

    /// Deliver a DELETE for the given field
    pub fn push_delete(&self, collection_id: &str, item_id: &str, field_id: &str) {
        let handler = self.handler(collection_id, item_id, field_id);
        handler(Ok(FieldNotification::new(MutationType::Delete, Value::Null)));
    }

    /// Deliver a delivery error for the given field
    pub fn push_error(&self, collection_id: &str, item_id: &str, field_id: &str, message: &str) {
        let handler = self.handler(collection_id, item_id, field_id);
        handler(Err(TransportError::Payload(message.to_string())));
    }
}

impl SubscriptionTransport for RecordingTransport {
    fn subscribe(
        &self,
        collection_id: &str,
        item_id: &str,
        field_id: &str,
        handler: FieldEventHandler,
    ) -> Result<SubscriptionHandle, TransportError> {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        let key = (collection_id.to_string(), item_id.to_string(), field_id.to_string());
        self.subscribed.lock().push(key.clone());
        self.handlers.lock().insert(key, (handle, handler));
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        self.unsubscribed.lock().push(handle);
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(TransportError::NotRunning);
        }
        self.handlers.lock().retain(|_, (h, _)| *h != handle);
        Ok(())
    }
}
