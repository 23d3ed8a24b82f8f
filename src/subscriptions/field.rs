/// A single shared remote field subscription
///
/// Created only by `SubscriptionRegistry`. Holds the latest value pushed by
/// the transport and notifies listeners when that value actually changes.
use super::path::{SubscriptionMode, SubscriptionPath};
use super::transport::{FieldEventHandler, FieldNotification, SubscriptionHandle, SubscriptionTransport};
use crate::errors::{BridgeError, BridgeResult, TransportError};
use crate::logger::EventLogger;
use crate::observer::{ListenerId, Listeners};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Default)]
struct FieldState {
    /// None until the first update arrives
    value: Option<Value>,
    cancelled: bool,
    handle: Option<SubscriptionHandle>,
}

pub struct FieldSubscription {
    path: SubscriptionPath,
    state: Mutex<FieldState>,
    listeners: Listeners<Value>,
    transport: Arc<dyn SubscriptionTransport>,
    logger: Arc<dyn EventLogger>,
}

impl FieldSubscription {
    /// Create the subscription and issue its single transport subscribe call
    pub(crate) fn create(
        path: SubscriptionPath,
        transport: Arc<dyn SubscriptionTransport>,
        logger: Arc<dyn EventLogger>,
    ) -> Arc<Self> {
        let subscription = Arc::new(Self {
            path,
            state: Mutex::new(FieldState::default()),
            listeners: Listeners::new(),
            transport,
            logger,
        });

        subscription
            .logger
            .debug(&format!("Subscription created: {}", subscription.path));

        match &subscription.path.mode {
            SubscriptionMode::HashField { item_id, field_id } => {
                let weak = Arc::downgrade(&subscription);
                let handler: FieldEventHandler = Arc::new(move |event| {
                    if let Some(subscription) = weak.upgrade() {
                        subscription.handle_event(event);
                    }
                });

                match subscription.transport.subscribe(
                    &subscription.path.collection_id,
                    item_id,
                    field_id,
                    handler,
                ) {
                    Ok(handle) => subscription.state.lock().handle = Some(handle),
                    Err(e) => subscription.logger.error(&format!(
                        "Failed to subscribe {}: {}",
                        subscription.path, e
                    )),
                }
            }
            SubscriptionMode::Item { .. } => {
                subscription.logger.debug(&format!(
                    "Whole-item subscriptions have no query yet, {} will not receive updates",
                    subscription.path
                ));
            }
        }

        subscription
    }

    fn handle_event(&self, event: Result<FieldNotification, TransportError>) {
        match event {
            Ok(notification) => {
                if self.is_cancelled() {
                    return;
                }
                self.set_value(notification.effective_value());
            }
            Err(e) => {
                self.logger
                    .error(&format!("Subscription error for {}: {}", self.path, e));
            }
        }
    }

    pub fn path(&self) -> &SubscriptionPath {
        &self.path
    }

    /// Latest value; None before the first update
    pub fn value(&self) -> Option<Value> {
        self.state.lock().value.clone()
    }

    /// Store `value` and notify listeners if it differs from the current one.
    /// Returns whether listeners were notified.
    pub fn set_value(&self, value: Value) -> bool {
        {
            let mut state = self.state.lock();
            if state.value.as_ref() == Some(&value) {
                return false;
            }
            state.value = Some(value.clone());
        }

        self.logger
            .debug(&format!("Received data {}: {}", self.path, value));
        self.listeners.notify(&value);
        true
    }

    /// Register a change listener
    pub fn on_data<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Unsubscribe from the transport. Unsubscribe failures are logged, not
    /// returned; a second call fails with `AlreadyCancelled`.
    pub(crate) fn cancel(&self) -> BridgeResult<()> {
        let handle = {
            let mut state = self.state.lock();
            if state.cancelled {
                return Err(BridgeError::AlreadyCancelled {
                    path: self.path.to_string(),
                });
            }
            state.cancelled = true;
            state.handle.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = self.transport.unsubscribe(handle) {
                self.logger
                    .error(&format!("Failed to unsubscribe {}: {}", self.path, e));
            }
        }

        self.logger
            .debug(&format!("Subscription cancelled: {}", self.path));
        Ok(())
    }
}
