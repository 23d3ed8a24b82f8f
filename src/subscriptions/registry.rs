/// Shared subscription registry
///
/// Canonicalizes requests into `SubscriptionPath` keys and hands out at most
/// one `FieldSubscription` per path, so every consumer of a remote field
/// shares a single transport subscription. The registry is the only owner
/// allowed to cancel subscriptions.
use super::field::FieldSubscription;
use super::path::{SubscriptionParams, SubscriptionPath};
use super::transport::SubscriptionTransport;
use crate::errors::{BridgeResult, ValidationError};
use crate::logger::EventLogger;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SubscriptionRegistry {
    transport: Arc<dyn SubscriptionTransport>,
    default_collection_id: Option<String>,
    subscriptions: Mutex<HashMap<SubscriptionPath, Arc<FieldSubscription>>>,
    logger: Arc<dyn EventLogger>,
}

impl SubscriptionRegistry {
    pub fn new(
        transport: Arc<dyn SubscriptionTransport>,
        default_collection_id: Option<String>,
        logger: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            transport,
            default_collection_id,
            subscriptions: Mutex::new(HashMap::new()),
            logger,
        }
    }

    /// Canonical path for `params` under this registry's default collection
    pub fn path_for(&self, params: &SubscriptionParams) -> Result<SubscriptionPath, ValidationError> {
        SubscriptionPath::sanitize(params, self.default_collection_id.as_deref())
    }

    /// Shared subscription for `params`, created on first request
    pub fn subscription(&self, params: &SubscriptionParams) -> BridgeResult<Arc<FieldSubscription>> {
        let path = self.path_for(params)?;

        let mut subscriptions = self.subscriptions.lock();
        if let Some(existing) = subscriptions.get(&path) {
            return Ok(existing.clone());
        }

        let created = FieldSubscription::create(path.clone(), self.transport.clone(), self.logger.clone());
        subscriptions.insert(path, created.clone());
        Ok(created)
    }

    /// Whether a subscription already exists for `params`
    pub fn has(&self, params: &SubscriptionParams) -> BridgeResult<bool> {
        let path = self.path_for(params)?;
        Ok(self.subscriptions.lock().contains_key(&path))
    }

    /// Cancel and forget the subscription for `params`.
    /// Returns false when no subscription existed.
    pub fn cancel(&self, params: &SubscriptionParams) -> BridgeResult<bool> {
        let path = self.path_for(params)?;
        let removed = self.subscriptions.lock().remove(&path);

        match removed {
            Some(subscription) => {
                subscription.cancel()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancel every subscription; returns how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Arc<FieldSubscription>> =
            self.subscriptions.lock().drain().map(|(_, s)| s).collect();

        let mut cancelled = 0;
        for subscription in drained {
            match subscription.cancel() {
                Ok(()) => cancelled += 1,
                Err(e) => self.logger.warning(&e.to_string()),
            }
        }
        cancelled
    }

    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display form of every active path, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .subscriptions
            .lock()
            .keys()
            .map(|path| path.to_string())
            .collect();
        paths.sort();
        paths
    }
}
