//! Remote field subscriptions
//!
//! - `path`: request parameters and canonical subscription keys
//! - `transport`: the transport seam and notification types
//! - `graphql`: GraphQL-over-WebSocket transport
//! - `field`: one shared, change-gated field subscription
//! - `registry`: deduplicating owner of all field subscriptions

mod field;
mod graphql;
mod path;
mod registry;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use field::FieldSubscription;
pub use graphql::{parse_hash_item_field, websocket_url, GraphqlWsClient, GraphqlWsOptions, GRAPHQL_WS_PROTOCOL};
pub use path::{SubscriptionMode, SubscriptionParams, SubscriptionPath};
pub use registry::SubscriptionRegistry;
pub use transport::{
    FieldEventHandler, FieldNotification, MutationType, SubscriptionHandle, SubscriptionTransport,
    TransportStatus,
};
