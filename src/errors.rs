/// Structured error types for cachebridge
///
/// Validation errors indicate misconfiguration and are returned to the caller
/// synchronously. Transport and sink errors describe I/O conditions; most of
/// them are logged and absorbed by the component that hit them.
use thiserror::Error;

// =============================================================================
// MAIN ERROR TYPE
// =============================================================================

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Validation error: {0}")] Validation(#[from] ValidationError),

    #[error("Subscription already cancelled: {path}")] AlreadyCancelled {
        path: String,
    },

    #[error("Configuration error: {0}")] Config(#[from] ConfigError),

    #[error("Transport error: {0}")] Transport(#[from] TransportError),

    #[error("Sink error: {0}")] Sink(#[from] SinkError),
}

impl BridgeError {
    /// Errors that describe a broken configuration rather than a runtime condition
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BridgeError::Validation(_) | BridgeError::Config(_) | BridgeError::AlreadyCancelled { .. }
        )
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

// =============================================================================
// VALIDATION ERRORS
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing collectionID")] MissingCollectionId,

    #[error("Missing itemID")] MissingItemId,

    #[error("Missing required name in sort params (sort key #{index})")] MissingSortName {
        index: usize,
    },
}

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing {field} in configuration")] Missing {
        field: String,
    },

    #[error("Invalid config field '{field}': {reason}")] Invalid {
        field: String,
        reason: String,
    },

    #[error("Unsupported output protocol '{protocol}' (only tcp is implemented)")] UnsupportedProtocol {
        protocol: String,
    },
}

// =============================================================================
// SUBSCRIPTION TRANSPORT ERRORS
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport connection task is not running")] NotRunning,

    #[error("Unknown subscription handle {0}")] UnknownHandle(u64),

    #[error("Subscription payload error: {0}")] Payload(String),

    #[error("Server reported error for subscription {id}: {message}")] Server {
        id: u64,
        message: String,
    },
}

// =============================================================================
// STREAM SINK ERRORS
// =============================================================================

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Socket not connected")] SocketClosed,

    #[error("Socket write failed: {0}")] Io(#[from] std::io::Error),
}
