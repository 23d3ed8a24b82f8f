//! Outbound renderer stream: configuration, wire protocol and connection

mod config;
mod protocol;
mod stream;

pub use config::{
    RawSinkConfig, SinkProtocol, StreamSinkConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RECONNECT_TIMEOUT_MS,
};
pub use protocol::{format_float, format_key, frame_message, stringify, DATAPOOL_COMMAND};
pub use stream::{ConnectionState, StreamSink};
