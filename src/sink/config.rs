/// Output sink configuration
///
/// `RawSinkConfig` is what the configuration file holds; `StreamSinkConfig`
/// is the resolved form with defaults applied.
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
/// Renderer default port for the command interface
pub const DEFAULT_PORT: u16 = 6100;
pub const DEFAULT_RECONNECT_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSinkConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(rename = "commandInterface", default)]
    pub command_interface: Option<bool>,
    /// Connect and reconnect timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkProtocol {
    Tcp,
    Udp,
}

impl SinkProtocol {
    /// Anything other than "udp" (case-insensitive) means tcp
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(p) if p.eq_ignore_ascii_case("udp") => SinkProtocol::Udp,
            _ => SinkProtocol::Tcp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SinkProtocol::Tcp => "tcp",
            SinkProtocol::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSinkConfig {
    pub host: String,
    pub port: u16,
    pub protocol: SinkProtocol,
    /// Wrap messages in DataPool SET commands; otherwise `name|value`
    pub command_interface: bool,
    pub reconnect_timeout: Duration,
}

impl StreamSinkConfig {
    /// Apply defaults; UDP has no framing and is rejected
    pub fn from_raw(raw: &RawSinkConfig) -> Result<Self, ConfigError> {
        let protocol = SinkProtocol::parse(raw.protocol.as_deref());
        if protocol == SinkProtocol::Udp {
            return Err(ConfigError::UnsupportedProtocol {
                protocol: protocol.as_str().to_string(),
            });
        }

        let reconnect_timeout = raw
            .timeout
            .filter(|ms| ms.is_finite() && *ms > 0.0)
            .map(|ms| Duration::from_secs_f64(ms / 1000.0))
            .unwrap_or(Duration::from_millis(DEFAULT_RECONNECT_TIMEOUT_MS));

        Ok(Self {
            host: raw.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            protocol,
            command_interface: raw.command_interface.unwrap_or(false) || raw.port.is_none(),
            reconnect_timeout,
        })
    }

    /// `host:port` for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for StreamSinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.protocol.as_str())
    }
}
