//! `log` facade bridge
//!
//! Dependencies such as tungstenite report through the `log` crate. Their
//! records are forwarded into our logger under the transport tag so they
//! share the console format and the --verbose gate.

use super::levels::LogLevel;
use super::tags::LogTag;

struct FacadeBridge;

static FACADE_BRIDGE: FacadeBridge = FacadeBridge;

impl log::Log for FacadeBridge {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Trace
    }

    fn log(&self, record: &log::Record) {
        let message = format!("{}: {}", record.target(), record.args());
        super::core::log_internal(LogTag::Transport, LogLevel::from_facade(record.level()), &message);
    }

    fn flush(&self) {
        super::file::flush_file_logging();
    }
}

/// Install the bridge as the global `log` logger; later calls are ignored
pub fn install() {
    if log::set_logger(&FACADE_BRIDGE).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}
