//! Structured logging system for cachebridge
//!
//! This module provides a tag-based logging API with:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-module debug control via --debug-<tag> flags (or --debug for all)
//! - Dual output: colored console + optional file mirror (--log-file)
//! - An `EventLogger` capability handed to components at construction
//! - Routing of `log` facade records from dependencies into the same output
//!
//! ## Usage
//!
//! ```rust
//! use cachebridge::logger::{self, LogTag};
//!
//! logger::info(LogTag::Sink, "Connected to localhost:6100");
//! logger::debug(LogTag::Subscriptions, "Created subscription"); // Only if --debug-subscriptions
//! ```
//!
//! ## Initialization
//!
//! Call once at startup:
//! ```rust
//! cachebridge::logger::init();
//! ```

mod capability;
mod config;
mod core;
mod facade;
mod file;
mod format;
mod levels;
mod tags;

pub use capability::{EventLogger, NoopLogger, TaggedLogger};
#[cfg(test)]
pub use capability::MemoryLogger;
pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system
///
/// 1. Parse command-line arguments for debug flags
/// 2. Open the log file mirror if requested
/// 3. Install the `log` facade bridge for dependency records
pub fn init() {
    config::init_from_args();
    file::init_file_logging(get_logger_config().log_file.as_deref());
    facade::install();
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (shown unless --quiet is combined with a lower threshold)
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level, only shown with --debug-<tag> or --debug
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level, only shown with --verbose
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Log at an explicit level
pub fn log(tag: LogTag, level: LogLevel, message: &str) {
    core::log_internal(tag, level, message);
}

/// Force flush all pending log writes
///
/// Call this during shutdown to ensure all logs are written to disk.
pub fn flush() {
    file::flush_file_logging();
}
