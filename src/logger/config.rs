/// Logger configuration derived from command-line flags
///
/// Held in a global so every `logger::*` call can filter without
/// threading configuration through the call stack.
use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Messages above this level are dropped (Debug/Verbose have extra gates)
    pub min_level: LogLevel,
    /// Debug output for every tag (--debug)
    pub debug_all: bool,
    /// Tags with debug output enabled (--debug-<tag>)
    pub debug_tags: HashSet<String>,
    /// When non-empty, only these tags are shown
    pub enabled_tags: HashSet<String>,
    /// Mirror file for log lines
    pub log_file: Option<String>,
    /// Console output toggle
    pub console: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_all: false,
            debug_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
            log_file: None,
            console: true,
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> = Lazy::new(|| RwLock::new(LoggerConfig::default()));

/// Snapshot of the current configuration
pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

/// Replace the configuration
pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

/// Build the configuration from command-line arguments
pub fn init_from_args() {
    let mut config = LoggerConfig::default();

    if arguments::is_quiet_enabled() {
        config.min_level = LogLevel::Warning;
    }
    if arguments::is_verbose_enabled() {
        config.min_level = LogLevel::Verbose;
    } else if arguments::is_debug_all_enabled() {
        config.min_level = LogLevel::Debug;
    }

    config.debug_all = arguments::is_debug_all_enabled();
    for tag in LogTag::ALL {
        let key = tag.to_debug_key();
        if arguments::is_debug_enabled_for(&key) {
            config.debug_tags.insert(key);
            if config.min_level < LogLevel::Debug {
                config.min_level = LogLevel::Debug;
            }
        }
    }

    config.log_file = arguments::get_log_file_path();

    set_logger_config(config);
}

pub(super) fn is_debug_enabled_for_tag(config: &LoggerConfig, tag: &LogTag) -> bool {
    config.debug_all || config.debug_tags.contains(&tag.to_debug_key())
}
