/// Logging capability handed to components at construction
///
/// Components log through an `Arc<dyn EventLogger>` instead of calling the
/// global functions directly, so embedders and tests can silence or capture
/// their output.
use super::levels::LogLevel;
use super::tags::LogTag;
use std::sync::Arc;

pub trait EventLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
}

/// Forwards to the global logger under a fixed tag
#[derive(Debug, Clone, Copy)]
pub struct TaggedLogger {
    tag: LogTag,
}

impl TaggedLogger {
    pub fn new(tag: LogTag) -> Self {
        Self { tag }
    }

    pub fn shared(tag: LogTag) -> Arc<dyn EventLogger> {
        Arc::new(Self::new(tag))
    }
}

impl EventLogger for TaggedLogger {
    fn log(&self, level: LogLevel, message: &str) {
        super::log(self.tag, level, message);
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl NoopLogger {
    pub fn shared() -> Arc<dyn EventLogger> {
        Arc::new(NoopLogger)
    }
}

impl EventLogger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Keeps every message in memory; used by tests to assert on logged errors
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryLogger {
    pub lines: parking_lot::Mutex<Vec<(LogLevel, String)>>,
}

#[cfg(test)]
impl MemoryLogger {
    pub fn count(&self, level: LogLevel) -> usize {
        self.lines.lock().iter().filter(|(l, _)| *l == level).count()
    }
}

#[cfg(test)]
impl EventLogger for MemoryLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}
