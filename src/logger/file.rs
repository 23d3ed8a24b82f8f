/// File mirror for log output
///
/// Lines are appended to the file given by `--log-file`. Failures to open or
/// write the file are reported once on stderr and never interrupt logging.
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

static LOG_FILE: Lazy<Mutex<Option<BufWriter<File>>>> = Lazy::new(|| Mutex::new(None));

/// Open (append) the log file, replacing any previously opened one
pub fn init_file_logging(path: Option<&str>) {
    let Some(path) = path else {
        return;
    };

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            *LOG_FILE.lock() = Some(BufWriter::new(file));
        }
        Err(e) => {
            eprintln!("Failed to open log file '{}': {}", path, e);
        }
    }
}

/// Append one line to the log file if one is open
pub fn write_to_file(line: &str) {
    let mut guard = LOG_FILE.lock();
    if let Some(writer) = guard.as_mut() {
        if let Err(e) = writeln!(writer, "{}", line) {
            eprintln!("Failed to write log file, disabling file logging: {}", e);
            *guard = None;
        }
    }
}

/// Flush buffered lines to disk
pub fn flush_file_logging() {
    if let Some(writer) = LOG_FILE.lock().as_mut() {
        let _ = writer.flush();
    }
}
