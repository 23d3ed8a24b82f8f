use std::time::Duration;
use tokio::sync::Notify;

/// Waits for `duration` unless shutdown is signalled first.
/// Returns true when shutdown was signalled.
pub async fn check_shutdown_or_delay(shutdown: &Notify, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.notified() => true,
    }
}

/// Shortens long payloads for log lines
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}... ({} chars)", head, text.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_delay_elapses_without_shutdown() {
        let shutdown = Notify::new();
        assert!(!check_shutdown_or_delay(&shutdown, Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_delay() {
        let shutdown = Arc::new(Notify::new());
        shutdown.notify_one();
        assert!(check_shutdown_or_delay(&shutdown, Duration::from_secs(60)).await);
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("abcdefghij", 4), "abcd... (10 chars)");
    }
}
