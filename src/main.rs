use cachebridge::{
    arguments::{is_help_requested, print_help},
    logger::{self as logger, LogTag},
};

/// Main entry point for cachebridge
///
/// Loads the subscription configuration, keeps every configured variable in
/// sync with the quote cache and streams the results to the renderer sockets
/// until interrupted.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logger system
    logger::init();

    // Check for help request first (before any other processing)
    if is_help_requested() {
        print_help();
        std::process::exit(0);
    }

    logger::info(LogTag::System, "cachebridge starting up...");

    match cachebridge::run::run_bridge().await {
        Ok(_) => {
            logger::info(LogTag::System, "cachebridge stopped");
        }
        Err(e) => {
            logger::error(LogTag::System, &format!("cachebridge failed: {}", e));
            logger::flush();
            std::process::exit(1);
        }
    }
}
