use crate::{
    arguments,
    bridge::{Bridge, BridgeLoggers},
    config::BridgeConfig,
    logger::{self, LogLevel, LogTag, TaggedLogger},
    sink::{ConnectionState, StreamSink},
    subscriptions::{GraphqlWsClient, GraphqlWsOptions, TransportStatus},
};
use std::sync::Arc;
use tokio::sync::watch;

/// Bridge lifecycle: load config, connect, run until a shutdown signal
pub async fn run_bridge() -> Result<(), String> {
    let config_path = arguments::get_config_path();
    logger::info(
        LogTag::Config,
        &format!("Loading configuration from {}", config_path),
    );

    let config = BridgeConfig::load(&config_path).map_err(|e| format!("{:#}", e))?;
    apply_config_debug(&config);

    let server_url = config.server_url().map_err(|e| e.to_string())?;
    let sink_configs = config.sink_configs().map_err(|e| e.to_string())?;

    // 1. Subscription transport
    let client = Arc::new(
        GraphqlWsClient::connect(
            server_url,
            GraphqlWsOptions::default(),
            TaggedLogger::shared(LogTag::Transport),
        )
        .map_err(|e| e.to_string())?,
    );
    let status_task = tokio::spawn(log_transport_status(server_url.to_string(), client.status()));

    // 2. Output sinks
    let sinks: Vec<Arc<StreamSink>> = sink_configs
        .into_iter()
        .map(|sink_config| Arc::new(StreamSink::connect(sink_config, TaggedLogger::shared(LogTag::Sink))))
        .collect();
    if sinks.is_empty() {
        logger::warning(
            LogTag::Config,
            "No vizOutput configured, variables are computed but not delivered",
        );
    }
    let sink_tasks: Vec<_> = sinks
        .iter()
        .map(|sink| tokio::spawn(log_sink_status(sink.config().to_string(), sink.subscribe_state())))
        .collect();

    // 3. Variables
    let bridge = Bridge::start(
        client.clone(),
        config.default_collection_id.clone(),
        &config.subscriptions,
        sinks,
        BridgeLoggers::tagged(),
    )
    .map_err(|e| format!("Failed to start bridge: {}", e))?;

    for path in bridge.registry().paths() {
        logger::debug(LogTag::Subscriptions, &format!("Subscribed {}", path));
    }

    // 4. Wait for shutdown signal
    let signal = wait_for_shutdown_signal().await?;
    logger::info(
        LogTag::System,
        &format!("Received {}, shutting down", signal),
    );

    bridge.shutdown().await;
    client.shutdown().await;
    status_task.abort();
    for task in sink_tasks {
        task.abort();
    }

    logger::info(LogTag::System, "Shutdown complete");
    logger::flush();
    Ok(())
}

/// `"debug": true` in the configuration enables debug output for every tag
fn apply_config_debug(config: &BridgeConfig) {
    if !config.debug_enabled() {
        return;
    }

    let mut logger_config = logger::get_logger_config();
    logger_config.debug_all = true;
    if logger_config.min_level < LogLevel::Debug {
        logger_config.min_level = LogLevel::Debug;
    }
    logger::set_logger_config(logger_config);
    logger::debug(LogTag::Config, "Debug output enabled by configuration");
}

async fn log_transport_status(server_url: String, mut status: watch::Receiver<TransportStatus>) {
    loop {
        let current = *status.borrow_and_update();
        match current {
            TransportStatus::Connecting => {
                logger::debug(LogTag::Transport, &format!("Connecting to {}", server_url));
            }
            TransportStatus::Connected => {
                logger::info(LogTag::Transport, &format!("Connected to {}", server_url));
            }
            TransportStatus::Reconnected => {
                logger::info(LogTag::Transport, &format!("Reconnected to {}", server_url));
            }
            TransportStatus::Disconnected => {
                logger::warning(LogTag::Transport, &format!("Disconnected from {}", server_url));
            }
        }

        if status.changed().await.is_err() {
            return;
        }
    }
}

async fn log_sink_status(label: String, mut state: watch::Receiver<ConnectionState>) {
    loop {
        let current = *state.borrow_and_update();
        logger::debug(
            LogTag::Sink,
            &format!("Socket {} is {}", label, current.as_str()),
        );

        if state.changed().await.is_err() {
            return;
        }
    }
}

/// Wait for shutdown signal (Ctrl+C, SIGTERM, SIGHUP on Unix)
async fn wait_for_shutdown_signal() -> Result<&'static str, String> {
    logger::info(LogTag::System, "Running, press Ctrl+C to stop");

    #[cfg(unix)]
    let signal_name = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint =
            signal(SignalKind::interrupt()).map_err(|e| format!("Failed to bind SIGINT: {}", e))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| format!("Failed to bind SIGTERM: {}", e))?;
        let mut sighup =
            signal(SignalKind::hangup()).map_err(|e| format!("Failed to bind SIGHUP: {}", e))?;

        tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
            _ = sighup.recv() => "SIGHUP",
        }
    };

    #[cfg(not(unix))]
    let signal_name = {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;
        "Ctrl+C"
    };

    Ok(signal_name)
}
