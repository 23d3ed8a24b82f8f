/// Auto-reconnecting outbound stream to the renderer
///
/// A supervisor task owns the connection lifecycle: it connects with a
/// timeout, watches the read half for the peer closing, and waits the
/// reconnect timeout before every new attempt. Writes go through `send`,
/// which drops messages while no connection is up.
use super::config::StreamSinkConfig;
use super::protocol::frame_message;
use crate::errors::SinkError;
use crate::logger::EventLogger;
use crate::utils::check_shutdown_or_delay;
use serde_json::Value;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

struct Connection {
    generation: u64,
    writer: OwnedWriteHalf,
}

struct SinkShared {
    config: StreamSinkConfig,
    state: watch::Sender<ConnectionState>,
    writer: AsyncMutex<Option<Connection>>,
    /// Generation of each connection whose write failed
    write_failed: mpsc::UnboundedSender<u64>,
    shutdown: Notify,
    logger: Arc<dyn EventLogger>,
}

impl SinkShared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

pub struct StreamSink {
    shared: Arc<SinkShared>,
    supervisor: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StreamSink {
    /// Start connecting in the background. Must be called inside a tokio runtime.
    pub fn connect(config: StreamSinkConfig, logger: Arc<dyn EventLogger>) -> Self {
        Self::with_connector(config, logger, TcpStream::connect)
    }

    /// Same as `connect`, with the socket opened by `connector(address)`
    pub(crate) fn with_connector<C, F>(
        config: StreamSinkConfig,
        logger: Arc<dyn EventLogger>,
        connector: C,
    ) -> Self
    where
        C: Fn(String) -> F + Send + 'static,
        F: Future<Output = io::Result<TcpStream>> + Send + 'static,
    {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (write_failed, failures) = mpsc::unbounded_channel();
        let shared = Arc::new(SinkShared {
            config,
            state,
            writer: AsyncMutex::new(None),
            write_failed,
            shutdown: Notify::new(),
            logger,
        });

        let supervisor = tokio::spawn(supervise(shared.clone(), failures, connector));

        Self {
            shared,
            supervisor: parking_lot::Mutex::new(Some(supervisor)),
        }
    }

    pub fn config(&self) -> &StreamSinkConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connection state updates
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Serialize and write one variable.
    ///
    /// Messages sent while not connected are dropped and `Ok` is returned.
    /// A failed write drops the connection; the supervisor reconnects.
    pub async fn send(&self, name: &str, value: &Value) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Ok(());
        }

        let message = frame_message(name, value, self.shared.config.command_interface);

        let mut writer = self.shared.writer.lock().await;
        let Some(connection) = writer.as_mut() else {
            return Err(SinkError::SocketClosed);
        };

        if let Err(e) = connection.writer.write_all(message.as_bytes()).await {
            let generation = connection.generation;
            writer.take();
            drop(writer);
            let _ = self.shared.write_failed.send(generation);
            return Err(SinkError::Io(e));
        }

        Ok(())
    }

    /// Stop the supervisor and close the socket
    pub async fn shutdown(&self) {
        self.shared.shutdown.notify_one();
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.await;
        }
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.abort();
        }
    }
}

async fn supervise<C, F>(shared: Arc<SinkShared>, mut failures: mpsc::UnboundedReceiver<u64>, connector: C)
where
    C: Fn(String) -> F,
    F: Future<Output = io::Result<TcpStream>>,
{
    let timeout = shared.config.reconnect_timeout;
    let mut generation: u64 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);
        shared
            .logger
            .debug(&format!("Connecting to socket {}", shared.config));

        let attempt = tokio::select! {
            result = tokio::time::timeout(timeout, connector(shared.config.address())) => result,
            _ = shared.shutdown.notified() => {
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
        };

        match attempt {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    shared.logger.debug(&format!("Failed to set TCP_NODELAY: {}", e));
                }
                generation += 1;
                let (mut reader, writer) = stream.into_split();
                *shared.writer.lock().await = Some(Connection { generation, writer });
                shared.set_state(ConnectionState::Connected);
                shared
                    .logger
                    .info(&format!("Connected to socket {}", shared.config));

                // Responses are ignored; reading only detects the peer closing.
                let mut buf = [0u8; 1024];
                let (reason, stop) = loop {
                    tokio::select! {
                        read = reader.read(&mut buf) => match read {
                            Ok(0) => break ("closed by peer".to_string(), false),
                            Ok(_) => continue,
                            Err(e) => break (e.to_string(), false),
                        },
                        Some(failed) = failures.recv() => {
                            if failed == generation {
                                break ("write failed".to_string(), false);
                            }
                        }
                        _ = shared.shutdown.notified() => break ("shutdown".to_string(), true),
                    }
                };

                if let Some(mut connection) = shared.writer.lock().await.take() {
                    let _ = connection.writer.shutdown().await;
                }
                shared.set_state(ConnectionState::Disconnected);

                if stop {
                    return;
                }
                shared.logger.warning(&format!(
                    "Disconnected from socket {}: {}",
                    shared.config, reason
                ));
            }
            Ok(Err(e)) => {
                shared.set_state(ConnectionState::Disconnected);
                shared.logger.debug(&format!(
                    "Connection to {} failed: {}",
                    shared.config, e
                ));
            }
            Err(_) => {
                shared.set_state(ConnectionState::Disconnected);
                shared.logger.debug(&format!(
                    "Connection to {} timed out after {}ms",
                    shared.config,
                    timeout.as_millis()
                ));
            }
        }

        if check_shutdown_or_delay(&shared.shutdown, timeout).await {
            return;
        }
    }
}
