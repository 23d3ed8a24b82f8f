//! GraphQL subscriptions over WebSocket (`graphql-ws` subprotocol).
//!
//! One background task owns the socket and multiplexes every hash-field
//! subscription over it. It handles:
//!
//! - `connection_init` / `connection_ack` handshake
//! - `start` / `stop` for each operation, routed by operation id
//! - Fixed-interval reconnection, re-starting every active operation
//! - Lifecycle reporting on a `watch` channel (connected / reconnected / disconnected)

use super::transport::{
    FieldEventHandler, FieldNotification, MutationType, SubscriptionHandle, SubscriptionTransport,
    TransportStatus,
};
use crate::errors::{ConfigError, TransportError};
use crate::logger::EventLogger;
use crate::utils::truncate_for_log;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Subprotocol spoken by the quote cache server
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

const HASH_ITEM_FIELD_QUERY: &str = "subscription onMutation($collectionID: ID!, $itemID: ID!, $fieldID: String!) {
    hashItemField(collectionID: $collectionID, itemID: $itemID, fieldID: $fieldID) {
        mutationType
        field {
            fieldValue
        }
    }
}";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct GraphqlWsOptions {
    /// Delay between a lost connection and the next attempt
    pub reconnect_interval: Duration,
    /// Limit for the TCP/TLS/WebSocket handshake plus `connection_ack`
    pub connect_timeout: Duration,
}

impl Default for GraphqlWsOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Normalize a configured server URL to a ws/wss URL
pub fn websocket_url(server_url: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        field: "serverURL".to_string(),
        reason,
    };

    let mut url = Url::parse(server_url).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot use scheme '{}'", scheme)))?;
    Ok(url)
}

/// Parse a `data` payload of the hash-field subscription
pub fn parse_hash_item_field(payload: &Value) -> Result<FieldNotification, TransportError> {
    #[derive(Deserialize)]
    struct HashItemField {
        #[serde(rename = "mutationType")]
        mutation_type: MutationType,
        field: Option<FieldValue>,
    }

    #[derive(Deserialize)]
    struct FieldValue {
        #[serde(rename = "fieldValue", default)]
        field_value: Value,
    }

    let raw = payload
        .get("data")
        .and_then(|data| data.get("hashItemField"))
        .filter(|raw| !raw.is_null())
        .ok_or_else(|| TransportError::Payload(format!("missing data.hashItemField in {}", payload)))?;

    let parsed: HashItemField = serde_json::from_value(raw.clone())
        .map_err(|e| TransportError::Payload(format!("invalid hashItemField: {}", e)))?;

    let value = match parsed.mutation_type {
        MutationType::Delete => Value::Null,
        _ => parsed
            .field
            .map(|field| field.field_value)
            .ok_or_else(|| TransportError::Payload("hashItemField.field is null".to_string()))?,
    };

    Ok(FieldNotification::new(parsed.mutation_type, value))
}

// ── Commands ────────────────────────────────────────────────────────────────

enum ClientCommand {
    Start(u64),
    Stop(u64),
    Shutdown,
}

enum SessionEnd {
    Shutdown,
    Closed(String),
}

/// Server → client message envelope
#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

struct Operation {
    payload: Value,
    handler: FieldEventHandler,
}

struct Shared {
    operations: Mutex<HashMap<u64, Operation>>,
    next_id: AtomicU64,
    status: watch::Sender<TransportStatus>,
    logger: Arc<dyn EventLogger>,
}

impl Shared {
    fn new(logger: Arc<dyn EventLogger>) -> Self {
        let (status, _) = watch::channel(TransportStatus::Disconnected);
        Self {
            operations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            status,
            logger,
        }
    }

    fn set_status(&self, status: TransportStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn handler(&self, id: u64) -> Option<FieldEventHandler> {
        self.operations.lock().get(&id).map(|op| op.handler.clone())
    }

    /// Route one text frame from the server
    fn handle_message(&self, text: &str) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                self.logger.warning(&format!(
                    "Unparseable server message ({}): {}",
                    e,
                    truncate_for_log(text, 200)
                ));
                return;
            }
        };

        let id = message.id.as_deref().and_then(|id| id.parse::<u64>().ok());

        match message.kind.as_str() {
            "data" => {
                let Some(id) = id else {
                    return;
                };
                let Some(handler) = self.handler(id) else {
                    self.logger.debug(&format!("Data for unknown operation {}", id));
                    return;
                };

                let payload = message.payload.unwrap_or(Value::Null);
                let event = match payload.get("errors").filter(|errors| !errors.is_null()) {
                    Some(errors) if payload.get("data").map_or(true, Value::is_null) => {
                        Err(TransportError::Server {
                            id,
                            message: errors.to_string(),
                        })
                    }
                    _ => parse_hash_item_field(&payload),
                };
                handler(event);
            }
            "error" => {
                let Some(id) = id else {
                    return;
                };
                if let Some(handler) = self.handler(id) {
                    handler(Err(TransportError::Server {
                        id,
                        message: message.payload.unwrap_or(Value::Null).to_string(),
                    }));
                }
            }
            "complete" => {
                self.logger
                    .warning(&format!("Server completed operation {:?}", message.id));
            }
            "connection_error" => {
                self.logger.error(&format!(
                    "Connection error from server: {}",
                    message.payload.unwrap_or(Value::Null)
                ));
            }
            "ka" | "connection_ack" => {}
            other => {
                self.logger.debug(&format!("Ignoring server message type '{}'", other));
            }
        }
    }
}

// ── GraphqlWsClient (public handle) ─────────────────────────────────────────

pub struct GraphqlWsClient {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<ClientCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GraphqlWsClient {
    /// Start the background connection task. Must be called inside a tokio runtime.
    pub fn connect(
        server_url: &str,
        options: GraphqlWsOptions,
        logger: Arc<dyn EventLogger>,
    ) -> Result<Self, ConfigError> {
        let url = websocket_url(server_url)?;
        let shared = Arc::new(Shared::new(logger));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(connection_task(url, shared.clone(), command_rx, options));

        Ok(Self {
            shared,
            commands,
            task: Mutex::new(Some(task)),
        })
    }

    /// Lifecycle updates of the underlying connection
    pub fn status(&self) -> watch::Receiver<TransportStatus> {
        self.shared.status.subscribe()
    }

    /// Number of operations that will be (re)started on every connection
    pub fn active_operations(&self) -> usize {
        self.shared.operations.lock().len()
    }

    /// Close the socket and stop reconnecting
    pub async fn shutdown(&self) {
        let _ = self.commands.send(ClientCommand::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl SubscriptionTransport for GraphqlWsClient {
    fn subscribe(
        &self,
        collection_id: &str,
        item_id: &str,
        field_id: &str,
        handler: FieldEventHandler,
    ) -> Result<SubscriptionHandle, TransportError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "query": HASH_ITEM_FIELD_QUERY,
            "variables": {
                "collectionID": collection_id,
                "itemID": item_id,
                "fieldID": field_id,
            },
        });

        self.shared
            .operations
            .lock()
            .insert(id, Operation { payload, handler });

        if self.commands.send(ClientCommand::Start(id)).is_err() {
            self.shared.operations.lock().remove(&id);
            return Err(TransportError::NotRunning);
        }

        Ok(SubscriptionHandle(id))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        if self.shared.operations.lock().remove(&handle.0).is_none() {
            return Err(TransportError::UnknownHandle(handle.0));
        }

        self.commands
            .send(ClientCommand::Stop(handle.0))
            .map_err(|_| TransportError::NotRunning)
    }
}

// ── Background connection task ──────────────────────────────────────────────

async fn connection_task(
    url: Url,
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    options: GraphqlWsOptions,
) {
    let mut connected_before = false;

    loop {
        shared.set_status(TransportStatus::Connecting);

        let attempt = tokio::select! {
            result = connect_and_ack(&url, options.connect_timeout) => result,
            _ = wait_for_shutdown(&mut commands) => {
                shared.set_status(TransportStatus::Disconnected);
                return;
            }
        };

        match attempt {
            Ok(ws) => {
                if connected_before {
                    shared.logger.info(&format!("Reconnected to {}", url));
                    shared.set_status(TransportStatus::Reconnected);
                } else {
                    shared.logger.info(&format!("Connected to {}", url));
                    shared.set_status(TransportStatus::Connected);
                }
                connected_before = true;

                match run_session(ws, &shared, &mut commands).await {
                    SessionEnd::Shutdown => {
                        shared.set_status(TransportStatus::Disconnected);
                        return;
                    }
                    SessionEnd::Closed(reason) => {
                        shared
                            .logger
                            .warning(&format!("Disconnected from {}: {}", url, reason));
                    }
                }
            }
            Err(e) => {
                shared
                    .logger
                    .warning(&format!("Connection to {} failed: {}", url, e));
            }
        }

        shared.set_status(TransportStatus::Disconnected);

        // Operations live in the shared map, so start/stop commands that
        // arrive while offline are dropped and replayed from the map.
        tokio::select! {
            _ = tokio::time::sleep(options.reconnect_interval) => {}
            _ = wait_for_shutdown(&mut commands) => return,
        }
    }
}

/// Drain commands until shutdown is requested or the client is dropped
async fn wait_for_shutdown(commands: &mut mpsc::UnboundedReceiver<ClientCommand>) {
    loop {
        match commands.recv().await {
            None | Some(ClientCommand::Shutdown) => return,
            Some(_) => continue,
        }
    }
}

async fn connect_and_ack(url: &Url, limit: Duration) -> Result<WsStream, String> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| format!("Failed to build WebSocket request: {}", e))?;
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_static(GRAPHQL_WS_PROTOCOL),
    );

    tokio::time::timeout(limit, async move {
        let (mut ws, _) = connect_async(request)
            .await
            .map_err(|e| format!("Failed to connect to WebSocket: {}", e))?;

        let init = json!({ "type": "connection_init", "payload": {} });
        ws.send(Message::Text(init.to_string()))
            .await
            .map_err(|e| format!("Failed to send connection_init: {}", e))?;

        while let Some(message) = ws.next().await {
            let message = message.map_err(|e| format!("WebSocket error during init: {}", e))?;
            let Message::Text(text) = message else {
                continue;
            };
            let parsed: ServerMessage = serde_json::from_str(&text)
                .map_err(|e| format!("Unparseable init response ({}): {}", e, text))?;
            match parsed.kind.as_str() {
                "connection_ack" => return Ok(ws),
                "connection_error" => {
                    return Err(format!(
                        "Server rejected connection: {}",
                        parsed.payload.unwrap_or(Value::Null)
                    ))
                }
                _ => continue,
            }
        }

        Err("Connection closed before connection_ack".to_string())
    })
    .await
    .map_err(|_| format!("Timed out after {}ms", limit.as_millis()))?
}

async fn run_session(
    ws: WsStream,
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    let mut started: HashSet<u64> = HashSet::new();

    let mut initial: Vec<(u64, Value)> = shared
        .operations
        .lock()
        .iter()
        .map(|(id, op)| (*id, op.payload.clone()))
        .collect();
    initial.sort_by_key(|(id, _)| *id);

    for (id, payload) in initial {
        if let Err(e) = sink.send(start_message(id, &payload)).await {
            return SessionEnd::Closed(format!("Failed to start operation {}: {}", id, e));
        }
        started.insert(id);
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(ClientCommand::Shutdown) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                Some(ClientCommand::Start(id)) => {
                    if started.contains(&id) {
                        continue;
                    }
                    let payload = shared.operations.lock().get(&id).map(|op| op.payload.clone());
                    if let Some(payload) = payload {
                        if let Err(e) = sink.send(start_message(id, &payload)).await {
                            return SessionEnd::Closed(format!("Failed to start operation {}: {}", id, e));
                        }
                        started.insert(id);
                    }
                }
                Some(ClientCommand::Stop(id)) => {
                    if started.remove(&id) {
                        let stop = json!({ "id": id.to_string(), "type": "stop" });
                        if let Err(e) = sink.send(Message::Text(stop.to_string())).await {
                            return SessionEnd::Closed(format!("Failed to stop operation {}: {}", id, e));
                        }
                    }
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => shared.handle_message(&text),
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Closed(format!("closed by server ({:?})", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Closed(e.to_string()),
                None => return SessionEnd::Closed("stream ended".to_string()),
            },
        }
    }
}

fn start_message(id: u64, payload: &Value) -> Message {
    let start = json!({ "id": id.to_string(), "type": "start", "payload": payload });
    Message::Text(start.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LogLevel, MemoryLogger, NoopLogger};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    fn recording_handler() -> (FieldEventHandler, Arc<Mutex<Vec<Result<FieldNotification, TransportError>>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let handler: FieldEventHandler =
            Arc::new(move |event: Result<FieldNotification, TransportError>| sink.lock().push(event));
        (handler, events)
    }

    #[test]
    fn test_websocket_url_normalization() {
        assert_eq!(websocket_url("http://cache:4000/graphql").unwrap().as_str(), "ws://cache:4000/graphql");
        assert_eq!(websocket_url("https://cache/graphql").unwrap().scheme(), "wss");
        assert_eq!(websocket_url("ws://cache/graphql").unwrap().scheme(), "ws");
        assert!(websocket_url("ftp://cache").is_err());
        assert!(websocket_url("not a url").is_err());
    }

    #[test]
    fn test_parse_update_and_delete() {
        let update = json!({"data": {"hashItemField": {"mutationType": "UPDATE", "field": {"fieldValue": "1.0843"}}}});
        let parsed = parse_hash_item_field(&update).unwrap();
        assert_eq!(parsed.mutation_type, MutationType::Update);
        assert_eq!(parsed.value, json!("1.0843"));

        let delete = json!({"data": {"hashItemField": {"mutationType": "DELETE", "field": null}}});
        let parsed = parse_hash_item_field(&delete).unwrap();
        assert_eq!(parsed.value, Value::Null);
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert!(parse_hash_item_field(&json!({"data": null})).is_err());
        assert!(parse_hash_item_field(&json!({"data": {"hashItemField": {"mutationType": "UPDATE", "field": null}}})).is_err());
        assert!(parse_hash_item_field(&json!({"data": {"hashItemField": {"field": {}}}})).is_err());
    }

    #[test]
    fn test_messages_routed_by_operation_id() {
        let shared = Shared::new(NoopLogger::shared());
        let (handler, events) = recording_handler();
        shared.operations.lock().insert(
            7,
            Operation {
                payload: Value::Null,
                handler,
            },
        );

        shared.handle_message(r#"{"type":"data","id":"7","payload":{"data":{"hashItemField":{"mutationType":"INSERT","field":{"fieldValue":42}}}}}"#);
        shared.handle_message(r#"{"type":"data","id":"8","payload":{"data":{"hashItemField":{"mutationType":"INSERT","field":{"fieldValue":1}}}}}"#);
        shared.handle_message(r#"{"type":"data","id":"7","payload":{"data":null,"errors":[{"message":"denied"}]}}"#);
        shared.handle_message(r#"{"type":"error","id":"7","payload":{"message":"bad query"}}"#);
        shared.handle_message(r#"{"type":"ka"}"#);

        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_ref().unwrap().value, json!(42));
        assert!(matches!(events[1], Err(TransportError::Server { id: 7, .. })));
        assert!(matches!(events[2], Err(TransportError::Server { id: 7, .. })));
    }

    #[test]
    fn test_garbage_is_logged() {
        let logger = Arc::new(MemoryLogger::default());
        let shared = Shared::new(logger.clone());
        shared.handle_message("{not json");
        assert_eq!(logger.count(LogLevel::Warning), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, |_req: &Request, mut response: Response| {
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(GRAPHQL_WS_PROTOCOL));
                Ok(response)
            })
            .await
            .unwrap();

            let mut start_variables = None;
            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let parsed: Value = serde_json::from_str(&text).unwrap();
                match parsed["type"].as_str() {
                    Some("connection_init") => {
                        ws.send(Message::Text(json!({"type": "connection_ack"}).to_string()))
                            .await
                            .unwrap();
                    }
                    Some("start") => {
                        start_variables = Some(parsed["payload"]["variables"].clone());
                        let data = json!({
                            "type": "data",
                            "id": parsed["id"],
                            "payload": {"data": {"hashItemField": {"mutationType": "UPDATE", "field": {"fieldValue": "99.5"}}}}
                        });
                        ws.send(Message::Text(data.to_string())).await.unwrap();
                    }
                    Some("stop") => break,
                    _ => {}
                }
            }
            start_variables
        });

        let client = GraphqlWsClient::connect(
            &format!("http://{}/graphql", address),
            GraphqlWsOptions::default(),
            NoopLogger::shared(),
        )
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<FieldNotification, TransportError>>();
        let handler: FieldEventHandler = Arc::new(move |event: Result<FieldNotification, TransportError>| {
            let _ = tx.send(event);
        });
        let handle = client.subscribe("quotes", "EURUSD", "bid", handler).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.value, json!("99.5"));
        assert_eq!(*client.status().borrow(), TransportStatus::Connected);

        client.unsubscribe(handle).unwrap();
        assert_eq!(client.active_operations(), 0);

        let variables = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(variables, json!({"collectionID": "quotes", "itemID": "EURUSD", "fieldID": "bid"}));

        client.shutdown().await;
        assert!(matches!(
            client.unsubscribe(handle),
            Err(TransportError::UnknownHandle(_))
        ));
    }
}
