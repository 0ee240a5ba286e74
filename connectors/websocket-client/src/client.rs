use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use ripple_core::{
    channel::ChannelName,
    error::DeliveryError,
    feed::{ChangeFeed, EventSink, FeedMessage, FeedSubscription, SubscriptionOptions},
    signal::{Mut, Read},
    BackendConfig,
};
use ripple_proto::{
    phoenix::{self, ChannelConfig, Inbound, JoinPayload, ReplyStatus},
    PhoenixMessage, SubscribeStatus, PHOENIX_TOPIC,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use strum::Display;
use thiserror::Error;
use tokio::{
    net::TcpStream,
    select,
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const PROTOCOL_VERSION: &str = "1.0.0";
const REALTIME_PATH: &str = "realtime/v1/websocket";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Connection state of the shared socket
#[derive(Debug, Clone, PartialEq, Display)]
pub enum ConnectionState {
    Disconnected,
    #[strum(serialize = "Connecting")]
    Connecting {
        url: String,
    },
    #[strum(serialize = "Connected")]
    Connected {
        url: String,
    },
    #[strum(serialize = "Error")]
    Error(ConnectionError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("invalid realtime endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("no async runtime: {0}")]
    NoRuntime(String),
    #[error("General connection error: {0}")]
    General(String),
}

/// Websocket endpoint of the realtime service for a project url.
/// `https://abc.supabase.co` becomes `wss://abc.supabase.co/realtime/v1/websocket?apikey=KEY&vsn=1.0.0`.
pub fn endpoint_url(config: &BackendConfig) -> Result<Url, ConnectionError> {
    let mut url = config.url.clone();
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ConnectionError::InvalidEndpoint(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme).map_err(|_| ConnectionError::InvalidEndpoint(config.url.to_string()))?;

    if !url.path().ends_with("/websocket") {
        let path = format!("{}/{}", url.path().trim_end_matches('/'), REALTIME_PATH);
        url.set_path(&path);
    }
    url.query_pairs_mut().clear().append_pair("apikey", &config.api_key).append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum JoinState {
    Pending,
    Joining(String),
    Joined(String),
    Failed,
}

impl JoinState {
    fn join_ref(&self) -> Option<&str> {
        match self {
            JoinState::Joining(r) | JoinState::Joined(r) => Some(r.as_str()),
            _ => None,
        }
    }
}

struct ChannelEntry {
    options: SubscriptionOptions,
    sink: EventSink,
    state: JoinState,
}

#[derive(Debug)]
enum Command {
    Join,
    Leave { topic: String, join_ref: Option<String> },
}

struct Inner {
    endpoint: Url,
    /// endpoint without the query string, safe to log
    display_url: String,
    access_token: String,
    channels: DashMap<String, ChannelEntry>,
    commands: mpsc::UnboundedSender<Command>,
    connection_state: Mut<ConnectionState>,
    connected: AtomicBool,
    dial_attempts: AtomicU64,
    heartbeat_interval: Duration,
    next_ref: AtomicU64,
    shutdown: Notify,
    shutdown_requested: AtomicBool,
}

/// Change feed over the hosted realtime service's websocket
pub struct RealtimeClient {
    inner: Arc<Inner>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Creates the client and its connection task. Fails outside a tokio runtime.
    /// Nothing is dialed until the first channel is opened.
    pub fn new(config: &BackendConfig) -> Result<Self, ConnectionError> { Self::with_heartbeat_interval(config, HEARTBEAT_INTERVAL) }

    /// Like [`RealtimeClient::new`]. The socket is considered lost when a heartbeat is still
    /// unanswered one `interval` later.
    pub fn with_heartbeat_interval(config: &BackendConfig, interval: Duration) -> Result<Self, ConnectionError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| ConnectionError::NoRuntime(e.to_string()))?;
        let endpoint = endpoint_url(config)?;
        let mut shown = endpoint.clone();
        shown.set_query(None);
        info!("Creating realtime client for {}", shown);

        let (commands, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            endpoint,
            display_url: shown.to_string(),
            access_token: config.api_key.clone(),
            channels: DashMap::new(),
            commands,
            connection_state: Mut::new(ConnectionState::Disconnected),
            connected: AtomicBool::new(false),
            dial_attempts: AtomicU64::new(0),
            heartbeat_interval: interval,
            next_ref: AtomicU64::new(1),
            shutdown: Notify::new(),
            shutdown_requested: AtomicBool::new(false),
        });

        let task = runtime.spawn(Self::run_connection_loop(inner.clone(), receiver));
        Ok(Self { inner, task: std::sync::Mutex::new(Some(task)) })
    }

    /// Builds a client when a configuration is available. Never fails: problems are logged and
    /// yield `None`, so callers can render nothing.
    pub fn connect(config: Option<&BackendConfig>) -> Option<Self> {
        let Some(config) = config else {
            warn!("No realtime client available: backend not configured");
            return None;
        };
        match Self::new(config) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("No realtime client available: {}", e);
                None
            }
        }
    }

    /// [`RealtimeClient::connect`] with the configuration from the environment
    pub fn from_env() -> Option<Self> { Self::connect(BackendConfig::from_env_or_warn().as_ref()) }

    /// Get the connection state as a reactive signal
    pub fn state(&self) -> Read<ConnectionState> { self.inner.connection_state.read() }

    /// Check if the socket is currently connected
    pub fn is_connected(&self) -> bool { self.inner.connected.load(Ordering::Acquire) }

    /// Number of channels registered with the client
    pub fn open_channels(&self) -> usize { self.inner.channels.len() }

    /// How many times the socket has been dialed
    pub fn dial_attempts(&self) -> u64 { self.inner.dial_attempts.load(Ordering::Acquire) }

    /// Wait for the socket to connect, or for the attempt to fail
    pub async fn wait_connected(&self) -> Result<(), ConnectionError> {
        self.state()
            .wait_for(|state| match state {
                ConnectionState::Connected { .. } => Some(Ok(())),
                ConnectionState::Error(e) => Some(Err(e.clone())),
                _ => None,
            })
            .await
            .unwrap_or_else(|| Err(ConnectionError::General("client shut down".to_string())))
    }

    /// Gracefully shut down the socket
    pub async fn shutdown(&self) {
        info!("Shutting down realtime client");

        let task = self.task.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        match task {
            Some(task) => {
                self.inner.shutdown_requested.store(true, Ordering::Release);
                self.inner.shutdown.notify_one();
                match task.await {
                    Ok(()) => info!("Realtime client shutdown completed"),
                    Err(e) => warn!("Connection task join error during shutdown: {}", e),
                }
            }
            None => info!("Realtime client already shut down"),
        }
    }

    /// Main loop. Dials when a channel is waiting to join; after the socket ends, every channel
    /// is failed and the loop goes back to waiting.
    async fn run_connection_loop(inner: Arc<Inner>, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Starting realtime connection loop for {}", inner.display_url);

        loop {
            if !inner.has_pending_channels() {
                select! {
                    _ = inner.shutdown.notified() => break,
                    command = commands.recv() => match command {
                        // joins queued before an earlier dial may find nothing left to join
                        Some(Command::Join) if !inner.has_pending_channels() => continue,
                        Some(Command::Join) => {}
                        Some(Command::Leave { topic, .. }) => {
                            debug!("Not connected, nothing to leave for {}", topic);
                            continue;
                        }
                        None => break,
                    }
                }
            }
            if inner.shutdown_requested.load(Ordering::Acquire) {
                break;
            }

            select! {
                _ = inner.shutdown.notified() => {
                    info!("Realtime connection shutting down");
                    break;
                }
                result = Self::connect_once(&inner, &mut commands) => {
                    match result {
                        Ok(()) => {
                            info!("Connection to {} ended", inner.display_url);
                            inner.connection_state.set(ConnectionState::Disconnected);
                        }
                        Err(e) => {
                            error!("Connection to {} failed: {}", inner.display_url, e);
                            inner.connection_state.set(ConnectionState::Error(ConnectionError::General(e.to_string())));
                        }
                    }
                    inner.connected.store(false, Ordering::Release);
                    inner.fail_channels("connection lost");
                    if inner.shutdown_requested.load(Ordering::Acquire) {
                        break;
                    }
                }
            }
        }

        inner.connected.store(false, Ordering::Release);
        inner.fail_channels("client shut down");
        inner.connection_state.set(ConnectionState::Disconnected);
    }

    /// Attempt a single connection and serve it until it ends
    async fn connect_once(inner: &Arc<Inner>, commands: &mut mpsc::UnboundedReceiver<Command>) -> anyhow::Result<()> {
        info!("Attempting to connect to {}", inner.display_url);
        inner.dial_attempts.fetch_add(1, Ordering::AcqRel);
        inner.connection_state.set(ConnectionState::Connecting { url: inner.display_url.clone() });

        let (ws_stream, _) = connect_async(inner.endpoint.as_str()).await?;
        info!("WebSocket handshake completed with {}", inner.display_url);
        inner.connection_state.set(ConnectionState::Connected { url: inner.display_url.clone() });
        inner.connected.store(true, Ordering::Release);

        let (mut sink, mut stream) = ws_stream.split();
        inner.join_pending(&mut sink).await?;

        let interval = inner.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + interval, interval);
        let mut unanswered: Option<String> = None;
        loop {
            select! {
                _ = inner.shutdown.notified() => {
                    debug!("Connection received shutdown signal");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                command = commands.recv() => match command {
                    Some(Command::Join) => inner.join_pending(&mut sink).await?,
                    Some(Command::Leave { topic, join_ref }) => {
                        let frame = PhoenixMessage::leave(topic, &inner.next_ref(), join_ref.as_deref());
                        sink.send(Message::text(frame.encode()?)).await?;
                    }
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if let Some(heartbeat_ref) = &unanswered {
                        warn!("Heartbeat {} unanswered after {:?}", heartbeat_ref, interval);
                        anyhow::bail!("heartbeat timed out");
                    }
                    let heartbeat_ref = inner.next_ref();
                    let frame = PhoenixMessage::heartbeat(&heartbeat_ref);
                    sink.send(Message::text(frame.encode()?)).await?;
                    unanswered = Some(heartbeat_ref);
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(acked) = inner.handle_frame(text.as_str()) {
                            if unanswered.as_deref() == Some(acked.as_str()) {
                                unanswered = None;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!("Received ping, sending pong");
                        sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket connection closed by server");
                        break;
                    }
                    Some(Ok(_)) => debug!("Received other message type"),
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return Err(e.into());
                    }
                    None => {
                        info!("WebSocket stream closed");
                        break;
                    }
                },
            }
        }
        Ok(())
    }
}

impl Inner {
    fn next_ref(&self) -> String { self.next_ref.fetch_add(1, Ordering::Relaxed).to_string() }

    fn has_pending_channels(&self) -> bool { self.channels.iter().any(|entry| entry.state == JoinState::Pending) }

    async fn join_pending(&self, sink: &mut WsSink) -> anyhow::Result<()> {
        let joins: Vec<(String, String, SubscriptionOptions)> = self
            .channels
            .iter_mut()
            .filter(|entry| entry.state == JoinState::Pending)
            .map(|mut entry| {
                let join_ref = self.next_ref();
                entry.state = JoinState::Joining(join_ref.clone());
                (entry.key().clone(), join_ref, entry.options.clone())
            })
            .collect();

        for (topic, join_ref, options) in joins {
            let payload = JoinPayload {
                config: ChannelConfig::postgres_changes(vec![options.to_spec()]),
                access_token: Some(self.access_token.clone()),
            };
            debug!("Joining {} ({})", topic, options);
            let frame = PhoenixMessage::join(topic, &join_ref, &payload)?;
            sink.send(Message::text(frame.encode()?)).await?;
        }
        Ok(())
    }

    /// Routes one frame to its channel. Returns the ref of an acknowledged heartbeat.
    fn handle_frame(&self, text: &str) -> Option<String> {
        let frame = match PhoenixMessage::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to decode frame: {}", e);
                return None;
            }
        };
        if frame.topic == PHOENIX_TOPIC {
            debug!("Heartbeat {:?} acknowledged", frame.msg_ref);
            return frame.msg_ref;
        }
        let inbound = match frame.inbound() {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Skipping malformed {} frame on {}: {}", frame.event, frame.topic, e);
                return None;
            }
        };

        let (sink, message) = {
            let Some(mut entry) = self.channels.get_mut(&frame.topic) else {
                debug!("Frame for unknown topic {}", frame.topic);
                return None;
            };
            let message = match inbound {
                Inbound::Reply { status, response } => {
                    let Some(join_ref) = entry.state.join_ref().map(str::to_string) else { return None };
                    if frame.msg_ref.as_deref() != Some(join_ref.as_str()) {
                        return None;
                    }
                    match status {
                        ReplyStatus::Ok => {
                            entry.state = JoinState::Joined(join_ref);
                            FeedMessage::Status(SubscribeStatus::Subscribed)
                        }
                        ReplyStatus::Error => {
                            entry.state = JoinState::Failed;
                            let reason = response.get("reason").and_then(|r| r.as_str()).map(str::to_string);
                            FeedMessage::Status(SubscribeStatus::ChannelError(reason))
                        }
                    }
                }
                Inbound::Change(change) => FeedMessage::Change(change),
                Inbound::System { ok: false, message } => {
                    entry.state = JoinState::Failed;
                    FeedMessage::Status(SubscribeStatus::ChannelError(message))
                }
                Inbound::Error => {
                    entry.state = JoinState::Failed;
                    FeedMessage::Status(SubscribeStatus::ChannelError(None))
                }
                Inbound::Close => {
                    entry.state = JoinState::Failed;
                    FeedMessage::Status(SubscribeStatus::Closed)
                }
                Inbound::System { ok: true, .. } | Inbound::Other => return None,
            };
            (entry.sink.clone(), message)
        };

        deliver(&frame.topic, &sink, message);
        None
    }

    fn fail_channels(&self, reason: &str) {
        let sinks: Vec<(String, EventSink)> = self
            .channels
            .iter_mut()
            .filter(|entry| entry.state != JoinState::Failed)
            .map(|mut entry| {
                entry.state = JoinState::Failed;
                (entry.key().clone(), entry.sink.clone())
            })
            .collect();

        for (topic, sink) in sinks {
            deliver(&topic, &sink, FeedMessage::Status(SubscribeStatus::ChannelError(Some(reason.to_string()))));
        }
    }
}

/// Hands a message to one channel without holding up the socket. A change that finds the
/// queue full is dropped; a status waits for room on its own task so it is never lost.
fn deliver(topic: &str, sink: &EventSink, message: FeedMessage) {
    match sink.try_deliver(message.clone()) {
        Ok(()) => {}
        Err(DeliveryError::Closed) => debug!("Subscriber for {} is gone", topic),
        Err(DeliveryError::Full) => match message {
            FeedMessage::Change(change) => warn!("Channel {} is full, dropping {} change", topic, change.kind),
            status @ FeedMessage::Status(_) => {
                let sink = sink.clone();
                tokio::spawn(async move {
                    let _ = sink.deliver(status).await;
                });
            }
        },
    }
}

impl ChangeFeed for RealtimeClient {
    fn subscribe(&self, name: &ChannelName, options: &SubscriptionOptions, sink: EventSink) -> Box<dyn FeedSubscription> {
        let topic = phoenix::channel_topic(name.as_str());
        if self.inner.channels.insert(topic.clone(), ChannelEntry { options: options.clone(), sink: sink.clone(), state: JoinState::Pending }).is_some()
        {
            warn!("Channel {} was already registered and has been replaced", topic);
        }

        if self.inner.commands.send(Command::Join).is_err() {
            warn!("Realtime client is shut down, {} cannot join", topic);
            if let Some(mut entry) = self.inner.channels.get_mut(&topic) {
                entry.state = JoinState::Failed;
            }
            let _ = sink.try_deliver(FeedMessage::Status(SubscribeStatus::ChannelError(Some("client shut down".to_string()))));
        }

        Box::new(RealtimeSubscription { topic, inner: Arc::downgrade(&self.inner), closed: AtomicBool::new(false) })
    }
}

struct RealtimeSubscription {
    topic: String,
    inner: Weak<Inner>,
    closed: AtomicBool,
}

impl FeedSubscription for RealtimeSubscription {
    fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(inner) = self.inner.upgrade() else { return };
        if let Some((topic, entry)) = inner.channels.remove(&self.topic) {
            if let Some(join_ref) = entry.state.join_ref() {
                let _ = inner.commands.send(Command::Leave { topic, join_ref: Some(join_ref.to_string()) });
            }
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        let task = self.task.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(task) = task {
            debug!("Realtime client dropped, requesting shutdown");
            self.inner.shutdown_requested.store(true, Ordering::Release);
            self.inner.shutdown.notify_one();
            task.abort();
        }
    }
}
