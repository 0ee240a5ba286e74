#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use ripple::{
    proto::{phoenix, ChangeKind, PhoenixMessage, PostgresChange, PHOENIX_TOPIC},
    signal::Mut,
    BackendConfig, ChangeFeed, ChangeNotifier, NotifierOptions, RefreshSignal, SubscriptionOptions,
};
use ripple_connector_local_process::LocalChangeFeed;
use serde_json::{json, Value};
use std::{
    future::Future,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() { tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init(); }

pub const WAIT: Duration = Duration::from_secs(5);

pub async fn within<F: Future>(future: F) -> F::Output { tokio::time::timeout(WAIT, future).await.expect("timed out waiting") }

pub fn change(table: &str, kind: ChangeKind, id: Value) -> PostgresChange {
    let row = json!({ "id": id, "title": "Hello" }).as_object().cloned().unwrap();
    match kind {
        ChangeKind::Deleted => PostgresChange::new("public", table, kind).with_old_record(row),
        _ => PostgresChange::new("public", table, kind).with_record(row),
    }
}

pub fn post(kind: ChangeKind, id: i64) -> PostgresChange { change("blog_posts", kind, json!(id)) }

/// A change whose row carries no identifier
pub fn anonymous_post(kind: ChangeKind) -> PostgresChange {
    PostgresChange::new("public", "blog_posts", kind).with_record(json!({ "title": "untitled" }).as_object().cloned().unwrap())
}

/// Notifier for `blog_posts` over `feed`, with a refresh signal standing in for the page
pub fn post_notifier(feed: Option<Arc<dyn ChangeFeed>>) -> (ChangeNotifier, RefreshSignal) {
    let signal = RefreshSignal::new();
    let options = NotifierOptions::new(SubscriptionOptions::table("blog_posts")).noun("post");
    (ChangeNotifier::new(feed, options, signal.clone()), signal)
}

pub fn local_post_notifier(local: &LocalChangeFeed) -> (ChangeNotifier, RefreshSignal) {
    let feed: Arc<dyn ChangeFeed> = Arc::new(local.clone());
    post_notifier(Some(feed))
}

pub async fn wait_subscribed(notifier: &ChangeNotifier) {
    assert!(within(notifier.status().wait_until(|status| status.is_subscribed())).await);
}

pub async fn wait_errored(notifier: &ChangeNotifier) {
    assert!(within(notifier.status().wait_until(|status| status.is_errored())).await);
}

/// Waits until `count` distinct ids have been recorded across all buckets
pub async fn wait_recorded(notifier: &ChangeNotifier, count: usize) {
    use ripple::Bucket;
    let total = |state: &ripple::AggregationState| state.count(Bucket::New) + state.count(Bucket::Updated) + state.count(Bucket::Deleted);
    assert!(within(notifier.changes().wait_until(|state| total(state) >= count)).await);
}

enum Control {
    Push(String),
    Drop,
}

struct ServerState {
    deny_joins: Option<String>,
    answer_heartbeats: bool,
    heartbeats: Mut<usize>,
    joins: Mut<Vec<PhoenixMessage>>,
    leaves: Mut<Vec<String>>,
    connections: Mut<usize>,
    controls: Mutex<Vec<mpsc::UnboundedSender<Control>>>,
}

/// A realtime service stand-in: accepts websocket connections, acknowledges joins, leaves and
/// heartbeats, and pushes whatever frames the test asks for.
pub struct MockRealtimeServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl MockRealtimeServer {
    pub async fn start() -> Self { Self::spawn(None, true).await }

    /// Every join is answered with an error reply carrying `reason`
    pub async fn denying_joins(reason: &str) -> Self { Self::spawn(Some(reason.to_string()), true).await }

    /// Heartbeats are counted but never answered
    pub async fn ignoring_heartbeats() -> Self { Self::spawn(None, false).await }

    async fn spawn(deny_joins: Option<String>, answer_heartbeats: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState {
            deny_joins,
            answer_heartbeats,
            heartbeats: Mut::new(0),
            joins: Mut::new(Vec::new()),
            leaves: Mut::new(Vec::new()),
            connections: Mut::new(0),
            controls: Mutex::new(Vec::new()),
        });

        let task = tokio::spawn({
            let state = state.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(state.clone(), stream));
                }
            }
        });
        Self { addr, state, task }
    }

    pub fn config(&self) -> BackendConfig { BackendConfig::new(&format!("http://{}", self.addr), "test-anon-key").unwrap() }

    /// Waits for at least `count` join requests and returns all of them
    pub async fn wait_joins(&self, count: usize) -> Vec<PhoenixMessage> {
        within(self.state.joins.read().wait_for(|joins| (joins.len() >= count).then(|| joins.clone()))).await.unwrap()
    }

    pub async fn wait_leave(&self, topic: &str) {
        assert!(within(self.state.leaves.read().wait_until(|leaves| leaves.iter().any(|t| t == topic))).await);
    }

    pub async fn wait_connections(&self, count: usize) {
        assert!(within(self.state.connections.read().wait_until(|n| *n >= count)).await);
    }

    pub fn connections(&self) -> usize { self.state.connections.value() }

    pub async fn wait_heartbeats(&self, count: usize) {
        assert!(within(self.state.heartbeats.read().wait_until(|n| *n >= count)).await);
    }

    pub fn push_change(&self, topic: &str, change: &PostgresChange) {
        self.push_raw(PhoenixMessage::postgres_change(topic, change).unwrap().encode().unwrap());
    }

    pub fn push_raw(&self, text: String) { self.control(|| Control::Push(text.clone())); }

    /// Drops every open socket without a closing handshake
    pub fn drop_connections(&self) {
        self.control(|| Control::Drop);
        self.state.controls.lock().unwrap().clear();
    }

    fn control(&self, make: impl Fn() -> Control) {
        self.state.controls.lock().unwrap().retain(|tx| tx.send(make()).is_ok());
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) { self.task.abort(); }
}

impl ServerState {
    fn respond(&self, text: &str) -> Option<String> {
        let frame = PhoenixMessage::decode(text).ok()?;
        let msg_ref = frame.msg_ref.clone().unwrap_or_default();
        let reply = match frame.event.as_str() {
            phoenix::EVENT_JOIN => {
                self.joins.update(|joins| {
                    joins.push(frame.clone());
                    true
                });
                match &self.deny_joins {
                    Some(reason) => PhoenixMessage::reply(frame.topic.clone(), &msg_ref, false, json!({ "reason": reason })),
                    None => PhoenixMessage::reply(frame.topic.clone(), &msg_ref, true, json!({ "postgres_changes": [] })),
                }
            }
            phoenix::EVENT_LEAVE => {
                self.leaves.update(|leaves| {
                    leaves.push(frame.topic.clone());
                    true
                });
                PhoenixMessage::reply(frame.topic.clone(), &msg_ref, true, json!({}))
            }
            phoenix::EVENT_HEARTBEAT => {
                self.heartbeats.update(|n| {
                    *n += 1;
                    true
                });
                if !self.answer_heartbeats {
                    return None;
                }
                PhoenixMessage::reply(PHOENIX_TOPIC, &msg_ref, true, json!({}))
            }
            _ => return None,
        };
        reply.encode().ok()
    }
}

async fn serve(state: Arc<ServerState>, stream: TcpStream) {
    let Ok(ws) = accept_async(stream).await else { return };
    let (mut sink, mut source) = ws.split();
    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    state.controls.lock().unwrap().push(control_tx);
    state.connections.update(|n| {
        *n += 1;
        true
    });

    loop {
        tokio::select! {
            control = control_rx.recv() => match control {
                Some(Control::Push(text)) => {
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Control::Drop) | None => break,
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = state.respond(text.as_str()) {
                        if sink.send(Message::text(reply)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
