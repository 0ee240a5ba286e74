use rand::{distributions::Alphanumeric, Rng};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::feed::{ChangeFeed, EventSink, FeedMessage, FeedSubscription, SubscriptionOptions, QUEUE_CAPACITY};

static CHANNEL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Backend-side name of a channel. Unique within the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// `{table}-{event}-{sequence}{suffix}`; the sequence keeps names unique within the
    /// process, the random suffix keeps separate processes from colliding on the backend.
    pub fn unique(options: &SubscriptionOptions) -> Self {
        let sequence = CHANNEL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(7).map(|c| char::from(c).to_ascii_lowercase()).collect();
        Self(format!("{}-{}-{}{}", options.table, options.event, sequence, suffix))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for ChannelName {
    fn from(name: &str) -> Self { Self(name.to_string()) }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Receiving end of a channel's event queue
pub struct ChannelEvents {
    receiver: mpsc::Receiver<FeedMessage>,
}

impl ChannelEvents {
    /// `None` once the channel is closed and drained
    pub async fn recv(&mut self) -> Option<FeedMessage> { self.receiver.recv().await }

    pub fn try_recv(&mut self) -> Option<FeedMessage> { self.receiver.try_recv().ok() }
}

/// Owns one backend subscription. The backend's unsubscribe runs exactly once, on
/// [`ChannelHandle::close`] or on drop, whichever comes first.
pub struct ChannelHandle {
    name: ChannelName,
    subscription: Option<Box<dyn FeedSubscription>>,
}

impl ChannelHandle {
    /// Starts subscribing right away. Without a backend the handle is inactive and its queue
    /// is already closed.
    pub fn open(feed: Option<&Arc<dyn ChangeFeed>>, options: &SubscriptionOptions) -> (Self, ChannelEvents) {
        let name = ChannelName::unique(options);
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);

        let subscription = match feed {
            Some(feed) => {
                info!("Opening channel {} ({})", name, options);
                Some(feed.subscribe(&name, options, EventSink::new(sender)))
            }
            None => {
                debug!("No backend client, channel {} stays inactive", name);
                None
            }
        };

        (Self { name, subscription }, ChannelEvents { receiver })
    }

    pub fn name(&self) -> &ChannelName { &self.name }

    pub fn is_active(&self) -> bool { self.subscription.is_some() }

    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            info!("Unsubscribing from {}", self.name);
            subscription.unsubscribe();
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) { self.close(); }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle").field("name", &self.name).field("active", &self.is_active()).finish()
    }
}
