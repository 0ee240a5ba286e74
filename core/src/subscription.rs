//! Lifecycle controller for one change-feed channel.
//!
//! ```text
//! Idle -> Connecting -> Subscribed -> ChannelError -> (reconnect) -> Connecting
//!   \-> Unavailable (no backend)          any state -> Closed (unmount)
//! ```
//!
//! Mounting opens a [`ChannelHandle`] and spawns a pump task that drains the channel's queue.
//! Every dispatch happens under the controller's lock and is checked against the channel
//! generation, so messages from a replaced or closed channel are discarded and nothing is
//! dispatched once [`Subscription::unmount`] has returned.

use ripple_proto::PostgresChange;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    channel::{ChannelEvents, ChannelHandle, ChannelName},
    error::LifecycleError,
    feed::{ChangeFeed, FeedMessage, SubscriptionOptions},
    signal::{Mut, Read},
    status::ChannelStatus,
};

/// Receives every change delivered on the current channel.
///
/// Called with the controller's lock held: implementations must not call back into the
/// [`Subscription`] that invokes them.
pub trait ChangeHandler: Send + Sync {
    fn on_change(&self, change: &PostgresChange);
}

impl<F> ChangeHandler for F
where F: Fn(&PostgresChange) + Send + Sync
{
    fn on_change(&self, change: &PostgresChange) { self(change) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Mounted,
    Closed,
}

struct Lifecycle {
    phase: Phase,
    generation: u64,
    channel: Option<ChannelHandle>,
    pump: Option<JoinHandle<()>>,
}

struct Inner {
    feed: Option<Arc<dyn ChangeFeed>>,
    options: SubscriptionOptions,
    handler: Arc<dyn ChangeHandler>,
    status: Mut<ChannelStatus>,
    lifecycle: Mutex<Lifecycle>,
}

/// A subscription to table changes with status tracking and manual reconnect.
/// Dropping it unmounts.
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    /// `feed` is `None` when no backend client could be built; the subscription then settles
    /// to [`ChannelStatus::Unavailable`] on mount.
    pub fn new(feed: Option<Arc<dyn ChangeFeed>>, options: SubscriptionOptions, handler: impl ChangeHandler + 'static) -> Self {
        Self::with_handler(feed, options, Arc::new(handler))
    }

    pub fn with_handler(feed: Option<Arc<dyn ChangeFeed>>, options: SubscriptionOptions, handler: Arc<dyn ChangeHandler>) -> Self {
        let inner = Arc::new(Inner {
            feed,
            options,
            handler,
            status: Mut::new(ChannelStatus::Idle),
            lifecycle: Mutex::new(Lifecycle { phase: Phase::Idle, generation: 0, channel: None, pump: None }),
        });
        Self { inner }
    }

    /// Subscribes. Mounting again while mounted is a no-op.
    pub fn mount(&self) -> Result<(), LifecycleError> {
        let mut lifecycle = self.inner.lock();
        match lifecycle.phase {
            Phase::Closed => return Err(LifecycleError::Closed),
            Phase::Mounted => {
                debug!("Already subscribed to {}", self.inner.options);
                return Ok(());
            }
            Phase::Idle => {}
        }
        lifecycle.phase = Phase::Mounted;
        Inner::open_channel(&self.inner, &mut lifecycle);
        Ok(())
    }

    /// Replaces an errored channel with a fresh one under a new name
    pub fn reconnect(&self) -> Result<(), LifecycleError> {
        let mut lifecycle = self.inner.lock();
        match lifecycle.phase {
            Phase::Closed => return Err(LifecycleError::Closed),
            Phase::Idle => return Err(LifecycleError::NotMounted),
            Phase::Mounted => {}
        }
        let status = self.inner.status.value();
        if !status.is_errored() {
            return Err(LifecycleError::InvalidTransition { action: "reconnect", status });
        }

        info!("Reconnecting {} after {}", self.inner.options, status);
        Inner::close_channel(&mut lifecycle);
        Inner::open_channel(&self.inner, &mut lifecycle);
        Ok(())
    }

    /// Unsubscribes and closes for good. Safe to call in any state, any number of times.
    pub fn unmount(&self) {
        let mut lifecycle = self.inner.lock();
        if lifecycle.phase == Phase::Closed {
            return;
        }
        lifecycle.phase = Phase::Closed;
        Inner::close_channel(&mut lifecycle);
        self.inner.status.set(ChannelStatus::Closed);
    }

    pub fn status(&self) -> Read<ChannelStatus> { self.inner.status.read() }

    pub fn options(&self) -> &SubscriptionOptions { &self.inner.options }

    /// Name of the channel currently open, if any
    pub fn channel_name(&self) -> Option<ChannelName> { self.inner.lock().channel.as_ref().map(|channel| channel.name().clone()) }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.unmount(); }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> { self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) }

    fn open_channel(this: &Arc<Inner>, lifecycle: &mut Lifecycle) {
        lifecycle.generation += 1;
        // the pump needs a runtime; without one the channel is never opened
        let runtime = match Handle::try_current() {
            Ok(runtime) => Some(runtime),
            Err(e) => {
                if this.feed.is_some() {
                    warn!("Cannot open a channel for {} outside a tokio runtime: {}", this.options, e);
                }
                None
            }
        };
        let feed = runtime.as_ref().and(this.feed.as_ref());
        let (channel, events) = ChannelHandle::open(feed, &this.options);

        match runtime {
            Some(runtime) if channel.is_active() => {
                this.status.set(ChannelStatus::Connecting);
                lifecycle.pump = Some(runtime.spawn(Self::pump(Arc::downgrade(this), lifecycle.generation, events)));
                lifecycle.channel = Some(channel);
            }
            _ => this.status.set(ChannelStatus::Unavailable),
        }
    }

    fn close_channel(lifecycle: &mut Lifecycle) {
        // bumping the generation fences any dispatch still queued for the old channel
        lifecycle.generation += 1;
        if let Some(mut channel) = lifecycle.channel.take() {
            channel.close();
        }
        if let Some(pump) = lifecycle.pump.take() {
            pump.abort();
        }
    }

    async fn pump(inner: Weak<Inner>, generation: u64, mut events: ChannelEvents) {
        while let Some(message) = events.recv().await {
            let Some(inner) = inner.upgrade() else { break };
            if !inner.dispatch(generation, message) {
                break;
            }
        }
        debug!("Pump for generation {} finished", generation);
    }

    /// Returns false once the channel this message came from is no longer current
    fn dispatch(&self, generation: u64, message: FeedMessage) -> bool {
        let lifecycle = self.lock();
        if lifecycle.phase != Phase::Mounted || lifecycle.generation != generation {
            debug!("Discarding message from a stale channel");
            return false;
        }

        match message {
            FeedMessage::Change(change) => self.handler.on_change(&change),
            FeedMessage::Status(reported) => {
                let current = self.status.value();
                let next = current.after(&reported);
                let channel = lifecycle.channel.as_ref().map(|c| c.name().to_string()).unwrap_or_default();
                if next.is_errored() {
                    warn!("Channel {} reported {}", channel, reported);
                } else {
                    info!("Subscription status for {}: {}", channel, reported);
                }
                if next != current {
                    self.status.set(next);
                }
            }
        }
        true
    }
}
