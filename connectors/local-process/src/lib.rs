//! In-process change feed.
//!
//! Stands in for the hosted realtime service wherever the producer of changes lives in the
//! same process: tests, demos, or a host that already observes its own writes. Changes are
//! published explicitly and fanned out to every open channel whose options match.

use dashmap::DashMap;
use ripple_core::{
    channel::ChannelName,
    error::DeliveryError,
    feed::{ChangeFeed, EventSink, FeedMessage, FeedSubscription, SubscriptionOptions},
};
use ripple_proto as proto;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Weak,
};
use tracing::{debug, warn};

struct LocalChannel {
    options: SubscriptionOptions,
    sink: EventSink,
}

#[derive(Default)]
struct Inner {
    channels: DashMap<ChannelName, LocalChannel>,
    manual_status: bool,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

/// Change feed backed by in-memory channels
#[derive(Clone, Default)]
pub struct LocalChangeFeed {
    inner: Arc<Inner>,
}

impl LocalChangeFeed {
    /// Channels are confirmed as subscribed as soon as they open
    pub fn new() -> Self { Self::default() }

    /// Channels stay connecting until a status is reported through [`LocalChangeFeed::confirm`],
    /// [`LocalChangeFeed::fail`] and friends
    pub fn manual() -> Self { Self { inner: Arc::new(Inner { manual_status: true, ..Default::default() }) } }

    /// Fans a change out to every matching channel. Returns how many channels took it.
    pub fn publish(&self, change: proto::PostgresChange) -> usize {
        let mut delivered = 0;
        for channel in self.inner.channels.iter() {
            if !channel.options.matches(&change) {
                continue;
            }
            match channel.sink.try_deliver(FeedMessage::Change(change.clone())) {
                Ok(()) => delivered += 1,
                Err(DeliveryError::Full) => warn!("Channel {} is full, dropping {} change", channel.key(), change.kind),
                Err(DeliveryError::Closed) => debug!("Channel {} is gone", channel.key()),
            }
        }
        delivered
    }

    pub fn confirm(&self, name: &ChannelName) -> bool { self.report(name, proto::SubscribeStatus::Subscribed) }

    pub fn fail(&self, name: &ChannelName, reason: Option<&str>) -> bool {
        self.report(name, proto::SubscribeStatus::ChannelError(reason.map(str::to_string)))
    }

    pub fn time_out(&self, name: &ChannelName) -> bool { self.report(name, proto::SubscribeStatus::TimedOut) }

    pub fn close_channel(&self, name: &ChannelName) -> bool { self.report(name, proto::SubscribeStatus::Closed) }

    /// Reports a channel error on every open channel, as a lost connection would
    pub fn fail_all(&self, reason: &str) -> usize {
        self.channel_names().iter().filter(|name| self.fail(name, Some(reason))).count()
    }

    pub fn report(&self, name: &ChannelName, status: proto::SubscribeStatus) -> bool {
        match self.inner.channels.get(name) {
            Some(channel) => channel.sink.try_deliver(FeedMessage::Status(status)).is_ok(),
            None => false,
        }
    }

    pub fn channel_names(&self) -> Vec<ChannelName> { self.inner.channels.iter().map(|c| c.key().clone()).collect() }

    pub fn open_channels(&self) -> usize { self.inner.channels.len() }

    pub fn subscribe_calls(&self) -> usize { self.inner.subscribe_calls.load(Ordering::SeqCst) }

    /// Counts every call, including repeated ones on the same subscription
    pub fn unsubscribe_calls(&self) -> usize { self.inner.unsubscribe_calls.load(Ordering::SeqCst) }
}

impl ChangeFeed for LocalChangeFeed {
    fn subscribe(&self, name: &ChannelName, options: &SubscriptionOptions, sink: EventSink) -> Box<dyn FeedSubscription> {
        self.inner.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.inner.manual_status {
            let _ = sink.try_deliver(FeedMessage::Status(proto::SubscribeStatus::Subscribed));
        }
        if self.inner.channels.insert(name.clone(), LocalChannel { options: options.clone(), sink }).is_some() {
            warn!("Channel {} was already open and has been replaced", name);
        }
        debug!("Local channel {} open ({})", name, options);

        Box::new(LocalSubscription { name: name.clone(), feed: Arc::downgrade(&self.inner), closed: AtomicBool::new(false) })
    }
}

struct LocalSubscription {
    name: ChannelName,
    feed: Weak<Inner>,
    closed: AtomicBool,
}

impl FeedSubscription for LocalSubscription {
    fn unsubscribe(&self) {
        let Some(feed) = self.feed.upgrade() else { return };
        feed.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::AcqRel) {
            feed.channels.remove(&self.name);
            debug!("Local channel {} closed", self.name);
        }
    }
}
