//! "New content available" notifier.
//!
//! Wraps a [`Subscription`] whose handler files every change into an [`AggregationState`],
//! and derives the one affordance a viewer sees: either a reconnect prompt, a summary of
//! pending changes that refreshes the host when clicked, or nothing.

use ripple_proto::{ChangeEvent, PostgresChange};
use std::sync::Arc;
use tracing::info;

use crate::{
    aggregation::{AggregationState, Summary},
    classifier::classify,
    error::LifecycleError,
    feed::{ChangeFeed, SubscriptionOptions},
    refresh::RefreshHost,
    signal::{Mut, Read},
    status::ChannelStatus,
    subscription::{ChangeHandler, Subscription},
};

pub const RECONNECT_MESSAGE: &str = "Connection error. Click to reconnect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierOptions {
    pub subscription: SubscriptionOptions,
    /// Singular noun used in summary messages ("post" -> "3 new posts available")
    pub noun: String,
}

impl NotifierOptions {
    pub fn new(subscription: SubscriptionOptions) -> Self { Self { subscription, noun: "item".to_string() } }

    pub fn noun(mut self, noun: impl Into<String>) -> Self {
        self.noun = noun.into();
        self
    }
}

/// What the host should render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Affordance {
    Hidden,
    NewContent { summary: Summary, message: String },
    Reconnect { message: String },
}

struct Aggregator {
    changes: Arc<Mut<AggregationState>>,
    id_column: String,
}

impl ChangeHandler for Aggregator {
    fn on_change(&self, change: &PostgresChange) {
        let event = ChangeEvent::from_postgres(change, &self.id_column);
        self.changes.update(|state| classify(&event, state).is_recorded());
    }
}

pub struct ChangeNotifier {
    subscription: Subscription,
    changes: Arc<Mut<AggregationState>>,
    host: Arc<dyn RefreshHost>,
    noun: String,
}

impl ChangeNotifier {
    pub fn new(feed: Option<Arc<dyn ChangeFeed>>, options: NotifierOptions, host: impl RefreshHost + 'static) -> Self {
        let changes = Arc::new(Mut::new(AggregationState::new()));
        let aggregator = Aggregator { changes: changes.clone(), id_column: options.subscription.id_column.clone() };
        let subscription = Subscription::new(feed, options.subscription, aggregator);
        Self { subscription, changes, host: Arc::new(host), noun: options.noun }
    }

    pub fn mount(&self) -> Result<(), LifecycleError> { self.subscription.mount() }

    pub fn unmount(&self) { self.subscription.unmount() }

    /// Only valid while the channel is errored. Pending changes are kept.
    pub fn reconnect(&self) -> Result<(), LifecycleError> { self.subscription.reconnect() }

    /// Asks the host to re-fetch and forgets every pending change. The state is cleared no
    /// matter how the host's re-fetch turns out.
    pub fn refresh(&self) {
        info!("Refreshing content for {}", self.subscription.options());
        self.host.request_refresh();
        self.changes.update(AggregationState::clear);
    }

    pub fn status(&self) -> Read<ChannelStatus> { self.subscription.status() }

    pub fn changes(&self) -> Read<AggregationState> { self.changes.read() }

    pub fn summary(&self) -> Option<Summary> { self.changes.with(AggregationState::summary) }

    pub fn summary_text(&self) -> Option<String> { self.summary().map(|summary| summary.message(&self.noun)) }

    pub fn has_pending_changes(&self) -> bool { self.changes.with(|state| !state.is_empty()) }

    pub fn is_errored(&self) -> bool { self.subscription.status().with(ChannelStatus::is_errored) }

    pub fn subscription(&self) -> &Subscription { &self.subscription }

    /// A channel error outranks pending changes
    pub fn affordance(&self) -> Affordance {
        if self.is_errored() {
            return Affordance::Reconnect { message: RECONNECT_MESSAGE.to_string() };
        }
        match self.summary() {
            Some(summary) => Affordance::NewContent { summary, message: summary.message(&self.noun) },
            None => Affordance::Hidden,
        }
    }
}
