//! The consumed change-feed interface.
//!
//! A backend opens channels on request and pushes [`FeedMessage`]s into the [`EventSink`] it
//! was given. Each sink feeds a bounded queue owned by exactly one subscription.

use ripple_proto::{phoenix::PostgresChangesSpec, EventKind, PostgresChange, RowFilter, SubscribeStatus};
use std::fmt;
use tokio::sync::mpsc;

use crate::{channel::ChannelName, error::DeliveryError};

/// Capacity of a channel's event queue
pub const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(PostgresChange),
    Status(SubscribeStatus),
}

/// What a channel listens to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub table: String,
    pub schema: String,
    pub event: EventKind,
    pub filter: Option<RowFilter>,
    /// Column holding the record identifier
    pub id_column: String,
}

impl SubscriptionOptions {
    pub fn table(table: impl Into<String>) -> Self {
        Self { table: table.into(), schema: "public".to_string(), event: EventKind::Any, filter: None, id_column: "id".to_string() }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn event(mut self, event: EventKind) -> Self {
        self.event = event;
        self
    }

    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Whether a change falls within this channel's schema, table, event kind and row filter
    pub fn matches(&self, change: &PostgresChange) -> bool {
        change.schema == self.schema
            && change.table == self.table
            && self.event.matches(change.kind)
            && self.filter.as_ref().map_or(true, |filter| filter.matches(change.row()))
    }

    pub fn to_spec(&self) -> PostgresChangesSpec {
        PostgresChangesSpec {
            event: self.event,
            schema: self.schema.clone(),
            table: self.table.clone(),
            filter: self.filter.as_ref().map(|f| f.to_string()),
        }
    }
}

impl fmt::Display for SubscriptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}.{}", self.event, self.schema, self.table)?;
        if let Some(filter) = &self.filter {
            write!(f, " where {}", filter)?;
        }
        Ok(())
    }
}

/// Producer end of a channel's event queue, handed to the backend
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::Sender<FeedMessage>,
}

impl EventSink {
    pub fn new(sender: mpsc::Sender<FeedMessage>) -> Self { Self { sender } }

    /// Delivers without waiting; fails if the queue is full or the subscriber went away
    pub fn try_deliver(&self, message: FeedMessage) -> Result<(), DeliveryError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Delivers, waiting for queue capacity
    pub async fn deliver(&self, message: FeedMessage) -> Result<(), DeliveryError> {
        self.sender.send(message).await.map_err(|_| DeliveryError::Closed)
    }

    pub fn is_closed(&self) -> bool { self.sender.is_closed() }
}

/// A managed change-feed backend
pub trait ChangeFeed: Send + Sync {
    /// Opens a channel called `name`. Never fails: problems are reported later as a
    /// `ChannelError` status through `sink`.
    fn subscribe(&self, name: &ChannelName, options: &SubscriptionOptions, sink: EventSink) -> Box<dyn FeedSubscription>;
}

/// Backend side of one open channel
pub trait FeedSubscription: Send + Sync {
    /// Idempotent and fire-and-forget
    fn unsubscribe(&self);
}
