use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The kind of row mutation reported by the change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Inserted,
    #[serde(rename = "UPDATE")]
    Updated,
    #[serde(rename = "DELETE")]
    Deleted,
}

impl ChangeKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ChangeKind::Inserted => "INSERT",
            ChangeKind::Updated => "UPDATE",
            ChangeKind::Deleted => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_wire()) }
}

/// Which mutations a channel listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[default]
    #[serde(rename = "*")]
    Any,
}

impl EventKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventKind::Insert => "INSERT",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
            EventKind::Any => "*",
        }
    }

    pub fn matches(&self, kind: ChangeKind) -> bool {
        matches!(
            (self, kind),
            (EventKind::Any, _)
                | (EventKind::Insert, ChangeKind::Inserted)
                | (EventKind::Update, ChangeKind::Updated)
                | (EventKind::Delete, ChangeKind::Deleted)
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_wire()) }
}

/// Unique key of a row. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Reads an identifier out of a JSON column value. Strings and numbers qualify.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::new(s.as_str()),
            Value::Number(n) => Self::new(n.to_string()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for RecordId {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value).ok_or_else(|| "record id must not be empty".to_string()) }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self { id.0 }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// A single change notification, reduced to what the notifier needs.
/// `record_id` is `None` when the backend sent a change without a usable identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record_id: Option<RecordId>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, record_id: &str) -> Self { Self { kind, record_id: RecordId::new(record_id) } }

    pub fn malformed(kind: ChangeKind) -> Self { Self { kind, record_id: None } }

    pub fn from_postgres(change: &PostgresChange, id_column: &str) -> Self {
        Self { kind: change.kind, record_id: change.record_id(id_column) }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.record_id {
            Some(id) => write!(f, "{} {}", self.kind, id),
            None => write!(f, "{} <missing id>", self.kind),
        }
    }
}

/// Row-level change payload as pushed by the hosted realtime service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresChange {
    pub schema: String,
    pub table: String,
    #[serde(rename = "type", alias = "eventType")]
    pub kind: ChangeKind,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub record: Map<String, Value>,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub old_record: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl PostgresChange {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            kind,
            record: Map::new(),
            old_record: Map::new(),
            commit_timestamp: None,
        }
    }

    pub fn with_record(mut self, record: Map<String, Value>) -> Self {
        self.record = record;
        self
    }

    pub fn with_old_record(mut self, old_record: Map<String, Value>) -> Self {
        self.old_record = old_record;
        self
    }

    /// The row this change describes: the old row for deletes, the new row otherwise
    pub fn row(&self) -> &Map<String, Value> {
        match self.kind {
            ChangeKind::Deleted => &self.old_record,
            _ => &self.record,
        }
    }

    pub fn record_id(&self, id_column: &str) -> Option<RecordId> { self.row().get(id_column).and_then(RecordId::from_json) }
}

// the service sends `null` for the side of the change that does not exist
fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where D: serde::Deserializer<'de> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}
