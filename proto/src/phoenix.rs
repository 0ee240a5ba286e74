//! Phoenix-channel frames spoken by the hosted realtime service (JSON serializer, vsn 1.0.0).
//!
//! ```json
//! {"topic":"realtime:blog_posts-*-1abc","event":"phx_join","payload":{...},"ref":"1","join_ref":"1"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{change::EventKind, error::DecodeError, PostgresChange};

pub const PHOENIX_TOPIC: &str = "phoenix";
pub const TOPIC_PREFIX: &str = "realtime:";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// One `postgres_changes` binding in a join request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresChangesSpec {
    pub event: EventKind,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub config: ChannelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub presence: PresenceConfig,
    pub postgres_changes: Vec<PostgresChangesSpec>,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    pub ack: bool,
    #[serde(rename = "self")]
    pub self_send: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    pub key: String,
}

impl ChannelConfig {
    pub fn postgres_changes(specs: Vec<PostgresChangesSpec>) -> Self {
        Self { broadcast: BroadcastConfig::default(), presence: PresenceConfig::default(), postgres_changes: specs, private: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Decoded form of a frame received from the service
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reply { status: ReplyStatus, response: Value },
    Change(PostgresChange),
    System { ok: bool, message: Option<String> },
    Error,
    Close,
    Other,
}

pub fn channel_topic(channel_name: &str) -> String { format!("{TOPIC_PREFIX}{channel_name}") }

impl PhoenixMessage {
    pub fn join(topic: impl Into<String>, join_ref: &str, payload: &JoinPayload) -> Result<Self, DecodeError> {
        Ok(Self {
            topic: topic.into(),
            event: EVENT_JOIN.to_string(),
            payload: serde_json::to_value(payload)?,
            msg_ref: Some(join_ref.to_string()),
            join_ref: Some(join_ref.to_string()),
        })
    }

    pub fn leave(topic: impl Into<String>, msg_ref: &str, join_ref: Option<&str>) -> Self {
        Self {
            topic: topic.into(),
            event: EVENT_LEAVE.to_string(),
            payload: Value::Object(Default::default()),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: join_ref.map(str::to_string),
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: Value::Object(Default::default()),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn reply(topic: impl Into<String>, msg_ref: &str, ok: bool, response: Value) -> Self {
        let status = if ok { "ok" } else { "error" };
        Self {
            topic: topic.into(),
            event: EVENT_REPLY.to_string(),
            payload: serde_json::json!({ "status": status, "response": response }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn postgres_change(topic: impl Into<String>, change: &PostgresChange) -> Result<Self, DecodeError> {
        Ok(Self {
            topic: topic.into(),
            event: EVENT_POSTGRES_CHANGES.to_string(),
            payload: serde_json::json!({ "ids": [], "data": serde_json::to_value(change)? }),
            msg_ref: None,
            join_ref: None,
        })
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> { Ok(serde_json::from_str(text)?) }

    pub fn encode(&self) -> Result<String, DecodeError> { Ok(serde_json::to_string(self)?) }

    /// Channel name for `realtime:`-prefixed topics
    pub fn channel_name(&self) -> Option<&str> { self.topic.strip_prefix(TOPIC_PREFIX) }

    pub fn inbound(&self) -> Result<Inbound, DecodeError> {
        Ok(match self.event.as_str() {
            EVENT_REPLY => {
                let status = match self.payload.get("status").and_then(Value::as_str) {
                    Some("ok") => ReplyStatus::Ok,
                    _ => ReplyStatus::Error,
                };
                Inbound::Reply { status, response: self.payload.get("response").cloned().unwrap_or(Value::Null) }
            }
            EVENT_POSTGRES_CHANGES => {
                // newer servers wrap the change in `data`
                let data = self.payload.get("data").unwrap_or(&self.payload);
                Inbound::Change(serde_json::from_value(data.clone())?)
            }
            EVENT_SYSTEM => Inbound::System {
                ok: self.payload.get("status").and_then(Value::as_str) == Some("ok"),
                message: self.payload.get("message").and_then(Value::as_str).map(str::to_string),
            },
            EVENT_ERROR => Inbound::Error,
            EVENT_CLOSE => Inbound::Close,
            _ => Inbound::Other,
        })
    }
}
