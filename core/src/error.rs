use thiserror::Error;

use crate::status::ChannelStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("subscription is closed")]
    Closed,
    #[error("subscription has not been mounted")]
    NotMounted,
    #[error("cannot {action} while {status}")]
    InvalidTransition { action: &'static str, status: ChannelStatus },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing backend url (set {0})")]
    MissingUrl(&'static str),
    #[error("missing backend api key (set {0})")]
    MissingKey(&'static str),
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("channel queue is full")]
    Full,
    #[error("channel is closed")]
    Closed,
}
