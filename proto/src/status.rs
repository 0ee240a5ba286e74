use std::fmt;

/// Channel status as reported by a change-feed backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeStatus {
    Subscribed,
    ChannelError(Option<String>),
    TimedOut,
    Closed,
}

impl fmt::Display for SubscribeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeStatus::Subscribed => f.write_str("SUBSCRIBED"),
            SubscribeStatus::ChannelError(Some(reason)) => write!(f, "CHANNEL_ERROR: {reason}"),
            SubscribeStatus::ChannelError(None) => f.write_str("CHANNEL_ERROR"),
            SubscribeStatus::TimedOut => f.write_str("TIMED_OUT"),
            SubscribeStatus::Closed => f.write_str("CLOSED"),
        }
    }
}
