use ripple_proto::SubscribeStatus;
use strum::Display;

/// Why a channel stopped delivering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFault {
    Backend(String),
    Unspecified,
    TimedOut,
    ClosedByBackend,
}

impl std::fmt::Display for ChannelFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelFault::Backend(reason) => f.write_str(reason),
            ChannelFault::Unspecified => f.write_str("channel error"),
            ChannelFault::TimedOut => f.write_str("subscription timed out"),
            ChannelFault::ClosedByBackend => f.write_str("closed by backend"),
        }
    }
}

/// Lifecycle status of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ChannelStatus {
    #[strum(serialize = "IDLE")]
    Idle,
    /// No backend client could be constructed; the channel never subscribes
    #[strum(serialize = "UNAVAILABLE")]
    Unavailable,
    #[strum(serialize = "CONNECTING")]
    Connecting,
    #[strum(serialize = "SUBSCRIBED")]
    Subscribed,
    #[strum(serialize = "CHANNEL_ERROR")]
    ChannelError(ChannelFault),
    #[strum(serialize = "CLOSED")]
    Closed,
}

impl ChannelStatus {
    /// Status after the backend reports `reported` for the current channel
    pub fn after(&self, reported: &SubscribeStatus) -> ChannelStatus {
        match reported {
            SubscribeStatus::Subscribed => ChannelStatus::Subscribed,
            SubscribeStatus::ChannelError(Some(reason)) => ChannelStatus::ChannelError(ChannelFault::Backend(reason.clone())),
            SubscribeStatus::ChannelError(None) => ChannelStatus::ChannelError(ChannelFault::Unspecified),
            SubscribeStatus::TimedOut => ChannelStatus::ChannelError(ChannelFault::TimedOut),
            // a close following an error keeps the more specific fault
            SubscribeStatus::Closed => match self {
                ChannelStatus::ChannelError(_) => self.clone(),
                _ => ChannelStatus::ChannelError(ChannelFault::ClosedByBackend),
            },
        }
    }

    pub fn is_errored(&self) -> bool { matches!(self, ChannelStatus::ChannelError(_)) }

    pub fn is_subscribed(&self) -> bool { matches!(self, ChannelStatus::Subscribed) }
}
