pub mod aggregation;
pub mod channel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod feed;
pub mod notifier;
pub mod refresh;
pub mod signal;
pub mod status;
pub mod subscription;

pub use aggregation::{AggregationState, Bucket, Summary};
pub use channel::{ChannelHandle, ChannelName};
pub use config::BackendConfig;
pub use feed::{ChangeFeed, EventSink, FeedMessage, FeedSubscription, SubscriptionOptions};
pub use notifier::{Affordance, ChangeNotifier, NotifierOptions};
pub use refresh::{RefreshHost, RefreshSignal};
pub use status::{ChannelFault, ChannelStatus};
pub use subscription::{ChangeHandler, Subscription};

pub use ripple_proto as proto;
