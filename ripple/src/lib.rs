//! # Ripple
//!
//! Ripple watches a table through a managed change feed and tells a viewer that newer content
//! exists, without touching what they are looking at. Changes are aggregated per record into
//! new, updated and removed buckets; the viewer decides when to refresh.
//!
//! ## Core Concepts
//!
//! - **Change feed**: a backend that opens named channels and pushes row changes and status
//! - **Subscription**: the lifecycle of one channel: mount, manual reconnect, unmount
//! - **Aggregation**: the distinct record ids seen per bucket since the last refresh
//! - **Affordance**: what to render: nothing, a summary such as "3 new posts available", or a
//!   reconnect prompt
//!
//! ## Example
//!
//! ```rust
//! # use ripple::{Affordance, ChangeFeed, ChangeNotifier, NotifierOptions, SubscriptionOptions};
//! # use ripple_connector_local_process::LocalChangeFeed;
//! # use ripple::proto::{ChangeKind, PostgresChange};
//! # use std::sync::Arc;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let local = LocalChangeFeed::new();
//!     let options = NotifierOptions::new(SubscriptionOptions::table("blog_posts")).noun("post");
//!     let feed: Arc<dyn ChangeFeed> = Arc::new(local.clone());
//!     let notifier = ChangeNotifier::new(Some(feed), options, || println!("reloading"));
//!     notifier.mount()?;
//!     notifier.status().wait_until(|status| status.is_subscribed()).await;
//!
//!     let record = serde_json::json!({ "id": 1 }).as_object().cloned().unwrap_or_default();
//!     local.publish(PostgresChange::new("public", "blog_posts", ChangeKind::Inserted).with_record(record));
//!     notifier.changes().wait_until(|changes| !changes.is_empty()).await;
//!
//!     assert_eq!(notifier.summary_text().as_deref(), Some("1 new post available"));
//!     notifier.refresh();
//!     assert_eq!(notifier.affordance(), Affordance::Hidden);
//!     # Ok(())
//! # }
//! ```
//!
//! With the `realtime` feature, [`realtime::RealtimeClient`] connects to the hosted realtime
//! service using a [`BackendConfig`] read from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.

pub use ripple_core as core;
pub use ripple_proto as proto;

pub use ripple_core::{
    aggregation, channel, classifier, config, error, feed, notifier, refresh, signal, status, subscription, Affordance,
    AggregationState, BackendConfig, Bucket, ChangeFeed, ChangeHandler, ChangeNotifier, ChannelFault, ChannelStatus, NotifierOptions,
    RefreshHost, RefreshSignal, Subscription, SubscriptionOptions, Summary,
};

#[cfg(feature = "local")]
pub use ripple_connector_local_process as local;
#[cfg(feature = "realtime")]
pub use ripple_realtime_client as realtime;

use std::sync::Arc;

/// The change feed for a process configured through the environment: the realtime client when
/// `SUPABASE_URL` and `SUPABASE_ANON_KEY` resolve, otherwise `None` so notifiers render nothing.
#[cfg(feature = "realtime")]
pub fn feed_from_env() -> Option<Arc<dyn ChangeFeed>> {
    let client = realtime::RealtimeClient::from_env()?;
    tracing::debug!("Using realtime change feed");
    Some(Arc::new(client))
}

/// A notifier over `feed`, mounted right away
pub fn watch(
    feed: Option<Arc<dyn ChangeFeed>>,
    options: NotifierOptions,
    host: impl RefreshHost + 'static,
) -> Result<ChangeNotifier, error::LifecycleError> {
    let notifier = ChangeNotifier::new(feed, options, host);
    notifier.mount()?;
    Ok(notifier)
}
