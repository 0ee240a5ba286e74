//! # Ripple realtime client
//!
//! A native websocket client for the hosted realtime service, usable as a
//! [`ChangeFeed`](ripple_core::ChangeFeed) backend.
//!
//! ## One socket, many channels
//!
//!  Every channel opened through the client is multiplexed over a single socket, which is
//!  connected lazily when the first channel joins.
//!
//! ## No automatic reconnection
//!
//!  When the socket drops, every open channel receives a `ChannelError` status. Nothing is
//!  retried until a channel is opened again, typically by a subscription's manual reconnect.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! # use ripple_core::{BackendConfig, ChangeFeed, ChangeNotifier, NotifierOptions, SubscriptionOptions};
//! # use ripple_realtime_client::RealtimeClient;
//! # use std::sync::Arc;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BackendConfig::new("https://abc.supabase.co", "anon-key")?;
//!     let client = Arc::new(RealtimeClient::new(&config)?);
//!
//!     let feed: Arc<dyn ChangeFeed> = client.clone();
//!     let options = NotifierOptions::new(SubscriptionOptions::table("blog_posts")).noun("post");
//!     let notifier = ChangeNotifier::new(Some(feed), options, || println!("refresh requested"));
//!     notifier.mount()?;
//!
//!     // render `notifier.affordance()` whenever `notifier.changes()` or `notifier.status()` change
//!
//!     notifier.unmount();
//!     Ok(())
//! }
//! ```

pub mod client;

pub use client::{endpoint_url, ConnectionError, ConnectionState, RealtimeClient, HEARTBEAT_INTERVAL};

pub use tokio_tungstenite::tungstenite::Error as TungsteniteError;
