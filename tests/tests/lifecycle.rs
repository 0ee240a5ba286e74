mod common;
use anyhow::Result;
use common::*;
use ripple::{
    error::LifecycleError,
    proto::{ChangeKind, SubscribeStatus},
    Affordance, Bucket, ChannelFault, ChannelStatus, Subscription, SubscriptionOptions,
};
use ripple_connector_local_process::LocalChangeFeed;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_mount_is_idempotent() -> Result<()> {
    let local = LocalChangeFeed::new();
    let (notifier, _) = local_post_notifier(&local);
    assert_eq!(notifier.status().get(), ChannelStatus::Idle);

    notifier.mount()?;
    notifier.mount()?;
    wait_subscribed(&notifier).await;
    assert_eq!(local.subscribe_calls(), 1);
    assert_eq!(local.open_channels(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unmount_while_connecting() -> Result<()> {
    let local = LocalChangeFeed::manual();
    let (notifier, _) = local_post_notifier(&local);
    notifier.mount()?;
    assert_eq!(notifier.status().get(), ChannelStatus::Connecting);
    let name = notifier.subscription().channel_name().unwrap();

    notifier.unmount();
    assert_eq!(local.unsubscribe_calls(), 1);
    assert_eq!(local.open_channels(), 0);
    assert_eq!(notifier.status().get(), ChannelStatus::Closed);

    // a late confirmation and late changes have nowhere to go
    assert!(!local.confirm(&name));
    assert_eq!(local.publish(post(ChangeKind::Inserted, 1)), 0);
    tokio::task::yield_now().await;
    assert_eq!(notifier.status().get(), ChannelStatus::Closed);
    assert!(!notifier.has_pending_changes());

    notifier.unmount();
    assert_eq!(local.unsubscribe_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_nothing_dispatched_after_unmount() -> Result<()> {
    let local = LocalChangeFeed::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let seen = seen.clone();
        move |change: &ripple::proto::PostgresChange| seen.lock().unwrap().push(change.kind)
    };
    let feed: Arc<dyn ripple::ChangeFeed> = Arc::new(local.clone());
    let subscription = Subscription::new(Some(feed), SubscriptionOptions::table("blog_posts"), handler);
    subscription.mount()?;
    assert!(within(subscription.status().wait_until(ChannelStatus::is_subscribed)).await);

    // queued but not yet pumped when the unmount lands
    for id in 0..10 {
        local.publish(post(ChangeKind::Updated, id));
    }
    subscription.unmount();
    let dispatched = seen.lock().unwrap().len();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(seen.lock().unwrap().len(), dispatched);
    assert_eq!(subscription.status().get(), ChannelStatus::Closed);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_after_channel_error() -> Result<()> {
    let local = LocalChangeFeed::manual();
    let (notifier, _) = local_post_notifier(&local);
    notifier.mount()?;
    let first = notifier.subscription().channel_name().unwrap();
    local.confirm(&first);
    wait_subscribed(&notifier).await;

    local.publish(post(ChangeKind::Inserted, 1));
    wait_recorded(&notifier, 1).await;

    local.fail(&first, Some("replication slot lost"));
    wait_errored(&notifier).await;
    assert_eq!(notifier.status().get(), ChannelStatus::ChannelError(ChannelFault::Backend("replication slot lost".into())));
    // the reconnect prompt outranks pending content
    assert!(matches!(notifier.affordance(), Affordance::Reconnect { .. }));

    notifier.reconnect()?;
    assert_eq!(notifier.status().get(), ChannelStatus::Connecting);
    let second = notifier.subscription().channel_name().unwrap();
    assert_ne!(first, second);
    assert_eq!(local.subscribe_calls(), 2);
    assert_eq!(local.unsubscribe_calls(), 1);
    assert_eq!(local.channel_names(), vec![second.clone()]);

    // pending changes survive the reconnect
    assert_eq!(notifier.changes().get().count(Bucket::New), 1);
    assert_eq!(notifier.summary_text().as_deref(), Some("1 new post available"));

    local.confirm(&second);
    wait_subscribed(&notifier).await;
    local.publish(post(ChangeKind::Inserted, 2));
    wait_recorded(&notifier, 2).await;
    assert_eq!(notifier.summary_text().as_deref(), Some("2 new posts available"));
    Ok(())
}

#[tokio::test]
async fn test_timeout_and_close_are_errors() -> Result<()> {
    let local = LocalChangeFeed::manual();
    let (notifier, _) = local_post_notifier(&local);
    notifier.mount()?;
    let name = notifier.subscription().channel_name().unwrap();

    local.time_out(&name);
    wait_errored(&notifier).await;
    assert_eq!(notifier.status().get(), ChannelStatus::ChannelError(ChannelFault::TimedOut));

    // a close after the error keeps the original fault
    local.close_channel(&name);
    local.report(&name, SubscribeStatus::Closed);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(notifier.status().get(), ChannelStatus::ChannelError(ChannelFault::TimedOut));

    notifier.reconnect()?;
    let name = notifier.subscription().channel_name().unwrap();
    local.confirm(&name);
    wait_subscribed(&notifier).await;

    local.close_channel(&name);
    wait_errored(&notifier).await;
    assert_eq!(notifier.status().get(), ChannelStatus::ChannelError(ChannelFault::ClosedByBackend));
    Ok(())
}

#[tokio::test]
async fn test_reconnect_only_from_error() -> Result<()> {
    let local = LocalChangeFeed::manual();
    let (notifier, _) = local_post_notifier(&local);
    assert!(matches!(notifier.reconnect(), Err(LifecycleError::NotMounted)));

    notifier.mount()?;
    assert!(matches!(notifier.reconnect(), Err(LifecycleError::InvalidTransition { status: ChannelStatus::Connecting, .. })));

    local.confirm(&notifier.subscription().channel_name().unwrap());
    wait_subscribed(&notifier).await;
    assert!(matches!(notifier.reconnect(), Err(LifecycleError::InvalidTransition { status: ChannelStatus::Subscribed, .. })));
    assert_eq!(local.subscribe_calls(), 1);

    notifier.unmount();
    assert!(matches!(notifier.reconnect(), Err(LifecycleError::Closed)));
    assert!(matches!(notifier.mount(), Err(LifecycleError::Closed)));
    Ok(())
}

#[tokio::test]
async fn test_stale_channel_is_fenced_after_reconnect() -> Result<()> {
    let local = LocalChangeFeed::manual();
    let (notifier, _) = local_post_notifier(&local);
    notifier.mount()?;
    let first = notifier.subscription().channel_name().unwrap();
    local.fail(&first, None);
    wait_errored(&notifier).await;
    assert_eq!(notifier.status().get(), ChannelStatus::ChannelError(ChannelFault::Unspecified));

    notifier.reconnect()?;
    // the replaced channel is gone from the backend
    assert!(!local.confirm(&first));
    assert!(!local.fail(&first, Some("late")));
    assert_eq!(notifier.status().get(), ChannelStatus::Connecting);
    Ok(())
}

#[tokio::test]
async fn test_lost_connection_fails_every_channel() -> Result<()> {
    let local = LocalChangeFeed::new();
    let (posts, _) = local_post_notifier(&local);
    let (more_posts, _) = local_post_notifier(&local);
    posts.mount()?;
    more_posts.mount()?;
    wait_subscribed(&posts).await;
    wait_subscribed(&more_posts).await;

    assert_eq!(local.fail_all("socket closed"), 2);
    wait_errored(&posts).await;
    wait_errored(&more_posts).await;
    Ok(())
}

#[tokio::test]
async fn test_no_backend_is_unavailable() -> Result<()> {
    let (notifier, signal) = post_notifier(None);
    notifier.mount()?;
    assert_eq!(notifier.status().get(), ChannelStatus::Unavailable);
    assert_eq!(notifier.subscription().channel_name(), None);
    assert_eq!(notifier.affordance(), Affordance::Hidden);
    assert!(!notifier.is_errored());
    assert!(matches!(notifier.reconnect(), Err(LifecycleError::InvalidTransition { status: ChannelStatus::Unavailable, .. })));

    notifier.refresh();
    assert_eq!(signal.requests(), 1);

    notifier.unmount();
    assert_eq!(notifier.status().get(), ChannelStatus::Closed);
    Ok(())
}

#[test]
fn test_mount_outside_runtime_is_unavailable() -> Result<()> {
    let local = LocalChangeFeed::new();
    let (notifier, signal) = local_post_notifier(&local);
    notifier.mount()?;
    assert_eq!(notifier.status().get(), ChannelStatus::Unavailable);
    assert_eq!(notifier.subscription().channel_name(), None);
    assert_eq!(local.subscribe_calls(), 0);
    assert_eq!(local.open_channels(), 0);

    notifier.refresh();
    assert_eq!(signal.requests(), 1);
    notifier.unmount();
    assert_eq!(notifier.status().get(), ChannelStatus::Closed);
    assert_eq!(local.unsubscribe_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_drop_unmounts() -> Result<()> {
    let local = LocalChangeFeed::new();
    let (notifier, _) = local_post_notifier(&local);
    notifier.mount()?;
    let status = notifier.status();
    assert_eq!(local.open_channels(), 1);

    drop(notifier);
    assert_eq!(local.open_channels(), 0);
    assert_eq!(local.unsubscribe_calls(), 1);
    assert_eq!(status.get(), ChannelStatus::Closed);
    Ok(())
}
