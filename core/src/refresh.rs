use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::Notify;

/// The page or view that owns the content list a notifier watches.
///
/// `request_refresh` only asks for a re-fetch; whether the re-fetch succeeds is the host's
/// business.
pub trait RefreshHost: Send + Sync {
    fn request_refresh(&self);
}

impl<F> RefreshHost for F
where F: Fn() + Send + Sync
{
    fn request_refresh(&self) { self() }
}

/// A host for async callers: counts requests and wakes whoever waits on [`RefreshSignal::requested`].
/// Requests made while nobody waits are coalesced into one wake-up.
#[derive(Clone, Default)]
pub struct RefreshSignal {
    inner: Arc<SignalInner>,
}

#[derive(Default)]
struct SignalInner {
    notify: Notify,
    requests: AtomicU64,
}

impl RefreshSignal {
    pub fn new() -> Self { Self::default() }

    /// Total refreshes requested so far
    pub fn requests(&self) -> u64 { self.inner.requests.load(Ordering::Acquire) }

    pub async fn requested(&self) { self.inner.notify.notified().await }
}

impl RefreshHost for RefreshSignal {
    fn request_refresh(&self) {
        self.inner.requests.fetch_add(1, Ordering::AcqRel);
        self.inner.notify.notify_one();
    }
}
