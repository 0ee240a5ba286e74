//! Minimal reactive cells for state the host renders from.
//!
//! Writers ([`Mut`]) and readers ([`Read`]) are different types; readers can be cloned freely,
//! read the present value, and wait asynchronously for a value matching a predicate.

use tokio::sync::watch;

/// Mutable (stateful) signal
pub struct Mut<T> {
    sender: watch::Sender<T>,
}

impl<T> Mut<T> {
    pub fn new(value: T) -> Self { Self { sender: watch::Sender::new(value) } }

    pub fn set(&self, value: T) { self.sender.send_replace(value); }

    /// Mutates the value in place. Readers are notified only when `f` returns true.
    /// The whole mutation is observed atomically by readers.
    pub fn update(&self, f: impl FnOnce(&mut T) -> bool) -> bool { self.sender.send_if_modified(f) }

    /// Calls a closure with a borrow of the current value
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { f(&self.sender.borrow()) }

    /// Readonly signal downstream of this mutable signal
    pub fn read(&self) -> Read<T> { Read { receiver: self.sender.subscribe() } }
}

impl<T: Clone> Mut<T> {
    pub fn value(&self) -> T { self.sender.borrow().clone() }
}

/// Read-only signal
pub struct Read<T> {
    receiver: watch::Receiver<T>,
}

impl<T> Clone for Read<T> {
    fn clone(&self) -> Self { Self { receiver: self.receiver.clone() } }
}

impl<T> Read<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { f(&self.receiver.borrow()) }

    /// Waits until the predicate yields a value. Returns `None` once the writer is gone
    /// without the predicate ever matching.
    pub async fn wait_for<R>(&self, predicate: impl Fn(&T) -> Option<R>) -> Option<R> {
        let mut receiver = self.receiver.clone();
        loop {
            let ready = predicate(&receiver.borrow_and_update());
            if ready.is_some() {
                return ready;
            }
            if receiver.changed().await.is_err() {
                return None;
            }
        }
    }

    pub async fn wait_until(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.wait_for(|value| predicate(value).then_some(())).await.is_some()
    }

    /// Waits for the next change after the last one this reader saw
    pub async fn changed(&mut self) -> bool { self.receiver.changed().await.is_ok() }
}

impl<T: Clone> Read<T> {
    pub fn get(&self) -> T { self.receiver.borrow().clone() }
}

impl<T: std::fmt::Display> std::fmt::Display for Read<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.with(|v| write!(f, "{}", v)) }
}
