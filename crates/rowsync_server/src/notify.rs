//! Pokes: out-of-band "something changed, pull now" signals.
//!
//! Delivery is best effort. A missed poke only delays a client until its next
//! scheduled pull, which always returns the authoritative state.

use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Receives poke keys (`user/<id>`, `list/<id>`) after successful pushes.
pub trait Notifier: Send + Sync {
    /// Signals that entities under `key` changed. Must not block.
    fn notify(&self, key: &str);
}

/// Drops every poke.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _key: &str) {}
}

/// Logs pokes at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, key: &str) {
        debug!(key, "poke");
    }
}

/// Fans pokes out to any number of subscribers.
///
/// Slow subscribers lose the oldest pokes once `capacity` are queued.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<String>,
}

impl BroadcastNotifier {
    /// Default channel capacity.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates a notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to pokes sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, key: &str) {
        // An error only means nobody is listening.
        if self.sender.send(key.to_string()).is_err() {
            trace!(key, "poke with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let notifier = BroadcastNotifier::new(8);
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        assert_eq!(notifier.receiver_count(), 2);

        notifier.notify("list/L1");
        assert_eq!(a.try_recv().unwrap(), "list/L1");
        assert_eq!(b.try_recv().unwrap(), "list/L1");
    }

    #[test]
    fn broadcast_without_subscribers_is_fine() {
        let notifier = BroadcastNotifier::default();
        notifier.notify("user/u1");
        let mut late = notifier.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn noop_and_log_accept_anything() {
        NoopNotifier.notify("list/L1");
        LogNotifier.notify("user/u1");
    }
}
