//! Publish/subscribe abstraction (mechanics only).
//!
//! The same subscription type carries two kinds of messages in this workspace:
//!
//! - committed event envelopes (fan-out to rollup consumers), and
//! - query snapshots pushed by the document store (full result set on every change).
//!
//! ## Delivery
//!
//! - **Broadcast**: every subscriber gets its own copy of each message.
//! - **At-least-once**: consumers must be idempotent.
//! - **Push-only**: subscribers block on the next message; nobody polls the store.
//!
//! ## Teardown
//!
//! A subscription owns its receiving end. [`Subscription::unsubscribe`] consumes it,
//! so once it returns nothing can be received through it anymore; publishers notice
//! the closed channel on their next send and prune it.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to a message stream.
///
/// Designed for single-threaded consumption: one worker owns one subscription.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(message) => handle(message)?,
///         Err(RecvTimeoutError::Timeout) => continue,  // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // publisher gone
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered and return only the newest message.
    ///
    /// Snapshot consumers only care about the latest full result set.
    pub fn latest(&self) -> Option<M> {
        let mut newest = None;
        while let Ok(message) = self.receiver.try_recv() {
            newest = Some(message);
        }
        newest
    }

    /// Stop receiving. Buffered, unread messages are discarded.
    pub fn unsubscribe(self) {
        drop(self.receiver);
    }
}

/// Domain-agnostic pub/sub bus.
///
/// Events are committed to the agency log first and published afterwards, so a
/// failed publish never loses a fact; consumers can catch up from the log.
///
/// Implementations must be `Send + Sync`: many cashier threads publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn latest_keeps_only_the_newest_message() {
        let (tx, rx) = mpsc::channel();
        let sub = Subscription::new(rx);
        for n in 1..=3 {
            tx.send(n).unwrap();
        }
        assert_eq!(sub.latest(), Some(3));
        assert_eq!(sub.latest(), None);
    }

    #[test]
    fn unsubscribe_closes_the_channel_for_publishers() {
        let (tx, rx) = mpsc::channel::<u8>();
        Subscription::new(rx).unsubscribe();
        assert!(tx.send(1).is_err());
    }
}
