//! Change notification publishing/subscription abstraction (mechanics only).
//!
//! The notifier is an injected component with explicit topics and explicit
//! subscriber lifetimes; there is no process-global channel.
//!
//! Delivery is best-effort and at-least-once: subscribers must treat every
//! notification as "invalidate, don't assume content". Anything derived from
//! the tables must also tolerate a missed notification (the view cache bounds
//! staleness independently).

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::{ChangeEnvelope, ChangeEvent, Topic};

/// Callback invoked synchronously on the publishing thread.
///
/// Handlers must be cheap (bump a counter, enqueue work); they run before
/// `publish` returns.
pub type ChangeHandler = Box<dyn Fn(&ChangeEnvelope) + Send + Sync>;

/// A channel subscription to a change stream.
///
/// Each subscription receives a copy of every notification on its topics.
/// Designed for a single consuming thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Registration returned by [`ChangeNotifier::subscribe`].
///
/// Dropping the handle unsubscribes; [`SubscriptionHandle::unsubscribe`] does
/// the same explicitly.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct SubscriptionHandle {
    id: u64,
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionHandle {
    pub fn new(id: u64, detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            detach: Some(Box::new(detach)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl core::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// Typed change notifier (pub/sub).
///
/// The `Send + Sync` bound lets one notifier be shared by every request
/// handler; publishers never coordinate with each other.
pub trait ChangeNotifier: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Announce a change. Returns the envelope that was delivered.
    fn publish(&self, event: ChangeEvent) -> Result<ChangeEnvelope, Self::Error>;

    /// Register a callback for one topic.
    fn subscribe(&self, topic: Topic, handler: ChangeHandler) -> SubscriptionHandle;

    /// Register a channel receiving every notification on `topics`.
    ///
    /// The subscription ends when the returned receiver is dropped.
    fn subscribe_channel(&self, topics: &[Topic]) -> Subscription<ChangeEnvelope>;
}

impl<N> ChangeNotifier for Arc<N>
where
    N: ChangeNotifier + ?Sized,
{
    type Error = N::Error;

    fn publish(&self, event: ChangeEvent) -> Result<ChangeEnvelope, Self::Error> {
        (**self).publish(event)
    }

    fn subscribe(&self, topic: Topic, handler: ChangeHandler) -> SubscriptionHandle {
        (**self).subscribe(topic, handler)
    }

    fn subscribe_channel(&self, topics: &[Topic]) -> Subscription<ChangeEnvelope> {
        (**self).subscribe_channel(topics)
    }
}
