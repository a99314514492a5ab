//! In-process change notifier.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak, mpsc};

use chrono::Utc;
use thiserror::Error;

use crate::bus::{ChangeHandler, ChangeNotifier, Subscription, SubscriptionHandle};
use crate::{ChangeEnvelope, ChangeEvent, Topic};

#[derive(Debug, Error)]
pub enum InMemoryNotifierError {
    /// Publish failed due to internal lock poisoning.
    #[error("notifier registry lock poisoned")]
    Poisoned,
}

type SharedHandler = Arc<dyn Fn(&ChangeEnvelope) + Send + Sync>;

struct HandlerEntry {
    id: u64,
    topic: Topic,
    handler: SharedHandler,
}

struct ChannelEntry {
    topics: Vec<Topic>,
    tx: mpsc::Sender<ChangeEnvelope>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    sequence: AtomicU64,
    handlers: Mutex<Vec<HandlerEntry>>,
    channels: Mutex<Vec<ChannelEntry>>,
}

/// In-memory pub/sub notifier.
///
/// - No IO / no async
/// - Handlers run on the publishing thread, outside the registry lock, so a
///   handler may itself publish or subscribe
/// - Channel subscribers whose receiver was dropped are pruned on publish
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    registry: Arc<Registry>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live callback subscriptions (all topics).
    pub fn handler_count(&self) -> usize {
        self.registry.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// Sequence number of the most recent notification (0 before the first).
    pub fn last_sequence(&self) -> u64 {
        self.registry.sequence.load(Ordering::SeqCst)
    }
}

impl core::fmt::Debug for InMemoryNotifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryNotifier")
            .field("handlers", &self.handler_count())
            .field("last_sequence", &self.last_sequence())
            .finish()
    }
}

impl ChangeNotifier for InMemoryNotifier {
    type Error = InMemoryNotifierError;

    fn publish(&self, event: ChangeEvent) -> Result<ChangeEnvelope, Self::Error> {
        let sequence = self.registry.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = ChangeEnvelope::new(sequence, Utc::now(), event);
        let topic = envelope.topic();

        let handlers: Vec<SharedHandler> = {
            let entries = self
                .registry
                .handlers
                .lock()
                .map_err(|_| InMemoryNotifierError::Poisoned)?;
            entries
                .iter()
                .filter(|entry| entry.topic == topic)
                .map(|entry| Arc::clone(&entry.handler))
                .collect()
        };

        for handler in &handlers {
            handler(&envelope);
        }

        {
            let mut channels = self
                .registry
                .channels
                .lock()
                .map_err(|_| InMemoryNotifierError::Poisoned)?;
            // Drop any dead receivers while publishing.
            channels.retain(|entry| {
                !entry.topics.contains(&topic) || entry.tx.send(envelope.clone()).is_ok()
            });
        }

        tracing::trace!(sequence, ?topic, handlers = handlers.len(), "change published");
        Ok(envelope)
    }

    fn subscribe(&self, topic: Topic, handler: ChangeHandler) -> SubscriptionHandle {
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        // A poisoned registry leaves the subscription inert; the handle is
        // still returned so callers keep a uniform lifetime story.
        match self.registry.handlers.lock() {
            Ok(mut entries) => entries.push(HandlerEntry {
                id,
                topic,
                handler: Arc::from(handler),
            }),
            Err(_) => {
                tracing::warn!(id, ?topic, "notifier registry poisoned; subscription is inert");
            }
        }

        let registry: Weak<Registry> = Arc::downgrade(&self.registry);
        SubscriptionHandle::new(id, move || {
            if let Some(registry) = registry.upgrade() {
                if let Ok(mut entries) = registry.handlers.lock() {
                    entries.retain(|entry| entry.id != id);
                }
            }
        })
    }

    fn subscribe_channel(&self, topics: &[Topic]) -> Subscription<ChangeEnvelope> {
        let (tx, rx) = mpsc::channel();
        match self.registry.channels.lock() {
            Ok(mut channels) => channels.push(ChannelEntry {
                topics: topics.to_vec(),
                tx,
            }),
            Err(_) => {
                tracing::warn!(?topics, "notifier registry poisoned; channel will stay empty");
            }
        }
        Subscription::new(rx)
    }
}
