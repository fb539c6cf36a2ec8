use event_schema::EngagementEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{self, error::TrySendError, Receiver, Sender, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod session;

/// Unique identifier for a WebSocket subscriber
///
/// Each WebSocket connection gets a unique subscriber ID when it registers.
/// This allows for precise cleanup when connections close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber entry with ID and bounded queue
struct Subscriber {
    id: SubscriberId,
    sender: Sender<Arc<str>>,
}

/// Result of fanning one payload out to a story's subscribers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    /// Queue was full; the payload was dropped for that subscriber only
    pub dropped: usize,
    /// Receiver was gone; the subscriber was removed
    pub closed: usize,
}

/// Connection registry for WebSocket subscribers
///
/// Tracks which WebSocket connections are subscribed to which stories.
/// Supports precise cleanup using subscriber IDs to prevent memory leaks.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // story_id -> list of subscribers
    inner: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber to a story with a queue of `capacity` payloads
    pub async fn add_subscriber(
        &self,
        story_id: Uuid,
        capacity: usize,
    ) -> (SubscriberId, Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscriber_id = SubscriberId::new();

        let mut guard = self.inner.write().await;
        guard.entry(story_id).or_default().push(Subscriber {
            id: subscriber_id,
            sender: tx,
        });

        tracing::debug!(
            "Added subscriber {:?} to story {}, total subscribers: {}",
            subscriber_id,
            story_id,
            guard.get(&story_id).map(|v| v.len()).unwrap_or(0)
        );

        (subscriber_id, rx)
    }

    /// Remove a specific subscriber from a story
    ///
    /// Must be called when a WebSocket connection closes.
    pub async fn remove_subscriber(&self, story_id: Uuid, subscriber_id: SubscriberId) {
        let mut guard = self.inner.write().await;

        if let Some(subscribers) = guard.get_mut(&story_id) {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != subscriber_id);

            if before != subscribers.len() {
                tracing::debug!(
                    "Removed subscriber {:?} from story {}, remaining: {}",
                    subscriber_id,
                    story_id,
                    subscribers.len()
                );
            }

            if subscribers.is_empty() {
                guard.remove(&story_id);
            }
        }
    }

    /// Offer a payload to every subscriber of a story without waiting on any of them
    pub async fn broadcast(&self, story_id: Uuid, payload: Arc<str>) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut guard = self.inner.write().await;

        if let Some(subscribers) = guard.get_mut(&story_id) {
            subscribers.retain(|subscriber| match subscriber.sender.try_send(payload.clone()) {
                Ok(()) => {
                    outcome.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    outcome.closed += 1;
                    false
                }
            });

            if subscribers.is_empty() {
                guard.remove(&story_id);
            }
        }

        outcome
    }

    /// Get subscriber count for a story
    pub async fn subscriber_count(&self, story_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&story_id).map(|v| v.len()).unwrap_or(0)
    }
}

/// A live subscription. Dropping the receiver is enough for the registry to
/// forget it on the next broadcast; `Notifier::unsubscribe` removes it eagerly.
pub struct Subscription {
    pub id: SubscriberId,
    pub story_id: Uuid,
    pub receiver: Receiver<Arc<str>>,
}

enum Dispatch {
    Event { story_id: Uuid, payload: Arc<str> },
    Shutdown,
}

/// Real-time fan-out of engagement events to per-story subscribers.
///
/// `publish` never blocks: it hands the serialized event to a single
/// dispatcher task, which offers it to each subscriber queue with `try_send`.
/// One dispatcher keeps delivery FIFO per connection. Delivery is best effort;
/// a full queue drops the event for that subscriber only.
#[derive(Clone)]
pub struct Notifier {
    registry: ConnectionRegistry,
    dispatch: UnboundedSender<Dispatch>,
    queue_capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl Notifier {
    /// Spawns the dispatcher on the current tokio runtime
    pub fn start(queue_capacity: usize) -> Self {
        let registry = ConnectionRegistry::new();
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(run_dispatcher(registry.clone(), rx, dropped.clone()));

        Self {
            registry,
            dispatch: tx,
            queue_capacity: queue_capacity.max(1),
            dropped,
        }
    }

    pub async fn subscribe(&self, story_id: Uuid) -> Subscription {
        let (id, receiver) = self
            .registry
            .add_subscriber(story_id, self.queue_capacity)
            .await;
        Subscription {
            id,
            story_id,
            receiver,
        }
    }

    pub async fn unsubscribe(&self, story_id: Uuid, subscriber_id: SubscriberId) {
        self.registry
            .remove_subscriber(story_id, subscriber_id)
            .await;
    }

    /// Queue an event for delivery to subscribers of its story
    pub fn publish(&self, event: &EngagementEvent) {
        let payload: Arc<str> = match event.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(event_id = %event.event_id, error = %e, "Failed to serialize engagement event");
                return;
            }
        };

        if self
            .dispatch
            .send(Dispatch::Event {
                story_id: event.story_id,
                payload,
            })
            .is_err()
        {
            tracing::debug!(event_id = %event.event_id, "Notifier stopped, event discarded");
        }
    }

    pub async fn subscriber_count(&self, story_id: Uuid) -> usize {
        self.registry.subscriber_count(story_id).await
    }

    /// Events dropped because a subscriber queue was full
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stops the dispatcher after it drains what was already published
    pub fn shutdown(&self) {
        let _ = self.dispatch.send(Dispatch::Shutdown);
    }
}

async fn run_dispatcher(
    registry: ConnectionRegistry,
    mut rx: UnboundedReceiver<Dispatch>,
    dropped: Arc<AtomicU64>,
) {
    tracing::info!("Notifier dispatcher started");

    while let Some(dispatch) = rx.recv().await {
        match dispatch {
            Dispatch::Event { story_id, payload } => {
                let outcome = registry.broadcast(story_id, payload).await;
                if outcome.dropped > 0 {
                    dropped.fetch_add(outcome.dropped as u64, Ordering::Relaxed);
                    tracing::warn!(
                        %story_id,
                        dropped = outcome.dropped,
                        "Subscriber queue full, event dropped"
                    );
                }
                if outcome.closed > 0 {
                    tracing::debug!(%story_id, closed = outcome.closed, "Removed closed subscribers");
                }
            }
            Dispatch::Shutdown => break,
        }
    }

    tracing::info!("Notifier dispatcher stopped");
}
