//! In-process value-change bus keyed by [`Topic`].
//!
//! Local writes are fanned out to every other controller watching the same
//! characteristic so they converge without waiting for a remote
//! notification. Each subscriber owns an unbounded queue: publishing never
//! blocks, and a slow subscriber never stalls the others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use hkhub_domain::id::{AccessoryId, InstanceId, SubscriptionId};
use hkhub_domain::topic::Topic;
use hkhub_domain::value::CharacteristicValue;
use tokio::sync::mpsc;

/// A value that was written locally for one characteristic.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub aid: AccessoryId,
    pub iid: InstanceId,
    pub value: CharacteristicValue,
}

/// Receiving side of one bus subscription.
///
/// The receiver drains whatever was queued and then yields `None` once the
/// subscription is cancelled.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<ValueChange>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<ValueChange> {
        self.receiver.recv().await
    }

    /// Non-blocking poll, `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<ValueChange> {
        self.receiver.try_recv().ok()
    }
}

type Senders = HashMap<SubscriptionId, mpsc::UnboundedSender<ValueChange>>;

/// Topic-keyed publish/subscribe for local value changes.
///
/// The topic table is only write-locked to add or drop a subscriber.
/// Publishing takes a read lock to find the topic and then serializes on
/// that topic's own lock, so publishers on distinct topics never contend
/// and subscribers of one topic observe the same order.
#[derive(Debug, Default)]
pub struct ValueChangeBus {
    topics: RwLock<HashMap<String, Arc<Mutex<Senders>>>>,
}

impl ValueChangeBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start receiving every value published on `topic` from now on.
    pub fn subscribe(&self, topic: &Topic) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = SubscriptionId::new();
        {
            let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
            let channel = topics.entry(topic.key()).or_default();
            lock(channel).insert(id, sender);
        }
        tracing::trace!(topic = %topic, subscription = %id, "bus subscription added");
        Subscription {
            id,
            topic: topic.clone(),
            receiver,
        }
    }

    /// Cancel a subscription. Unknown or already cancelled ids are a no-op.
    ///
    /// Returns `true` if a subscription was removed.
    pub fn unsubscribe(&self, topic: &Topic, id: SubscriptionId) -> bool {
        let key = topic.key();
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(channel) = topics.get(&key) else {
            return false;
        };
        let (removed, empty) = {
            let mut senders = lock(channel);
            let removed = senders.remove(&id).is_some();
            (removed, senders.is_empty())
        };
        if empty {
            topics.remove(&key);
        }
        if removed {
            tracing::trace!(topic = %topic, subscription = %id, "bus subscription removed");
        }
        removed
    }

    /// Deliver `value` to every current subscriber of `topic`.
    ///
    /// Returns the number of subscribers reached. Publishing to a topic
    /// nobody watches is not an error.
    pub fn publish(&self, topic: &Topic, value: CharacteristicValue) -> usize {
        let channel = {
            let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
            topics.get(&topic.key()).cloned()
        };
        let Some(channel) = channel else {
            return 0;
        };

        let change = ValueChange {
            aid: topic.aid,
            iid: topic.iid,
            value,
        };
        let (reached, empty) = {
            let mut senders = lock(&channel);
            // receivers dropped without unsubscribing
            senders.retain(|_, sender| !sender.is_closed());
            let reached = senders
                .values()
                .filter(|sender| sender.send(change.clone()).is_ok())
                .count();
            (reached, senders.is_empty())
        };
        if empty {
            self.drop_if_empty(&topic.key());
        }
        reached
    }

    /// Remove the topic entry unless a subscriber joined meanwhile.
    fn drop_if_empty(&self, key: &str) {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        if topics.get(key).is_some_and(|channel| lock(channel).is_empty()) {
            topics.remove(key);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics
            .get(&topic.key())
            .map_or(0, |channel| lock(channel).len())
    }

    /// Number of topics with at least one live registration.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn lock(channel: &Mutex<Senders>) -> MutexGuard<'_, Senders> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}
