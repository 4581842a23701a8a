//! Topic → handler routing.

use super::error::SubscribeError;
use super::topic;
use super::{MAX_SUBSCRIPTIONS, Message, QoS, Topic};
use heapless::FnvIndexMap;

/// Receives messages for a subscribed topic.
///
/// Implemented for every `FnMut(&Message)`, so a closure is usually enough:
///
/// ```rust
/// use libpubsub::pubsub::{Message, MessageHandler};
///
/// let mut last = None;
/// let mut handler = |message: &Message| last = message.payload_str().map(|s| s == "1");
/// handler.handle(&Message::new("digital", b"1").unwrap());
/// assert_eq!(last, Some(true));
/// ```
pub trait MessageHandler {
    /// Handle one delivered message.
    fn handle(&mut self, message: &Message);
}

impl<F> MessageHandler for F
where
    F: FnMut(&Message),
{
    fn handle(&mut self, message: &Message) {
        self(message)
    }
}

struct Subscription<'a> {
    qos: QoS,
    handler: &'a mut dyn MessageHandler,
    // Registration order; kept when the handler is replaced.
    seq: u32,
}

/// At most one handler per topic; subscribing again replaces it.
///
/// Lookups are by exact topic first. If nothing matches exactly, registered
/// topic filters (`+`, `#`) are tried in registration order, and the first
/// one that matches wins.
pub struct Registry<'a> {
    entries: FnvIndexMap<Topic, Subscription<'a>, MAX_SUBSCRIPTIONS>,
    next_seq: u32,
}

impl<'a> Registry<'a> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: FnvIndexMap::new(),
            next_seq: 0,
        }
    }

    /// Insert or replace the handler for `topic`.
    ///
    /// A replaced filter keeps its place in the matching order.
    pub fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        handler: &'a mut dyn MessageHandler,
    ) -> Result<(), SubscribeError> {
        if !topic::is_valid_filter(topic) {
            warn!("refusing invalid filter {}", topic);
            return Err(SubscribeError::InvalidTopic);
        }
        let key = Topic::try_from(topic).map_err(|_| SubscribeError::TopicTooLong)?;

        if let Some(existing) = self.entries.get_mut(&key) {
            existing.qos = qos;
            existing.handler = handler;
            debug!("replaced handler for {}", topic);
            return Ok(());
        }

        let seq = self.next_seq;
        self.entries
            .insert(key, Subscription { qos, handler, seq })
            .map_err(|_| SubscribeError::RegistryFull)?;
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok(())
    }

    /// Remove `topic`. Returns whether it was registered.
    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        match Topic::try_from(topic) {
            Ok(key) => self.entries.remove(&key).is_some(),
            Err(_) => false,
        }
    }

    /// Route `message` to its handler. Returns whether a handler ran.
    ///
    /// Messages for unknown topics are dropped; the registry is not modified.
    pub fn dispatch(&mut self, message: &Message) -> bool {
        if let Some(subscription) = self.entries.get_mut(&message.topic) {
            subscription.handler.handle(message);
            return true;
        }

        // Removal reorders the map, so order comes from `seq`.
        let name = message.topic.as_str();
        let filtered = self
            .entries
            .iter_mut()
            .filter(|(filter, _)| {
                topic::is_filter(filter.as_str()) && topic::matches(filter.as_str(), name)
            })
            .min_by_key(|(_, subscription)| subscription.seq);
        match filtered {
            Some((_, subscription)) => {
                subscription.handler.handle(message);
                true
            }
            None => {
                debug!("no handler for {}, dropping", name);
                false
            }
        }
    }

    /// Whether `topic` has a handler registered under exactly that name.
    pub fn contains(&self, topic: &str) -> bool {
        Topic::try_from(topic)
            .map(|key| self.entries.contains_key(&key))
            .unwrap_or(false)
    }

    /// Registered topics and their requested QoS, for replay after reconnect.
    pub fn topics(&self) -> impl Iterator<Item = (&str, QoS)> + '_ {
        self.entries
            .iter()
            .map(|(topic, subscription)| (topic.as_str(), subscription.qos))
    }

    /// Number of registered topics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Registry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Registry<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.topics()).finish()
    }
}
