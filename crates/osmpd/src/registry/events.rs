//! Event channels and subscriber bookkeeping.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use osmp_protocol::Event;
use serde_json::Value;
use tracing::debug;

use super::EVENTS_TARGET;
use super::errors::{RegistryError, check_name};

/// Result of handing an event to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The sink accepted the event.
    Delivered,
    /// The sink was full and discarded the event.
    Dropped,
    /// The sink is closed; its subscriptions can be pruned.
    Closed,
}

/// Receiving end of event delivery, typically a client session.
///
/// Implementations must not block: delivery runs while the channel lock is
/// held so that every subscriber observes events in sequence order.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Offers `event` to the sink.
    fn deliver(&self, event: &Event) -> DeliveryStatus;
}

/// Stable identity of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Weak back-reference to a subscriber.
///
/// Holding a handle never keeps the subscriber alive; removing a handle from
/// the registry never destroys the subscriber.
#[derive(Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    sink: Weak<dyn EventSink>,
}

impl SubscriberHandle {
    /// Creates a handle for `sink` with a fresh identity.
    #[must_use]
    pub fn new(sink: &Arc<dyn EventSink>) -> Self {
        Self {
            id: SubscriberId::next(),
            sink: Arc::downgrade(sink),
        }
    }

    /// Subscriber identity.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Upgrades to the sink while the subscriber is alive.
    #[must_use]
    pub fn sink(&self) -> Option<Arc<dyn EventSink>> {
        self.sink.upgrade()
    }

    /// Returns true while the subscriber is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.sink.strong_count() > 0
    }
}

impl PartialEq for SubscriberHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriberHandle {}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// One event addressed to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Recipient.
    pub subscriber: SubscriberHandle,
    /// Published event.
    pub event: Event,
}

/// A registered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    instruction_set: String,
    name: String,
    description: String,
}

impl EventDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(instruction_set: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            instruction_set: instruction_set.into(),
            name: name.into(),
            description: String::new(),
        }
    }

    /// Sets the description shown by `event-list`.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Owning instruction set.
    #[must_use]
    pub fn instruction_set(&self) -> &str {
        &self.instruction_set
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Debug)]
struct Subscription {
    handle: SubscriberHandle,
    expires_at: Option<Instant>,
}

impl Subscription {
    fn is_live(&self, now: Instant) -> bool {
        self.handle.is_alive() && self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

#[derive(Debug)]
struct EventChannel {
    descriptor: Arc<EventDescriptor>,
    subscribers: Mutex<Vec<Subscription>>,
}

impl EventChannel {
    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Maps `(instruction set, event name)` to subscriber sets.
///
/// Sequence numbers are assigned per instruction set and are allocated while
/// the channel lock is held, so deliveries for one channel are handed out in
/// strictly increasing order.
#[derive(Debug, Default)]
pub struct EventRegistry {
    channels: HashMap<String, HashMap<String, EventChannel>>,
    ordered: Vec<Arc<EventDescriptor>>,
    sequences: HashMap<String, AtomicU64>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event channel.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateEvent`] when the name is taken and
    /// [`RegistryError::InvalidName`] for blank names.
    pub fn register(
        &mut self,
        descriptor: EventDescriptor,
    ) -> Result<Arc<EventDescriptor>, RegistryError> {
        check_name("instruction set", descriptor.instruction_set())?;
        check_name("event", descriptor.name())?;
        let channels = self
            .channels
            .entry(descriptor.instruction_set.clone())
            .or_default();
        if channels.contains_key(descriptor.name()) {
            return Err(RegistryError::duplicate_event(
                descriptor.instruction_set(),
                descriptor.name(),
            ));
        }

        let descriptor = Arc::new(descriptor);
        channels.insert(
            descriptor.name.clone(),
            EventChannel {
                descriptor: Arc::clone(&descriptor),
                subscribers: Mutex::new(Vec::new()),
            },
        );
        self.sequences
            .entry(descriptor.instruction_set.clone())
            .or_insert_with(|| AtomicU64::new(0));
        self.ordered.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Looks up an event descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] on a miss.
    pub fn descriptor(
        &self,
        instruction_set: &str,
        name: &str,
    ) -> Result<Arc<EventDescriptor>, RegistryError> {
        self.channel(instruction_set, name)
            .map(|channel| Arc::clone(&channel.descriptor))
    }

    /// Every event in registration order.
    #[must_use]
    pub fn events(&self) -> &[Arc<EventDescriptor>] {
        &self.ordered
    }

    /// Events of one instruction set in registration order.
    pub fn in_instruction_set<'a>(
        &'a self,
        instruction_set: &'a str,
    ) -> impl Iterator<Item = &'a Arc<EventDescriptor>> + 'a {
        self.ordered
            .iter()
            .filter(move |descriptor| descriptor.instruction_set == instruction_set)
    }

    /// Adds `handle` to the event's subscribers.
    ///
    /// Subscribing an existing handle again refreshes its time-to-live. A
    /// subscriber only receives events published after this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] when the event is not
    /// registered.
    pub fn subscribe(
        &self,
        instruction_set: &str,
        name: &str,
        handle: SubscriberHandle,
        ttl: Option<Duration>,
    ) -> Result<(), RegistryError> {
        let channel = self.channel(instruction_set, name)?;
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        let mut subscribers = channel.subscribers();
        match subscribers
            .iter_mut()
            .find(|subscription| subscription.handle == handle)
        {
            Some(existing) => existing.expires_at = expires_at,
            None => subscribers.push(Subscription { handle, expires_at }),
        }
        debug!(
            target: EVENTS_TARGET,
            instruction_set,
            event = name,
            subscribers = subscribers.len(),
            "subscriber added"
        );
        Ok(())
    }

    /// Removes `handle` from the event's subscribers.
    ///
    /// Returns true when the handle was subscribed; removing an absent
    /// handle is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] when the event is not
    /// registered.
    pub fn unsubscribe(
        &self,
        instruction_set: &str,
        name: &str,
        handle: &SubscriberHandle,
    ) -> Result<bool, RegistryError> {
        let channel = self.channel(instruction_set, name)?;
        let mut subscribers = channel.subscribers();
        let before = subscribers.len();
        subscribers.retain(|subscription| subscription.handle != *handle);
        Ok(subscribers.len() != before)
    }

    /// Removes `handle` from every event. Returns the number of removals.
    pub fn unsubscribe_all(&self, handle: &SubscriberHandle) -> usize {
        self.channels
            .values()
            .flat_map(HashMap::values)
            .map(|channel| {
                let mut subscribers = channel.subscribers();
                let before = subscribers.len();
                subscribers.retain(|subscription| subscription.handle != *handle);
                before - subscribers.len()
            })
            .sum()
    }

    /// Number of live subscribers of an event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] when the event is not
    /// registered.
    pub fn subscriber_count(
        &self,
        instruction_set: &str,
        name: &str,
    ) -> Result<usize, RegistryError> {
        let channel = self.channel(instruction_set, name)?;
        let now = Instant::now();
        Ok(channel
            .subscribers()
            .iter()
            .filter(|subscription| subscription.is_live(now))
            .count())
    }

    /// Publishes an event and returns one delivery per live subscriber.
    ///
    /// Publishing with no subscribers succeeds with an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] when the event is not
    /// registered.
    pub fn publish(
        &self,
        instruction_set: &str,
        name: &str,
        payload: Value,
    ) -> Result<Vec<Delivery>, RegistryError> {
        self.publish_with(instruction_set, name, payload, |_| {})
    }

    /// Publishes an event, running `fan_out` before the channel lock is
    /// released.
    ///
    /// Expired subscriptions and subscribers that no longer exist are pruned
    /// before the sequence number is allocated.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] when the event is not
    /// registered.
    pub fn publish_with<F>(
        &self,
        instruction_set: &str,
        name: &str,
        payload: Value,
        fan_out: F,
    ) -> Result<Vec<Delivery>, RegistryError>
    where
        F: FnOnce(&[Delivery]),
    {
        let channel = self.channel(instruction_set, name)?;
        let sequence = self
            .sequences
            .get(instruction_set)
            .ok_or_else(|| RegistryError::unknown_event(instruction_set, name))?;

        let mut subscribers = channel.subscribers();
        let now = Instant::now();
        let before = subscribers.len();
        subscribers.retain(|subscription| subscription.is_live(now));
        let pruned = before - subscribers.len();

        let event = Event {
            instruction_set: instruction_set.to_owned(),
            name: name.to_owned(),
            payload,
            sequence: sequence.fetch_add(1, Ordering::SeqCst) + 1,
        };
        let deliveries: Vec<Delivery> = subscribers
            .iter()
            .map(|subscription| Delivery {
                subscriber: subscription.handle.clone(),
                event: event.clone(),
            })
            .collect();
        fan_out(&deliveries);
        drop(subscribers);

        debug!(
            target: EVENTS_TARGET,
            instruction_set,
            event = name,
            sequence = event.sequence,
            subscribers = deliveries.len(),
            pruned,
            "event published"
        );
        Ok(deliveries)
    }

    fn channel(&self, instruction_set: &str, name: &str) -> Result<&EventChannel, RegistryError> {
        self.channels
            .get(instruction_set)
            .and_then(|channels| channels.get(name))
            .ok_or_else(|| RegistryError::unknown_event(instruction_set, name))
    }
}
