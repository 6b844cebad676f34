//! Watch lifecycle events
//!
//! A session publishes every lifecycle step (connect, data, resync, reconnect,
//! give-up, ...) to an [`EventBus`]. Emission happens synchronously on the
//! session's own control flow, in the order the steps occur, so observers see
//! resource-version updates right after the event that produced them.
//!
//! Observers run inline with the session and must not block. Use
//! [`EventBus::subscribe_channel`] to move the work onto another task.

use crate::error::WatchError;
use crate::models::WatchPhase;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

/// Event emitted by a watch session
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    /// The watch request was accepted and the stream is open
    Connect,
    /// An object was decoded and is about to be handed to the callback
    Data {
        /// Decoded object
        object: K,
        /// Event phase
        phase: WatchPhase,
    },
    /// A bookmark was received (raw object, usually only metadata)
    Bookmark(Value),
    /// The resource version cursor changed (`None` after a purge)
    ResourceVersion(Option<String>),
    /// A line could not be decoded or the callback failed
    DataError(Arc<WatchError>),
    /// Connecting or reading the stream failed
    NetworkError(Arc<WatchError>),
    /// The resync timer expired
    Resync(Arc<WatchError>),
    /// The server rejected the cursor as too old; carries the purged value
    OldResourceVersion(Option<String>),
    /// A reconnect attempt is starting
    Reconnect {
        /// Fault that caused the reconnect
        error: Arc<WatchError>,
        /// Attempt number since the last healthy stream
        attempt: u32,
    },
    /// A fault arrived while a reconnect attempt was already in flight
    ReconnectPending,
    /// Retries are exhausted; the session is closed
    GiveUp(Arc<WatchError>),
    /// The session was closed by the caller
    Abort(Arc<WatchError>),
}

/// Field-less discriminant of [`WatchEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    /// See [`WatchEvent::Connect`]
    Connect,
    /// See [`WatchEvent::Data`]
    Data,
    /// See [`WatchEvent::Bookmark`]
    Bookmark,
    /// See [`WatchEvent::ResourceVersion`]
    ResourceVersion,
    /// See [`WatchEvent::DataError`]
    DataError,
    /// See [`WatchEvent::NetworkError`]
    NetworkError,
    /// See [`WatchEvent::Resync`]
    Resync,
    /// See [`WatchEvent::OldResourceVersion`]
    OldResourceVersion,
    /// See [`WatchEvent::Reconnect`]
    Reconnect,
    /// See [`WatchEvent::ReconnectPending`]
    ReconnectPending,
    /// See [`WatchEvent::GiveUp`]
    GiveUp,
    /// See [`WatchEvent::Abort`]
    Abort,
}

impl WatchEventKind {
    /// Stable event name
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchEventKind::Connect => "connect",
            WatchEventKind::Data => "data",
            WatchEventKind::Bookmark => "bookmark",
            WatchEventKind::ResourceVersion => "resource_version",
            WatchEventKind::DataError => "data_error",
            WatchEventKind::NetworkError => "network_error",
            WatchEventKind::Resync => "resync",
            WatchEventKind::OldResourceVersion => "old_resource_version",
            WatchEventKind::Reconnect => "reconnect",
            WatchEventKind::ReconnectPending => "reconnect_pending",
            WatchEventKind::GiveUp => "give_up",
            WatchEventKind::Abort => "abort",
        }
    }
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<K> WatchEvent<K> {
    /// Discriminant of this event
    pub fn kind(&self) -> WatchEventKind {
        match self {
            WatchEvent::Connect => WatchEventKind::Connect,
            WatchEvent::Data { .. } => WatchEventKind::Data,
            WatchEvent::Bookmark(_) => WatchEventKind::Bookmark,
            WatchEvent::ResourceVersion(_) => WatchEventKind::ResourceVersion,
            WatchEvent::DataError(_) => WatchEventKind::DataError,
            WatchEvent::NetworkError(_) => WatchEventKind::NetworkError,
            WatchEvent::Resync(_) => WatchEventKind::Resync,
            WatchEvent::OldResourceVersion(_) => WatchEventKind::OldResourceVersion,
            WatchEvent::Reconnect { .. } => WatchEventKind::Reconnect,
            WatchEvent::ReconnectPending => WatchEventKind::ReconnectPending,
            WatchEvent::GiveUp(_) => WatchEventKind::GiveUp,
            WatchEvent::Abort(_) => WatchEventKind::Abort,
        }
    }

    /// Take the object back out of a `Data` event
    pub(crate) fn into_data(self) -> Option<(K, WatchPhase)> {
        match self {
            WatchEvent::Data { object, phase } => Some((object, phase)),
            _ => None,
        }
    }
}

/// Receives events from an [`EventBus`]
pub trait WatchObserver<K>: Send + Sync {
    /// Called synchronously for every event
    fn on_event(&self, event: &WatchEvent<K>);
}

impl<K, F> WatchObserver<K> for F
where
    F: Fn(&WatchEvent<K>) + Send + Sync,
{
    fn on_event(&self, event: &WatchEvent<K>) {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscribers<K> = Vec<(SubscriptionId, Arc<dyn WatchObserver<K>>)>;

struct Registry<K> {
    next_id: AtomicU64,
    subscribers: RwLock<Subscribers<K>>,
}

/// Publish point for watch events
///
/// Cloning yields another handle to the same subscriber list. Subscribing
/// and unsubscribing are safe from any thread, including from inside an
/// observer while an event is being emitted.
pub struct EventBus<K> {
    registry: Arc<Registry<K>>,
}

impl<K> Clone for EventBus<K> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K> Default for EventBus<K> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }
}

impl<K> fmt::Debug for EventBus<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<K> EventBus<K> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached observers
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Detach an observer. Returns false if it was not attached.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .registry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Deliver an event to every observer, in subscription order
    pub(crate) fn emit(&self, event: &WatchEvent<K>) {
        // Snapshot so observers may (un)subscribe without deadlocking
        let observers: Vec<Arc<dyn WatchObserver<K>>> = self
            .registry
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer.on_event(event);
        }
    }
}

impl<K: 'static> EventBus<K> {
    /// Attach a closure observer
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&WatchEvent<K>) + Send + Sync + 'static,
    {
        self.subscribe_observer(Arc::new(observer))
    }

    /// Attach an observer
    pub fn subscribe_observer(&self, observer: Arc<dyn WatchObserver<K>>) -> SubscriptionId {
        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Receive cloned events on an unbounded channel
    ///
    /// Events keep their emission order. Sending never blocks the session.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<WatchEvent<K>>
    where
        K: Clone + Send + Sync,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event: &WatchEvent<K>| {
            // A dropped receiver only means nobody is listening any more
            let _ = tx.send(event.clone());
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_in_subscription_order() {
        let bus: EventBus<String> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event: &WatchEvent<String>| {
                seen.lock().unwrap().push(format!("{}:{}", tag, event.kind()));
            });
        }

        bus.emit(&WatchEvent::Connect);
        bus.emit(&WatchEvent::ResourceVersion(Some("1".to_string())));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "first:connect",
                "second:connect",
                "first:resource_version",
                "second:resource_version"
            ]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let bus: EventBus<String> = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = bus.subscribe(move |_: &WatchEvent<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&WatchEvent::Connect);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&WatchEvent::Connect);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_observer() {
        let bus: EventBus<String> = EventBus::new();
        let own_id = Arc::new(Mutex::new(None));
        let handle = bus.clone();
        let slot = Arc::clone(&own_id);
        let id = bus.subscribe(move |_: &WatchEvent<String>| {
            if let Some(id) = *slot.lock().unwrap() {
                handle.unsubscribe(id);
            }
        });
        *own_id.lock().unwrap() = Some(id);

        bus.emit(&WatchEvent::Connect);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_subscriber() {
        let bus: EventBus<String> = EventBus::new();
        let mut rx = bus.subscribe_channel();

        bus.emit(&WatchEvent::Data {
            object: "pod-a".to_string(),
            phase: WatchPhase::Added,
        });
        bus.emit(&WatchEvent::ReconnectPending);

        match rx.recv().await.unwrap() {
            WatchEvent::Data { object, phase } => {
                assert_eq!(object, "pod-a");
                assert_eq!(phase, WatchPhase::Added);
            }
            other => panic!("unexpected event {:?}", other.kind()),
        }
        assert_eq!(rx.recv().await.unwrap().kind(), WatchEventKind::ReconnectPending);
    }

    #[test]
    fn test_event_names() {
        let event: WatchEvent<String> = WatchEvent::OldResourceVersion(None);
        assert_eq!(event.kind().as_str(), "old_resource_version");
        assert_eq!(WatchEventKind::GiveUp.to_string(), "give_up");
    }
}
