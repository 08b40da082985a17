//! Change topics, the in-process notifier, and the bridge that turns storage
//! events from other views into topic publications.

use std::sync::{Arc, Mutex, MutexGuard};

use ambience_core::CatalogKind;
use ambience_platform::{ConfigStore, StorageEvent, WatchGuard};
use crossbeam_channel::{unbounded, Receiver};
use tracing::{debug, trace};

use crate::config::{BACKGROUNDS_KEY, EFFECTS_KEY, PLAYBACK_KEY};

/// What changed in the shared configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Catalog(CatalogKind),
    Playback,
}

impl Topic {
    pub const ALL: [Topic; 3] = [
        Topic::Catalog(CatalogKind::Effects),
        Topic::Catalog(CatalogKind::Backgrounds),
        Topic::Playback,
    ];

    pub fn storage_key(self) -> &'static str {
        match self {
            Topic::Catalog(CatalogKind::Effects) => EFFECTS_KEY,
            Topic::Catalog(CatalogKind::Backgrounds) => BACKGROUNDS_KEY,
            Topic::Playback => PLAYBACK_KEY,
        }
    }

    /// `None` for keys this engine does not own.
    pub fn from_storage_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.storage_key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(Topic) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next: u64,
    entries: Vec<(SubscriptionId, Topic, Handler)>,
}

/// Intra-view publish/subscribe on configuration topics.
///
/// Clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Arc<Mutex<Subscribers>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // a panicking handler never runs under the lock, so the list stays consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl Fn(Topic) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut subscribers = self.lock();
        subscribers.next += 1;
        let id = SubscriptionId(subscribers.next);
        subscribers.entries.push((id, topic, Arc::new(handler)));
        id
    }

    /// Returns whether the subscription was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(entry, _, _)| *entry != id);
        subscribers.entries.len() != before
    }

    /// Invokes every handler subscribed to `topic` and returns how many ran.
    pub fn publish(&self, topic: Topic) -> usize {
        let handlers: Vec<Handler> = self
            .lock()
            .entries
            .iter()
            .filter(|(_, subscribed, _)| *subscribed == topic)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();
        trace!(?topic, handlers = handlers.len(), "publish");
        for handler in &handlers {
            handler(topic);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().entries.len()
    }
}

/// Forwards storage events written by other views into a [`ChangeNotifier`].
pub struct StorageBridge {
    events: Receiver<StorageEvent>,
    _guard: WatchGuard,
}

impl StorageBridge {
    pub fn connect(store: &dyn ConfigStore) -> ambience_platform::Result<Self> {
        let (tx, rx) = unbounded();
        let guard = store.watch(tx)?;
        Ok(Self {
            events: rx,
            _guard: guard,
        })
    }

    /// Drains pending events and republishes the ones naming an owned key.
    ///
    /// Returns how many topics were published.
    pub fn pump(&self, notifier: &ChangeNotifier) -> usize {
        let mut published = 0;
        for event in self.events.try_iter() {
            match Topic::from_storage_key(&event.key) {
                Some(topic) => {
                    notifier.publish(topic);
                    published += 1;
                }
                None => debug!(key = %event.key, "ignoring storage event for unrelated key"),
            }
        }
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn storage_keys_round_trip_and_unrelated_keys_are_ignored() {
        for topic in Topic::ALL {
            assert_eq!(Topic::from_storage_key(topic.storage_key()), Some(topic));
        }
        assert_eq!(Topic::from_storage_key("theme"), None);
        assert_eq!(Topic::from_storage_key("ambience.effects.backup"), None);
    }

    #[test]
    fn publish_reaches_only_matching_subscribers() {
        let notifier = ChangeNotifier::new();
        let effects = Arc::new(AtomicUsize::new(0));
        let playback = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&effects);
        notifier.subscribe(Topic::Catalog(CatalogKind::Effects), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&playback);
        notifier.subscribe(Topic::Playback, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(notifier.publish(Topic::Catalog(CatalogKind::Effects)), 1);
        assert_eq!(notifier.publish(Topic::Catalog(CatalogKind::Backgrounds)), 0);
        assert_eq!(effects.load(Ordering::SeqCst), 1);
        assert_eq!(playback.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribed_handlers_stop_firing() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = notifier.subscribe(Topic::Playback, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.publish(Topic::Playback);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.publish(Topic::Playback);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn handlers_may_subscribe_while_being_published() {
        let notifier = ChangeNotifier::new();
        let inner = notifier.clone();
        notifier.subscribe(Topic::Playback, move |_| {
            inner.subscribe(Topic::Playback, |_| {});
        });
        notifier.publish(Topic::Playback);
        assert_eq!(notifier.subscriber_count(), 2);
    }
}
