use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ambience_platform::{ConfigStore, Result, StorageEvent, ViewId, WatchGuard};
use crossbeam_channel::Sender;
use tracing::trace;

#[derive(Default)]
struct Hub {
    values: HashMap<String, String>,
    watchers: Vec<Watcher>,
    next_view: u64,
    next_watch: u64,
}

struct Watcher {
    id: u64,
    view: ViewId,
    sink: Sender<StorageEvent>,
}

impl Hub {
    /// Tells every other view about a write; closed sinks are dropped.
    fn broadcast(&mut self, key: &str, origin: ViewId) {
        self.watchers.retain(|watcher| {
            if watcher.view == origin {
                return true;
            }
            let event = StorageEvent {
                key: key.to_string(),
                origin: Some(origin),
            };
            watcher.sink.send(event).is_ok()
        });
    }
}

/// One in-process key space shared by any number of views.
#[derive(Clone, Default)]
pub struct SharedStorage {
    hub: Arc<Mutex<Hub>>,
}

impl SharedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A store for a new view. Writes through it notify every other view.
    pub fn open_view(&self) -> MemoryStore {
        let mut hub = self.lock();
        hub.next_view += 1;
        MemoryStore {
            view: ViewId(hub.next_view),
            storage: self.clone(),
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }
}

/// A view's handle on [`SharedStorage`].
#[derive(Clone)]
pub struct MemoryStore {
    view: ViewId,
    storage: SharedStorage,
}

impl MemoryStore {
    pub fn view(&self) -> ViewId {
        self.view
    }
}

struct Registration {
    id: u64,
    storage: SharedStorage,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let id = self.id;
        self.storage.lock().watchers.retain(|watcher| watcher.id != id);
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.storage.lock().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut hub = self.storage.lock();
        hub.values.insert(key.to_string(), value.to_string());
        trace!(view = self.view.0, key, "set");
        hub.broadcast(key, self.view);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<bool> {
        let mut hub = self.storage.lock();
        let Some(next) = apply(hub.values.get(key).map(String::as_str)) else {
            return Ok(false);
        };
        hub.values.insert(key.to_string(), next);
        trace!(view = self.view.0, key, "update");
        hub.broadcast(key, self.view);
        Ok(true)
    }

    fn watch(&self, sink: Sender<StorageEvent>) -> Result<WatchGuard> {
        let mut hub = self.storage.lock();
        hub.next_watch += 1;
        let id = hub.next_watch;
        hub.watchers.push(Watcher {
            id,
            view: self.view,
            sink,
        });
        Ok(Box::new(Registration {
            id,
            storage: self.storage.clone(),
        }))
    }
}
