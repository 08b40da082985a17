//! Host abstraction traits so `ambience-engine` stays host-agnostic.

use ambience_core::ParticleInstance;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// One open view of the application (a window, a tab, a process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewId(pub u64);

/// A key changed in durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub key: String,
    /// Writing view, when the backend knows it.
    pub origin: Option<ViewId>,
}

/// Keeps a watch alive; dropping it stops delivery.
pub type WatchGuard = Box<dyn std::any::Any + Send>;

/// Durable key/value storage readable and writable by every view.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Atomic read-modify-write of one key. `apply` returns `None` to leave it untouched.
    ///
    /// Returns whether a value was written.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<bool>;

    /// Sends a [`StorageEvent`] to `sink` whenever a key is written by another view.
    fn watch(&self, sink: Sender<StorageEvent>) -> Result<WatchGuard>;
}

/// Pixel or cell extent of the area hosting the mounting surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Where the mounting surface lives and how its frames are shown.
pub trait SurfaceHost: Send {
    /// Attaches the container, or confirms it is still attached.
    fn attach(&mut self) -> Result<Viewport>;

    fn set_visible(&mut self, visible: bool) -> Result<()>;

    fn present(&mut self, frame: &[ParticleInstance]) -> Result<()>;

    fn detach(&mut self) -> Result<()> {
        Ok(())
    }
}
