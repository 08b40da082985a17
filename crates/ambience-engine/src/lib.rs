//! Per-view ambient effect engine.
//!
//! An [`AmbientEngine`] reads the shared configuration, reconciles its running
//! instances whenever a topic changes in this view or another, and presents
//! frames of its mounting surface to a [`SurfaceHost`].

pub mod config;
pub mod lifecycle;
pub mod notifier;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ambience_core::{
    EngineError, GeneratorRegistry, InstanceKey, Limits, PlaybackFlags, Result,
};
use ambience_platform::{ConfigStore, SurfaceHost, Viewport};
use tracing::{debug, info, warn};

pub use config::{
    ConfigEditor, ConfigRepository, DesiredState, BACKGROUNDS_KEY, EFFECTS_KEY, PLAYBACK_KEY,
};
pub use lifecycle::{LifecycleManager, PausePolicy, ReconcileReport};
pub use notifier::{ChangeNotifier, StorageBridge, SubscriptionId, Topic};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineConfig {
    pub limits: Limits,
    pub pause_policy: PausePolicy,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

/// An audio-bearing instance that should currently be audible.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioCue {
    pub key: InstanceKey,
    pub gain: f32,
}

/// Counters for one [`AmbientEngine::pump`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    /// Topics republished from other views.
    pub external: usize,
    pub reconciled: bool,
    pub timers_fired: usize,
    pub particles: usize,
}

pub struct AmbientEngine<H: SurfaceHost> {
    repo: ConfigRepository,
    notifier: ChangeNotifier,
    host: H,
    manager: LifecycleManager,
    dirty: Arc<AtomicBool>,
    subscriptions: Vec<SubscriptionId>,
    bridge: Option<StorageBridge>,
    playback: PlaybackFlags,
    viewport: Option<Viewport>,
    started: bool,
}

impl<H: SurfaceHost> AmbientEngine<H> {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        host: H,
        registry: Arc<GeneratorRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self::with_repository(ConfigRepository::new(store), host, registry, config)
    }

    pub fn with_repository(
        repo: ConfigRepository,
        host: H,
        registry: Arc<GeneratorRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            notifier: ChangeNotifier::new(),
            host,
            manager: LifecycleManager::new(registry, config.limits, config.pause_policy, config.seed),
            dirty: Arc::new(AtomicBool::new(false)),
            subscriptions: Vec::new(),
            bridge: None,
            playback: PlaybackFlags::default(),
            viewport: None,
            started: false,
        }
    }

    /// Notifier shared with this view's configuration writers.
    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }

    /// A writer whose edits this engine picks up on the next pump.
    pub fn editor(&self) -> ConfigEditor {
        ConfigEditor::new(self.repo.clone(), self.notifier.clone())
    }

    /// Subscribes to every topic, starts watching storage, and runs the first
    /// reconciliation pass. Calling it again while started does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        for topic in Topic::ALL {
            let dirty = Arc::clone(&self.dirty);
            let id = self.notifier.subscribe(topic, move |_| {
                dirty.store(true, Ordering::SeqCst);
            });
            self.subscriptions.push(id);
        }
        match StorageBridge::connect(self.repo.store().as_ref()) {
            Ok(bridge) => self.bridge = Some(bridge),
            Err(err) => warn!("storage watch unavailable, changes from other views will be missed: {err}"),
        }
        self.started = true;
        info!("ambient engine started");
        self.sync();
        Ok(())
    }

    /// Unsubscribes, stops watching storage, and tears down every instance.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        for id in self.subscriptions.drain(..) {
            self.notifier.unsubscribe(id);
        }
        self.bridge = None;
        let cancelled = self.manager.teardown_all();
        if let Err(err) = self.host.detach() {
            warn!("detaching surface host failed: {err}");
        }
        self.viewport = None;
        self.started = false;
        info!(cancelled, "ambient engine stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Forces a reconciliation on the next pump.
    pub fn request_sync(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// One frame: collect changes, reconcile at most once, advance the clock by
    /// `dt`, and present the surface.
    pub fn pump(&mut self, dt: Duration) -> PumpStats {
        let mut stats = PumpStats::default();
        if !self.started {
            return stats;
        }
        if let Some(bridge) = &self.bridge {
            stats.external = bridge.pump(&self.notifier);
        }
        if self.dirty.swap(false, Ordering::SeqCst) {
            stats.reconciled = self.sync();
        }
        stats.timers_fired = self.manager.advance(dt);
        stats.particles = self.present();
        stats
    }

    /// Reads the configuration and reconciles. Returns whether a pass ran.
    fn sync(&mut self) -> bool {
        match self.repo.read_playback() {
            Ok(flags) => self.playback = flags,
            Err(err) => warn!("keeping previous playback flags: {err}"),
        }
        let desired = match self.repo.read_desired() {
            Ok(desired) => desired,
            Err(err) => {
                warn!("skipping reconcile, configuration unreadable: {err}");
                return false;
            }
        };
        match self.host.attach() {
            Ok(viewport) => {
                if self.viewport != Some(viewport) {
                    debug!(width = viewport.width, height = viewport.height, "surface attached");
                }
                self.viewport = Some(viewport);
                self.manager.mount_surface();
            }
            Err(err) => {
                let err = EngineError::MissingMountSurface(err.to_string());
                warn!("skipping reconcile: {err}");
                return false;
            }
        }
        if self.manager.set_playing(self.playback.playing) {
            if let Err(err) = self.host.set_visible(self.playback.playing) {
                warn!("toggling surface visibility failed: {err}");
            }
        }
        match self.manager.reconcile(&desired) {
            Ok(_) => true,
            Err(err) => {
                warn!("{err}");
                false
            }
        }
    }

    fn present(&mut self) -> usize {
        let Some(surface) = self.manager.surface() else {
            return 0;
        };
        if !surface.is_visible() {
            return 0;
        }
        let frame = surface.snapshot(self.manager.now());
        if let Err(err) = self.host.present(&frame) {
            debug!("present failed: {err}");
        }
        frame.len()
    }

    /// Audio-bearing instances and the gain each should play at. Empty while
    /// muted, at zero volume, or paused.
    pub fn audio_cues(&self) -> Vec<AudioCue> {
        let Some(gain) = self.playback.audible_gain() else {
            return Vec::new();
        };
        self.manager
            .instances()
            .filter(|instance| instance.params().has_audio)
            .map(|instance| AudioCue {
                key: instance.key().clone(),
                gain,
            })
            .collect()
    }

    pub fn running(&self) -> Vec<InstanceKey> {
        self.manager.running_keys().cloned().collect()
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    pub fn playback(&self) -> PlaybackFlags {
        self.playback
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn repository(&self) -> &ConfigRepository {
        &self.repo
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: SurfaceHost> Drop for AmbientEngine<H> {
    fn drop(&mut self) {
        self.stop();
    }
}
