//! Reconciles the running instance set against the desired configuration and
//! drives their timers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ambience_core::{
    EffectParameters, EngineError, GeneratorRegistry, InstanceKey, Limits, MountSurface, OwnerId,
    Result, RunningInstance, Scheduler, Tick,
};
use fastrand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::DesiredState;

/// What happens to running instances while playback is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PausePolicy {
    /// Hide the surface and freeze the clock; nothing spawns while paused.
    #[default]
    Suspend,
    /// Hide the surface only; timers keep running underneath.
    Hide,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<InstanceKey>,
    pub stopped: Vec<InstanceKey>,
    /// Torn down and started again with changed parameters.
    pub restarted: Vec<InstanceKey>,
    pub unknown: Vec<InstanceKey>,
    pub faulted: Vec<InstanceKey>,
    /// Timers that were still pending when their instance was torn down.
    pub cancelled_timers: usize,
}

impl ReconcileReport {
    /// Nothing was started or stopped.
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.restarted.is_empty()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "started {}, stopped {}, restarted {}, unknown {}, faulted {}",
            self.started.len(),
            self.stopped.len(),
            self.restarted.len(),
            self.unknown.len(),
            self.faulted.len()
        )
    }
}

/// Sole owner of the running instances, their timers, and the mounting surface.
pub struct LifecycleManager {
    registry: Arc<GeneratorRegistry>,
    scheduler: Scheduler,
    rng: Rng,
    limits: Limits,
    pause_policy: PausePolicy,
    surface: Option<MountSurface>,
    running: BTreeMap<InstanceKey, RunningInstance>,
    owners: HashMap<OwnerId, InstanceKey>,
    next_owner: u64,
    playing: bool,
    passes: u64,
}

impl LifecycleManager {
    pub fn new(
        registry: Arc<GeneratorRegistry>,
        limits: Limits,
        pause_policy: PausePolicy,
        seed: Option<u64>,
    ) -> Self {
        Self {
            registry,
            scheduler: Scheduler::new(),
            rng: seed.map(Rng::with_seed).unwrap_or_default(),
            limits,
            pause_policy,
            surface: None,
            running: BTreeMap::new(),
            owners: HashMap::new(),
            next_owner: 0,
            playing: true,
            passes: 0,
        }
    }

    /// Creates the mounting surface on first call; later calls keep the existing one.
    pub fn mount_surface(&mut self) -> &mut MountSurface {
        let playing = self.playing;
        self.surface.get_or_insert_with(|| {
            let mut surface = MountSurface::new();
            surface.set_visible(playing);
            surface
        })
    }

    pub fn surface(&self) -> Option<&MountSurface> {
        self.surface.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn pause_policy(&self) -> PausePolicy {
        self.pause_policy
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Completed reconciliation passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn running_keys(&self) -> impl Iterator<Item = &InstanceKey> {
        self.running.keys()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, key: &InstanceKey) -> bool {
        self.running.contains_key(key)
    }

    pub fn instance(&self, key: &InstanceKey) -> Option<&RunningInstance> {
        self.running.get(key)
    }

    pub fn instances(&self) -> impl Iterator<Item = &RunningInstance> {
        self.running.values()
    }

    /// Brings the running set in line with `desired`.
    ///
    /// Unknown ids and faulting generators are reported per entry and never
    /// abort the pass. Without a mounting surface nothing changes.
    pub fn reconcile(&mut self, desired: &DesiredState) -> Result<ReconcileReport> {
        let Self {
            registry,
            scheduler,
            rng,
            limits,
            surface,
            running,
            owners,
            next_owner,
            passes,
            ..
        } = self;
        let Some(surface) = surface.as_mut() else {
            return Err(EngineError::MissingMountSurface(
                "reconcile before the surface was mounted".into(),
            ));
        };
        let mut report = ReconcileReport::default();

        let mut restart = Vec::new();
        let retired: Vec<InstanceKey> = running
            .iter()
            .filter_map(|(key, instance)| match desired.get(key) {
                Some(params) if params.is_active => {
                    if params != instance.params() {
                        restart.push(key.clone());
                        Some(key.clone())
                    } else {
                        None
                    }
                }
                _ => Some(key.clone()),
            })
            .collect();
        for key in retired {
            if let Some(mut instance) = running.remove(&key) {
                report.cancelled_timers += instance.teardown(scheduler, surface);
                owners.remove(&instance.owner());
                if !restart.contains(&key) {
                    debug!(instance = %key, "stopped");
                    report.stopped.push(key);
                }
            }
        }
        if running.is_empty() && surface.layer_count() > 0 {
            surface.clear();
        }

        for (key, params) in desired {
            if !params.is_active || running.contains_key(key) {
                continue;
            }
            let generator = match registry.lookup(key.catalog, &key.id) {
                Ok(generator) => generator,
                Err(err) => {
                    warn!(instance = %key, "{err}");
                    report.unknown.push(key.clone());
                    continue;
                }
            };
            *next_owner += 1;
            let owner = OwnerId(*next_owner);
            let tick = Tick {
                scheduler: &mut *scheduler,
                rng: &mut *rng,
                limits: *limits,
            };
            match RunningInstance::launch(
                generator.as_ref(),
                key.clone(),
                params.clone(),
                owner,
                tick,
                surface,
            ) {
                Ok(instance) => {
                    owners.insert(owner, key.clone());
                    running.insert(key.clone(), instance);
                    if restart.contains(key) {
                        debug!(instance = %key, "restarted with new parameters");
                        report.restarted.push(key.clone());
                    } else {
                        debug!(instance = %key, "started");
                        report.started.push(key.clone());
                    }
                }
                Err(err) => {
                    warn!(instance = %key, "{err}");
                    if restart.contains(key) {
                        report.stopped.push(key.clone());
                    }
                    report.faulted.push(key.clone());
                }
            }
        }

        *passes += 1;
        if report.is_noop() {
            debug!(running = running.len(), "reconcile: {report}");
        } else {
            info!(running = running.len(), "reconcile: {report}");
        }
        Ok(report)
    }

    /// Advances the virtual clock and dispatches due timers to their owners.
    ///
    /// Returns how many timers fired. Under [`PausePolicy::Suspend`] a paused
    /// manager does not advance at all.
    pub fn advance(&mut self, dt: Duration) -> usize {
        if !self.playing && self.pause_policy == PausePolicy::Suspend {
            return 0;
        }
        let Self {
            scheduler,
            rng,
            limits,
            surface,
            running,
            owners,
            ..
        } = self;
        let Some(surface) = surface.as_mut() else {
            return 0;
        };
        let limits = *limits;
        scheduler.advance(dt, |scheduler, fired| {
            let Some(instance) = owners.get(&fired.owner).and_then(|key| running.get_mut(key))
            else {
                trace!(owner = fired.owner.0, "dropping timer with no owner");
                scheduler.cancel(fired.handle);
                return;
            };
            let tick = Tick {
                scheduler,
                rng: &mut *rng,
                limits,
            };
            instance.on_timer(fired, tick, surface);
        })
    }

    /// Applies the global playback switch. Returns whether it changed.
    pub fn set_playing(&mut self, playing: bool) -> bool {
        if self.playing == playing {
            return false;
        }
        self.playing = playing;
        if let Some(surface) = self.surface.as_mut() {
            surface.set_visible(playing);
        }
        info!(playing, policy = ?self.pause_policy, "playback changed");
        true
    }

    /// Tears down every running instance and clears the surface.
    pub fn teardown_all(&mut self) -> usize {
        let Some(surface) = self.surface.as_mut() else {
            return 0;
        };
        let mut cancelled = 0;
        for (key, mut instance) in std::mem::take(&mut self.running) {
            cancelled += instance.teardown(&mut self.scheduler, surface);
            debug!(instance = %key, "stopped");
        }
        self.owners.clear();
        surface.clear();
        cancelled
    }

    /// Parameters the running instance of `key` was started with.
    pub fn running_params(&self, key: &InstanceKey) -> Option<&EffectParameters> {
        self.running.get(key).map(RunningInstance::params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambience_core::{Behavior, CatalogKind, SpawnContext, TimerTag};

    struct Idle;

    impl Behavior for Idle {
        fn on_timer(&mut self, _tag: TimerTag, _ctx: &mut SpawnContext<'_>) {}
    }

    fn manager() -> LifecycleManager {
        let mut registry = GeneratorRegistry::new();
        registry.register(
            CatalogKind::Effects,
            "pulse",
            |ctx: &mut SpawnContext<'_>| -> Result<Box<dyn Behavior>> {
                ctx.every(Duration::from_millis(100), TimerTag::Cadence);
                Ok(Box::new(Idle))
            },
        );
        registry.register(
            CatalogKind::Effects,
            "broken",
            |ctx: &mut SpawnContext<'_>| -> Result<Box<dyn Behavior>> {
                ctx.every(Duration::from_millis(100), TimerTag::Cadence);
                Err(EngineError::fault("broken", "always fails"))
            },
        );
        registry.register(
            CatalogKind::Effects,
            "fragile",
            |ctx: &mut SpawnContext<'_>| -> Result<Box<dyn Behavior>> {
                if ctx.params.intensity > 80.0 {
                    return Err(EngineError::fault("fragile", "too intense"));
                }
                ctx.every(Duration::from_millis(100), TimerTag::Cadence);
                Ok(Box::new(Idle))
            },
        );
        let mut manager =
            LifecycleManager::new(Arc::new(registry), Limits::default(), PausePolicy::Suspend, Some(1));
        manager.mount_surface();
        manager
    }

    fn desired(entries: &[(&str, bool)]) -> DesiredState {
        entries
            .iter()
            .map(|(id, active)| {
                (
                    InstanceKey::new(CatalogKind::Effects, *id),
                    EffectParameters::default().active(*active),
                )
            })
            .collect()
    }

    #[test]
    fn reconcile_without_surface_is_an_error_and_changes_nothing() {
        let mut manager = LifecycleManager::new(
            Arc::new(GeneratorRegistry::new()),
            Limits::default(),
            PausePolicy::Suspend,
            None,
        );
        assert!(matches!(
            manager.reconcile(&desired(&[("pulse", true)])),
            Err(EngineError::MissingMountSurface(_))
        ));
        assert_eq!(manager.running_count(), 0);
        assert_eq!(manager.passes(), 0);
    }

    #[test]
    fn faulted_and_unknown_entries_leave_nothing_behind() {
        let mut manager = manager();
        let report = manager
            .reconcile(&desired(&[("pulse", true), ("broken", true), ("ghost", true)]))
            .unwrap();
        assert_eq!(report.started, vec![InstanceKey::new(CatalogKind::Effects, "pulse")]);
        assert_eq!(report.faulted, vec![InstanceKey::new(CatalogKind::Effects, "broken")]);
        assert_eq!(report.unknown, vec![InstanceKey::new(CatalogKind::Effects, "ghost")]);
        assert_eq!(manager.running_count(), 1);
        assert_eq!(manager.scheduler().pending(), 1);
        assert_eq!(manager.surface().unwrap().layer_count(), 1);
    }

    #[test]
    fn changed_parameters_restart_the_instance() {
        let mut manager = manager();
        manager.reconcile(&desired(&[("pulse", true)])).unwrap();
        let key = InstanceKey::new(CatalogKind::Effects, "pulse");
        let before = manager.instance(&key).unwrap().mount_node();

        let mut next = desired(&[("pulse", true)]);
        next.get_mut(&key).unwrap().intensity = 90.0;
        let report = manager.reconcile(&next).unwrap();

        assert_eq!(report.restarted, vec![key.clone()]);
        assert!(report.started.is_empty() && report.stopped.is_empty());
        assert_ne!(manager.instance(&key).unwrap().mount_node(), before);
        assert_eq!(manager.running_params(&key).unwrap().intensity, 90.0);
        assert_eq!(manager.scheduler().pending(), 1);
    }

    #[test]
    fn failed_relaunch_counts_as_stopped_and_faulted() {
        let mut manager = manager();
        manager.reconcile(&desired(&[("fragile", true)])).unwrap();
        let key = InstanceKey::new(CatalogKind::Effects, "fragile");
        assert!(manager.is_running(&key));

        let mut next = desired(&[("fragile", true)]);
        next.get_mut(&key).unwrap().intensity = 90.0;
        let report = manager.reconcile(&next).unwrap();

        assert_eq!(report.stopped, vec![key.clone()]);
        assert_eq!(report.faulted, vec![key.clone()]);
        assert!(report.restarted.is_empty());
        assert_eq!(manager.running_count(), 0);
        assert_eq!(manager.scheduler().pending(), 0);
        assert_eq!(manager.surface().unwrap().layer_count(), 0);
    }

    #[test]
    fn suspended_playback_freezes_the_clock() {
        let mut manager = manager();
        manager.reconcile(&desired(&[("pulse", true)])).unwrap();
        assert!(manager.advance(Duration::from_millis(250)) > 0);

        assert!(manager.set_playing(false));
        assert!(!manager.set_playing(false));
        let frozen = manager.now();
        assert_eq!(manager.advance(Duration::from_secs(5)), 0);
        assert_eq!(manager.now(), frozen);
        assert!(!manager.surface().unwrap().is_visible());

        manager.set_playing(true);
        assert_eq!(manager.advance(Duration::from_millis(100)), 1);
    }

    #[test]
    fn hide_policy_keeps_timers_running_while_paused() {
        let mut manager = manager();
        manager.pause_policy = PausePolicy::Hide;
        manager.reconcile(&desired(&[("pulse", true)])).unwrap();
        manager.set_playing(false);
        assert_eq!(manager.advance(Duration::from_millis(300)), 3);
        assert!(manager.surface().unwrap().snapshot(manager.now()).is_empty());
    }

    #[test]
    fn teardown_all_cancels_everything() {
        let mut manager = manager();
        manager.reconcile(&desired(&[("pulse", true)])).unwrap();
        assert_eq!(manager.teardown_all(), 1);
        assert_eq!(manager.scheduler().pending(), 0);
        assert_eq!(manager.surface().unwrap().layer_count(), 0);
        assert_eq!(manager.running_count(), 0);
    }
}
