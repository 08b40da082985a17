//! Running instances: the live timers and layer owned by one active catalog entry.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use fastrand::Rng;
use glam::Vec4;
use tracing::trace;

use crate::catalog::CatalogKind;
use crate::error::{EngineError, Result};
use crate::generator::{Behavior, Generator};
use crate::params::EffectParameters;
use crate::scheduler::{Fired, OwnerId, Scheduler, TimerHandle, TimerTag};
use crate::surface::{Element, ElementId, ElementRole, Layer, MountNode, MountSurface};
use crate::trajectory::Trajectory;

/// Catalog-qualified identity of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub catalog: CatalogKind,
    pub id: String,
}

impl InstanceKey {
    pub fn new(catalog: CatalogKind, id: impl Into<String>) -> Self {
        Self {
            catalog,
            id: id.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.catalog, self.id)
    }
}

/// Load bounds applied to every generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Spawn intervals never go below this.
    pub min_cadence: Duration,
    /// Hard ceiling on live elements per layer, whatever `particleCount` says.
    pub max_particles_per_layer: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_cadence: Duration::from_millis(40),
            max_particles_per_layer: 400,
        }
    }
}

/// Borrowed scheduling state handed to instances while they run.
pub struct Tick<'a> {
    pub scheduler: &'a mut Scheduler,
    pub rng: &'a mut Rng,
    pub limits: Limits,
}

/// Outstanding timers created by one instance.
#[derive(Debug, Default, Clone)]
pub struct HandleSet {
    handles: BTreeSet<TimerHandle>,
}

impl HandleSet {
    pub fn insert(&mut self, handle: TimerHandle) {
        self.handles.insert(handle);
    }

    pub fn remove(&mut self, handle: TimerHandle) -> bool {
        self.handles.remove(&handle)
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.handles.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TimerHandle> + '_ {
        self.handles.iter().copied()
    }

    fn drain(&mut self) -> impl Iterator<Item = TimerHandle> {
        std::mem::take(&mut self.handles).into_iter()
    }
}

/// Everything a generator may touch: its own layer, its own timers, and the clock.
pub struct SpawnContext<'a> {
    pub owner: OwnerId,
    pub node: MountNode,
    pub params: &'a EffectParameters,
    pub limits: Limits,
    pub rng: &'a mut Rng,
    scheduler: &'a mut Scheduler,
    layer: &'a mut Layer,
    handles: &'a mut HandleSet,
}

impl<'a> SpawnContext<'a> {
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Repeating timer tracked by this instance.
    pub fn every(&mut self, period: Duration, tag: TimerTag) -> TimerHandle {
        let handle = self.scheduler.set_interval(self.owner, period, tag);
        self.handles.insert(handle);
        handle
    }

    /// One-shot timer tracked by this instance.
    pub fn after(&mut self, delay: Duration, tag: TimerTag) -> TimerHandle {
        let handle = self.scheduler.set_timeout(self.owner, delay, tag);
        self.handles.insert(handle);
        handle
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.handles.remove(handle);
        self.scheduler.cancel(handle)
    }

    /// Live elements in this instance's layer.
    pub fn live(&self) -> usize {
        self.layer.len()
    }

    /// Concurrent element budget after applying limits.
    pub fn budget(&self) -> usize {
        (self.params.particle_count as usize).min(self.limits.max_particles_per_layer)
    }

    pub fn has_room(&self) -> bool {
        self.live() < self.budget()
    }

    /// Adds an element born now and arms its removal at the end of `lifetime`.
    pub fn spawn(
        &mut self,
        trajectory: Trajectory,
        lifetime: Duration,
        size: f32,
        color: Vec4,
        role: ElementRole,
    ) -> ElementId {
        let element = Element {
            trajectory,
            born: self.now(),
            lifetime,
            size,
            color,
            role,
        };
        let id = self.layer.insert(element);
        self.after(lifetime, TimerTag::Expire(id));
        trace!(?id, ?lifetime, "spawned element");
        id
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.layer.get(id)
    }

    fn remove(&mut self, id: ElementId) -> Option<Element> {
        self.layer.remove(id)
    }
}

pub struct RunningInstance {
    key: InstanceKey,
    owner: OwnerId,
    node: MountNode,
    params: EffectParameters,
    handles: HandleSet,
    behavior: Box<dyn Behavior>,
    torn_down: bool,
}

impl fmt::Debug for RunningInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningInstance")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("node", &self.node)
            .field("handles", &self.handles.len())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl RunningInstance {
    /// Mounts a fresh layer and runs the generator in it.
    ///
    /// On failure nothing is left behind: timers armed before the fault are
    /// cancelled and the layer is detached.
    pub fn launch(
        generator: &dyn Generator,
        key: InstanceKey,
        params: EffectParameters,
        owner: OwnerId,
        tick: Tick<'_>,
        surface: &mut MountSurface,
    ) -> Result<Self> {
        let Tick {
            scheduler,
            rng,
            limits,
        } = tick;
        let node = surface.mount(key.to_string());
        let mut handles = HandleSet::default();

        let outcome = match surface.layer_mut(node) {
            Some(layer) => {
                let mut ctx = SpawnContext {
                    owner,
                    node,
                    params: &params,
                    limits,
                    rng: &mut *rng,
                    scheduler: &mut *scheduler,
                    layer,
                    handles: &mut handles,
                };
                generator.instantiate(&mut ctx)
            }
            None => Err(EngineError::MissingMountSurface(format!(
                "layer for {key} vanished while mounting"
            ))),
        };

        match outcome {
            Ok(behavior) => Ok(Self {
                key,
                owner,
                node,
                params,
                handles,
                behavior,
                torn_down: false,
            }),
            Err(err) => {
                for handle in handles.drain() {
                    scheduler.cancel(handle);
                }
                surface.unmount(node);
                Err(match err {
                    EngineError::GeneratorFault { .. } => err,
                    other => EngineError::fault(key.id.clone(), other.to_string()),
                })
            }
        }
    }

    pub fn key(&self) -> &InstanceKey {
        &self.key
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn mount_node(&self) -> MountNode {
        self.node
    }

    pub fn params(&self) -> &EffectParameters {
        &self.params
    }

    pub fn handles(&self) -> &HandleSet {
        &self.handles
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Routes a fired timer to the behavior. Expired elements are removed first.
    pub fn on_timer(&mut self, fired: Fired, tick: Tick<'_>, surface: &mut MountSurface) {
        if self.torn_down {
            return;
        }
        if !fired.repeating {
            self.handles.remove(fired.handle);
        }
        let Some(layer) = surface.layer_mut(self.node) else {
            return;
        };
        let mut ctx = SpawnContext {
            owner: self.owner,
            node: self.node,
            params: &self.params,
            limits: tick.limits,
            rng: tick.rng,
            scheduler: tick.scheduler,
            layer,
            handles: &mut self.handles,
        };
        match fired.tag {
            TimerTag::Expire(element) => {
                if let Some(removed) = ctx.remove(element) {
                    self.behavior.on_expire(removed, &mut ctx);
                }
            }
            tag => self.behavior.on_timer(tag, &mut ctx),
        }
    }

    /// Cancels every outstanding timer, then detaches the layer. Idempotent.
    ///
    /// Returns how many timers were still pending.
    pub fn teardown(&mut self, scheduler: &mut Scheduler, surface: &mut MountSurface) -> usize {
        if self.torn_down {
            return 0;
        }
        self.torn_down = true;
        let cancelled = self
            .handles
            .drain()
            .filter(|handle| scheduler.cancel(*handle))
            .count();
        surface.unmount(self.node);
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    struct Dripper;

    impl Behavior for Dripper {
        fn on_timer(&mut self, _tag: TimerTag, ctx: &mut SpawnContext<'_>) {
            if ctx.has_room() {
                ctx.spawn(
                    Trajectory::Twinkle {
                        at: Vec2::splat(0.5),
                        pulses: 1.0,
                    },
                    Duration::from_millis(300),
                    0.01,
                    Vec4::ONE,
                    ElementRole::Primary,
                );
            }
        }
    }

    fn drip(ctx: &mut SpawnContext<'_>) -> Result<Box<dyn Behavior>> {
        ctx.every(Duration::from_millis(100), TimerTag::Cadence);
        Ok(Box::new(Dripper))
    }

    fn broken(ctx: &mut SpawnContext<'_>) -> Result<Box<dyn Behavior>> {
        ctx.every(Duration::from_millis(100), TimerTag::Cadence);
        Err(EngineError::Config("bad".into()))
    }

    fn pump(
        instance: &mut RunningInstance,
        scheduler: &mut Scheduler,
        rng: &mut Rng,
        surface: &mut MountSurface,
        ms: u64,
    ) {
        scheduler.advance(Duration::from_millis(ms), |sched, fired| {
            let tick = Tick {
                scheduler: sched,
                rng: &mut *rng,
                limits: Limits::default(),
            };
            instance.on_timer(fired, tick, surface);
        });
    }

    #[test]
    fn spawned_elements_expire_and_release_their_timers() {
        let mut scheduler = Scheduler::new();
        let mut rng = Rng::with_seed(1);
        let mut surface = MountSurface::new();
        let params = EffectParameters::default();
        let tick = Tick {
            scheduler: &mut scheduler,
            rng: &mut rng,
            limits: Limits::default(),
        };
        let mut instance = RunningInstance::launch(
            &drip,
            InstanceKey::new(CatalogKind::Effects, "drip"),
            params,
            OwnerId(1),
            tick,
            &mut surface,
        )
        .unwrap();

        pump(&mut instance, &mut scheduler, &mut rng, &mut surface, 250);
        // two spawns (100, 200) still alive, plus the cadence
        assert_eq!(surface.element_count(), 2);
        assert_eq!(instance.handles().len(), 3);
        assert_eq!(scheduler.pending_for(OwnerId(1)), 3);

        pump(&mut instance, &mut scheduler, &mut rng, &mut surface, 200);
        // 100 expired at 400; 300 and 400 spawned
        assert_eq!(surface.element_count(), 3);
        assert_eq!(instance.handles().len(), scheduler.pending_for(OwnerId(1)));

        let cancelled = instance.teardown(&mut scheduler, &mut surface);
        assert_eq!(cancelled, 4);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(surface.layer_count(), 0);
        assert_eq!(instance.teardown(&mut scheduler, &mut surface), 0);
    }

    #[test]
    fn failed_launch_leaves_nothing_behind() {
        let mut scheduler = Scheduler::new();
        let mut rng = Rng::with_seed(1);
        let mut surface = MountSurface::new();
        let tick = Tick {
            scheduler: &mut scheduler,
            rng: &mut rng,
            limits: Limits::default(),
        };
        let err = RunningInstance::launch(
            &broken,
            InstanceKey::new(CatalogKind::Effects, "broken"),
            EffectParameters::default(),
            OwnerId(9),
            tick,
            &mut surface,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::GeneratorFault { ref id, .. } if id == "broken"));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(surface.layer_count(), 0);
    }
}
