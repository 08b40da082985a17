//! Ambience core engine: platform-agnostic catalog, scheduling, surface and generators.
//!
//! Everything here is single-threaded and driven by a virtual clock. A host
//! advances the [`Scheduler`]; due timers are routed to the [`RunningInstance`]
//! that armed them, which spawns and retires elements on its own layer of the
//! [`MountSurface`].

pub mod cadence;
pub mod catalog;
pub mod error;
pub mod generator;
pub mod instance;
pub mod params;
pub mod scheduler;
pub mod surface;
pub mod trajectory;

pub use cadence::Cadence;
pub use catalog::{Catalog, CatalogKind, Category, EffectDescriptor};
pub use error::{EngineError, Result};
pub use generator::{Behavior, Generator, GeneratorRegistry};
pub use instance::{HandleSet, InstanceKey, Limits, RunningInstance, SpawnContext, Tick};
pub use params::{Direction, EffectParameters, PlaybackFlags};
pub use scheduler::{Fired, OwnerId, Scheduler, TimerHandle, TimerTag};
pub use surface::{Element, ElementId, ElementRole, Layer, MountNode, MountSurface, ParticleInstance};
pub use trajectory::{Pose, Trajectory};
