//! Table-driven generators: each effect is a record selecting a motion primitive.

use std::f32::consts::TAU;
use std::time::Duration;

use glam::Vec2;

use crate::cadence::scaled_interval;
use crate::error::{EngineError, Result};
use crate::generator::{Behavior, Generator};
use crate::instance::SpawnContext;
use crate::scheduler::TimerTag;
use crate::surface::{Element, ElementRole};
use crate::trajectory::{anywhere, entry, jitter, Trajectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Fall,
    Float,
    Rise,
    Twinkle,
    Sweep,
}

/// Reaction spawned where a primary element ends, when `physics` is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Secondary {
    /// Droplets kicked up from the impact point.
    Splash { count: u32 },
    /// Sparks radiating in every direction.
    Burst { count: u32 },
    /// One lingering ring.
    Ripple,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pattern {
    pub motion: Motion,
    /// Spawn interval at intensity 0.
    pub interval_ms: u64,
    /// Element lifetime at speed 1.
    pub lifetime_ms: u64,
    pub per_tick: u32,
    /// Element size at size 1, in surface units.
    pub size: f32,
    /// Sway, wobble, wander radius or undulation, depending on the motion.
    pub sway: f32,
    /// Turns per lifetime.
    pub spin: f32,
    /// Lateral drift added when `physics` is on.
    pub wind: f32,
    /// Fraction of the surface crossed per lifetime.
    pub reach: f32,
    pub secondary: Option<Secondary>,
    /// Spawn one tick's worth immediately instead of waiting for the first interval.
    pub prefill: bool,
}

impl Pattern {
    pub const fn base(motion: Motion, interval_ms: u64, lifetime_ms: u64) -> Self {
        Self {
            motion,
            interval_ms,
            lifetime_ms,
            per_tick: 1,
            size: 0.01,
            sway: 0.0,
            spin: 0.0,
            wind: 0.0,
            reach: 1.1,
            secondary: None,
            prefill: false,
        }
    }
}

use Motion::*;

pub static EFFECT_PATTERNS: &[(&str, Pattern)] = &[
    ("rain", Pattern { per_tick: 2, size: 0.006, wind: 0.08, secondary: Some(Secondary::Splash { count: 3 }), ..Pattern::base(Fall, 120, 900) }),
    ("drizzle", Pattern { size: 0.004, wind: 0.04, ..Pattern::base(Fall, 300, 1400) }),
    ("snow", Pattern { sway: 0.04, spin: 0.5, wind: 0.15, ..Pattern::base(Fall, 250, 6000) }),
    ("blizzard", Pattern { per_tick: 3, sway: 0.02, spin: 1.0, wind: 0.35, ..Pattern::base(Fall, 90, 2500) }),
    ("hail", Pattern { size: 0.008, secondary: Some(Secondary::Splash { count: 2 }), ..Pattern::base(Fall, 200, 700) }),
    ("fog", Pattern { size: 0.3, sway: 0.03, reach: 1.4, prefill: true, ..Pattern::base(Sweep, 4000, 20000) }),
    ("leaves", Pattern { size: 0.02, sway: 0.08, spin: 2.0, wind: 0.25, secondary: Some(Secondary::Ripple), ..Pattern::base(Fall, 700, 7000) }),
    ("petals", Pattern { size: 0.012, sway: 0.06, spin: 1.5, ..Pattern::base(Fall, 600, 7000) }),
    ("cherry-blossoms", Pattern { size: 0.012, sway: 0.05, spin: 1.2, ..Pattern::base(Fall, 500, 8000) }),
    ("fireflies", Pattern { size: 0.008, sway: 0.06, prefill: true, ..Pattern::base(Float, 600, 8000) }),
    ("butterflies", Pattern { size: 0.025, sway: 0.12, ..Pattern::base(Float, 1500, 10000) }),
    ("bubbles", Pattern { size: 0.02, sway: 0.02, reach: 0.9, secondary: Some(Secondary::Burst { count: 5 }), ..Pattern::base(Rise, 500, 5000) }),
    ("pollen", Pattern { size: 0.004, sway: 0.03, prefill: true, ..Pattern::base(Float, 300, 9000) }),
    ("stars", Pattern { size: 0.006, prefill: true, ..Pattern::base(Twinkle, 200, 3000) }),
    ("shooting-stars", Pattern { size: 0.01, reach: 1.3, ..Pattern::base(Sweep, 3000, 900) }),
    ("meteors", Pattern { size: 0.015, reach: 1.2, wind: 0.5, secondary: Some(Secondary::Burst { count: 6 }), ..Pattern::base(Fall, 1200, 1100) }),
    ("comets", Pattern { size: 0.03, sway: 0.05, reach: 1.3, ..Pattern::base(Sweep, 8000, 4000) }),
    ("galaxy-dust", Pattern { size: 0.003, sway: 0.02, prefill: true, ..Pattern::base(Float, 150, 12000) }),
    ("sparkles", Pattern { per_tick: 2, size: 0.006, ..Pattern::base(Twinkle, 150, 900) }),
    ("fairy-dust", Pattern { size: 0.005, sway: 0.03, reach: 0.6, ..Pattern::base(Rise, 120, 2000) }),
    ("magic-orbs", Pattern { size: 0.04, sway: 0.1, prefill: true, ..Pattern::base(Float, 2000, 12000) }),
    ("embers", Pattern { size: 0.006, sway: 0.02, reach: 0.7, ..Pattern::base(Rise, 150, 2500) }),
    ("fireworks", Pattern { size: 0.01, reach: 0.6, secondary: Some(Secondary::Burst { count: 14 }), ..Pattern::base(Rise, 1600, 1400) }),
    ("confetti", Pattern { per_tick: 2, size: 0.01, sway: 0.05, spin: 3.0, wind: 0.1, ..Pattern::base(Fall, 120, 4000) }),
    ("hearts", Pattern { size: 0.02, sway: 0.04, reach: 1.1, ..Pattern::base(Rise, 900, 6000) }),
    ("balloons", Pattern { size: 0.05, sway: 0.03, ..Pattern::base(Rise, 2500, 9000) }),
];

pub static BACKGROUND_PATTERNS: &[(&str, Pattern)] = &[
    ("aurora", Pattern { size: 0.5, sway: 0.08, reach: 1.5, prefill: true, ..Pattern::base(Sweep, 3000, 16000) }),
    ("starfield", Pattern { per_tick: 3, size: 0.004, prefill: true, ..Pattern::base(Twinkle, 150, 5000) }),
    ("nebula", Pattern { size: 0.6, sway: 0.15, prefill: true, ..Pattern::base(Float, 5000, 30000) }),
    ("ocean-waves", Pattern { size: 0.4, sway: 0.04, reach: 1.5, prefill: true, ..Pattern::base(Sweep, 2500, 9000) }),
    ("gradient-drift", Pattern { size: 1.0, sway: 0.1, reach: 1.6, prefill: true, ..Pattern::base(Sweep, 8000, 40000) }),
    ("cloudscape", Pattern { size: 0.35, sway: 0.02, reach: 1.5, prefill: true, ..Pattern::base(Sweep, 4000, 25000) }),
    ("rainy-window", Pattern { size: 0.012, sway: 0.01, reach: 0.6, secondary: Some(Secondary::Ripple), ..Pattern::base(Fall, 400, 5000) }),
];

#[derive(Debug, Clone, Copy)]
pub struct PatternGenerator {
    pattern: Pattern,
}

impl PatternGenerator {
    pub fn new(pattern: Pattern) -> Self {
        Self { pattern }
    }
}

impl Generator for PatternGenerator {
    fn instantiate(&self, ctx: &mut SpawnContext<'_>) -> Result<Box<dyn Behavior>> {
        ctx.params.validate().map_err(EngineError::Config)?;
        let interval = scaled_interval(
            Duration::from_millis(self.pattern.interval_ms),
            ctx.params.intensity,
            ctx.limits.min_cadence,
        );
        let mut behavior = PatternBehavior {
            pattern: self.pattern,
        };
        if self.pattern.prefill {
            behavior.spawn_tick(ctx);
        }
        ctx.every(interval, TimerTag::Cadence);
        Ok(Box::new(behavior))
    }
}

pub(crate) struct PatternBehavior {
    pub(crate) pattern: Pattern,
}

impl PatternBehavior {
    pub(crate) fn spawn_tick(&mut self, ctx: &mut SpawnContext<'_>) {
        for _ in 0..self.pattern.per_tick {
            if !ctx.has_room() {
                break;
            }
            spawn_primary(&self.pattern, ctx);
        }
    }
}

impl Behavior for PatternBehavior {
    fn on_timer(&mut self, tag: TimerTag, ctx: &mut SpawnContext<'_>) {
        if tag == TimerTag::Cadence {
            self.spawn_tick(ctx);
        }
    }

    fn on_expire(&mut self, element: Element, ctx: &mut SpawnContext<'_>) {
        react(&self.pattern, &element, ctx);
    }
}

/// Lifetime at the current speed, jittered by 20%, never under 50 ms.
pub(crate) fn scaled_lifetime(base_ms: u64, ctx: &mut SpawnContext<'_>) -> Duration {
    let millis = jitter(ctx.rng, base_ms as f32 / ctx.params.speed, 0.2);
    Duration::from_millis(millis.max(50.0) as u64)
}

pub(crate) fn spawn_primary(pattern: &Pattern, ctx: &mut SpawnContext<'_>) {
    let params = ctx.params;
    let lifetime = scaled_lifetime(pattern.lifetime_ms, ctx);
    let size = jitter(ctx.rng, pattern.size * params.size, 0.3);
    let color = params.rgba();
    let drift = if params.physics { pattern.wind } else { 0.0 };

    let trajectory = match pattern.motion {
        Motion::Fall => {
            let (start, dir) = entry(params.direction, ctx.rng);
            Trajectory::Fall {
                start,
                velocity: dir * pattern.reach + dir.perp() * drift,
                sway: jitter(ctx.rng, pattern.sway, 0.5),
                sway_cycles: 1.0 + ctx.rng.f32() * 2.0,
                spin: pattern.spin * (ctx.rng.f32() * 2.0 - 1.0),
            }
        }
        Motion::Rise => {
            let (start, dir) = entry(params.direction, ctx.rng);
            Trajectory::Rise {
                start,
                velocity: dir * jitter(ctx.rng, pattern.reach, 0.2) + dir.perp() * drift,
                wobble: jitter(ctx.rng, pattern.sway, 0.5),
            }
        }
        Motion::Float => Trajectory::Float {
            anchor: anywhere(ctx.rng, 0.05),
            radius: jitter(ctx.rng, pattern.sway, 0.4),
            phase: ctx.rng.f32() * TAU,
            pulses: 1.0 + ctx.rng.f32() * 3.0,
        },
        Motion::Twinkle => Trajectory::Twinkle {
            at: anywhere(ctx.rng, 0.0),
            pulses: 1.0 + ctx.rng.f32() * 3.0,
        },
        Motion::Sweep => {
            let (start, dir) = entry(params.direction, ctx.rng);
            Trajectory::Sweep {
                start,
                velocity: dir * pattern.reach,
                amplitude: jitter(ctx.rng, pattern.sway, 0.5),
            }
        }
    };
    ctx.spawn(trajectory, lifetime, size, color, ElementRole::Primary);
}

/// Spawns the pattern's secondary reaction where `element` ended.
pub(crate) fn react(pattern: &Pattern, element: &Element, ctx: &mut SpawnContext<'_>) {
    let Some(secondary) = pattern.secondary else {
        return;
    };
    if !ctx.params.physics || element.role != ElementRole::Primary {
        return;
    }
    // secondaries may overshoot the budget, but only up to twice it
    let room = (ctx.budget() * 2).saturating_sub(ctx.live());
    if room == 0 {
        return;
    }
    let origin = element.trajectory.terminal().clamp(Vec2::ZERO, Vec2::ONE);
    let color = element.color;
    match secondary {
        Secondary::Splash { count } => {
            for _ in 0..(count as usize).min(room) {
                let velocity = Vec2::new(
                    (ctx.rng.f32() * 2.0 - 1.0) * 0.05,
                    -(0.03 + ctx.rng.f32() * 0.05),
                );
                let lifetime = Duration::from_millis(300 + ctx.rng.u64(0..200));
                ctx.spawn(
                    Trajectory::Burst {
                        origin,
                        velocity,
                        gravity: 0.1,
                    },
                    lifetime,
                    element.size * 0.4,
                    color,
                    ElementRole::Secondary,
                );
            }
        }
        Secondary::Burst { count } => {
            for i in 0..(count as usize).min(room) {
                let angle = i as f32 / count as f32 * TAU + ctx.rng.f32() * 0.3;
                let velocity = Vec2::new(angle.cos(), angle.sin()) * jitter(ctx.rng, 0.15, 0.3);
                let lifetime = Duration::from_millis(700 + ctx.rng.u64(0..400));
                ctx.spawn(
                    Trajectory::Burst {
                        origin,
                        velocity,
                        gravity: 0.05,
                    },
                    lifetime,
                    element.size * 0.5,
                    color,
                    ElementRole::Secondary,
                );
            }
        }
        Secondary::Ripple => {
            ctx.spawn(
                Trajectory::Twinkle {
                    at: origin,
                    pulses: 0.5,
                },
                Duration::from_millis(600),
                element.size * 2.0,
                color,
                ElementRole::Secondary,
            );
        }
    }
}
