//! Spiral vortex whose base wanders across the bottom of the surface.

use std::f32::consts::TAU;
use std::time::Duration;

use glam::Vec2;

use crate::cadence::scaled_interval;
use crate::error::{EngineError, Result};
use crate::generator::pattern::scaled_lifetime;
use crate::generator::{Behavior, Generator};
use crate::instance::SpawnContext;
use crate::scheduler::TimerTag;
use crate::surface::{Element, ElementRole};
use crate::trajectory::{jitter, Trajectory};

const WANDER: u32 = 1;
const WANDER_PERIOD: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, Default)]
pub struct Tornado;

impl Generator for Tornado {
    fn instantiate(&self, ctx: &mut SpawnContext<'_>) -> Result<Box<dyn Behavior>> {
        ctx.params.validate().map_err(EngineError::Config)?;
        let interval = scaled_interval(
            Duration::from_millis(150),
            ctx.params.intensity,
            ctx.limits.min_cadence,
        );
        ctx.every(interval, TimerTag::Cadence);
        ctx.every(WANDER_PERIOD, TimerTag::Custom(WANDER));
        let drift = 0.01 * ctx.params.speed * if ctx.rng.bool() { 1.0 } else { -1.0 };
        Ok(Box::new(TornadoBehavior {
            base_x: 0.2 + ctx.rng.f32() * 0.6,
            drift,
        }))
    }
}

struct TornadoBehavior {
    base_x: f32,
    drift: f32,
}

impl TornadoBehavior {
    fn wander(&mut self, jolt: f32) {
        self.base_x += self.drift + jolt;
        if !(0.15..=0.85).contains(&self.base_x) {
            self.drift = -self.drift;
            self.base_x = self.base_x.clamp(0.15, 0.85);
        }
    }
}

impl Behavior for TornadoBehavior {
    fn on_timer(&mut self, tag: TimerTag, ctx: &mut SpawnContext<'_>) {
        match tag {
            TimerTag::Cadence => {
                for _ in 0..2 {
                    if !ctx.has_room() {
                        break;
                    }
                    let size = ctx.params.size;
                    let trajectory = Trajectory::Spiral {
                        base: Vec2::new(self.base_x, 1.02),
                        radius: jitter(ctx.rng, 0.12 * size, 0.3),
                        turns: 2.0 + ctx.rng.f32() * 2.0,
                        climb: 0.9 + ctx.rng.f32() * 0.1,
                        phase: ctx.rng.f32() * TAU,
                    };
                    let lifetime = scaled_lifetime(2500, ctx);
                    let color = ctx.params.rgba();
                    ctx.spawn(trajectory, lifetime, 0.008 * size, color, ElementRole::Primary);
                }
            }
            TimerTag::Custom(WANDER) => {
                let jolt = (ctx.rng.f32() * 2.0 - 1.0) * 0.005;
                self.wander(jolt);
            }
            _ => {}
        }
    }

    fn on_expire(&mut self, element: Element, ctx: &mut SpawnContext<'_>) {
        // debris flung off the top of the funnel
        if !ctx.params.physics || element.role != ElementRole::Primary {
            return;
        }
        if ctx.live() >= ctx.budget() * 2 || ctx.rng.f32() > 0.3 {
            return;
        }
        let origin = element.trajectory.terminal().clamp(Vec2::ZERO, Vec2::ONE);
        let outward = if origin.x < self.base_x { -1.0 } else { 1.0 };
        let velocity = Vec2::new(outward * jitter(ctx.rng, 0.12, 0.4), -0.05);
        ctx.spawn(
            Trajectory::Burst {
                origin,
                velocity,
                gravity: 0.3,
            },
            Duration::from_millis(800),
            element.size * 0.8,
            element.color,
            ElementRole::Secondary,
        );
    }
}
