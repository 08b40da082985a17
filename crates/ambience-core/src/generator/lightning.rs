//! Branching lightning on a randomized, non-periodic schedule.

use std::time::Duration;

use fastrand::Rng;
use glam::{Vec2, Vec4};
use tracing::trace;

use crate::cadence::{scaled_interval, Cadence};
use crate::error::{EngineError, Result};
use crate::generator::pattern::{react, scaled_lifetime, PatternBehavior};
use crate::generator::{Behavior, Generator, Pattern, EFFECT_PATTERNS};
use crate::instance::SpawnContext;
use crate::scheduler::TimerTag;
use crate::surface::{Element, ElementRole};
use crate::trajectory::Trajectory;

const STRIKE: u32 = 1;
const AFTERFLASH: u32 = 2;

/// Vertical steps in the main channel of a bolt.
const BOLT_STEPS: usize = 9;

#[derive(Debug, Clone, Copy, Default)]
pub struct Lightning {
    rain: Option<Pattern>,
}

impl Lightning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lightning over the built-in rain pattern.
    pub fn with_rain() -> Self {
        Self {
            rain: EFFECT_PATTERNS
                .iter()
                .find(|(id, _)| *id == "rain")
                .map(|(_, pattern)| *pattern),
        }
    }
}

/// Delay between strikes: 1.5–7 s when calm, a fifth of that at full intensity.
pub fn strike_cadence(intensity: f32, floor: Duration) -> Cadence {
    let fraction = (intensity / 100.0).clamp(0.0, 1.0);
    let scale = 1.0 - 0.8 * fraction;
    Cadence::Jittered {
        min: Duration::from_millis((1500.0 * scale) as u64).max(floor),
        max: Duration::from_millis((7000.0 * scale) as u64).max(floor),
    }
}

impl Generator for Lightning {
    fn instantiate(&self, ctx: &mut SpawnContext<'_>) -> Result<Box<dyn Behavior>> {
        ctx.params.validate().map_err(EngineError::Config)?;
        let cadence = strike_cadence(ctx.params.intensity, ctx.limits.min_cadence);
        let first = cadence.next_delay(ctx.rng);
        ctx.after(first, TimerTag::Custom(STRIKE));

        let rain = self.rain.map(|pattern| {
            let interval = scaled_interval(
                Duration::from_millis(pattern.interval_ms),
                ctx.params.intensity,
                ctx.limits.min_cadence,
            );
            ctx.every(interval, TimerTag::Cadence);
            PatternBehavior { pattern }
        });
        Ok(Box::new(LightningBehavior { cadence, rain }))
    }
}

struct LightningBehavior {
    cadence: Cadence,
    rain: Option<PatternBehavior>,
}

impl Behavior for LightningBehavior {
    fn on_timer(&mut self, tag: TimerTag, ctx: &mut SpawnContext<'_>) {
        match tag {
            TimerTag::Custom(STRIKE) => {
                strike(ctx);
                if ctx.rng.f32() < 0.35 {
                    ctx.after(Duration::from_millis(90), TimerTag::Custom(AFTERFLASH));
                }
                // redrawn after every strike so no period is perceptible
                let delay = self.cadence.next_delay(ctx.rng);
                ctx.after(delay, TimerTag::Custom(STRIKE));
            }
            TimerTag::Custom(AFTERFLASH) if ctx.has_room() => sky_flash(ctx, 0.2),
            TimerTag::Cadence => {
                if let Some(rain) = self.rain.as_mut() {
                    rain.spawn_tick(ctx);
                }
            }
            _ => {}
        }
    }

    fn on_expire(&mut self, element: Element, ctx: &mut SpawnContext<'_>) {
        if let Some(rain) = &self.rain {
            if matches!(element.trajectory, Trajectory::Fall { .. }) {
                react(&rain.pattern, &element, ctx);
            }
        }
    }
}

fn dim(color: Vec4, factor: f32) -> Vec4 {
    Vec4::new(color.x, color.y, color.z, color.w * factor)
}

fn sky_flash(ctx: &mut SpawnContext<'_>, strength: f32) {
    let color = dim(ctx.params.rgba(), strength);
    ctx.spawn(
        Trajectory::Flash {
            from: Vec2::new(0.0, 0.5),
            to: Vec2::new(1.0, 0.5),
        },
        Duration::from_millis(200),
        1.0,
        color,
        ElementRole::Secondary,
    );
}

fn strike(ctx: &mut SpawnContext<'_>) {
    let room = ctx.budget().saturating_sub(ctx.live());
    if room < 2 {
        trace!("lightning strike skipped, layer full");
        return;
    }
    sky_flash(ctx, 0.35);
    let origin = Vec2::new(0.15 + ctx.rng.f32() * 0.7, 0.0);
    let segments = bolt(ctx.rng, origin, room - 1);
    let color = ctx.params.rgba();
    let lifetime = scaled_lifetime(450, ctx);
    let size = ctx.params.size;
    for segment in segments {
        let width = if segment.depth == 0 { 0.006 } else { 0.003 };
        ctx.spawn(
            Trajectory::Flash {
                from: segment.from,
                to: segment.to,
            },
            lifetime,
            width * size,
            dim(color, 1.0 / (1.0 + segment.depth as f32)),
            ElementRole::Primary,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Vec2,
    pub to: Vec2,
    /// 0 for the main channel, 1+ for forks.
    pub depth: u8,
}

/// Random branching bolt from `origin` downward, at most `max_segments` long.
pub fn bolt(rng: &mut Rng, origin: Vec2, max_segments: usize) -> Vec<Segment> {
    let step = 1.0 / BOLT_STEPS as f32;
    let mut segments = Vec::new();
    // (start point, steps left, lateral spread, depth)
    let mut pending = vec![(origin, BOLT_STEPS, 0.06_f32, 0_u8)];

    while let Some((mut point, steps, spread, depth)) = pending.pop() {
        for remaining in (0..steps).rev() {
            if segments.len() >= max_segments {
                return segments;
            }
            let lean = if depth == 0 { 0.0 } else { spread * 0.5 };
            let next = point + Vec2::new((rng.f32() * 2.0 - 1.0) * spread + lean, step);
            segments.push(Segment {
                from: point,
                to: next,
                depth,
            });
            if depth < 2 && remaining > 1 && rng.f32() < 0.25 {
                let side = if rng.bool() { 1.0 } else { -1.0 };
                pending.push((next, remaining / 2, spread * 1.5 * side, depth + 1));
            }
            point = next;
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_channel_reaches_the_ground_and_is_connected() {
        let mut rng = Rng::with_seed(42);
        let segments = bolt(&mut rng, Vec2::new(0.5, 0.0), 100);
        let main: Vec<_> = segments.iter().filter(|s| s.depth == 0).collect();
        assert_eq!(main.len(), BOLT_STEPS);
        for pair in main.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert!((main[BOLT_STEPS - 1].to.y - 1.0).abs() < 1e-4);
        assert!(segments.iter().all(|s| s.to.y > s.from.y));
    }

    #[test]
    fn bolt_respects_segment_cap() {
        let mut rng = Rng::with_seed(5);
        assert_eq!(bolt(&mut rng, Vec2::new(0.5, 0.0), 4).len(), 4);
        assert!(bolt(&mut rng, Vec2::new(0.5, 0.0), 0).is_empty());
    }

    #[test]
    fn strike_delays_are_randomized_and_shrink_with_intensity() {
        let floor = Duration::from_millis(40);
        let calm = strike_cadence(0.0, floor);
        let wild = strike_cadence(100.0, floor);
        let mut rng = Rng::with_seed(9);
        let delays: Vec<_> = (0..20).map(|_| calm.next_delay(&mut rng)).collect();
        assert!(delays.windows(2).any(|w| w[0] != w[1]));
        match (calm, wild) {
            (Cadence::Jittered { max: calm_max, .. }, Cadence::Jittered { max: wild_max, .. }) => {
                assert!(wild_max < calm_max)
            }
            _ => panic!("lightning must use a jittered cadence"),
        }
    }
}
