//! Motion primitives. A trajectory is a pure function of normalized progress.

use std::f32::consts::{PI, TAU};

use fastrand::Rng;
use glam::Vec2;

use crate::params::Direction;

/// Sampled state of an element at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub opacity: f32,
    pub rotation: f32,
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trajectory {
    /// Straight travel across the surface with sideways sway.
    Fall {
        start: Vec2,
        velocity: Vec2,
        sway: f32,
        sway_cycles: f32,
        spin: f32,
    },
    /// Wander around an anchor with a pulsing glow.
    Float {
        anchor: Vec2,
        radius: f32,
        phase: f32,
        pulses: f32,
    },
    /// Climb while wobbling and fading out.
    Rise {
        start: Vec2,
        velocity: Vec2,
        wobble: f32,
    },
    /// Stay put and flicker.
    Twinkle { at: Vec2, pulses: f32 },
    /// Slow band crossing the surface with a vertical undulation.
    Sweep {
        start: Vec2,
        velocity: Vec2,
        amplitude: f32,
    },
    /// Thrown outward from a point, decelerating under gravity.
    Burst {
        origin: Vec2,
        velocity: Vec2,
        gravity: f32,
    },
    /// Orbit a vertical axis while climbing.
    Spiral {
        base: Vec2,
        radius: f32,
        turns: f32,
        climb: f32,
        phase: f32,
    },
    /// A lit segment: full brightness, brief flicker, then decay.
    Flash { from: Vec2, to: Vec2 },
}

/// Fade in over the first and out over the last `edge` of the lifetime.
fn envelope(t: f32, edge: f32) -> f32 {
    (t / edge).min(1.0).min((1.0 - t) / edge).clamp(0.0, 1.0)
}

impl Trajectory {
    pub fn sample(&self, t: f32) -> Pose {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Trajectory::Fall {
                start,
                velocity,
                sway,
                sway_cycles,
                spin,
            } => {
                let across = velocity.perp().normalize_or_zero();
                let offset = across * (t * sway_cycles * TAU).sin() * sway;
                Pose {
                    position: start + velocity * t + offset,
                    opacity: envelope(t, 0.1),
                    rotation: spin * t * TAU,
                    scale: 1.0,
                }
            }
            Trajectory::Float {
                anchor,
                radius,
                phase,
                pulses,
            } => {
                let angle = phase + t * TAU;
                let position =
                    anchor + Vec2::new((angle * 0.7).cos(), (angle * 1.3).sin() * 0.6) * radius;
                let glow = 0.5 + 0.5 * (phase + t * pulses * TAU).sin();
                Pose {
                    position,
                    opacity: glow * envelope(t, 0.2),
                    rotation: 0.0,
                    scale: 0.8 + 0.2 * glow,
                }
            }
            Trajectory::Rise {
                start,
                velocity,
                wobble,
            } => Pose {
                position: start + velocity * t + Vec2::new((t * 2.0 * TAU).sin() * wobble, 0.0),
                opacity: (1.0 - t) * (t / 0.05).min(1.0),
                rotation: 0.0,
                scale: 1.0 - 0.3 * t,
            },
            Trajectory::Twinkle { at, pulses } => Pose {
                position: at,
                opacity: (t * PI).sin() * (0.6 + 0.4 * (t * pulses * TAU).cos()),
                rotation: 0.0,
                scale: 1.0,
            },
            Trajectory::Sweep {
                start,
                velocity,
                amplitude,
            } => Pose {
                position: start + velocity * t + Vec2::new(0.0, (t * TAU).sin() * amplitude),
                opacity: (t * PI).sin(),
                rotation: 0.0,
                scale: 1.0,
            },
            Trajectory::Burst {
                origin,
                velocity,
                gravity,
            } => Pose {
                position: origin + velocity * (t * (1.0 - 0.5 * t)) + Vec2::new(0.0, gravity * t * t),
                opacity: 1.0 - t,
                rotation: 0.0,
                scale: 1.0 - 0.5 * t,
            },
            Trajectory::Spiral {
                base,
                radius,
                turns,
                climb,
                phase,
            } => {
                let angle = phase + turns * TAU * t;
                let r = radius * (0.3 + 0.7 * t);
                Pose {
                    position: base + Vec2::new(angle.cos() * r, -climb * t),
                    opacity: envelope(t, 0.15),
                    rotation: angle,
                    scale: 0.6 + 0.4 * t,
                }
            }
            Trajectory::Flash { from, to } => {
                let span = to - from;
                let opacity = if t < 0.15 {
                    1.0
                } else if t < 0.3 {
                    0.4 + 0.6 * ((t - 0.15) * 40.0).cos().abs()
                } else {
                    (1.0 - t) / 0.7
                };
                Pose {
                    position: from + span * 0.5,
                    opacity: opacity.clamp(0.0, 1.0),
                    rotation: span.y.atan2(span.x),
                    scale: span.length(),
                }
            }
        }
    }

    /// Where the element ends up at the end of its lifetime.
    pub fn terminal(&self) -> Vec2 {
        self.sample(1.0).position
    }
}

/// Resolves `Random` to one of the four concrete directions.
pub fn resolve_direction(direction: Direction, rng: &mut Rng) -> Direction {
    match direction {
        Direction::Random => match rng.u8(0..4) {
            0 => Direction::Down,
            1 => Direction::Up,
            2 => Direction::Left,
            _ => Direction::Right,
        },
        other => other,
    }
}

/// Entry point on the edge opposite to travel and the unit travel vector.
pub fn entry(direction: Direction, rng: &mut Rng) -> (Vec2, Vec2) {
    let along = rng.f32();
    match resolve_direction(direction, rng) {
        Direction::Up => (Vec2::new(along, 1.05), Vec2::NEG_Y),
        Direction::Left => (Vec2::new(1.05, along), Vec2::NEG_X),
        Direction::Right => (Vec2::new(-0.05, along), Vec2::X),
        _ => (Vec2::new(along, -0.05), Vec2::Y),
    }
}

/// Uniform point inside the surface with a margin.
pub fn anywhere(rng: &mut Rng, margin: f32) -> Vec2 {
    let span = 1.0 - 2.0 * margin;
    Vec2::new(margin + rng.f32() * span, margin + rng.f32() * span)
}

/// Uniform value in `[center * (1 - spread), center * (1 + spread)]`.
pub fn jitter(rng: &mut Rng, center: f32, spread: f32) -> f32 {
    center * (1.0 + (rng.f32() * 2.0 - 1.0) * spread)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn fall_crosses_the_surface() {
        let fall = Trajectory::Fall {
            start: Vec2::new(0.5, -0.05),
            velocity: Vec2::new(0.0, 1.1),
            sway: 0.0,
            sway_cycles: 1.0,
            spin: 0.0,
        };
        assert!(close(fall.sample(0.0).position, Vec2::new(0.5, -0.05)));
        assert!(close(fall.terminal(), Vec2::new(0.5, 1.05)));
        assert_eq!(fall.sample(0.0).opacity, 0.0);
        assert_eq!(fall.sample(0.5).opacity, 1.0);
    }

    #[test]
    fn sampling_is_deterministic_and_clamped() {
        let spiral = Trajectory::Spiral {
            base: Vec2::new(0.5, 1.0),
            radius: 0.1,
            turns: 3.0,
            climb: 0.8,
            phase: 0.4,
        };
        assert_eq!(spiral.sample(0.37), spiral.sample(0.37));
        assert_eq!(spiral.sample(2.0), spiral.sample(1.0));
        assert!(spiral.terminal().y < 0.3);
    }

    #[test]
    fn burst_fades_to_nothing() {
        let burst = Trajectory::Burst {
            origin: Vec2::splat(0.5),
            velocity: Vec2::new(0.2, -0.2),
            gravity: 0.1,
        };
        assert_eq!(burst.sample(1.0).opacity, 0.0);
        assert!(burst.sample(0.2).opacity > 0.5);
    }

    #[test]
    fn entry_points_sit_on_the_opposite_edge() {
        let mut rng = Rng::with_seed(7);
        let (start, dir) = entry(Direction::Up, &mut rng);
        assert_eq!(dir, Vec2::NEG_Y);
        assert!(start.y > 1.0);
        let (start, dir) = entry(Direction::Right, &mut rng);
        assert_eq!(dir, Vec2::X);
        assert!(start.x < 0.0);
        for _ in 0..20 {
            assert_ne!(resolve_direction(Direction::Random, &mut rng), Direction::Random);
        }
    }

    #[test]
    fn flash_spans_its_segment() {
        let flash = Trajectory::Flash {
            from: Vec2::new(0.5, 0.0),
            to: Vec2::new(0.5, 0.2),
        };
        let pose = flash.sample(0.05);
        assert_eq!(pose.opacity, 1.0);
        assert!((pose.scale - 0.2).abs() < 1e-6);
        assert!(close(pose.position, Vec2::new(0.5, 0.1)));
    }
}
