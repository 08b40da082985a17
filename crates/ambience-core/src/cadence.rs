//! Spawn-timing policies.

use std::time::Duration;

use fastrand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// Recurring interval.
    Fixed(Duration),
    /// Fresh uniform delay in `[min, max]` drawn before every spawn.
    Jittered { min: Duration, max: Duration },
}

impl Cadence {
    /// Fixed cadence whose interval shrinks as intensity rises, never below `floor`.
    pub fn from_intensity(base: Duration, intensity: f32, floor: Duration) -> Self {
        Cadence::Fixed(scaled_interval(base, intensity, floor))
    }

    pub fn next_delay(&self, rng: &mut Rng) -> Duration {
        match *self {
            Cadence::Fixed(interval) => interval,
            Cadence::Jittered { min, max } => {
                if max <= min {
                    return min;
                }
                let span = (max - min).as_millis() as u64;
                min + Duration::from_millis(rng.u64(0..=span))
            }
        }
    }
}

/// `base` at intensity 0 down to a tenth of it at full intensity, clamped to `floor`.
pub fn scaled_interval(base: Duration, intensity: f32, floor: Duration) -> Duration {
    let fraction = (intensity / 100.0).clamp(0.0, 1.0);
    let millis = base.as_millis() as f32 * (1.0 - 0.9 * fraction);
    Duration::from_millis(millis.round() as u64).max(floor)
}
