//! Cooperative, single-threaded timer queue over a virtual clock.
//!
//! Nothing here sleeps or spawns threads. The host advances the clock and the
//! scheduler hands back every timer that came due, in deadline order, one at a
//! time. Ties fire in the order they were armed.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::trace;

use crate::surface::ElementId;

/// Smallest delay a timer can be armed with, so a callback never re-arms itself
/// for the instant that is currently being drained.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Identity of the running instance a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// What a timer means to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTag {
    /// The recurring (or self re-arming) spawn cadence.
    Cadence,
    /// End of a particle's lifetime.
    Expire(ElementId),
    /// Generator-specific timer.
    Custom(u32),
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub handle: TimerHandle,
    pub owner: OwnerId,
    pub tag: TimerTag,
    /// Repeating timers stay armed after firing.
    pub repeating: bool,
}

#[derive(Debug, Clone)]
struct Timer {
    owner: OwnerId,
    tag: TimerTag,
    period: Option<Duration>,
    slot: (Duration, u64),
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    seq: u64,
    next_handle: u64,
    created: u64,
    queue: BTreeMap<(Duration, u64), TimerHandle>,
    timers: HashMap<TimerHandle, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn set_timeout(&mut self, owner: OwnerId, delay: Duration, tag: TimerTag) -> TimerHandle {
        self.arm(owner, delay, None, tag)
    }

    /// Repeating timer; first fires one `period` from now.
    pub fn set_interval(&mut self, owner: OwnerId, period: Duration, tag: TimerTag) -> TimerHandle {
        let period = period.max(MIN_DELAY);
        self.arm(owner, period, Some(period), tag)
    }

    fn arm(
        &mut self,
        owner: OwnerId,
        delay: Duration,
        period: Option<Duration>,
        tag: TimerTag,
    ) -> TimerHandle {
        self.next_handle += 1;
        self.created += 1;
        let handle = TimerHandle(self.next_handle);
        let slot = self.enqueue(handle, self.now + delay.max(MIN_DELAY));
        self.timers.insert(
            handle,
            Timer {
                owner,
                tag,
                period,
                slot,
            },
        );
        handle
    }

    fn enqueue(&mut self, handle: TimerHandle, deadline: Duration) -> (Duration, u64) {
        self.seq += 1;
        let slot = (deadline, self.seq);
        self.queue.insert(slot, handle);
        slot
    }

    /// Returns false when the handle already fired (one-shot) or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.timers.remove(&handle) {
            Some(timer) => {
                self.queue.remove(&timer.slot);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn pending_for(&self, owner: OwnerId) -> usize {
        self.timers.values().filter(|t| t.owner == owner).count()
    }

    /// Total timers ever armed.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Time until the earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue
            .keys()
            .next()
            .map(|(deadline, _)| deadline.saturating_sub(self.now))
    }

    /// Pops the earliest timer due at or before `until`, moving the clock to its deadline.
    pub fn pop_due(&mut self, until: Duration) -> Option<Fired> {
        let (&slot, &handle) = self.queue.iter().next()?;
        if slot.0 > until {
            return None;
        }
        self.queue.remove(&slot);
        self.now = self.now.max(slot.0);

        let timer = self.timers.get(&handle)?.clone();
        let fired = Fired {
            handle,
            owner: timer.owner,
            tag: timer.tag,
            repeating: timer.period.is_some(),
        };
        match timer.period {
            Some(period) => {
                let next = self.enqueue(handle, slot.0 + period);
                if let Some(entry) = self.timers.get_mut(&handle) {
                    entry.slot = next;
                }
            }
            None => {
                self.timers.remove(&handle);
            }
        }
        trace!(?fired, now = ?self.now, "timer fired");
        Some(fired)
    }

    /// Advances the clock by `dt`, handing each due timer to `dispatch` in order.
    ///
    /// `dispatch` may arm or cancel timers; newly armed timers that fall inside
    /// the window fire during the same call.
    pub fn advance<F>(&mut self, dt: Duration, mut dispatch: F) -> usize
    where
        F: FnMut(&mut Scheduler, Fired),
    {
        let until = self.now + dt;
        let mut count = 0;
        while let Some(fired) = self.pop_due(until) {
            dispatch(self, fired);
            count += 1;
        }
        self.now = until;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: OwnerId = OwnerId(1);
    const B: OwnerId = OwnerId(2);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn fires_in_deadline_order_with_ties_in_arm_order() {
        let mut scheduler = Scheduler::new();
        let late = scheduler.set_timeout(A, ms(30), TimerTag::Custom(3));
        let first = scheduler.set_timeout(B, ms(10), TimerTag::Custom(1));
        let tie = scheduler.set_timeout(A, ms(10), TimerTag::Custom(2));

        let mut order = Vec::new();
        scheduler.advance(ms(50), |_, fired| order.push(fired.handle));
        assert_eq!(order, vec![first, tie, late]);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.now(), ms(50));
    }

    #[test]
    fn interval_rearms_until_cancelled() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.set_interval(A, ms(100), TimerTag::Cadence);
        let fired = scheduler.advance(ms(450), |_, _| {});
        assert_eq!(fired, 4);
        assert!(scheduler.is_pending(handle));
        assert_eq!(scheduler.next_deadline(), Some(ms(50)));

        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert_eq!(scheduler.advance(ms(1000), |_, _| {}), 0);
    }

    #[test]
    fn callbacks_can_arm_timers_inside_the_window() {
        let mut scheduler = Scheduler::new();
        scheduler.set_timeout(A, ms(10), TimerTag::Custom(0));
        let mut seen = 0;
        scheduler.advance(ms(100), |sched, fired| {
            seen += 1;
            if let TimerTag::Custom(n) = fired.tag {
                if n < 3 {
                    sched.set_timeout(fired.owner, ms(10), TimerTag::Custom(n + 1));
                }
            }
        });
        assert_eq!(seen, 4);
        assert_eq!(scheduler.created(), 4);
    }

    #[test]
    fn zero_delay_is_clamped() {
        let mut scheduler = Scheduler::new();
        scheduler.set_timeout(A, Duration::ZERO, TimerTag::Cadence);
        assert_eq!(scheduler.advance(Duration::ZERO, |_, _| {}), 0);
        assert_eq!(scheduler.advance(MIN_DELAY, |_, _| {}), 1);
    }

    #[test]
    fn pending_counts_per_owner() {
        let mut scheduler = Scheduler::new();
        scheduler.set_interval(A, ms(5), TimerTag::Cadence);
        scheduler.set_timeout(A, ms(5), TimerTag::Custom(0));
        scheduler.set_timeout(B, ms(5), TimerTag::Custom(0));
        assert_eq!(scheduler.pending_for(A), 2);
        assert_eq!(scheduler.pending_for(B), 1);
    }
}
