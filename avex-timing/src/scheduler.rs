use crate::timer::Timer;
use std::time::Duration;
use tracing::trace;

/// Handle of one armed single-shot timer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Host capability to run a callback after a delay.
///
/// The callback itself is not stored here: the host delivers the returned id
/// back to its owner once the delay has elapsed.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId;
    fn cancel(&mut self, id: TimerId);
}

/// Single-shot deadlines measured against a `Timer`
#[derive(Debug, Clone)]
pub struct DeadlineScheduler<T: Timer> {
    timer: T,
    next_id: u64,
    pending: Vec<(TimerId, u64)>,
}

impl<T: Timer> DeadlineScheduler<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.iter().any(|(p, _)| *p == id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Earliest armed deadline in timer nanoseconds
    pub fn next_deadline(&self) -> Option<(TimerId, u64)> {
        self.pending
            .iter()
            .copied()
            .min_by_key(|(id, deadline)| (*deadline, *id))
    }

    /// Removes and returns every timer whose deadline has passed, earliest first
    pub fn poll(&mut self) -> Vec<TimerId> {
        let now = self.timer.now();
        let mut expired: Vec<(TimerId, u64)> = self
            .pending
            .iter()
            .copied()
            .filter(|(_, deadline)| *deadline <= now)
            .collect();
        self.pending.retain(|(_, deadline)| *deadline > now);
        expired.sort_by_key(|(id, deadline)| (*deadline, *id));
        expired.into_iter().map(|(id, _)| id).collect()
    }

    /// Sleeps until the earliest deadline and fires it.
    ///
    /// Returns `None` without sleeping when nothing is armed.
    pub fn wait_next(&mut self) -> Option<TimerId> {
        let (id, deadline) = self.next_deadline()?;
        let now = self.timer.now();
        if deadline > now {
            self.timer.sleep(Duration::from_nanos(deadline - now));
        }
        self.pending.retain(|(p, _)| *p != id);
        Some(id)
    }
}

impl<T: Timer> Scheduler for DeadlineScheduler<T> {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let deadline = self.timer.now() + delay.as_nanos() as u64;
        self.pending.push((id, deadline));
        trace!("armed timer {:?} for {:?}", id, delay);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.pending.retain(|(p, _)| *p != id);
    }
}
