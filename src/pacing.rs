use std::thread;
use std::time::{Duration, Instant};

/// Fixed-interval frame pacing.
///
/// Keeps an absolute deadline for the next frame and sleeps only for whatever is left
/// of the interval once fetching and rendering are done, so per-frame work does not add
/// up to drift. When a frame overruns by more than a whole interval the schedule
/// restarts from the current time instead of bursting frames to catch up.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next: Instant,
}

impl Pacer {
    /// A zero interval disables pacing.
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    fn starting_at(interval: Duration, start: Instant) -> Self {
        Self { interval, next: start + interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left until the next frame is due, as seen at `now`.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    /// Restart the schedule so the next frame is due one interval from now.
    pub fn reset(&mut self) {
        self.next = Instant::now() + self.interval;
    }

    /// Block until the next frame is due. Returns how long it slept.
    pub fn wait(&mut self) -> Duration {
        if self.interval.is_zero() {
            return Duration::ZERO;
        }
        let slept = self.remaining(Instant::now());
        if !slept.is_zero() {
            thread::sleep(slept);
        }
        self.advance(Instant::now());
        slept
    }

    fn advance(&mut self, now: Instant) {
        self.next += self.interval;
        if self.next <= now {
            log::debug!("frame overran its slot by {:?}, resetting schedule", now - self.next);
            self.next = now + self.interval;
        }
    }
}
