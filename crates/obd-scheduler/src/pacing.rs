//! Cycle pacing and interruptible sleeps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Delay before the next cycle: the rest of the interval plus the settle time.
///
/// An overrun cycle yields just the settle time, never a negative wait.
pub fn pacing_delay(interval: Duration, elapsed: Duration, settle: Duration) -> Duration {
    interval.saturating_sub(elapsed) + settle
}

/// Sleeps of the acquisition loop, cut short when the loop is stopped.
///
/// Waiting threads park; [`AcquisitionScheduler::stop`](crate::AcquisitionScheduler::stop)
/// clears the flag and unparks them.
#[derive(Debug, Clone)]
pub struct Pacer {
    running: Arc<AtomicBool>,
    interval: Duration,
    settle: Duration,
    no_data_pause: Duration,
}

impl Pacer {
    pub fn new(
        running: Arc<AtomicBool>,
        interval: Duration,
        settle: Duration,
        no_data_pause: Duration,
    ) -> Self {
        Self {
            running,
            interval,
            settle,
            no_data_pause,
        }
    }

    /// Pacer with no waits, for driving single cycles by hand
    pub fn immediate() -> Self {
        Self::new(
            Arc::new(AtomicBool::new(true)),
            Duration::ZERO,
            Duration::ZERO,
            Duration::ZERO,
        )
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Park for up to `duration`. Returns whether the loop is still running.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
        self.is_running()
    }

    /// Back off after the vehicle did not answer
    pub fn pause_after_no_data(&self) -> bool {
        self.sleep(self.no_data_pause)
    }

    /// Wait out the remainder of a cycle that started at `cycle_start`
    pub fn finish_cycle(&self, cycle_start: Instant) -> bool {
        self.sleep(pacing_delay(
            self.interval,
            cycle_start.elapsed(),
            self.settle,
        ))
    }
}
