//! Bounded retries with a fixed schedule of delays.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

/// Source of waiting, replaced by a recording fake in tests.
pub trait Sleep {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A bounded number of attempts, each preceded by its own delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `delays[i]` is waited before attempt `i`; never empty.
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// One attempt per delay. An empty list means a single immediate attempt.
    pub fn with_delays(delays: Vec<Duration>) -> Self {
        let delays = if delays.is_empty() {
            vec![Duration::ZERO]
        } else {
            delays
        };
        Self { delays }
    }

    /// `attempts` attempts, the first immediately and the rest `interval` apart.
    pub fn fixed(attempts: usize, interval: Duration) -> Self {
        let delays = (0..attempts.max(1))
            .map(|i| if i == 0 { Duration::ZERO } else { interval })
            .collect();
        Self { delays }
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    /// Calls `op` with the 1-based attempt number until it succeeds or the
    /// attempts are used up, returning the last error in that case.
    pub fn run<T, E: Display>(
        &self,
        sleeper: &dyn Sleep,
        mut op: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut index = 0;
        loop {
            let delay = self.delays[index];
            if !delay.is_zero() {
                log::trace!(target: "retry", "Waiting {delay:?} before attempt {}", index + 1);
                sleeper.sleep(delay);
            }

            match op(index + 1) {
                Ok(value) => return Ok(value),
                Err(e) if index + 1 >= self.delays.len() => return Err(e),
                Err(e) => {
                    log::debug!(target: "retry", "Attempt {} of {} failed: {e}", index + 1, self.attempts());
                    index += 1;
                }
            }
        }
    }
}
