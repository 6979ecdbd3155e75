//! Idle backoff for the background workers
//!
//! While a queue stays empty the worker sleeps for the current interval and
//! then lengthens it by a fixed step, capped at the ceiling. The first cycle
//! that finds work resets the interval to the floor.

use crowdq_common::config::IdleBackoffConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct IdleBackoff {
    floor: Duration,
    step: Duration,
    ceiling: Duration,
    current: Duration,
}

impl IdleBackoff {
    pub fn new(floor: Duration, step: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            step,
            ceiling,
            current: floor,
        }
    }

    pub fn from_config(config: &IdleBackoffConfig) -> Self {
        Self::new(config.floor(), config.step(), config.ceiling())
    }

    /// Interval to sleep for this idle cycle; advances the next one
    pub fn next_idle(&mut self) -> Duration {
        let interval = self.current;
        self.current = (self.current + self.step).min(self.ceiling);
        interval
    }

    /// Work appeared: start over from the floor
    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for IdleBackoff {
    fn default() -> Self {
        Self::from_config(&IdleBackoffConfig::default())
    }
}
