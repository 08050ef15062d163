//! Bounded exponential backoff for polling loops

use crate::config::PollConfig;
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;

/// Tracks delay growth and the overall deadline of one polling loop
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    timeout: Duration,
    started: Instant,
    pub poll_count: u32,
}

impl Backoff {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            current: config.initial_backoff(),
            max: config.max_backoff(),
            timeout: config.timeout(),
            started: Instant::now(),
            poll_count: 0,
        }
    }

    /// Delay before the next poll; doubles every call up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fail with [`Error::PollTimeout`] once the deadline has passed
    pub fn check_deadline(&mut self, what: &str) -> Result<()> {
        self.poll_count += 1;
        let waited = self.elapsed();
        if waited >= self.timeout {
            return Err(Error::PollTimeout {
                what: what.to_string(),
                waited,
            });
        }
        Ok(())
    }

    /// Sleep for the next delay, never past the deadline
    pub async fn wait(&mut self, what: &str) -> Result<()> {
        self.check_deadline(what)?;
        let remaining = self.timeout.saturating_sub(self.elapsed());
        let delay = self.next_delay().min(remaining);
        tracing::trace!("Waiting {:?} before polling {} again", delay, what);
        tokio::time::sleep(delay).await;
        Ok(())
    }
}
