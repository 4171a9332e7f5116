use std::time::Duration;

use crate::config::ReconnectConfig;

/// Where the broker path stands with respect to reconnecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPhase {
    Connected,
    Reconnecting,
    /// Terminal: no further attempts are made
    GivenUp,
}

/// Exponential backoff schedule for broker reconnects
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    rate: u32,
    max_delay: Duration,
    max_attempts: u32,
    phase: ReconnectPhase,
    attempts: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, rate: u32, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            rate: rate.max(1),
            max_delay,
            max_attempts,
            phase: ReconnectPhase::Connected,
            attempts: 0,
            delay: base_delay,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            config.first_delay(),
            config.rate,
            config.max_delay(),
            config.max_attempts,
        )
    }

    pub fn phase(&self) -> ReconnectPhase {
        self.phase
    }

    /// Consecutive failed attempts since the last disconnect
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Transport dropped; start a fresh backoff sequence
    pub fn on_disconnect(&mut self) {
        if self.phase == ReconnectPhase::GivenUp {
            return;
        }
        self.phase = ReconnectPhase::Reconnecting;
        self.attempts = 0;
        self.delay = self.base_delay;
    }

    /// Wait before the next attempt, or `None` when no attempt should be made
    pub fn next_delay(&self) -> Option<Duration> {
        match self.phase {
            ReconnectPhase::Reconnecting => Some(self.delay),
            ReconnectPhase::Connected | ReconnectPhase::GivenUp => None,
        }
    }

    pub fn record_success(&mut self) {
        if self.phase == ReconnectPhase::GivenUp {
            return;
        }
        self.phase = ReconnectPhase::Connected;
        self.attempts = 0;
        self.delay = self.base_delay;
    }

    /// Count a failed attempt and grow the delay; returns the resulting phase
    pub fn record_failure(&mut self) -> ReconnectPhase {
        if self.phase != ReconnectPhase::Reconnecting {
            return self.phase;
        }
        self.attempts = self.attempts.saturating_add(1);
        self.delay = self
            .delay
            .saturating_mul(self.rate)
            .min(self.max_delay);
        if self.attempts >= self.max_attempts {
            self.phase = ReconnectPhase::GivenUp;
        }
        self.phase
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}
