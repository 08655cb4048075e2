use std::time::Duration;

/// Bounded retry with a per-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// No waiting between attempts.
    Immediate,
    /// After failed attempt `n` wait `base * n`.
    Linear(Duration),
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Linear(base_delay),
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Immediate,
        }
    }

    /// Delay to wait after `failed_attempt` (1-based) before the next one.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Linear(base) => base.saturating_mul(failed_attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_secs(2))
    }
}
