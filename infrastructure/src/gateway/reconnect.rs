//! Reconnection backoff policy.

use std::time::Duration;

use crate::config::GatewayConfig;

/// Exponential backoff with a cap and an attempt budget.
///
/// Delay for attempt `n` (zero-based) is `base * 2^n`, clamped to `max`.
/// Once the budget is exhausted the policy yields `None` and the caller
/// gives up until the next explicit connect.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.reconnect_base_delay(),
            config.reconnect_max_delay(),
            config.reconnect_max_attempts,
        )
    }

    /// Delay before the given attempt, or `None` when the budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u64 << attempt.min(31);
        Some(self.base.saturating_mul(factor as u32).min(self.max))
    }
}

/// Mutable counter carried across a run of reconnect attempts. Reset to
/// zero on every successful handshake.
#[derive(Debug, Default)]
pub(crate) struct ReconnectState {
    pub attempts: u32,
}
