use std::cmp;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LiveError, Result};

const BASE_DELAY_MS: u64 = 2_500;
const MAX_DELAY_MS: u64 = 30_000;
const MAX_RETRIES: u32 = 20;

/// Reconnect policy for the live channel: `min(base * 2^k, max)` for the
/// k-th retry, and no retry at all once `k` reaches `max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            max_retries: MAX_RETRIES,
        }
    }
}

impl BackoffPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(cmp::min(delay, self.max_delay_ms))
    }

    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(LiveError::InvalidInput(
                "backoff.base_delay_ms must be positive".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(LiveError::InvalidInput(
                "backoff.max_delay_ms must be at least base_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
