//! External reward emission schedule.
//!
//! The venue's own emission logic is opaque to the accounting engine: it
//! only asks how much reward was emitted over an interval. Emission is
//! further capped by the funded reserve inside the accumulator.

use serde::{Deserialize, Serialize};
use yieldopt_types::{Amount, Timestamp};

/// Reward emitted by the staking venue over time.
pub trait RewardSource: Send + Sync {
    /// Total reward emitted during `(from, to]`. Returns zero when `to <= from`.
    fn emitted(&self, from: Timestamp, to: Timestamp) -> Amount;
}

/// A constant per-second emission, optionally ending at a fixed time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedRateEmission {
    /// Reward emitted per second across all stakers.
    pub reward_per_second: Amount,
    /// No emission after this timestamp.
    pub ends_at: Option<Timestamp>,
}

impl FixedRateEmission {
    /// Emit `reward_per_second` forever.
    pub fn new(reward_per_second: Amount) -> Self {
        Self {
            reward_per_second,
            ends_at: None,
        }
    }

    /// Stop emitting at `ends_at`.
    pub fn until(self, ends_at: Timestamp) -> Self {
        Self {
            ends_at: Some(ends_at),
            ..self
        }
    }
}

impl RewardSource for FixedRateEmission {
    fn emitted(&self, from: Timestamp, to: Timestamp) -> Amount {
        let to = match self.ends_at {
            Some(end) => to.min(end),
            None => to,
        };
        if to <= from {
            return 0;
        }
        self.reward_per_second
            .saturating_mul(Amount::from(to - from))
    }
}
