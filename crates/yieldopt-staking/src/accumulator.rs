//! Global reward-per-share accumulator.
//!
//! `acc_reward_per_share` is the cumulative reward earned by one unit of
//! staked principal since genesis, scaled by [`ACC_REWARD_SCALE`]. A
//! participant staking `amount` is owed
//!
//! ```text
//! amount * acc_reward_per_share / ACC_REWARD_SCALE - reward_debt
//! ```
//!
//! where `reward_debt` is the same product taken at its last interaction.
//!
//! Accrual is a pure projection ([`RewardPool::accrued`]): callers compute
//! the advanced pool, apply their own delta on the copy, and commit only
//! once every fallible step succeeded. Read-only queries use the same
//! projection without committing it.

use serde::{Deserialize, Serialize};
use yieldopt_types::{math, Amount, Timestamp, ACC_REWARD_SCALE};

use crate::emission::RewardSource;
use crate::Result;

/// Pool-wide accrual state shared by all participants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPool {
    /// Cumulative reward per staked unit, scaled. Never decreases.
    pub acc_reward_per_share: u128,
    /// Last time the accumulator was advanced.
    pub last_reward_time: Timestamp,
    /// Sum of all participants' staked principal.
    pub total_staked: Amount,
    /// Funded reward not yet allocated to participants.
    pub reward_reserve: Amount,
    /// Reward allocated through the accumulator but not yet paid out.
    pub allocated_rewards: Amount,
}

impl RewardPool {
    /// An empty pool starting its reward clock at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            acc_reward_per_share: 0,
            last_reward_time: now,
            total_staked: 0,
            reward_reserve: 0,
            allocated_rewards: 0,
        }
    }

    /// Project the pool forward to `now`.
    ///
    /// With nothing staked no reward is allocated but the clock still moves,
    /// so a later first staker is not credited for the empty interval.
    /// Emission is capped by `reward_reserve`. Allocation is rounded down;
    /// the remainder stays in the reserve.
    ///
    /// # Errors
    ///
    /// - [`crate::StakingError::Math`] on accumulator overflow
    pub fn accrued(&self, now: Timestamp, source: &dyn RewardSource) -> Result<Self> {
        let mut next = *self;
        if now <= self.last_reward_time {
            return Ok(next);
        }
        next.last_reward_time = now;
        if self.total_staked == 0 {
            return Ok(next);
        }

        let reward = source
            .emitted(self.last_reward_time, now)
            .min(self.reward_reserve);
        if reward == 0 {
            return Ok(next);
        }

        let increment = math::mul_div(reward, ACC_REWARD_SCALE, self.total_staked)?;
        let allocated = math::mul_div(increment, self.total_staked, ACC_REWARD_SCALE)?;

        next.acc_reward_per_share = math::add(self.acc_reward_per_share, increment)?;
        next.reward_reserve = math::sub(self.reward_reserve, allocated)?;
        next.allocated_rewards = math::add(self.allocated_rewards, allocated)?;
        Ok(next)
    }

    /// `amount * acc_reward_per_share / ACC_REWARD_SCALE`: the reward-debt
    /// snapshot for a stake of `amount` at the current accumulator.
    pub fn accumulated(&self, amount: Amount) -> Result<Amount> {
        Ok(math::mul_div(amount, self.acc_reward_per_share, ACC_REWARD_SCALE)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission::FixedRateEmission;

    fn staked_pool(total: Amount, reserve: Amount) -> RewardPool {
        RewardPool {
            total_staked: total,
            reward_reserve: reserve,
            ..RewardPool::new(1_000)
        }
    }

    #[test]
    fn test_accrual_spreads_reward_over_stake() {
        let source = FixedRateEmission::new(1);
        let pool = staked_pool(1_500, 10_000).accrued(1_150, &source).expect("accrue");
        assert_eq!(pool.acc_reward_per_share, 100_000_000_000);
        assert_eq!(pool.accumulated(1_500).expect("accumulated"), 150);
        assert_eq!(pool.allocated_rewards, 150);
        assert_eq!(pool.reward_reserve, 9_850);
        assert_eq!(pool.last_reward_time, 1_150);
    }

    #[test]
    fn test_empty_pool_advances_clock_only() {
        let source = FixedRateEmission::new(1_000);
        let pool = staked_pool(0, 10_000).accrued(2_000, &source).expect("accrue");
        assert_eq!(pool.acc_reward_per_share, 0);
        assert_eq!(pool.last_reward_time, 2_000);
        assert_eq!(pool.reward_reserve, 10_000);
    }

    #[test]
    fn test_emission_capped_by_reserve() {
        let source = FixedRateEmission::new(100);
        let pool = staked_pool(10, 50).accrued(1_100, &source).expect("accrue");
        assert_eq!(pool.allocated_rewards, 50);
        assert_eq!(pool.reward_reserve, 0);
    }

    #[test]
    fn test_past_timestamp_is_noop() {
        let source = FixedRateEmission::new(100);
        let pool = staked_pool(10, 50);
        assert_eq!(pool.accrued(999, &source).expect("accrue"), pool);
    }

    #[test]
    fn test_rounding_remainder_stays_in_reserve() {
        let source = FixedRateEmission::new(1);
        // 1 reward over 3 units: increment floors to 333_333_333_333,
        // which allocates 0 whole units back out of the reserve.
        let pool = staked_pool(3, 10).accrued(1_001, &source).expect("accrue");
        assert_eq!(pool.acc_reward_per_share, 333_333_333_333);
        assert_eq!(pool.allocated_rewards, 0);
        assert_eq!(pool.reward_reserve, 10);
    }

    #[test]
    fn test_accumulator_monotonic() {
        let source = FixedRateEmission::new(7);
        let mut pool = staked_pool(1_000, 1_000_000);
        let mut last = pool.acc_reward_per_share;
        for t in (1_010..1_200).step_by(10) {
            pool = pool.accrued(t, &source).expect("accrue");
            assert!(pool.acc_reward_per_share >= last);
            last = pool.acc_reward_per_share;
        }
    }

    #[test]
    fn test_token_scale_accumulation() {
        use yieldopt_types::UNITS_PER_TOKEN;

        // One token staked for 1e6 seconds at one token per second drives
        // the accumulator to 1e18; a million-token stake then snapshots a
        // 1e42 product before the division.
        let source = FixedRateEmission::new(UNITS_PER_TOKEN);
        let pool = staked_pool(UNITS_PER_TOKEN, 1_000_000_000 * UNITS_PER_TOKEN)
            .accrued(1_000 + 1_000_000, &source)
            .expect("accrue");
        assert_eq!(pool.acc_reward_per_share, 1_000_000_000_000_000_000);
        assert_eq!(pool.allocated_rewards, 1_000_000 * UNITS_PER_TOKEN);
        assert_eq!(
            pool.accumulated(1_000_000 * UNITS_PER_TOKEN)
                .expect("accumulated"),
            1_000_000_000_000 * UNITS_PER_TOKEN
        );
    }
}
