//! Per-participant stake records and the staking operations.
//!
//! The staking ledger custodies base asset in its own account on the base
//! ledger. The base ledger is passed into each call rather than held, so
//! the ledger owns nothing but its bookkeeping.
//!
//! Every mutating operation follows the same order:
//!
//! 1. authority and argument checks
//! 2. project the accumulator to the current time
//! 3. settle the participant's pending reward and apply the delta, on copies
//! 4. the single base-asset transfer
//! 5. commit pool and record
//!
//! A failure at any step leaves the ledger exactly as it was.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use yieldopt_ledger::BaseAssetLedger;
use yieldopt_types::{math, AccountId, Amount};

use crate::accumulator::RewardPool;
use crate::clock::Clock;
use crate::emission::RewardSource;
use crate::{Result, StakingError};

/// One participant's position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    /// Principal currently staked.
    pub amount: Amount,
    /// Accumulated-reward snapshot at the last interaction.
    pub reward_debt: Amount,
    /// Reward settled by `stake` and held until `claim` or `unstake`.
    pub claimable: Amount,
}

/// Result of an unstake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unstaked {
    /// Principal returned.
    pub principal: Amount,
    /// Reward settled and paid together with the principal.
    pub reward: Amount,
}

/// Consistent copy of the ledger's bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingSnapshot {
    /// Accumulator state.
    pub pool: RewardPool,
    /// All records, keyed by participant.
    pub records: BTreeMap<AccountId, StakeRecord>,
}

/// The staking venue's bookkeeping.
pub struct StakingLedger {
    identity: AccountId,
    owner: Option<AccountId>,
    pool: RewardPool,
    records: HashMap<AccountId, StakeRecord>,
    source: Box<dyn RewardSource>,
    clock: Arc<dyn Clock>,
}

impl StakingLedger {
    /// Create a ledger custodying funds in `identity`'s base-asset account.
    ///
    /// With an `owner`, only the owner may stake, unstake or claim. Without
    /// one, every caller acts for itself.
    pub fn new(
        identity: AccountId,
        owner: Option<AccountId>,
        source: Box<dyn RewardSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pool = RewardPool::new(clock.now());
        Self {
            identity,
            owner,
            pool,
            records: HashMap::new(),
            source,
            clock,
        }
    }

    /// The venue's base-asset account.
    pub fn identity(&self) -> &AccountId {
        &self.identity
    }

    /// The stake authority, if restricted.
    pub fn owner(&self) -> Option<&AccountId> {
        self.owner.as_ref()
    }

    /// Whether `caller` may stake, unstake and claim.
    pub fn is_authorized(&self, caller: &AccountId) -> bool {
        self.owner.as_ref().map_or(true, |owner| owner == caller)
    }

    /// Hand stake authority to `new_owner`.
    ///
    /// # Errors
    ///
    /// - [`StakingError::Unauthorized`] unless `caller` is the current owner
    pub fn transfer_ownership(&mut self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        if self.owner.as_ref() != Some(caller) {
            return Err(StakingError::Unauthorized { caller: *caller });
        }
        tracing::info!(
            from = %caller.short(),
            to = %new_owner.short(),
            "stake authority transferred"
        );
        self.owner = Some(new_owner);
        Ok(())
    }

    /// Committed accumulator state.
    pub fn pool(&self) -> &RewardPool {
        &self.pool
    }

    /// Record of `participant`, zeroed if it never staked.
    pub fn record(&self, participant: &AccountId) -> StakeRecord {
        self.records.get(participant).copied().unwrap_or_default()
    }

    /// Principal staked by `participant`.
    pub fn staked_of(&self, participant: &AccountId) -> Amount {
        self.record(participant).amount
    }

    /// Principal staked by everyone.
    pub fn total_staked(&self) -> Amount {
        self.pool.total_staked
    }

    /// Base asset the venue can currently pay out.
    pub fn available_liquidity(&self, assets: &dyn BaseAssetLedger) -> Amount {
        assets.balance_of(&self.identity)
    }

    /// Consistent copy of pool and records.
    pub fn snapshot(&self) -> StakingSnapshot {
        StakingSnapshot {
            pool: self.pool,
            records: self.records.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }

    /// Reward `participant` could claim right now. Never mutates state.
    ///
    /// # Errors
    ///
    /// - [`StakingError::Math`] on accumulator overflow
    pub fn pending_rewards(&self, participant: &AccountId) -> Result<Amount> {
        let pool = self.pool.accrued(self.clock.now(), self.source.as_ref())?;
        let record = self.record(participant);
        Ok(math::add(record.claimable, settle(&pool, &record)?)?)
    }

    /// Advance the accumulator to the current time.
    ///
    /// # Errors
    ///
    /// - [`StakingError::Math`] on accumulator overflow
    pub fn update_pool(&mut self) -> Result<&RewardPool> {
        self.pool = self.pool.accrued(self.clock.now(), self.source.as_ref())?;
        Ok(&self.pool)
    }

    /// Add `amount` of `funder`'s base asset to the reward reserve.
    ///
    /// # Errors
    ///
    /// - [`StakingError::InvalidAmount`] if `amount` is zero
    /// - [`StakingError::Transfer`] if the funder cannot pay
    pub fn fund_rewards(
        &mut self,
        assets: &mut dyn BaseAssetLedger,
        funder: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount);
        }
        let mut pool = self.pool.accrued(self.clock.now(), self.source.as_ref())?;
        pool.reward_reserve = math::add(pool.reward_reserve, amount)?;
        assets.transfer(funder, &self.identity, amount)?;
        self.pool = pool;
        tracing::info!(
            funder = %funder.short(),
            amount,
            reserve = pool.reward_reserve,
            "reward reserve funded"
        );
        Ok(())
    }

    /// Stake `amount` of `caller`'s base asset for `participant`.
    ///
    /// Reward pending on the existing stake is moved to the record's
    /// claimable balance. Returns the amount so settled.
    ///
    /// # Errors
    ///
    /// - [`StakingError::Unauthorized`] if `caller` lacks stake authority
    /// - [`StakingError::InvalidAmount`] if `amount` is zero
    /// - [`StakingError::Transfer`] if `caller` cannot pay
    pub fn stake(
        &mut self,
        assets: &mut dyn BaseAssetLedger,
        caller: &AccountId,
        participant: &AccountId,
        amount: Amount,
    ) -> Result<Amount> {
        self.ensure_authorized(caller)?;
        if amount == 0 {
            return Err(StakingError::InvalidAmount);
        }

        let mut pool = self.pool.accrued(self.clock.now(), self.source.as_ref())?;
        let mut record = self.record(participant);
        let pending = settle(&pool, &record)?;

        record.claimable = math::add(record.claimable, pending)?;
        record.amount = math::add(record.amount, amount)?;
        record.reward_debt = pool.accumulated(record.amount)?;
        pool.total_staked = math::add(pool.total_staked, amount)?;

        assets.transfer(caller, &self.identity, amount)?;

        self.commit(pool, participant, record);
        tracing::debug!(
            participant = %participant.short(),
            amount,
            settled = pending,
            staked = record.amount,
            total_staked = pool.total_staked,
            "staked"
        );
        Ok(pending)
    }

    /// Return `amount` of `participant`'s principal, plus all reward owed,
    /// to `caller`. The record stays in place at zero when fully unstaked.
    ///
    /// # Errors
    ///
    /// - [`StakingError::Unauthorized`] if `caller` lacks stake authority
    /// - [`StakingError::InsufficientStake`] unless `0 < amount <= staked`
    /// - [`StakingError::InsufficientLiquidity`] if the venue cannot pay out
    pub fn unstake(
        &mut self,
        assets: &mut dyn BaseAssetLedger,
        caller: &AccountId,
        participant: &AccountId,
        amount: Amount,
    ) -> Result<Unstaked> {
        self.ensure_authorized(caller)?;
        let mut record = self.record(participant);
        if amount == 0 || amount > record.amount {
            return Err(StakingError::InsufficientStake {
                available: record.amount,
                requested: amount,
            });
        }

        let mut pool = self.pool.accrued(self.clock.now(), self.source.as_ref())?;
        let reward = math::add(record.claimable, settle(&pool, &record)?)?;

        record.claimable = 0;
        record.amount -= amount;
        record.reward_debt = pool.accumulated(record.amount)?;
        pool.total_staked = math::sub(pool.total_staked, amount)?;
        pool.allocated_rewards = pool.allocated_rewards.saturating_sub(reward);

        let payout = math::add(amount, reward)?;
        self.ensure_liquidity(&*assets, payout)?;
        assets.transfer(&self.identity, caller, payout)?;

        self.commit(pool, participant, record);
        tracing::debug!(
            participant = %participant.short(),
            amount,
            reward,
            staked = record.amount,
            total_staked = pool.total_staked,
            "unstaked"
        );
        Ok(Unstaked {
            principal: amount,
            reward,
        })
    }

    /// Pay all reward owed to `participant` to `caller`, leaving the stake
    /// untouched. Returns zero when nothing is owed.
    ///
    /// # Errors
    ///
    /// - [`StakingError::Unauthorized`] if `caller` lacks stake authority
    /// - [`StakingError::InsufficientLiquidity`] if the venue cannot pay out
    pub fn claim(
        &mut self,
        assets: &mut dyn BaseAssetLedger,
        caller: &AccountId,
        participant: &AccountId,
    ) -> Result<Amount> {
        self.ensure_authorized(caller)?;

        let mut pool = self.pool.accrued(self.clock.now(), self.source.as_ref())?;
        let mut record = self.record(participant);
        let reward = math::add(record.claimable, settle(&pool, &record)?)?;

        record.claimable = 0;
        record.reward_debt = pool.accumulated(record.amount)?;
        pool.allocated_rewards = pool.allocated_rewards.saturating_sub(reward);

        if reward > 0 {
            self.ensure_liquidity(&*assets, reward)?;
            assets.transfer(&self.identity, caller, reward)?;
        }

        self.commit(pool, participant, record);
        tracing::debug!(participant = %participant.short(), reward, "claimed");
        Ok(reward)
    }

    fn ensure_authorized(&self, caller: &AccountId) -> Result<()> {
        if !self.is_authorized(caller) {
            tracing::warn!(caller = %caller.short(), "stake authority check failed");
            return Err(StakingError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn ensure_liquidity(&self, assets: &dyn BaseAssetLedger, required: Amount) -> Result<()> {
        let available = self.available_liquidity(assets);
        if available < required {
            tracing::warn!(available, required, "venue cannot cover payout");
            return Err(StakingError::InsufficientLiquidity {
                available,
                required,
            });
        }
        Ok(())
    }

    fn commit(&mut self, pool: RewardPool, participant: &AccountId, record: StakeRecord) {
        self.pool = pool;
        self.records.insert(*participant, record);
    }
}

/// Reward accrued on `record` since its last interaction.
fn settle(pool: &RewardPool, record: &StakeRecord) -> Result<Amount> {
    Ok(math::sub(pool.accumulated(record.amount)?, record.reward_debt)?)
}
