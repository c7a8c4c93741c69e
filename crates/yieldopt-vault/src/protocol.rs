//! Serialized, thread-safe handle over a whole deployment.
//!
//! [`YieldOptimizer`] owns the base ledger, the share ledger, the staking
//! ledger and the vault behind one mutex. Every call, read-only or not,
//! holds it for its full duration, so operations are applied one at a time
//! and queries never observe a half-applied deposit or withdraw.
//!
//! A call made from the thread already inside an operation (a ledger
//! implementation calling back into the engine) is rejected with
//! [`VaultError::Reentrant`] instead of deadlocking.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};
use std::thread::ThreadId;

use yieldopt_ledger::{BaseAssetLedger, ShareLedger, TokenLedger};
use yieldopt_staking::StakingLedger;
use yieldopt_types::{AccountId, Amount};

use crate::state::{ExchangeRate, VaultState};
use crate::vault::{Vault, Venue};
use crate::{Result, VaultError};

/// Everything one vault deployment consists of.
pub struct Deployment<A = TokenLedger, S = TokenLedger> {
    /// Base asset ledger.
    pub assets: A,
    /// Share ledger.
    pub shares: S,
    /// Staking venue.
    pub staking: StakingLedger,
    /// The vault.
    pub vault: Vault,
}

impl<A: BaseAssetLedger, S: ShareLedger> Deployment<A, S> {
    /// See [`Vault::deposit`].
    pub fn deposit(&mut self, caller: &AccountId, amount: Amount) -> Result<Amount> {
        let Self {
            assets,
            shares,
            staking,
            vault,
        } = self;
        let result = vault.deposit(&mut Venue { assets, shares, staking }, caller, amount);
        self.audit("deposit");
        result
    }

    /// See [`Vault::withdraw`].
    pub fn withdraw(&mut self, caller: &AccountId, shares: Amount) -> Result<Amount> {
        let Self {
            assets,
            shares: share_ledger,
            staking,
            vault,
        } = self;
        let venue = &mut Venue {
            assets,
            shares: share_ledger,
            staking,
        };
        let result = vault.withdraw(venue, caller, shares);
        self.audit("withdraw");
        result
    }

    /// See [`Vault::compound`].
    pub fn compound(&mut self, caller: &AccountId) -> Result<Amount> {
        let Self {
            assets,
            shares,
            staking,
            vault,
        } = self;
        let result = vault.compound(&mut Venue { assets, shares, staking }, caller);
        self.audit("compound");
        result
    }

    /// Reward `participant` could claim from the staking venue now.
    pub fn pending_rewards(&self, participant: &AccountId) -> Result<Amount> {
        Ok(self.staking.pending_rewards(participant)?)
    }

    /// Cross-check vault bookkeeping against the ledgers.
    pub fn check_invariants(&self) -> Result<()> {
        self.vault.check_invariants(&self.staking, &self.shares)
    }

    fn audit(&self, operation: &str) {
        if let Err(err) = self.check_invariants() {
            tracing::error!(operation, %err, "post-operation invariant check failed");
        }
    }
}

/// The protocol handle shared by all callers.
pub struct YieldOptimizer<A = TokenLedger, S = TokenLedger> {
    deployment: Mutex<Deployment<A, S>>,
    active: Mutex<Option<ThreadId>>,
}

impl<A: BaseAssetLedger, S: ShareLedger> YieldOptimizer<A, S> {
    /// Wrap an assembled deployment.
    pub fn new(deployment: Deployment<A, S>) -> Self {
        Self {
            deployment: Mutex::new(deployment),
            active: Mutex::new(None),
        }
    }

    /// The vault's account id.
    pub fn vault_identity(&self) -> Result<AccountId> {
        Ok(*self.enter()?.vault.identity())
    }

    /// Deposit `amount` of `caller`'s base asset; returns shares minted.
    pub fn deposit(&self, caller: &AccountId, amount: Amount) -> Result<Amount> {
        self.enter()?.deposit(caller, amount)
    }

    /// Redeem `shares` of `caller`; returns base asset paid out.
    pub fn withdraw(&self, caller: &AccountId, shares: Amount) -> Result<Amount> {
        self.enter()?.withdraw(caller, shares)
    }

    /// Reinvest pending reward; returns the amount reinvested.
    pub fn compound(&self, caller: &AccountId) -> Result<Amount> {
        self.enter()?.compound(caller)
    }

    /// Shares a deposit of `amount` would mint now.
    pub fn preview_deposit(&self, amount: Amount) -> Result<Amount> {
        let guard = self.enter()?;
        guard.vault.preview_deposit(&guard.staking, amount)
    }

    /// Base asset redeeming `shares` would return now.
    pub fn preview_withdraw(&self, shares: Amount) -> Result<Amount> {
        let guard = self.enter()?;
        guard.vault.preview_withdraw(&guard.staking, shares)
    }

    /// `(total_underlying_principal, total_shares)`.
    pub fn exchange_rate(&self) -> Result<ExchangeRate> {
        Ok(self.enter()?.vault.exchange_rate())
    }

    /// Copy of the vault's bookkeeping.
    pub fn vault_state(&self) -> Result<VaultState> {
        Ok(*self.enter()?.vault.state())
    }

    /// Principal plus pending and not yet reinvested reward.
    pub fn total_assets(&self) -> Result<Amount> {
        let guard = self.enter()?;
        guard.vault.total_assets(&guard.staking)
    }

    /// Reward `participant` could claim from the staking venue now.
    pub fn pending_rewards(&self, participant: &AccountId) -> Result<Amount> {
        self.enter()?.pending_rewards(participant)
    }

    /// Cross-check vault bookkeeping against the ledgers.
    pub fn check_invariants(&self) -> Result<()> {
        self.enter()?.check_invariants()
    }

    /// Run `f` with exclusive access to the deployment, e.g. for ledger
    /// approvals and balance queries that belong to the same serialized
    /// history as vault operations.
    pub fn with_deployment<R>(&self, f: impl FnOnce(&mut Deployment<A, S>) -> R) -> Result<R> {
        let mut guard = self.enter()?;
        Ok(f(&mut guard))
    }

    fn enter(&self) -> Result<OperationGuard<'_, A, S>> {
        let current = std::thread::current().id();
        {
            let active = self.active.lock().map_err(|_| VaultError::LockPoisoned)?;
            if *active == Some(current) {
                tracing::warn!("reentrant call rejected");
                return Err(VaultError::Reentrant);
            }
        }
        let deployment = self
            .deployment
            .lock()
            .map_err(|_| VaultError::LockPoisoned)?;
        *self.active.lock().map_err(|_| VaultError::LockPoisoned)? = Some(current);
        Ok(OperationGuard {
            deployment,
            active: &self.active,
        })
    }
}

/// Exclusive access for one logical operation.
struct OperationGuard<'a, A, S> {
    deployment: MutexGuard<'a, Deployment<A, S>>,
    active: &'a Mutex<Option<ThreadId>>,
}

impl<A, S> Deref for OperationGuard<'_, A, S> {
    type Target = Deployment<A, S>;

    fn deref(&self) -> &Self::Target {
        &self.deployment
    }
}

impl<A, S> DerefMut for OperationGuard<'_, A, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.deployment
    }
}

impl<A, S> Drop for OperationGuard<'_, A, S> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::vault::CompoundPolicy;
    use crate::TransferStage;
    use yieldopt_ledger::LedgerError;
    use yieldopt_staking::{FixedRateEmission, ManualClock};

    const START: u64 = 1_700_000_000;

    /// Base ledger that can be told to reject transfers to one account.
    struct FlakyLedger {
        inner: TokenLedger,
        reject_transfers_to: Option<AccountId>,
    }

    impl BaseAssetLedger for FlakyLedger {
        fn balance_of(&self, account: &AccountId) -> Amount {
            self.inner.balance_of(account)
        }

        fn transfer(
            &mut self,
            from: &AccountId,
            to: &AccountId,
            amount: Amount,
        ) -> yieldopt_ledger::Result<()> {
            if self.reject_transfers_to.as_ref() == Some(to) {
                return Err(LedgerError::Rejected("recipient blocked".to_string()));
            }
            self.inner.transfer(from, to, amount)
        }

        fn transfer_from(
            &mut self,
            spender: &AccountId,
            from: &AccountId,
            to: &AccountId,
            amount: Amount,
        ) -> yieldopt_ledger::Result<()> {
            self.inner.transfer_from(spender, from, to, amount)
        }
    }

    struct Actors {
        admin: AccountId,
        vault: AccountId,
        alice: AccountId,
        bob: AccountId,
    }

    fn actors() -> Actors {
        Actors {
            admin: AccountId::from_label("admin"),
            vault: AccountId::from_label("vault"),
            alice: AccountId::from_label("alice"),
            bob: AccountId::from_label("bob"),
        }
    }

    /// Deployment with authority already handed to the vault, users funded
    /// and approved, and a 1M reward reserve emitting one unit per second.
    fn deployment(policy: CompoundPolicy) -> (Deployment<FlakyLedger, TokenLedger>, ManualClock) {
        let a = actors();
        let clock = ManualClock::new(START);
        let mut base = TokenLedger::new("Deposit Token", "DT", a.admin);
        for user in [&a.alice, &a.bob] {
            base.mint(&a.admin, user, 100_000).expect("mint");
            base.approve(user, &a.vault, Amount::MAX);
        }
        base.mint(&a.admin, &a.admin, 1_000_000).expect("mint reserve");

        let mut staking = StakingLedger::new(
            AccountId::from_label("venue"),
            Some(a.vault),
            Box::new(FixedRateEmission::new(1)),
            Arc::new(clock.clone()),
        );
        staking
            .fund_rewards(&mut base, &a.admin, 1_000_000)
            .expect("fund");

        let deployment = Deployment {
            assets: FlakyLedger {
                inner: base,
                reject_transfers_to: None,
            },
            shares: TokenLedger::new("Receipt Token", "RT", a.vault),
            staking,
            vault: Vault::new(a.vault, policy),
        };
        (deployment, clock)
    }

    #[test]
    fn test_reference_scenario() {
        let a = actors();
        let (mut d, clock) = deployment(CompoundPolicy::Permissionless);

        assert_eq!(d.deposit(&a.alice, 1_000).expect("alice deposit"), 1_000);
        assert_eq!(d.vault.state().total_underlying_principal, 1_000);
        assert_eq!(d.deposit(&a.bob, 500).expect("bob deposit"), 500);

        clock.advance(150);
        assert_eq!(d.compound(&a.bob).expect("compound"), 150);
        let rate = d.vault.exchange_rate();
        assert_eq!(rate.total_underlying_principal, 1_650);
        assert_eq!(rate.total_shares, 1_500);

        assert_eq!(d.withdraw(&a.alice, 1_000).expect("withdraw"), 1_100);
        assert_eq!(d.assets.balance_of(&a.alice), 100_000 + 100);
        d.check_invariants().expect("invariants");
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let a = actors();
        let (mut d, _) = deployment(CompoundPolicy::Permissionless);
        let err = d.deposit(&a.alice, 0).expect_err("zero");
        assert!(matches!(err, VaultError::InvalidAmount(_)));
        assert_eq!(d.vault.state(), &VaultState::default());
        assert_eq!(d.shares.balance_of(&a.alice), 0);
        assert_eq!(d.assets.balance_of(&a.alice), 100_000);
    }

    #[test]
    fn test_dust_deposit_rejected_when_it_mints_nothing() {
        let a = actors();
        let (mut d, clock) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 10).expect("deposit");
        clock.advance(20);
        d.compound(&a.alice).expect("compound");
        // Rate is now 30/10; one unit buys zero shares.
        let before = *d.vault.state();
        assert!(matches!(
            d.deposit(&a.bob, 1),
            Err(VaultError::InvalidAmount(_))
        ));
        assert_eq!(d.vault.state(), &before);
    }

    #[test]
    fn test_withdraw_more_than_held_rejected() {
        let a = actors();
        let (mut d, _) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 1_000).expect("deposit");
        let before = *d.vault.state();
        let err = d.withdraw(&a.alice, 1_001).expect_err("over-withdraw");
        assert_eq!(
            err,
            VaultError::InsufficientShares {
                held: 1_000,
                requested: 1_001
            }
        );
        assert!(d.withdraw(&a.bob, 1).is_err());
        assert!(d.withdraw(&a.alice, 0).is_err());
        assert_eq!(d.vault.state(), &before);
    }

    #[test]
    fn test_pull_failure_changes_nothing() {
        let (mut d, _) = deployment(CompoundPolicy::Permissionless);
        let stranger = AccountId::from_label("stranger");
        let staking_before = d.staking.snapshot();

        let err = d.deposit(&stranger, 500).expect_err("no allowance");
        assert!(matches!(
            err,
            VaultError::TransferFailed {
                stage: TransferStage::Pull,
                source: LedgerError::InsufficientAllowance { .. }
            }
        ));
        assert_eq!(d.vault.state(), &VaultState::default());
        assert_eq!(d.shares.total_supply(), 0);
        assert_eq!(d.staking.snapshot(), staking_before);
    }

    #[test]
    fn test_illiquid_venue_withdraw_changes_nothing() {
        let a = actors();
        let (mut d, _) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 1_000).expect("deposit");
        let venue = *d.staking.identity();
        let held = d.assets.balance_of(&venue);
        d.assets
            .inner
            .transfer(&venue, &a.admin, held - 500)
            .expect("drain");
        let before = *d.vault.state();

        let err = d.withdraw(&a.alice, 1_000).expect_err("illiquid");
        assert_eq!(
            err,
            VaultError::InsufficientLiquidity {
                available: 500,
                required: 1_000
            }
        );
        assert_eq!(d.vault.state(), &before);
        assert_eq!(d.shares.balance_of(&a.alice), 1_000);
        d.check_invariants().expect("invariants");
    }

    #[test]
    fn test_payout_failure_is_unrecoverable_and_tracked() {
        let a = actors();
        let (mut d, _) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 1_000).expect("deposit");
        d.assets.reject_transfers_to = Some(a.alice);

        let err = d.withdraw(&a.alice, 400).expect_err("payout blocked");
        assert!(err.is_unrecoverable());
        assert_eq!(d.shares.balance_of(&a.alice), 600);
        assert_eq!(d.vault.state().stranded, 400);
        assert_eq!(d.assets.balance_of(&a.vault), 400);
        d.check_invariants().expect("accounting stays consistent");
    }

    #[test]
    fn test_compound_without_reward_is_noop() {
        let a = actors();
        let (mut d, _) = deployment(CompoundPolicy::Permissionless);
        assert_eq!(d.compound(&a.alice).expect("empty vault"), 0);
        d.deposit(&a.alice, 1_000).expect("deposit");
        let before = *d.vault.state();
        assert_eq!(d.compound(&a.alice).expect("no time passed"), 0);
        assert_eq!(d.vault.state(), &before);
    }

    #[test]
    fn test_keeper_policy() {
        let a = actors();
        let (mut d, clock) = deployment(CompoundPolicy::Keeper(a.admin));
        d.deposit(&a.alice, 1_000).expect("deposit");
        clock.advance(10);
        assert!(matches!(
            d.compound(&a.alice),
            Err(VaultError::Unauthorized(_))
        ));
        assert_eq!(d.compound(&a.admin).expect("keeper"), 10);
    }

    #[test]
    fn test_vault_without_authority_takes_nothing() {
        let a = actors();
        let (mut d, _) = deployment(CompoundPolicy::Permissionless);
        d.shares = TokenLedger::new("Receipt Token", "RT", a.admin);
        let err = d.deposit(&a.alice, 1_000).expect_err("no mint authority");
        assert!(matches!(err, VaultError::Unauthorized(_)));
        assert_eq!(d.assets.balance_of(&a.alice), 100_000);
    }

    #[test]
    fn test_withdraw_reinvests_pending_reward_first() {
        let a = actors();
        let (mut d, clock) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 1_000).expect("alice");
        d.deposit(&a.bob, 1_000).expect("bob");
        clock.advance(100);

        // The 100 reward is staked as principal before alice is priced.
        assert_eq!(d.vault.preview_withdraw(&d.staking, 1_000).expect("preview"), 1_050);
        assert_eq!(d.withdraw(&a.alice, 1_000).expect("withdraw"), 1_050);
        assert_eq!(d.vault.state().unreinvested, 0);
        assert_eq!(d.vault.state().total_underlying_principal, 1_050);
        assert_eq!(d.compound(&a.bob).expect("nothing left"), 0);
        assert_eq!(d.withdraw(&a.bob, 1_000).expect("bob out"), 1_050);
        assert_eq!(d.vault.state(), &VaultState::default());
        d.check_invariants().expect("invariants");
    }

    #[test]
    fn test_late_depositor_does_not_share_pending_reward() {
        let a = actors();
        let (mut d, clock) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 1_000).expect("alice");
        clock.advance(150);

        // Bob buys in at 1150/1000, not at the stale 1000/1000.
        let preview = d.vault.preview_deposit(&d.staking, 1_000).expect("preview");
        assert_eq!(d.deposit(&a.bob, 1_000).expect("bob"), preview);
        assert_eq!(preview, 869);
        assert_eq!(d.vault.state().total_underlying_principal, 2_150);
        d.check_invariants().expect("invariants");

        let bob_out = d.withdraw(&a.bob, 869).expect("bob out");
        assert_eq!(bob_out, 999);
        assert_eq!(d.withdraw(&a.alice, 1_000).expect("alice out"), 1_151);
        assert_eq!(d.vault.state(), &VaultState::default());
    }

    #[test]
    fn test_token_scale_deposits_and_withdraw() {
        let t = yieldopt_types::UNITS_PER_TOKEN;
        let a = actors();
        let (mut d, _) = deployment(CompoundPolicy::Permissionless);
        for user in [&a.alice, &a.bob] {
            d.assets.inner.mint(&a.admin, user, 1_000 * t).expect("mint");
        }

        assert_eq!(d.deposit(&a.alice, 100 * t).expect("alice"), 100 * t);
        assert_eq!(d.deposit(&a.bob, 100 * t).expect("bob"), 100 * t);
        assert_eq!(d.vault.state().total_underlying_principal, 200 * t);
        assert_eq!(d.withdraw(&a.bob, 100 * t).expect("bob out"), 100 * t);
        assert_eq!(d.withdraw(&a.alice, 40 * t).expect("alice part"), 40 * t);
        d.check_invariants().expect("invariants");
    }

    #[test]
    fn test_compound_checks_authority_before_claiming() {
        let a = actors();
        let (mut d, clock) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 1_000).expect("deposit");
        clock.advance(50);
        d.staking
            .transfer_ownership(&a.vault, a.admin)
            .expect("hand authority away");
        let staking_before = d.staking.snapshot();
        let before = *d.vault.state();

        let err = d.compound(&a.alice).expect_err("no stake authority");
        assert!(matches!(err, VaultError::Unauthorized(_)));
        assert_eq!(d.staking.snapshot(), staking_before);
        assert_eq!(d.vault.state(), &before);
        assert_eq!(d.assets.balance_of(&a.vault), 0);
    }

    #[test]
    fn test_compound_restake_failure_keeps_claimed_reward() {
        let a = actors();
        let (mut d, clock) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 1_000).expect("deposit");
        clock.advance(50);
        let venue = *d.staking.identity();
        d.assets.reject_transfers_to = Some(venue);

        let err = d.compound(&a.alice).expect_err("venue blocked");
        assert!(matches!(
            err,
            VaultError::TransferFailed {
                stage: TransferStage::Venue,
                ..
            }
        ));
        assert_eq!(d.vault.state().unreinvested, 50);
        assert_eq!(d.vault.state().total_underlying_principal, 1_000);
        assert_eq!(d.assets.balance_of(&a.vault), 50);
        d.check_invariants().expect("accounting stays consistent");

        d.assets.reject_transfers_to = None;
        assert_eq!(d.compound(&a.alice).expect("retry"), 50);
        assert_eq!(d.vault.state().total_underlying_principal, 1_050);
        assert_eq!(d.vault.state().unreinvested, 0);
    }

    #[test]
    fn test_total_assets_includes_pending() {
        let a = actors();
        let (mut d, clock) = deployment(CompoundPolicy::Permissionless);
        d.deposit(&a.alice, 1_000).expect("deposit");
        clock.advance(40);
        assert_eq!(d.vault.total_assets(&d.staking).expect("total"), 1_040);
    }

    fn optimizer() -> (YieldOptimizer<FlakyLedger, TokenLedger>, ManualClock) {
        let (d, clock) = deployment(CompoundPolicy::Permissionless);
        (YieldOptimizer::new(d), clock)
    }

    #[test]
    fn test_optimizer_surface() {
        let a = actors();
        let (opt, clock) = optimizer();
        assert_eq!(opt.preview_deposit(1_000).expect("preview"), 1_000);
        assert_eq!(opt.deposit(&a.alice, 1_000).expect("deposit"), 1_000);
        clock.advance(100);
        assert_eq!(opt.pending_rewards(&a.vault).expect("pending"), 100);
        assert_eq!(opt.total_assets().expect("total"), 1_100);
        assert_eq!(opt.preview_withdraw(500).expect("preview"), 550);
        assert_eq!(opt.compound(&a.alice).expect("compound"), 100);
        assert_eq!(opt.preview_withdraw(500).expect("preview"), 550);
        assert_eq!(
            opt.exchange_rate().expect("rate"),
            ExchangeRate {
                total_underlying_principal: 1_100,
                total_shares: 1_000
            }
        );
        assert_eq!(opt.vault_identity().expect("id"), a.vault);
        opt.check_invariants().expect("invariants");
    }

    #[test]
    fn test_reentrant_call_rejected() {
        let a = actors();
        let (opt, _) = optimizer();
        let inner = opt
            .with_deployment(|_| opt.deposit(&a.alice, 10))
            .expect("outer call");
        assert_eq!(inner, Err(VaultError::Reentrant));
        // The guard is released afterwards.
        assert_eq!(opt.deposit(&a.alice, 10).expect("deposit"), 10);
    }

    #[test]
    fn test_pending_rewards_query_is_read_only() {
        let a = actors();
        let (opt, clock) = optimizer();
        opt.deposit(&a.alice, 1_000).expect("deposit");
        clock.advance(33);
        let before = opt
            .with_deployment(|d| (d.staking.snapshot(), *d.vault.state()))
            .expect("snapshot");
        assert_eq!(opt.pending_rewards(&a.vault).expect("first"), 33);
        assert_eq!(opt.pending_rewards(&a.vault).expect("second"), 33);
        let after = opt
            .with_deployment(|d| (d.staking.snapshot(), *d.vault.state()))
            .expect("snapshot");
        assert_eq!(before, after);
    }
}
