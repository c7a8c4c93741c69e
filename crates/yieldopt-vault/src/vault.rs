//! Deposit, withdraw and compound orchestration.
//!
//! The vault is the staking ledger's only participant: all deposits are
//! staked under one record keyed by the vault's identity, and share
//! balances divide that record among holders.
//!
//! ## Ordering
//!
//! Each operation checks every authority it needs and prices itself before
//! the first external call. Deposit and withdraw first reinvest the
//! vault's pending reward, so they are priced at
//! `(principal + pending reward) / total_shares` with the reward already
//! staked as principal. External calls then run in a fixed order and a
//! failure part-way is unwound:
//!
//! | operation | steps | unwinding |
//! |---|---|---|
//! | deposit  | pull → reinvest → stake → mint | refund; unstake, refund |
//! | withdraw | reinvest → unstake → burn → payout | re-stake; a failed payout is not unwound |
//! | compound | claim → stake | claimed reward kept as `unreinvested` |
//!
//! Reinvestment checks every precondition of its re-stake before claiming.
//! The only failure left after the claim is the base ledger rejecting the
//! vault's own transfer to the venue. The claimed reward is then held as
//! `unreinvested` and picked up by the next reinvestment.
//!
//! A payout that fails after unstaking leaves the funds in the vault's
//! base-asset account. It is reported as an unrecoverable
//! [`VaultError::TransferFailed`] and never retried here.

use serde::{Deserialize, Serialize};
use yieldopt_ledger::{BaseAssetLedger, ShareLedger};
use yieldopt_staking::StakingLedger;
use yieldopt_types::{math, AccountId, Amount};

use crate::state::{ExchangeRate, VaultState};
use crate::{Result, TransferStage, VaultError};

/// Who may trigger `compound()`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundPolicy {
    /// Anyone.
    #[default]
    Permissionless,
    /// Only this keeper account.
    Keeper(AccountId),
}

/// The collaborators a vault operation acts on.
pub struct Venue<'a> {
    /// Base asset ledger.
    pub assets: &'a mut dyn BaseAssetLedger,
    /// Share ledger; the vault must hold its mint/burn authority.
    pub shares: &'a mut dyn ShareLedger,
    /// Staking venue; the vault must hold its stake authority.
    pub staking: &'a mut StakingLedger,
}

/// The share-accounting vault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vault {
    identity: AccountId,
    policy: CompoundPolicy,
    state: VaultState,
}

impl Vault {
    /// An empty vault acting as `identity` on every ledger.
    pub fn new(identity: AccountId, policy: CompoundPolicy) -> Self {
        Self {
            identity,
            policy,
            state: VaultState::default(),
        }
    }

    /// The vault's account and stake-record key.
    pub fn identity(&self) -> &AccountId {
        &self.identity
    }

    /// Compound policy.
    pub fn policy(&self) -> &CompoundPolicy {
        &self.policy
    }

    /// Current bookkeeping.
    pub fn state(&self) -> &VaultState {
        &self.state
    }

    /// `(total_underlying_principal, total_shares)`.
    pub fn exchange_rate(&self) -> ExchangeRate {
        self.state.exchange_rate()
    }

    /// Shares a deposit of `amount` would mint now.
    pub fn preview_deposit(&self, staking: &StakingLedger, amount: Amount) -> Result<Amount> {
        self.priced_state(staking)?.shares_for(amount)
    }

    /// Base asset redeeming `shares` would return now.
    pub fn preview_withdraw(&self, staking: &StakingLedger, shares: Amount) -> Result<Amount> {
        self.priced_state(staking)?.amount_for(shares)
    }

    /// The state a deposit or withdraw made now is priced against: pending
    /// and unreinvested reward credited to principal. An empty vault has
    /// no holder to credit and keeps its 1:1 rate.
    pub fn priced_state(&self, staking: &StakingLedger) -> Result<VaultState> {
        if self.state.total_shares == 0 {
            return Ok(self.state);
        }
        let pending = staking.pending_rewards(&self.identity)?;
        let reward = math::add(pending, self.state.unreinvested)?;
        Ok(VaultState {
            total_underlying_principal: math::add(self.state.total_underlying_principal, reward)?,
            unreinvested: 0,
            ..self.state
        })
    }

    /// Principal plus pending and not yet reinvested reward.
    pub fn total_assets(&self, staking: &StakingLedger) -> Result<Amount> {
        let pending = staking.pending_rewards(&self.identity)?;
        let assets = math::add(self.state.total_underlying_principal, pending)?;
        Ok(math::add(assets, self.state.unreinvested)?)
    }

    /// Deposit `amount` of `caller`'s base asset and mint shares for it.
    ///
    /// `caller` must have approved the vault for `amount` on the base ledger.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidAmount`] if `amount` is zero or mints no shares
    /// - [`VaultError::Unauthorized`] if the vault lacks mint or stake authority
    /// - [`VaultError::TransferFailed`] if the base asset cannot be pulled
    pub fn deposit(
        &mut self,
        venue: &mut Venue<'_>,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<Amount> {
        if amount == 0 {
            tracing::warn!(caller = %caller.short(), "zero deposit rejected");
            return Err(VaultError::InvalidAmount("deposit of zero".to_string()));
        }
        let shares = self.preview_deposit(venue.staking, amount)?;
        if shares == 0 {
            tracing::warn!(caller = %caller.short(), amount, "deposit too small for one share");
            return Err(VaultError::InvalidAmount(format!(
                "deposit of {amount} mints no shares"
            )));
        }
        self.ensure_authority(venue)?;

        venue
            .assets
            .transfer_from(&self.identity, caller, &self.identity, amount)
            .map_err(|source| {
                tracing::warn!(caller = %caller.short(), amount, %source, "deposit pull failed");
                VaultError::TransferFailed {
                    stage: TransferStage::Pull,
                    source,
                }
            })?;

        if let Err(err) = self.reinvest(venue) {
            tracing::warn!(caller = %caller.short(), amount, %err, "reinvest before deposit failed, refunding");
            self.refund(venue, caller, amount)?;
            return Err(err);
        }
        let next = VaultState {
            total_shares: math::add(self.state.total_shares, shares)?,
            total_underlying_principal: math::add(self.state.total_underlying_principal, amount)?,
            ..self.state
        };

        if let Err(err) =
            venue
                .staking
                .stake(&mut *venue.assets, &self.identity, &self.identity, amount)
        {
            tracing::warn!(caller = %caller.short(), amount, %err, "deposit stake failed, refunding");
            self.refund(venue, caller, amount)?;
            return Err(err.into());
        }

        if let Err(source) = venue.shares.mint(&self.identity, caller, shares) {
            tracing::warn!(caller = %caller.short(), amount, %source, "share mint failed, unwinding deposit");
            self.unstake_into_vault(venue, amount)?;
            self.refund(venue, caller, amount)?;
            return Err(VaultError::Ledger(source));
        }

        self.state = next;
        tracing::info!(
            caller = %caller.short(),
            amount,
            shares,
            total_shares = self.state.total_shares,
            principal = self.state.total_underlying_principal,
            "deposit"
        );
        Ok(shares)
    }

    /// Redeem `shares` held by `caller` for base asset.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InsufficientShares`] unless `0 < shares <= held`
    /// - [`VaultError::InsufficientLiquidity`] if the venue cannot return the principal
    /// - [`VaultError::TransferFailed`] with [`TransferStage::Payout`] if the
    ///   final transfer fails; shares are already burned at that point
    pub fn withdraw(
        &mut self,
        venue: &mut Venue<'_>,
        caller: &AccountId,
        shares: Amount,
    ) -> Result<Amount> {
        let held = venue.shares.balance_of(caller);
        if shares == 0 || shares > held {
            tracing::warn!(caller = %caller.short(), held, requested = shares, "withdraw rejected");
            return Err(VaultError::InsufficientShares {
                held,
                requested: shares,
            });
        }
        let amount = self.preview_withdraw(venue.staking, shares)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount(format!(
                "{shares} shares redeem for nothing"
            )));
        }
        self.ensure_authority(venue)?;
        let available = venue.staking.available_liquidity(&*venue.assets);
        if available < amount {
            tracing::warn!(caller = %caller.short(), available, amount, "venue cannot cover withdraw");
            return Err(VaultError::InsufficientLiquidity {
                available,
                required: amount,
            });
        }

        self.reinvest(venue)?;
        let mut next = VaultState {
            total_shares: math::sub(self.state.total_shares, shares)?,
            total_underlying_principal: math::sub(self.state.total_underlying_principal, amount)?,
            ..self.state
        };

        let unstaked =
            venue
                .staking
                .unstake(&mut *venue.assets, &self.identity, &self.identity, amount)?;
        next.unreinvested = math::add(next.unreinvested, unstaked.reward)?;

        if let Err(source) = venue.shares.burn(&self.identity, caller, shares) {
            tracing::warn!(caller = %caller.short(), shares, %source, "share burn failed, re-staking");
            self.state.unreinvested = next.unreinvested;
            venue
                .staking
                .stake(&mut *venue.assets, &self.identity, &self.identity, amount)?;
            return Err(VaultError::Ledger(source));
        }
        self.state = next;

        if let Err(source) = venue.assets.transfer(&self.identity, caller, amount) {
            self.state.stranded = self.state.stranded.saturating_add(amount);
            tracing::error!(
                caller = %caller.short(),
                shares,
                amount,
                stranded = self.state.stranded,
                %source,
                "withdraw payout failed after unstaking; funds held by the vault"
            );
            return Err(VaultError::TransferFailed {
                stage: TransferStage::Payout,
                source,
            });
        }

        tracing::info!(
            caller = %caller.short(),
            shares,
            amount,
            total_shares = self.state.total_shares,
            principal = self.state.total_underlying_principal,
            "withdraw"
        );
        Ok(amount)
    }

    /// Claim the vault's reward and stake it as principal without minting
    /// shares. Returns the amount reinvested; zero when there is nothing to
    /// reinvest or no shareholder to credit it to.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] if a keeper is configured and `caller` is not it
    /// - [`VaultError::InsufficientLiquidity`] if the venue cannot pay the reward
    pub fn compound(&mut self, venue: &mut Venue<'_>, caller: &AccountId) -> Result<Amount> {
        if let CompoundPolicy::Keeper(keeper) = &self.policy {
            if keeper != caller {
                tracing::warn!(caller = %caller.short(), "compound by non-keeper rejected");
                return Err(VaultError::Unauthorized(format!(
                    "{caller} is not the compound keeper"
                )));
            }
        }
        let reinvested = self.reinvest(venue)?;
        if reinvested > 0 {
            tracing::info!(
                caller = %caller.short(),
                reinvested,
                principal = self.state.total_underlying_principal,
                total_shares = self.state.total_shares,
                "compound"
            );
        }
        Ok(reinvested)
    }

    /// Cross-check the vault's bookkeeping against the ledgers.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvariantViolation`] naming the first mismatch
    pub fn check_invariants(&self, staking: &StakingLedger, shares: &dyn ShareLedger) -> Result<()> {
        self.state.check()?;
        let staked = staking.staked_of(&self.identity);
        if staked != self.state.total_underlying_principal {
            return Err(VaultError::InvariantViolation(format!(
                "vault stake {staked} != principal {}",
                self.state.total_underlying_principal
            )));
        }
        let supply = shares.total_supply();
        if supply != self.state.total_shares {
            return Err(VaultError::InvariantViolation(format!(
                "share supply {supply} != total_shares {}",
                self.state.total_shares
            )));
        }
        Ok(())
    }

    /// Claim pending reward and stake it, together with any unreinvested
    /// reward, as principal. Skipped while the vault has no shareholders.
    fn reinvest(&mut self, venue: &mut Venue<'_>) -> Result<Amount> {
        if self.state.total_shares == 0 {
            tracing::debug!("no shareholders, nothing to reinvest");
            return Ok(0);
        }
        let pending = venue.staking.pending_rewards(&self.identity)?;
        let reinvest = math::add(pending, self.state.unreinvested)?;
        if reinvest == 0 {
            tracing::debug!("no pending reward, nothing to reinvest");
            return Ok(0);
        }

        // Re-stake preconditions, checked before the claim moves anything.
        self.ensure_authority(venue)?;
        math::add(self.state.total_underlying_principal, reinvest)?;
        math::add(venue.staking.total_staked(), reinvest)?;

        if pending > 0 {
            let claimed = venue
                .staking
                .claim(&mut *venue.assets, &self.identity, &self.identity)?;
            self.state.unreinvested = math::add(self.state.unreinvested, claimed)?;
        }
        let reinvest = self.state.unreinvested;
        let principal = math::add(self.state.total_underlying_principal, reinvest)?;

        if let Err(err) =
            venue
                .staking
                .stake(&mut *venue.assets, &self.identity, &self.identity, reinvest)
        {
            tracing::warn!(
                unreinvested = reinvest,
                %err,
                "re-stake failed; claimed reward held by the vault"
            );
            return Err(err.into());
        }
        self.state.total_underlying_principal = principal;
        self.state.unreinvested = 0;
        tracing::debug!(reinvested = reinvest, principal, "reward reinvested");
        Ok(reinvest)
    }

    fn ensure_authority(&self, venue: &Venue<'_>) -> Result<()> {
        if !venue.shares.is_minter(&self.identity) {
            return Err(VaultError::Unauthorized(
                "vault does not hold share mint authority".to_string(),
            ));
        }
        if !venue.staking.is_authorized(&self.identity) {
            return Err(VaultError::Unauthorized(
                "vault does not hold stake authority".to_string(),
            ));
        }
        Ok(())
    }

    fn refund(&self, venue: &mut Venue<'_>, caller: &AccountId, amount: Amount) -> Result<()> {
        venue
            .assets
            .transfer(&self.identity, caller, amount)
            .map_err(|source| {
                tracing::error!(
                    caller = %caller.short(),
                    amount,
                    %source,
                    "deposit refund failed; funds held by the vault"
                );
                VaultError::TransferFailed {
                    stage: TransferStage::Refund,
                    source,
                }
            })
    }

    fn unstake_into_vault(&mut self, venue: &mut Venue<'_>, amount: Amount) -> Result<()> {
        let unstaked =
            venue
                .staking
                .unstake(&mut *venue.assets, &self.identity, &self.identity, amount)?;
        self.state.unreinvested = math::add(self.state.unreinvested, unstaked.reward)?;
        Ok(())
    }
}
