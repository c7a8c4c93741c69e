//! One-time deployment of a vault and its collaborators.
//!
//! Creates the base ledger, the share ledger and the staking venue, mints
//! the deployer's initial base-asset balance, optionally funds the reward
//! reserve, and hands share mint/burn authority and stake authority to the
//! vault. Once this returns, only the vault can mint shares or stake.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use yieldopt_ledger::TokenLedger;
use yieldopt_staking::{Clock, RewardSource, StakingLedger};
use yieldopt_types::{AccountId, Amount, UNITS_PER_TOKEN};

use crate::protocol::{Deployment, YieldOptimizer};
use crate::vault::{CompoundPolicy, Vault};
use crate::{Result, VaultError};

/// Deployment parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapParams {
    /// Base asset name.
    pub asset_name: String,
    /// Base asset symbol.
    pub asset_symbol: String,
    /// Share token name.
    pub share_name: String,
    /// Share token symbol.
    pub share_symbol: String,
    /// Label the vault's account id is derived from.
    pub vault_label: String,
    /// Label the staking venue's account id is derived from.
    pub staking_label: String,
    /// Base asset minted to the deployer.
    pub initial_mint: Amount,
    /// Part of the deployer's balance moved into the reward reserve.
    pub reward_funding: Amount,
    /// Who may trigger `compound()`.
    pub compound_policy: CompoundPolicy,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        Self {
            asset_name: "DepositToken".to_string(),
            asset_symbol: "DT".to_string(),
            share_name: "ReceiptToken".to_string(),
            share_symbol: "RT".to_string(),
            vault_label: "vault".to_string(),
            staking_label: "stake".to_string(),
            initial_mint: 10_000 * UNITS_PER_TOKEN,
            reward_funding: 0,
            compound_policy: CompoundPolicy::Permissionless,
        }
    }
}

/// Deploy a vault owned by nobody but itself.
///
/// # Errors
///
/// - [`VaultError::InvalidAmount`] if `reward_funding` exceeds `initial_mint`
/// - [`VaultError::Ledger`] if an authority hand-over fails
pub fn bootstrap(
    deployer: AccountId,
    params: &BootstrapParams,
    source: Box<dyn RewardSource>,
    clock: Arc<dyn Clock>,
) -> Result<YieldOptimizer> {
    if params.reward_funding > params.initial_mint {
        return Err(VaultError::InvalidAmount(format!(
            "reward funding {} exceeds initial mint {}",
            params.reward_funding, params.initial_mint
        )));
    }
    let vault_id = AccountId::from_label(&params.vault_label);
    let staking_id = AccountId::from_label(&params.staking_label);

    let mut assets = TokenLedger::new(&params.asset_name, &params.asset_symbol, deployer);
    let mut shares = TokenLedger::new(&params.share_name, &params.share_symbol, deployer);
    let mut staking = StakingLedger::new(staking_id, Some(deployer), source, clock);
    tracing::info!(
        deployer = %deployer.short(),
        asset = %params.asset_symbol,
        share = %params.share_symbol,
        vault = %vault_id.short(),
        staking = %staking_id.short(),
        "ledgers created"
    );

    if params.initial_mint > 0 {
        assets
            .mint(&deployer, &deployer, params.initial_mint)
            .map_err(VaultError::Ledger)?;
        tracing::info!(amount = params.initial_mint, "initial supply minted to deployer");
    }
    if params.reward_funding > 0 {
        staking.fund_rewards(&mut assets, &deployer, params.reward_funding)?;
    }

    shares
        .transfer_ownership(&deployer, vault_id)
        .map_err(VaultError::Ledger)?;
    staking.transfer_ownership(&deployer, vault_id)?;
    tracing::info!(vault = %vault_id.short(), "share and stake authority handed to vault");

    Ok(YieldOptimizer::new(Deployment {
        assets,
        shares,
        staking,
        vault: Vault::new(vault_id, params.compound_policy.clone()),
    }))
}
