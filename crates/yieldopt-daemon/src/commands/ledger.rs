//! Base asset and share ledger command handlers.
//!
//! Callers are not authenticated: `approve` grants the vault an allowance on
//! whichever account the request names, and `faucet` pays out of the
//! deployer's balance. Both exist for local development.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::{account_param, amount_param, amount_value, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Base asset and share balances of an account.
pub async fn get_balances(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let account = account_param(params, "account")?;
    let (base, shares, allowance) = state.optimizer.with_deployment(|d| {
        (
            d.assets.balance_of(&account),
            d.shares.balance_of(&account),
            d.assets.allowance(&account, d.vault.identity()),
        )
    })?;
    Ok(serde_json::json!({
        "account": account.to_string(),
        "base": amount_value(base),
        "shares": amount_value(shares),
        "vault_allowance": amount_value(allowance),
    }))
}

/// Approve the vault to pull `amount` of the account's base asset.
pub async fn approve(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let account = account_param(params, "account")?;
    let amount = amount_param(params, "amount")?;
    state.optimizer.with_deployment(|d| {
        let vault = *d.vault.identity();
        d.assets.approve(&account, &vault, amount);
    })?;
    Ok(serde_json::json!({ "allowance": amount_value(amount) }))
}

/// Send base asset from the deployer to an account.
pub async fn faucet(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    if !state.config.advanced.faucet_enabled {
        return Err(RpcError::disabled("faucet"));
    }
    let account = account_param(params, "account")?;
    let amount = amount_param(params, "amount")?;
    let deployer = state.deployer;
    let balance = state.optimizer.with_deployment(|d| {
        d.assets.transfer(&deployer, &account, amount)?;
        Ok::<_, yieldopt_ledger::LedgerError>(d.assets.balance_of(&account))
    })??;
    info!(account = %account.short(), amount, "faucet transfer");
    Ok(serde_json::json!({ "balance": amount_value(balance) }))
}
