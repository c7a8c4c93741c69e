//! Vault command handlers.
//!
//! Like `faucet` and `approve`, `deposit`, `withdraw` and `compound` act for
//! the account named in the request without authenticating the caller.
//! Anyone who can open the socket can move any account's funds; this is a
//! local development surface for a single user.

use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use super::{account_param, amount_param, amount_value, Result};
use crate::events::Event;
use crate::keeper::emit_compounded;
use crate::rpc::RpcError;
use crate::DaemonState;

/// Deposit base asset for shares.
pub async fn deposit(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let account = account_param(params, "account")?;
    let amount = amount_param(params, "amount")?;
    let shares = state.optimizer.deposit(&account, amount)?;

    state.event_bus.emit(Event::now(
        "Deposited",
        serde_json::json!({
            "account": account.to_string(),
            "amount": amount_value(amount),
            "shares": amount_value(shares),
        }),
    ));
    Ok(serde_json::json!({ "shares": amount_value(shares) }))
}

/// Redeem shares for base asset.
pub async fn withdraw(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let account = account_param(params, "account")?;
    let shares = amount_param(params, "shares")?;
    let amount = state.optimizer.withdraw(&account, shares).map_err(|err| {
        if err.is_unrecoverable() {
            error!(account = %account, %err, "withdraw left funds in the vault");
        }
        RpcError::from(err)
    })?;

    state.event_bus.emit(Event::now(
        "Withdrawn",
        serde_json::json!({
            "account": account.to_string(),
            "shares": amount_value(shares),
            "amount": amount_value(amount),
        }),
    ));
    Ok(serde_json::json!({ "amount": amount_value(amount) }))
}

/// Reinvest pending reward.
pub async fn compound(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let account = account_param(params, "account")?;
    let reinvested = state.optimizer.compound(&account)?;
    if reinvested > 0 {
        emit_compounded(state, &account.to_string(), reinvested);
    }
    Ok(serde_json::json!({ "reinvested": amount_value(reinvested) }))
}

/// Shares a deposit would mint now.
pub async fn preview_deposit(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let amount = amount_param(params, "amount")?;
    let shares = state.optimizer.preview_deposit(amount)?;
    Ok(serde_json::json!({ "shares": amount_value(shares) }))
}

/// Base asset a redemption would return now.
pub async fn preview_withdraw(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let shares = amount_param(params, "shares")?;
    let amount = state.optimizer.preview_withdraw(shares)?;
    Ok(serde_json::json!({ "amount": amount_value(amount) }))
}

/// Current exchange rate.
pub async fn exchange_rate(state: &Arc<DaemonState>) -> Result<Value> {
    let rate = state.optimizer.exchange_rate()?;
    Ok(serde_json::json!({
        "total_underlying_principal": amount_value(rate.total_underlying_principal),
        "total_shares": amount_value(rate.total_shares),
        "rate": rate.as_f64(),
    }))
}

/// Pending staking reward of an account; the vault's by default.
pub async fn pending_rewards(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let account = if params.get("account").is_some() {
        account_param(params, "account")?
    } else {
        state.optimizer.vault_identity()?
    };
    let amount = state.optimizer.pending_rewards(&account)?;
    Ok(serde_json::json!({
        "account": account.to_string(),
        "amount": amount_value(amount),
    }))
}

/// Full vault snapshot.
pub async fn get_vault_state(state: &Arc<DaemonState>) -> Result<Value> {
    let snapshot = state
        .optimizer
        .with_deployment(|d| -> std::result::Result<Value, yieldopt_vault::VaultError> {
            let vault = d.vault.state();
            let pool = d.staking.pool();
            Ok(serde_json::json!({
                "vault": d.vault.identity().to_string(),
                "policy": d.vault.policy(),
                "total_shares": amount_value(vault.total_shares),
                "total_underlying_principal": amount_value(vault.total_underlying_principal),
                "unreinvested": amount_value(vault.unreinvested),
                "stranded": amount_value(vault.stranded),
                "total_assets": amount_value(d.vault.total_assets(&d.staking)?),
                "pending_rewards": amount_value(d.pending_rewards(d.vault.identity())?),
                "staking": {
                    "total_staked": amount_value(pool.total_staked),
                    "reward_reserve": amount_value(pool.reward_reserve),
                    "last_reward_time": pool.last_reward_time,
                },
            }))
        })??;
    Ok(snapshot)
}
