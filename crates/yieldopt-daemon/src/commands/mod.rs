//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Amounts
//! cross the wire as decimal strings since they may exceed what a JSON
//! number can carry exactly; requests may send either form.

pub mod ledger;
pub mod vault;

use serde_json::Value;
use yieldopt_types::{AccountId, Amount};

use crate::rpc::RpcError;

type Result<T> = std::result::Result<T, RpcError>;

/// Required account parameter: 64 hex characters or a label.
fn account_param(params: &Value, key: &str) -> Result<AccountId> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(AccountId::resolve)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Required amount parameter, as a JSON number or a decimal string.
fn amount_param(params: &Value, key: &str) -> Result<Amount> {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Amount::from)
            .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be a non-negative integer"))),
        Some(Value::String(s)) => s
            .parse::<Amount>()
            .map_err(|_| RpcError::invalid_params(&format!("{key} is not a decimal amount"))),
        _ => Err(RpcError::invalid_params(&format!("{key} required"))),
    }
}

/// Amounts go out as decimal strings.
fn amount_value(amount: Amount) -> Value {
    Value::String(amount.to_string())
}
