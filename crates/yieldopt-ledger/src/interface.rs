//! Ledger interfaces at the engine boundary.
//!
//! The caller of every state-changing method is explicit: ledgers have no
//! ambient notion of "the current sender". A `false`/failed transfer is an
//! `Err`; the engine never inspects partial effects of a failed call.

use yieldopt_types::{AccountId, Amount};

use crate::Result;

/// The deposit asset.
pub trait BaseAssetLedger: Send {
    /// Balance held by `account`.
    fn balance_of(&self, account: &AccountId) -> Amount;

    /// Move `amount` from `from` to `to`, authorized by `from` itself.
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()>;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming
    /// the allowance `from` granted to `spender`.
    fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()>;
}

/// The receipt token. Only the mint authority may create or destroy supply.
pub trait ShareLedger: Send {
    /// Create `amount` new shares for `to`.
    fn mint(&mut self, authority: &AccountId, to: &AccountId, amount: Amount) -> Result<()>;

    /// Destroy `amount` shares held by `from`.
    fn burn(&mut self, authority: &AccountId, from: &AccountId, amount: Amount) -> Result<()>;

    /// Shares held by `account`.
    fn balance_of(&self, account: &AccountId) -> Amount;

    /// Outstanding shares.
    fn total_supply(&self) -> Amount;

    /// Whether `account` currently holds mint/burn authority.
    fn is_minter(&self, account: &AccountId) -> bool;
}
