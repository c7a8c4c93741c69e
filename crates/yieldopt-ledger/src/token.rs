//! In-memory token ledger.
//!
//! A standard fungible-token ledger: balances, allowances, total supply,
//! and a single owner who holds mint/burn authority. Ownership is handed
//! over once at bootstrap (e.g. the share token's authority goes to the
//! vault). Every mutation validates fully before touching any balance, so
//! a failed call leaves the ledger unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use yieldopt_types::{math, AccountId, Amount};

use crate::interface::{BaseAssetLedger, ShareLedger};
use crate::{LedgerError, Result};

/// Public metadata of a token ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Display name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Current owner (mint/burn authority).
    pub owner: AccountId,
    /// Outstanding supply.
    pub total_supply: Amount,
}

/// An in-memory fungible token ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenLedger {
    name: String,
    symbol: String,
    owner: AccountId,
    total_supply: Amount,
    balances: HashMap<AccountId, Amount>,
    allowances: HashMap<(AccountId, AccountId), Amount>,
}

impl TokenLedger {
    /// Create an empty ledger owned by `owner`.
    pub fn new(name: &str, symbol: &str, owner: AccountId) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            owner,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    /// Ledger metadata.
    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            owner: self.owner,
            total_supply: self.total_supply,
        }
    }

    /// Current owner.
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    /// Hand mint/burn authority to `new_owner`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the current owner
    pub fn transfer_ownership(&mut self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        self.ensure_owner(caller)?;
        tracing::info!(
            token = %self.symbol,
            from = %caller.short(),
            to = %new_owner.short(),
            "token ownership transferred"
        );
        self.owner = new_owner;
        Ok(())
    }

    /// Balance held by `account`.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Outstanding supply.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Remaining amount `spender` may move out of `holder`'s balance.
    pub fn allowance(&self, holder: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(*holder, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Set the allowance `holder` grants to `spender`, replacing any previous one.
    pub fn approve(&mut self, holder: &AccountId, spender: &AccountId, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(*holder, *spender));
        } else {
            self.allowances.insert((*holder, *spender), amount);
        }
        tracing::debug!(
            token = %self.symbol,
            holder = %holder.short(),
            spender = %spender.short(),
            amount,
            "allowance set"
        );
    }

    /// Create `amount` tokens for `to`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the owner
    /// - [`LedgerError::Math`] if the supply would overflow
    pub fn mint(&mut self, caller: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.ensure_owner(caller)?;
        let supply = math::add(self.total_supply, amount)?;
        let balance = math::add(self.balance_of(to), amount)?;
        self.total_supply = supply;
        self.balances.insert(*to, balance);
        tracing::debug!(token = %self.symbol, to = %to.short(), amount, "minted");
        Ok(())
    }

    /// Destroy `amount` tokens held by `from`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the owner
    /// - [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`
    pub fn burn(&mut self, caller: &AccountId, from: &AccountId, amount: Amount) -> Result<()> {
        self.ensure_owner(caller)?;
        let balance = self.debited_balance(from, amount)?;
        let supply = math::sub(self.total_supply, amount)?;
        self.set_balance(from, balance);
        self.total_supply = supply;
        tracing::debug!(token = %self.symbol, from = %from.short(), amount, "burned");
        Ok(())
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`
    pub fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        let debited = self.debited_balance(from, amount)?;
        if from == to {
            return Ok(());
        }
        let credited = math::add(self.balance_of(to), amount)?;
        self.set_balance(from, debited);
        self.set_balance(to, credited);
        Ok(())
    }

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientAllowance`] if the allowance is too small
    /// - [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                available: allowance,
                required: amount,
            });
        }
        self.transfer(from, to, amount)?;
        self.approve(from, spender, allowance - amount);
        Ok(())
    }

    fn ensure_owner(&self, caller: &AccountId) -> Result<()> {
        if caller != &self.owner {
            return Err(LedgerError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn debited_balance(&self, account: &AccountId, amount: Amount) -> Result<Amount> {
        let available = self.balance_of(account);
        available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: *account,
                available,
                required: amount,
            })
    }

    fn set_balance(&mut self, account: &AccountId, balance: Amount) {
        if balance == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, balance);
        }
    }
}

impl BaseAssetLedger for TokenLedger {
    fn balance_of(&self, account: &AccountId) -> Amount {
        TokenLedger::balance_of(self, account)
    }

    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        TokenLedger::transfer(self, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        TokenLedger::transfer_from(self, spender, from, to, amount)
    }
}

impl ShareLedger for TokenLedger {
    fn mint(&mut self, authority: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        TokenLedger::mint(self, authority, to, amount)
    }

    fn burn(&mut self, authority: &AccountId, from: &AccountId, amount: Amount) -> Result<()> {
        TokenLedger::burn(self, authority, from, amount)
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        TokenLedger::balance_of(self, account)
    }

    fn total_supply(&self) -> Amount {
        TokenLedger::total_supply(self)
    }

    fn is_minter(&self, account: &AccountId) -> bool {
        account == &self.owner
    }
}
