//! Vault bookkeeping and the derived exchange rate.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use yieldopt_types::{math, Amount};

use crate::{Result, VaultError};

/// The vault's own accounting. Created zeroed, never destroyed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    /// Sum of all outstanding share balances.
    pub total_shares: Amount,
    /// Base asset staked on behalf of shareholders. Pending reward is folded
    /// in before any deposit or withdraw is priced.
    pub total_underlying_principal: Amount,
    /// Reward claimed or settled to the vault but not yet re-staked.
    pub unreinvested: Amount,
    /// Withdrawal payouts that failed after unstaking; held by the vault.
    pub stranded: Amount,
}

impl VaultState {
    /// Current exchange rate.
    pub fn exchange_rate(&self) -> ExchangeRate {
        ExchangeRate {
            total_underlying_principal: self.total_underlying_principal,
            total_shares: self.total_shares,
        }
    }

    /// Shares minted for a deposit of `amount` (truncating).
    pub fn shares_for(&self, amount: Amount) -> Result<Amount> {
        if self.total_shares == 0 {
            return Ok(amount);
        }
        Ok(math::mul_div(
            amount,
            self.total_shares,
            self.total_underlying_principal,
        )?)
    }

    /// Base asset returned for redeeming `shares` (truncating).
    pub fn amount_for(&self, shares: Amount) -> Result<Amount> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        Ok(math::mul_div(
            shares,
            self.total_underlying_principal,
            self.total_shares,
        )?)
    }

    /// An empty vault has no claims, and a vault with claims is not empty.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvariantViolation`] if exactly one side is zero
    pub fn check(&self) -> Result<()> {
        if (self.total_shares == 0) != (self.total_underlying_principal == 0) {
            return Err(VaultError::InvariantViolation(format!(
                "total_shares = {} but total_underlying_principal = {}",
                self.total_shares, self.total_underlying_principal
            )));
        }
        Ok(())
    }
}

/// `total_underlying_principal / total_shares`, kept as a fraction.
///
/// An empty vault trades at 1:1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Numerator.
    pub total_underlying_principal: Amount,
    /// Denominator.
    pub total_shares: Amount,
}

impl ExchangeRate {
    /// Compare two rates exactly.
    pub fn compare(&self, other: &Self) -> Ordering {
        math::cmp_ratio(
            self.total_underlying_principal,
            self.total_shares,
            other.total_underlying_principal,
            other.total_shares,
        )
    }

    /// Lossy value of one share, for display only.
    pub fn as_f64(&self) -> f64 {
        if self.total_shares == 0 {
            return 1.0;
        }
        self.total_underlying_principal as f64 / self.total_shares as f64
    }
}
