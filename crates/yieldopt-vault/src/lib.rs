//! # yieldopt-vault
//!
//! The auto-compounding vault: share accounting over a staking position.
//!
//! Depositors receive shares at the current exchange rate
//! `(total_underlying_principal + pending reward) / total_shares`; their
//! base asset is staked under the vault's single stake record. `compound()`
//! claims the record's reward and stakes it as new principal without
//! minting shares, which is what raises the rate for every holder. Deposit
//! and withdraw run the same reinvestment first, so reward accrued before a
//! deposit is never shared with the depositor.
//!
//! ## Modules
//!
//! - [`state`] — `VaultState` and the derived exchange rate
//! - [`vault`] — Deposit, withdraw and compound orchestration
//! - [`protocol`] — Serialized, thread-safe handle over the whole deployment
//! - [`bootstrap`] — One-time deployment and authority hand-over

pub mod bootstrap;
pub mod protocol;
pub mod state;
pub mod vault;

pub use bootstrap::{bootstrap, BootstrapParams};
pub use protocol::{Deployment, YieldOptimizer};
pub use state::{ExchangeRate, VaultState};
pub use vault::{CompoundPolicy, Vault, Venue};

use std::fmt;

use yieldopt_ledger::LedgerError;
use yieldopt_staking::StakingError;
use yieldopt_types::{Amount, MathError};

/// The step of an operation at which a base-asset transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Pulling the depositor's funds into the vault.
    Pull,
    /// Moving funds between the vault and the staking venue.
    Venue,
    /// Paying a withdrawal out to the caller, after unstaking.
    Payout,
    /// Returning funds while unwinding a failed deposit.
    Refund,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pull => "pull",
            Self::Venue => "venue",
            Self::Payout => "payout",
            Self::Refund => "refund",
        };
        f.write_str(name)
    }
}

/// Error types for vault operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    /// Zero amount, or an amount too small to mint a share.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The caller holds fewer shares than it tried to redeem.
    #[error("insufficient shares: hold {held}, requested {requested}")]
    InsufficientShares {
        /// Shares held.
        held: Amount,
        /// Shares requested.
        requested: Amount,
    },

    /// The vault's stake record cannot cover the request.
    #[error("insufficient stake: staked {available}, requested {requested}")]
    InsufficientStake {
        /// Principal staked by the vault.
        available: Amount,
        /// Requested amount.
        requested: Amount,
    },

    /// The staking venue cannot return the requested principal.
    #[error("insufficient liquidity: venue holds {available}, need {required}")]
    InsufficientLiquidity {
        /// Base asset held by the venue.
        available: Amount,
        /// Amount requested.
        required: Amount,
    },

    /// An external ledger rejected a transfer.
    #[error("transfer failed during {stage}: {source}")]
    TransferFailed {
        /// Where in the operation the transfer failed.
        stage: TransferStage,
        /// The ledger's error.
        #[source]
        source: LedgerError,
    },

    /// The caller lacks the role a restricted operation requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A ledger rejected a mint, burn or other non-transfer operation.
    #[error("ledger: {0}")]
    Ledger(#[source] LedgerError),

    /// A call re-entered the engine while an operation was in progress.
    #[error("reentrant call rejected")]
    Reentrant,

    /// A previous operation panicked while holding the engine lock.
    #[error("engine lock poisoned")]
    LockPoisoned,

    /// Vault bookkeeping disagrees with the ledgers.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Share arithmetic failed.
    #[error("vault arithmetic: {0}")]
    Math(#[from] MathError),
}

impl VaultError {
    /// True for failures after funds already left the staking venue.
    ///
    /// The funds sit in the vault's base-asset account and are not
    /// retried automatically.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Self::TransferFailed {
                stage: TransferStage::Payout | TransferStage::Refund,
                ..
            }
        )
    }
}

impl From<StakingError> for VaultError {
    fn from(err: StakingError) -> Self {
        match err {
            StakingError::InvalidAmount => Self::InvalidAmount("zero stake".to_string()),
            StakingError::InsufficientStake {
                available,
                requested,
            } => Self::InsufficientStake {
                available,
                requested,
            },
            StakingError::InsufficientLiquidity {
                available,
                required,
            } => Self::InsufficientLiquidity {
                available,
                required,
            },
            StakingError::Unauthorized { caller } => {
                Self::Unauthorized(format!("{caller} lacks stake authority"))
            }
            StakingError::Transfer(source) => Self::TransferFailed {
                stage: TransferStage::Venue,
                source,
            },
            StakingError::Math(e) => Self::Math(e),
        }
    }
}

/// Convenience result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;
    use yieldopt_types::AccountId;

    #[test]
    fn test_staking_errors_lift_to_taxonomy() {
        let err: VaultError = StakingError::InsufficientLiquidity {
            available: 1,
            required: 2,
        }
        .into();
        assert_eq!(
            err,
            VaultError::InsufficientLiquidity {
                available: 1,
                required: 2
            }
        );

        let err: VaultError = StakingError::Unauthorized {
            caller: AccountId::from_label("mallory"),
        }
        .into();
        assert!(matches!(err, VaultError::Unauthorized(_)));
    }

    #[test]
    fn test_unrecoverable_only_after_unstake() {
        let source = LedgerError::Rejected("offline".to_string());
        let payout = VaultError::TransferFailed {
            stage: TransferStage::Payout,
            source: source.clone(),
        };
        let pull = VaultError::TransferFailed {
            stage: TransferStage::Pull,
            source,
        };
        assert!(payout.is_unrecoverable());
        assert!(!pull.is_unrecoverable());
        assert!(!VaultError::Reentrant.is_unrecoverable());
    }

    #[test]
    fn test_display_names_stage() {
        let err = VaultError::TransferFailed {
            stage: TransferStage::Payout,
            source: LedgerError::Rejected("offline".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "transfer failed during payout: ledger rejected the operation: offline"
        );
    }
}
