//! # yieldopt-ledger
//!
//! Fungible-token ledgers consumed by the vault engine.
//!
//! The engine only talks to ledgers through the two traits in
//! [`interface`]. [`token::TokenLedger`] is a plain in-memory
//! balance / transfer / approve ledger implementing both, used for the base
//! asset and for the share (receipt) token.
//!
//! ## Modules
//!
//! - [`interface`] — `BaseAssetLedger` and `ShareLedger` traits
//! - [`token`] — In-memory token ledger

pub mod interface;
pub mod token;

pub use interface::{BaseAssetLedger, ShareLedger};
pub use token::TokenLedger;

use yieldopt_types::{AccountId, Amount, MathError};

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The debited account does not hold enough tokens.
    #[error("insufficient balance for {account}: have {available}, need {required}")]
    InsufficientBalance {
        /// Debited account.
        account: AccountId,
        /// Balance held.
        available: Amount,
        /// Amount requested.
        required: Amount,
    },

    /// The spender has not been approved for enough tokens.
    #[error("insufficient allowance: have {available}, need {required}")]
    InsufficientAllowance {
        /// Remaining allowance.
        available: Amount,
        /// Amount requested.
        required: Amount,
    },

    /// The caller is not the ledger owner (mint/burn authority).
    #[error("caller {caller} is not the ledger owner")]
    Unauthorized {
        /// The rejected caller.
        caller: AccountId,
    },

    /// Supply or balance arithmetic failed.
    #[error("ledger arithmetic: {0}")]
    Math(#[from] MathError),

    /// Failure reported by an external ledger implementation.
    #[error("ledger rejected the operation: {0}")]
    Rejected(String),
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
