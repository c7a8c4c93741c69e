//! # yieldopt-staking
//!
//! The underlying yield-bearing staking position.
//!
//! Participants stake base asset and earn a share of an external reward
//! stream proportional to stake × time. The accumulator pattern keeps
//! every operation O(1) regardless of the number of participants: a single
//! global reward-per-share value grows over time and each participant
//! stores a reward-debt snapshot of it.
//!
//! ## Modules
//!
//! - [`accumulator`] — Global reward-per-share accumulator
//! - [`emission`] — External reward emission schedule
//! - [`clock`] — Time sources
//! - [`ledger`] — Per-participant stake records and operations

pub mod accumulator;
pub mod clock;
pub mod emission;
pub mod ledger;

pub use accumulator::RewardPool;
pub use clock::{Clock, ManualClock, SystemClock};
pub use emission::{FixedRateEmission, RewardSource};
pub use ledger::{StakeRecord, StakingLedger, StakingSnapshot, Unstaked};

use yieldopt_ledger::LedgerError;
use yieldopt_types::{AccountId, Amount, MathError};

/// Error types for staking operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StakingError {
    /// Zero amount where a positive one is required.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// Unstaking more than the participant has staked.
    #[error("insufficient stake: staked {available}, requested {requested}")]
    InsufficientStake {
        /// Currently staked.
        available: Amount,
        /// Requested amount.
        requested: Amount,
    },

    /// The venue does not hold enough base asset for the payout.
    #[error("insufficient liquidity: venue holds {available}, payout needs {required}")]
    InsufficientLiquidity {
        /// Base asset held by the venue.
        available: Amount,
        /// Principal plus reward owed.
        required: Amount,
    },

    /// The caller lacks stake authority.
    #[error("caller {caller} lacks stake authority")]
    Unauthorized {
        /// The rejected caller.
        caller: AccountId,
    },

    /// The base-asset ledger rejected a transfer.
    #[error("base asset transfer failed: {0}")]
    Transfer(#[from] LedgerError),

    /// Accumulator arithmetic failed.
    #[error("staking arithmetic: {0}")]
    Math(#[from] MathError),
}

/// Convenience result type for staking operations.
pub type Result<T> = std::result::Result<T, StakingError>;
