//! # yieldopt-types
//!
//! Shared domain types used across the yieldopt workspace.
//!
//! ## Modules
//!
//! - [`account`] — Account identifiers
//! - [`math`] — Checked fixed-point arithmetic

pub mod account;
pub mod math;

pub use account::AccountId;
pub use math::MathError;

/// Token amounts in base units.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Fixed-point scale of the reward-per-share accumulator.
pub const ACC_REWARD_SCALE: u128 = 1_000_000_000_000;

/// Base units per whole token (18 decimals).
pub const UNITS_PER_TOKEN: u128 = 1_000_000_000_000_000_000;
