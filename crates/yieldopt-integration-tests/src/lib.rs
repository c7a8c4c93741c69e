//! Integration test crate for the yieldopt workspace.
//!
//! This crate has no library code. It only contains integration tests
//! that drive a bootstrapped vault deployment end to end across the
//! ledger, staking and vault crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p yieldopt-integration-tests
//! ```
