//! Checked integer arithmetic for share and reward accounting.
//!
//! All accounting is done on `u128` base units with explicit overflow
//! checks. Products are always formed before the division so that small
//! reward increments spread over large stake totals keep their precision;
//! every division truncates toward zero.
//!
//! Intermediate products are widened to 256 bits. Two 18-decimal token
//! amounts multiply to well past `u128::MAX`, so only the final quotient is
//! required to fit.

use std::cmp::Ordering;

use crate::Amount;

#[allow(dead_code, clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::panic)]
mod wide {
    uint::construct_uint! {
        pub struct U256(4);
    }
}

use wide::U256;

/// Arithmetic failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    /// A result exceeded `u128::MAX`.
    #[error("arithmetic overflow")]
    Overflow,

    /// A subtraction went below zero.
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Convenience result type for arithmetic.
pub type Result<T> = std::result::Result<T, MathError>;

/// `a * b` at full width. A product of two `u128` always fits in 256 bits.
fn full_mul(a: Amount, b: Amount) -> U256 {
    U256::from(a) * U256::from(b)
}

fn narrow(value: U256) -> Result<Amount> {
    if value.bits() > 128 {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

/// Compute `a * b / denominator`, truncating.
///
/// The product is formed at 256 bits, so only the quotient has to fit in
/// `u128`.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `denominator` is zero
/// - [`MathError::Overflow`] if the quotient does not fit in `u128`
pub fn mul_div(a: Amount, b: Amount, denominator: Amount) -> Result<Amount> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let quotient = full_mul(a, b)
        .checked_div(U256::from(denominator))
        .ok_or(MathError::DivisionByZero)?;
    narrow(quotient)
}

/// Checked addition.
pub fn add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Checked subtraction.
pub fn sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// Compare the ratios `a_num / a_den` and `b_num / b_den` without division.
///
/// Zero denominators are treated as a 1:1 ratio, matching the exchange rate
/// of an empty vault. Cross products are compared at 256 bits and cannot
/// overflow.
pub fn cmp_ratio(a_num: Amount, a_den: Amount, b_num: Amount, b_den: Amount) -> Ordering {
    let (a_num, a_den) = if a_den == 0 { (1, 1) } else { (a_num, a_den) };
    let (b_num, b_den) = if b_den == 0 { (1, 1) } else { (b_num, b_den) };
    full_mul(a_num, b_den).cmp(&full_mul(b_num, a_den))
}
