//! Fixed-point arithmetic for the clearing engine.
//!
//! Two scaled kinds are carried as distinct newtypes so they cannot be mixed:
//!
//! - [`ValueX7`]: a value multiplied by `MPS` (single-scaled). Demand,
//!   per-auction supply and resolved token demand live here.
//! - [`ValueX7X7`]: a value multiplied by `MPS²` (double-scaled). A single-
//!   scaled value multiplied by a rate lands here exactly, so per-interval
//!   sales never round.
//!
//! Every multiply-then-divide goes through a 512-bit intermediate and is
//! narrowed back with a checked conversion. Overflow and zero denominators are
//! errors, never wrapped results.

use std::fmt;
use std::ops::{Add, Sub};

use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};

use crate::constants::{MPS, mps, mps_squared};
use crate::error::{AuctionError, Result};

// ---------------------------------------------------------------------------
// Widening helpers
// ---------------------------------------------------------------------------

fn full_div(a: U256, b: U256, denominator: U256, op: &'static str) -> Result<(U256, bool)> {
    if denominator.is_zero() {
        return Err(AuctionError::DivisionByZero { op });
    }
    let product: U512 = a.full_mul(b);
    let (quotient, remainder) = product.div_mod(U512::from(denominator));
    let quotient = U256::try_from(quotient).map_err(|_| AuctionError::ArithmeticOverflow { op })?;
    Ok((quotient, !remainder.is_zero()))
}

/// `floor(a * b / denominator)` with a 512-bit intermediate.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    full_div(a, b, denominator, "mul_div").map(|(q, _)| q)
}

/// `ceil(a * b / denominator)` with a 512-bit intermediate.
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> Result<U256> {
    let (q, inexact) = full_div(a, b, denominator, "mul_div_up")?;
    if inexact {
        checked_add(q, U256::one(), "mul_div_up")
    } else {
        Ok(q)
    }
}

/// `ceil(a / b)`.
pub fn div_up(a: U256, b: U256) -> Result<U256> {
    if b.is_zero() {
        return Err(AuctionError::DivisionByZero { op: "div_up" });
    }
    let (q, r) = a.div_mod(b);
    if r.is_zero() {
        Ok(q)
    } else {
        checked_add(q, U256::one(), "div_up")
    }
}

pub fn checked_add(a: U256, b: U256, op: &'static str) -> Result<U256> {
    a.checked_add(b).ok_or(AuctionError::ArithmeticOverflow { op })
}

pub fn checked_sub(a: U256, b: U256, op: &'static str) -> Result<U256> {
    a.checked_sub(b).ok_or(AuctionError::ArithmeticOverflow { op })
}

pub fn checked_mul(a: U256, b: U256, op: &'static str) -> Result<U256> {
    a.checked_mul(b).ok_or(AuctionError::ArithmeticOverflow { op })
}

/// Narrow to `u128`, failing closed.
pub fn to_u128(value: U256, op: &'static str) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(AuctionError::ArithmeticOverflow { op });
    }
    Ok(value.low_u128())
}

// ---------------------------------------------------------------------------
// ValueX7
// ---------------------------------------------------------------------------

/// A value scaled by `MPS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueX7(U256);

impl ValueX7 {
    pub const ZERO: Self = Self(U256([0; 4]));

    #[must_use]
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(&self) -> U256 {
        self.0
    }

    /// `value * MPS`.
    #[must_use]
    pub fn scale_up(value: u128) -> Self {
        // u128 * 2^24 always fits in 256 bits.
        Self(U256::from(value) * mps())
    }

    /// `floor(self / MPS)`.
    #[must_use]
    pub fn scale_down(&self) -> U256 {
        self.0 / mps()
    }

    /// `ceil(self / MPS)`.
    pub fn scale_down_up(&self) -> Result<U256> {
        div_up(self.0, mps())
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        checked_add(self.0, other.0, "ValueX7::add").map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Result<Self> {
        checked_sub(self.0, other.0, "ValueX7::sub").map(Self)
    }

    /// Multiply by a rate, landing exactly in the double-scaled domain.
    pub fn mul_rate(self, rate: u32) -> Result<ValueX7X7> {
        checked_mul(self.0, U256::from(rate), "ValueX7::mul_rate").map(ValueX7X7)
    }

    /// `floor(self * numerator / denominator)`, same scale.
    pub fn mul_div(self, numerator: U256, denominator: U256) -> Result<Self> {
        mul_div(self.0, numerator, denominator).map(Self)
    }

    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }
}

impl Add for ValueX7 {
    type Output = Self;

    /// Panics on overflow, like the integer primitives.
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for ValueX7 {
    type Output = Self;

    /// Panics on underflow, like the integer primitives.
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for ValueX7 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}e-7", self.0)
    }
}

// ---------------------------------------------------------------------------
// ValueX7X7
// ---------------------------------------------------------------------------

/// A value scaled by `MPS²`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueX7X7(U256);

impl ValueX7X7 {
    pub const ZERO: Self = Self(U256([0; 4]));

    #[must_use]
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(&self) -> U256 {
        self.0
    }

    /// `value * MPS²`.
    #[must_use]
    pub fn scale_up(value: u128) -> Self {
        Self(U256::from(value) * mps_squared())
    }

    /// `floor(self / MPS²)`: the unscaled integer value, rounded down.
    #[must_use]
    pub fn scale_down(&self) -> U256 {
        self.0 / mps_squared()
    }

    /// `ceil(self / MPS²)`.
    pub fn scale_down_up(&self) -> Result<U256> {
        div_up(self.0, mps_squared())
    }

    /// Drop one scale factor: `floor(self / MPS)`.
    #[must_use]
    pub fn to_x7(&self) -> ValueX7 {
        ValueX7(self.0 / mps())
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        checked_add(self.0, other.0, "ValueX7X7::add").map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Result<Self> {
        checked_sub(self.0, other.0, "ValueX7X7::sub").map(Self)
    }

    /// Whole-auction equivalent of a value spread over `rate` units:
    /// `floor(self / rate)` as a single-scaled value.
    pub fn per_rate(self, rate: u32) -> Result<ValueX7> {
        if rate == 0 {
            return Err(AuctionError::DivisionByZero { op: "ValueX7X7::per_rate" });
        }
        Ok(ValueX7(self.0 / U256::from(rate)))
    }

    /// `floor(self * numerator / denominator)`, same scale.
    pub fn mul_div(self, numerator: U256, denominator: U256) -> Result<Self> {
        mul_div(self.0, numerator, denominator).map(Self)
    }

    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }

    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl Add for ValueX7X7 {
    type Output = Self;

    /// Panics on overflow, like the integer primitives.
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for ValueX7X7 {
    type Output = Self;

    /// Panics on underflow, like the integer primitives.
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for ValueX7X7 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}e-14", self.0)
    }
}

/// Whole-auction normalisation of an amount committed when `cumulative_mps`
/// of the schedule had already elapsed: `ceil(amount * MPS² / (MPS - c))`.
pub fn effective_amount(amount: u128, cumulative_mps: u32) -> Result<ValueX7> {
    if cumulative_mps >= MPS {
        return Err(AuctionError::AuctionIsOver);
    }
    let remaining = U256::from(MPS - cumulative_mps);
    let scaled = ValueX7::scale_up(amount).raw();
    mul_div_up(scaled, mps(), remaining).map(ValueX7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_rounds_both_ways() {
        let seven = U256::from(7u8);
        let two = U256::from(2u8);
        let three = U256::from(3u8);
        assert_eq!(mul_div(seven, two, three).unwrap(), U256::from(4u8));
        assert_eq!(mul_div_up(seven, two, three).unwrap(), U256::from(5u8));
        assert_eq!(mul_div_up(three, two, three).unwrap(), two);
    }

    #[test]
    fn mul_div_uses_wide_intermediate() {
        // (2^255 * 4) / 8 fits even though the product does not.
        let big = U256::one() << 255;
        let got = mul_div(big, U256::from(4u8), U256::from(8u8)).unwrap();
        assert_eq!(got, U256::one() << 254);
    }

    #[test]
    fn mul_div_fails_closed() {
        let err = mul_div(U256::MAX, U256::MAX, U256::one()).unwrap_err();
        assert!(matches!(err, AuctionError::ArithmeticOverflow { .. }));
        let err = mul_div(U256::one(), U256::one(), U256::zero()).unwrap_err();
        assert!(matches!(err, AuctionError::DivisionByZero { .. }));
        assert!(div_up(U256::one(), U256::zero()).is_err());
    }

    #[test]
    fn div_up_exact_and_inexact() {
        assert_eq!(div_up(U256::from(10u8), U256::from(5u8)).unwrap(), U256::from(2u8));
        assert_eq!(div_up(U256::from(11u8), U256::from(5u8)).unwrap(), U256::from(3u8));
    }

    #[test]
    fn scaled_values_roundtrip() {
        let v = ValueX7::scale_up(1_234);
        assert_eq!(v.scale_down(), U256::from(1_234u32));
        let vv = v.mul_rate(MPS).unwrap();
        assert_eq!(vv, ValueX7X7::scale_up(1_234));
        assert_eq!(vv.scale_down(), U256::from(1_234u32));
        assert_eq!(vv.to_x7(), v);
    }

    #[test]
    fn scale_down_up_rounds_up() {
        let v = ValueX7::from_raw(U256::from(MPS) + U256::one());
        assert_eq!(v.scale_down(), U256::one());
        assert_eq!(v.scale_down_up().unwrap(), U256::from(2u8));
    }

    #[test]
    fn checked_ops_fail_closed() {
        let max = ValueX7::from_raw(U256::MAX);
        assert!(max.checked_add(ValueX7::from_raw(U256::one())).is_err());
        assert!(ValueX7::ZERO.checked_sub(ValueX7::from_raw(U256::one())).is_err());
        assert!(ValueX7X7::ZERO.per_rate(0).is_err());
    }

    #[test]
    fn effective_amount_spreads_over_remaining_rate() {
        // At the start the effective amount is the amount itself.
        assert_eq!(effective_amount(500, 0).unwrap(), ValueX7::scale_up(500));
        // Halfway through it doubles.
        assert_eq!(effective_amount(500, MPS / 2).unwrap(), ValueX7::scale_up(1_000));
        // Rounds up when inexact.
        let third = effective_amount(1, MPS / 3 * 2).unwrap();
        assert!(third.raw() * U256::from(MPS - MPS / 3 * 2) >= ValueX7::scale_up(1).raw() * mps());
        assert!(effective_amount(1, MPS).is_err());
    }

    #[test]
    fn to_u128_bounds() {
        assert_eq!(to_u128(U256::from(u128::MAX), "t").unwrap(), u128::MAX);
        assert!(to_u128(U256::from(u128::MAX) + U256::one(), "t").is_err());
    }
}
