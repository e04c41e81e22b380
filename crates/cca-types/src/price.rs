//! Q96 fixed-point prices.
//!
//! A [`Price`] is `currency_per_token * 2^96` stored in 256 bits. Prices are
//! compared and hashed as raw integers, so a price's identity at a tick never
//! depends on decimal formatting.

use std::fmt;

use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{PRICE_DISPLAY_SCALE, RESOLUTION, q96};
use crate::error::{AuctionError, Result};
use crate::fixed_point::{checked_add, mul_div};

/// Currency per token in Q96 fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(U256);

impl Price {
    pub const ZERO: Self = Self(U256([0; 4]));

    #[must_use]
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(&self) -> U256 {
        self.0
    }

    /// A whole number of currency units per token.
    #[must_use]
    pub fn from_integer(value: u64) -> Self {
        Self(U256::from(value) << RESOLUTION)
    }

    /// `numerator / denominator` currency per token, rounded down.
    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Self> {
        mul_div(U256::from(numerator), q96(), U256::from(denominator)).map(Self)
    }

    /// Convert a human-entered decimal, rounding down to the Q96 grid.
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() {
            return Err(AuctionError::Configuration(format!(
                "negative price {value}"
            )));
        }
        let mantissa = u128::try_from(value.mantissa())
            .map_err(|_| AuctionError::Configuration(format!("bad price {value}")))?;
        let denominator = U256::exp10(value.scale() as usize);
        mul_div(U256::from(mantissa), q96(), denominator).map(Self)
    }

    /// Render with `scale` decimal places (rounded down). `None` when the
    /// value does not fit a `Decimal`.
    #[must_use]
    pub fn to_decimal(&self, scale: u32) -> Option<Decimal> {
        let scaled = mul_div(self.0, U256::exp10(scale as usize), q96()).ok()?;
        if scaled > U256::from(i128::MAX as u128) {
            return None;
        }
        let mantissa = i128::try_from(scaled.low_u128()).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, scale).ok()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True when this price lies on the grid defined by `spacing`.
    #[must_use]
    pub fn is_multiple_of(&self, spacing: Price) -> bool {
        !spacing.is_zero() && (self.0 % spacing.0).is_zero()
    }

    pub fn checked_add(self, other: Price) -> Result<Self> {
        checked_add(self.0, other.0, "Price::add").map(Self)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal(PRICE_DISPLAY_SCALE) {
            Some(d) => write!(f, "{d}"),
            None => write!(f, "q96:{}", self.0),
        }
    }
}
