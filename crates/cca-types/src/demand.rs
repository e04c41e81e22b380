//! Two-sided demand carried by ticks and accumulators.

use serde::{Deserialize, Serialize};

use crate::constants::q96;
use crate::error::{AuctionError, Result};
use crate::fixed_point::{ValueX7, mul_div};
use crate::price::Price;

/// Demand normalised to "per full auction".
///
/// `currency_demand` comes from bids that name a currency amount, and
/// `token_demand` from bids that name a token amount. Both are single-scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Demand {
    pub currency_demand: ValueX7,
    pub token_demand: ValueX7,
}

impl Demand {
    pub const ZERO: Self = Self {
        currency_demand: ValueX7::ZERO,
        token_demand: ValueX7::ZERO,
    };

    #[must_use]
    pub fn currency(value: ValueX7) -> Self {
        Self {
            currency_demand: value,
            token_demand: ValueX7::ZERO,
        }
    }

    #[must_use]
    pub fn token(value: ValueX7) -> Self {
        Self {
            currency_demand: ValueX7::ZERO,
            token_demand: value,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.currency_demand.is_zero() && self.token_demand.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        Ok(Self {
            currency_demand: self.currency_demand.checked_add(other.currency_demand)?,
            token_demand: self.token_demand.checked_add(other.token_demand)?,
        })
    }

    pub fn checked_sub(self, other: Self) -> Result<Self> {
        Ok(Self {
            currency_demand: self.currency_demand.checked_sub(other.currency_demand)?,
            token_demand: self.token_demand.checked_sub(other.token_demand)?,
        })
    }

    /// Token-denominated demand at `price`: `currency / price + token`,
    /// rounded down.
    pub fn resolve(&self, price: Price) -> Result<ValueX7> {
        if self.currency_demand.is_zero() {
            return Ok(self.token_demand);
        }
        if price.is_zero() {
            return Err(AuctionError::DivisionByZero { op: "Demand::resolve" });
        }
        let from_currency = mul_div(self.currency_demand.raw(), q96(), price.raw())?;
        ValueX7::from_raw(from_currency).checked_add(self.token_demand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_mixes_both_sides() {
        let demand = Demand {
            currency_demand: ValueX7::scale_up(600),
            token_demand: ValueX7::scale_up(100),
        };
        // 600 currency at 2/token buys 300 tokens, plus 100 named directly.
        let got = demand.resolve(Price::from_integer(2)).unwrap();
        assert_eq!(got, ValueX7::scale_up(400));
    }

    #[test]
    fn resolve_token_only_ignores_price() {
        let demand = Demand::token(ValueX7::scale_up(5));
        assert_eq!(demand.resolve(Price::ZERO).unwrap(), ValueX7::scale_up(5));
        assert!(Demand::currency(ValueX7::scale_up(1)).resolve(Price::ZERO).is_err());
    }

    #[test]
    fn add_and_sub_are_component_wise() {
        let a = Demand::currency(ValueX7::scale_up(3));
        let b = Demand::token(ValueX7::scale_up(4));
        let sum = a.checked_add(b).unwrap();
        assert_eq!(sum.checked_sub(a).unwrap(), b);
        assert!(a.checked_sub(b).is_err());
        assert!(Demand::ZERO.is_zero());
    }
}
