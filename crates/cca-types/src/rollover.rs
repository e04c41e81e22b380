//! Supply rollover multiplier.
//!
//! Until the auction first sells out an interval, supply is released at the
//! scheduled rate. From then on the supply not yet cleared is spread evenly
//! over the rate that remains, so capacity unsold in earlier, thin intervals
//! is offered again. Once set the multiplier never changes.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{AuctionError, Result};
use crate::fixed_point::{ValueX7, ValueX7X7};

const SUPPLY_BITS: usize = 231;
const MPS_BITS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RolloverMultiplier {
    pub is_set: bool,
    /// Rate left in the schedule when the multiplier was set.
    pub remaining_mps: u32,
    /// Supply not yet cleared when the multiplier was set.
    pub remaining_supply: ValueX7X7,
}

impl RolloverMultiplier {
    pub const UNSET: Self = Self {
        is_set: false,
        remaining_mps: 0,
        remaining_supply: ValueX7X7::ZERO,
    };

    #[must_use]
    pub fn set(remaining_mps: u32, remaining_supply: ValueX7X7) -> Self {
        Self {
            is_set: true,
            remaining_mps,
            remaining_supply,
        }
    }

    /// Supply offered per full auction, single-scaled. Clearing prices are
    /// searched against this value.
    pub fn supply_per_auction(&self, total_supply: u128) -> Result<ValueX7> {
        if self.is_set {
            self.remaining_supply.per_rate(self.remaining_mps)
        } else {
            Ok(ValueX7::scale_up(total_supply))
        }
    }

    /// Supply released over an interval of `delta_mps`, rounded down.
    pub fn supply_for_interval(&self, total_supply: u128, delta_mps: u32) -> Result<ValueX7X7> {
        if self.is_set {
            self.remaining_supply
                .mul_div(U256::from(delta_mps), U256::from(self.remaining_mps))
        } else {
            ValueX7::scale_up(total_supply).mul_rate(delta_mps)
        }
    }

    /// Pack as `flag (1 bit) || remaining_mps (24 bits) || remaining_supply (231 bits)`.
    pub fn pack(&self) -> Result<U256> {
        if !self.is_set {
            return Ok(U256::zero());
        }
        if self.remaining_supply.raw().bits() > SUPPLY_BITS || self.remaining_mps >= 1 << MPS_BITS {
            return Err(AuctionError::ArithmeticOverflow { op: "RolloverMultiplier::pack" });
        }
        Ok((U256::one() << 255)
            | (U256::from(self.remaining_mps) << SUPPLY_BITS)
            | self.remaining_supply.raw())
    }

    pub fn unpack(packed: U256) -> Result<Self> {
        if packed.is_zero() {
            return Ok(Self::UNSET);
        }
        if !packed.bit(255) {
            return Err(AuctionError::Serialization(
                "rollover multiplier has payload without the set flag".into(),
            ));
        }
        let supply_mask = (U256::one() << SUPPLY_BITS) - U256::one();
        let mps_mask = (U256::one() << MPS_BITS) - U256::one();
        let remaining_mps = ((packed >> SUPPLY_BITS) & mps_mask).low_u32();
        Ok(Self::set(remaining_mps, ValueX7X7::from_raw(packed & supply_mask)))
    }
}
