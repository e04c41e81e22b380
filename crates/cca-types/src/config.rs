//! Auction configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_TOTAL_SUPPLY, MIN_FLOOR_PRICE_RAW, MIN_TICK_SPACING_RAW, MPS, max_bid_price_ceiling,
};
use crate::error::{AuctionError, Result};
use crate::ids::AuctionId;
use crate::price::Price;
use crate::step::{AuctionStep, validate_steps};

/// Parameters fixed at auction creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub auction_id: AuctionId,
    /// Tokens offered, in atomic units.
    pub total_supply: u128,
    pub start_block: u64,
    /// First block at which filled tokens may be claimed.
    pub claim_block: u64,
    pub floor_price: Price,
    pub tick_spacing: Price,
    pub max_bid_price: Price,
    /// Currency that must be raised for the sale to go through.
    #[serde(default)]
    pub required_currency_raised: u128,
    pub steps: Vec<AuctionStep>,
}

impl AuctionConfig {
    /// An evenly released auction over `blocks` blocks, claimable at the end.
    #[must_use]
    pub fn linear(
        total_supply: u128,
        start_block: u64,
        blocks: u64,
        floor_price: Price,
        tick_spacing: Price,
    ) -> Self {
        let mut steps = Vec::new();
        if blocks > 0 {
            let per_block = u64::from(MPS) / blocks;
            let remainder = u64::from(MPS) % blocks;
            #[allow(clippy::cast_possible_truncation)]
            {
                if blocks > remainder {
                    steps.push(AuctionStep::new(per_block as u32, blocks - remainder));
                }
                if remainder > 0 {
                    steps.push(AuctionStep::new(per_block as u32 + 1, remainder));
                }
            }
        }
        Self {
            auction_id: AuctionId::new(),
            total_supply,
            start_block,
            claim_block: start_block.saturating_add(blocks),
            floor_price,
            tick_spacing,
            max_bid_price: Price::from_raw(max_bid_price_ceiling()),
            required_currency_raised: 0,
            steps,
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuctionError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// First block after the last step.
    pub fn end_block(&self) -> Result<u64> {
        self.steps.iter().try_fold(self.start_block, |acc, step| {
            acc.checked_add(step.duration)
                .ok_or_else(|| AuctionError::InvalidSchedule { reason: "end block overflows".into() })
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_supply == 0 || self.total_supply > MAX_TOTAL_SUPPLY {
            return Err(AuctionError::Configuration(format!(
                "total supply {} outside (0, 2^100]",
                self.total_supply
            )));
        }
        if self.floor_price < Price::from_raw(MIN_FLOOR_PRICE_RAW.into()) {
            return Err(AuctionError::Configuration(format!(
                "floor price {} below minimum",
                self.floor_price
            )));
        }
        if self.tick_spacing < Price::from_raw(MIN_TICK_SPACING_RAW.into()) {
            return Err(AuctionError::Configuration("tick spacing below minimum".into()));
        }
        if !self.floor_price.is_multiple_of(self.tick_spacing) {
            return Err(AuctionError::Configuration(
                "floor price is not on a tick boundary".into(),
            ));
        }
        if self.max_bid_price <= self.floor_price
            || self.max_bid_price.raw() > max_bid_price_ceiling()
        {
            return Err(AuctionError::Configuration(format!(
                "max bid price {} outside (floor, ceiling]",
                self.max_bid_price
            )));
        }
        validate_steps(&self.steps)?;
        let end_block = self.end_block()?;
        if self.claim_block < end_block {
            return Err(AuctionError::Configuration(format!(
                "claim block {} before end block {end_block}",
                self.claim_block
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AuctionConfig {
        AuctionConfig::linear(1_000, 100, 10, Price::from_integer(1), Price::from_integer(1))
    }

    #[test]
    fn linear_preset_is_valid() {
        let config = base();
        config.validate().unwrap();
        assert_eq!(config.end_block().unwrap(), 110);
        assert_eq!(config.claim_block, 110);
    }

    #[test]
    fn linear_preset_handles_uneven_division() {
        let config = AuctionConfig::linear(1_000, 0, 3, Price::from_integer(1), Price::from_integer(1));
        config.validate().unwrap();
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.end_block().unwrap(), 3);
    }

    #[test]
    fn schedule_must_sum_exactly() {
        let mut config = base();
        config.steps[0].mps -= 1;
        assert!(matches!(config.validate(), Err(AuctionError::InvalidSchedule { .. })));
        config.steps.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn floor_must_be_aligned() {
        let mut config = base();
        config.tick_spacing = Price::from_integer(3);
        assert!(matches!(config.validate(), Err(AuctionError::Configuration(_))));
    }

    #[test]
    fn bounds_are_enforced() {
        let mut config = base();
        config.total_supply = 0;
        assert!(config.validate().is_err());

        let mut config = base();
        config.total_supply = MAX_TOTAL_SUPPLY + 1;
        assert!(config.validate().is_err());

        let mut config = base();
        config.claim_block = 105;
        assert!(config.validate().is_err());

        let mut config = base();
        config.max_bid_price = config.floor_price;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_roundtrip_validates() {
        let config = base();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(AuctionConfig::from_json_str(&json).unwrap(), config);
        assert!(AuctionConfig::from_json_str("{").is_err());
    }
}
