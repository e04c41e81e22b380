//! Checkpoint records and their read-only view.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::fixed_point::ValueX7X7;
use crate::price::Price;

/// Cumulative auction state at one block.
///
/// The interval ending at `block` is sold at `clearing_price`. Cumulative
/// fields are monotone along the chain; `prev`/`next` link neighbouring
/// checkpoints by block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub block: u64,
    pub clearing_price: Price,
    /// Rate released since the auction began.
    pub cumulative_mps: u32,
    /// `Σ δ · 2^192 / price`, i.e. rate per unit price in Q96.
    pub cumulative_mps_per_price: U256,
    /// `Σ δ · price`.
    pub cumulative_mps_times_price: U256,
    pub cumulative_released: ValueX7X7,
    pub total_cleared: ValueX7X7,
    pub currency_raised: ValueX7X7,
    /// Tokens sold to the tick at `clearing_price` since the price last moved.
    pub cleared_at_clearing_price: ValueX7X7,
    pub prev: Option<u64>,
    pub next: Option<u64>,
}

impl Checkpoint {
    /// The first checkpoint: nothing released, priced at the floor.
    #[must_use]
    pub fn genesis(block: u64, floor_price: Price) -> Self {
        Self {
            block,
            clearing_price: floor_price,
            cumulative_mps: 0,
            cumulative_mps_per_price: U256::zero(),
            cumulative_mps_times_price: U256::zero(),
            cumulative_released: ValueX7X7::ZERO,
            total_cleared: ValueX7X7::ZERO,
            currency_raised: ValueX7X7::ZERO,
            cleared_at_clearing_price: ValueX7X7::ZERO,
            prev: None,
            next: None,
        }
    }

    #[must_use]
    pub fn view(&self) -> CheckpointView {
        CheckpointView {
            block: self.block,
            clearing_price: self.clearing_price,
            cumulative_mps: self.cumulative_mps,
            tokens_released: self.cumulative_released.scale_down(),
            tokens_cleared: self.total_cleared.scale_down(),
            currency_raised: self.currency_raised.scale_down(),
            prev: self.prev,
            next: self.next,
        }
    }
}

/// Read-only, unscaled copy of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointView {
    pub block: u64,
    pub clearing_price: Price,
    pub cumulative_mps: u32,
    pub tokens_released: U256,
    pub tokens_cleared: U256,
    pub currency_raised: U256,
    pub prev: Option<u64>,
    pub next: Option<u64>,
}
