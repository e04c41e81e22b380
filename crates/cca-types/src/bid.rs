//! Bid model.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::demand::Demand;
use crate::fixed_point::ValueX7;
use crate::ids::{BidId, OwnerId};
use crate::price::Price;

/// Which asset a bid's amount is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidSide {
    /// The amount is currency to spend.
    ExactIn,
    /// The amount is tokens to buy.
    ExactOut,
}

impl fmt::Display for BidSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactIn => write!(f, "EXACT_IN"),
            Self::ExactOut => write!(f, "EXACT_OUT"),
        }
    }
}

/// Final accounting of an exited bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BidSettlement {
    pub tokens_filled: u128,
    pub currency_spent: u128,
    pub currency_refunded: u128,
}

/// A registered bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub owner: OwnerId,
    pub max_price: Price,
    pub amount: u128,
    pub side: BidSide,
    /// Block at which the bid was registered.
    pub start_block: u64,
    /// Rate already elapsed when the bid was registered.
    pub start_cumulative_mps: u32,
    /// Amount normalised over the remaining schedule (see [`crate::effective_amount`]).
    pub effective_demand: ValueX7,
    /// Currency pulled from the owner at submission.
    pub committed_currency: u128,
    pub exited_block: Option<u64>,
    pub settlement: Option<BidSettlement>,
    pub claimed: bool,
}

impl Bid {
    /// The demand this bid contributes to its tick.
    #[must_use]
    pub fn demand(&self) -> Demand {
        match self.side {
            BidSide::ExactIn => Demand::currency(self.effective_demand),
            BidSide::ExactOut => Demand::token(self.effective_demand),
        }
    }

    #[must_use]
    pub fn is_exited(&self) -> bool {
        self.exited_block.is_some()
    }
}

/// A bid as submitted, before the ledger assigns it an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BidRequest {
    pub max_price: Price,
    pub amount: u128,
    pub side: BidSide,
    pub owner: OwnerId,
    /// Initialized tick just below `max_price`; walked from the floor when absent.
    pub prev_tick_hint: Option<Price>,
}

impl BidRequest {
    #[must_use]
    pub fn new(side: BidSide, max_price: Price, amount: u128, owner: OwnerId) -> Self {
        Self {
            max_price,
            amount,
            side,
            owner,
            prev_tick_hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, prev_tick_hint: Price) -> Self {
        self.prev_tick_hint = Some(prev_tick_hint);
        self
    }
}

/// Checkpoint blocks that bound a bid's fill windows. Always verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExitHints {
    /// Last checkpoint whose clearing price was strictly below the bid price.
    pub last_fully_filled: Option<u64>,
    /// First checkpoint whose clearing price was strictly above the bid price.
    pub outbid: Option<u64>,
}

/// Outcome of exiting a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillResult {
    pub bid_id: BidId,
    pub owner: OwnerId,
    pub tokens_filled: u128,
    pub currency_spent: u128,
    pub currency_refunded: u128,
}

/// Outcome of claiming a bid's tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub bid_id: BidId,
    pub owner: OwnerId,
    pub tokens_filled: u128,
    pub currency_refunded: u128,
}

/// Rounding residue released once every bid has settled.
///
/// Per-bid fills round down and per-bid spends round up, so the settled
/// totals drift from the chain's aggregate by at most one unit per bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DustSweep {
    /// Currency spent by bids beyond the currency raised.
    pub currency: u128,
    /// Tokens sold by the chain that no bid was credited.
    pub tokens: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(side: BidSide) -> Bid {
        Bid {
            id: BidId(0),
            owner: OwnerId::from_bytes([1; 20]),
            max_price: Price::from_integer(2),
            amount: 10,
            side,
            start_block: 0,
            start_cumulative_mps: 0,
            effective_demand: ValueX7::scale_up(10),
            committed_currency: 20,
            exited_block: None,
            settlement: None,
            claimed: false,
        }
    }

    #[test]
    fn demand_follows_side() {
        assert_eq!(bid(BidSide::ExactIn).demand(), Demand::currency(ValueX7::scale_up(10)));
        assert_eq!(bid(BidSide::ExactOut).demand(), Demand::token(ValueX7::scale_up(10)));
    }

    #[test]
    fn side_serializes_screaming() {
        let json = serde_json::to_string(&BidSide::ExactOut).unwrap();
        assert_eq!(json, "\"EXACT_OUT\"");
        assert_eq!(BidSide::ExactIn.to_string(), "EXACT_IN");
    }
}
