//! Bid storage and fill arithmetic.
//!
//! Bids are stored densely by id. Fills are computed from checkpoint
//! integrals, never by replaying steps:
//!
//! - **Fully filled** windows (clearing price strictly below the bid price)
//!   use the cumulative rate and rate-per-price accumulators.
//! - **Marginal** windows (clearing price equal to the bid price) share the
//!   tokens sold at that tick pro rata by resolved demand.
//!
//! Tokens credited round down; currency charged rounds up.

use cca_types::constants::{MPS, mps_squared, q96};
use cca_types::*;

/// Tokens and currency accounted to one bid over some window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fill {
    pub tokens: U256,
    pub currency_spent: U256,
}

impl Fill {
    pub const ZERO: Self = Self {
        tokens: U256([0; 4]),
        currency_spent: U256([0; 4]),
    };

    pub fn checked_add(self, other: Self) -> Result<Self> {
        Ok(Self {
            tokens: checked_add(self.tokens, other.tokens, "Fill::tokens")?,
            currency_spent: checked_add(self.currency_spent, other.currency_spent, "Fill::currency")?,
        })
    }
}

/// Currency pulled from the owner when the bid is registered.
pub fn committed_currency(side: BidSide, amount: u128, max_price: Price) -> Result<u128> {
    match side {
        BidSide::ExactIn => Ok(amount),
        BidSide::ExactOut => {
            let owed = mul_div_up(U256::from(amount), max_price.raw(), q96())?;
            to_u128(owed, "committed_currency")
        }
    }
}

fn remaining_rate(bid: &Bid) -> Result<U256> {
    if bid.start_cumulative_mps >= MPS {
        return Err(AuctionError::Internal(format!("{} registered after the schedule ended", bid.id)));
    }
    Ok(U256::from(MPS - bid.start_cumulative_mps))
}

/// Fill between two checkpoints during which the bid was strictly above
/// the clearing price.
pub fn fully_filled(bid: &Bid, lower: &Checkpoint, upper: &Checkpoint) -> Result<Fill> {
    if upper.block < lower.block {
        return Err(AuctionError::Internal("fill window runs backwards".into()));
    }
    let remaining = remaining_rate(bid)?;
    let amount = U256::from(bid.amount);
    let delta_mps = U256::from(upper.cumulative_mps - lower.cumulative_mps);
    let price_denominator = checked_mul(q96(), remaining, "fully_filled")?;
    match bid.side {
        BidSide::ExactIn => {
            let delta_per_price = checked_sub(
                upper.cumulative_mps_per_price,
                lower.cumulative_mps_per_price,
                "fully_filled",
            )?;
            Ok(Fill {
                tokens: mul_div(amount, delta_per_price, price_denominator)?,
                currency_spent: mul_div_up(amount, delta_mps, remaining)?,
            })
        }
        BidSide::ExactOut => {
            let delta_times_price = checked_sub(
                upper.cumulative_mps_times_price,
                lower.cumulative_mps_times_price,
                "fully_filled",
            )?;
            Ok(Fill {
                tokens: mul_div(amount, delta_mps, remaining)?,
                currency_spent: mul_div_up(amount, delta_times_price, price_denominator)?,
            })
        }
    }
}

/// Pro-rata share of the tokens sold at the bid's own price.
///
/// `tick_demand` is the total demand at the bid's tick, which is frozen once
/// the clearing price reaches it.
pub fn partially_filled(bid: &Bid, tick_demand: Demand, cleared_at_price: ValueX7X7) -> Result<Fill> {
    if cleared_at_price.is_zero() {
        return Ok(Fill::ZERO);
    }
    let price = bid.max_price;
    let tick_resolved = tick_demand.resolve(price)?;
    if tick_resolved.is_zero() {
        return Ok(Fill::ZERO);
    }
    let bid_resolved = bid.demand().resolve(price)?;
    let tokens_x7x7 = mul_div(bid_resolved.raw(), cleared_at_price.raw(), tick_resolved.raw())?;
    let currency_denominator = checked_mul(q96(), mps_squared(), "partially_filled")?;
    Ok(Fill {
        tokens: tokens_x7x7 / mps_squared(),
        currency_spent: mul_div_up(tokens_x7x7, price.raw(), currency_denominator)?,
    })
}

/// Close out a fill: spend never exceeds the commitment, the rest is refunded.
pub fn settle(bid: &Bid, fill: Fill) -> Result<BidSettlement> {
    let committed = U256::from(bid.committed_currency);
    let spent = if fill.currency_spent > committed {
        committed
    } else {
        fill.currency_spent
    };
    let currency_spent = to_u128(spent, "settle")?;
    Ok(BidSettlement {
        tokens_filled: to_u128(fill.tokens, "settle")?,
        currency_spent,
        currency_refunded: bid.committed_currency - currency_spent,
    })
}

/// Every bid ever registered, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct BidLedger {
    bids: Vec<Bid>,
}

impl BidLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bids(bids: Vec<Bid>) -> Result<Self> {
        for (i, bid) in bids.iter().enumerate() {
            if bid.id.0 != i as u64 {
                return Err(AuctionError::DanglingLink {
                    reason: format!("bid at position {i} has id {}", bid.id),
                });
            }
        }
        Ok(Self { bids })
    }

    /// Identifier the next registered bid will receive.
    #[must_use]
    pub fn next_id(&self) -> BidId {
        BidId(self.bids.len() as u64)
    }

    pub fn get(&self, id: BidId) -> Result<&Bid> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.bids.get(i))
            .ok_or(AuctionError::BidNotFound(id))
    }

    fn get_mut(&mut self, id: BidId) -> Result<&mut Bid> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.bids.get_mut(i))
            .ok_or(AuctionError::BidNotFound(id))
    }

    /// Append a bid whose id was taken from [`Self::next_id`].
    pub fn push(&mut self, bid: Bid) -> Result<BidId> {
        if bid.id != self.next_id() {
            return Err(AuctionError::Internal(format!("out-of-order bid id {}", bid.id)));
        }
        let id = bid.id;
        self.bids.push(bid);
        Ok(id)
    }

    pub fn record_exit(&mut self, id: BidId, block: u64, settlement: BidSettlement) -> Result<()> {
        let bid = self.get_mut(id)?;
        if bid.is_exited() {
            return Err(AuctionError::BidAlreadyExited(id));
        }
        bid.exited_block = Some(block);
        bid.settlement = Some(settlement);
        Ok(())
    }

    /// Mark an exited bid claimed and report its entitlement.
    pub fn claim(&mut self, id: BidId) -> Result<ClaimResult> {
        let bid = self.get_mut(id)?;
        let settlement = bid.settlement.ok_or(AuctionError::BidNotExited(id))?;
        if bid.claimed {
            return Err(AuctionError::AlreadyClaimed(id));
        }
        bid.claimed = true;
        Ok(ClaimResult {
            bid_id: id,
            owner: bid.owner,
            tokens_filled: settlement.tokens_filled,
            currency_refunded: settlement.currency_refunded,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bid> {
        self.bids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(side: BidSide, amount: u128, price: u64) -> Bid {
        let max_price = Price::from_integer(price);
        let effective_demand = effective_amount(amount, 0).unwrap();
        Bid {
            id: BidId(0),
            owner: OwnerId::from_bytes([9; 20]),
            max_price,
            amount,
            side,
            start_block: 0,
            start_cumulative_mps: 0,
            effective_demand,
            committed_currency: committed_currency(side, amount, max_price).unwrap(),
            exited_block: None,
            settlement: None,
            claimed: false,
        }
    }

    fn checkpoint_at_price(price: u64, mps: u32) -> Checkpoint {
        let p = Price::from_integer(price);
        let mut cp = Checkpoint::genesis(1, p);
        cp.cumulative_mps = mps;
        cp.cumulative_mps_per_price = mul_div(U256::from(mps) << 192, U256::one(), p.raw()).unwrap();
        cp.cumulative_mps_times_price = U256::from(mps) * p.raw();
        cp
    }

    #[test]
    fn committed_currency_by_side() {
        let p = Price::from_integer(3);
        assert_eq!(committed_currency(BidSide::ExactIn, 10, p).unwrap(), 10);
        assert_eq!(committed_currency(BidSide::ExactOut, 10, p).unwrap(), 30);
        let half = Price::from_ratio(1, 2).unwrap();
        assert_eq!(committed_currency(BidSide::ExactOut, 3, half).unwrap(), 2);
    }

    #[test]
    fn exact_in_full_window_at_constant_price() {
        let b = bid(BidSide::ExactIn, 500, 2);
        let lower = Checkpoint::genesis(0, Price::from_integer(1));
        let upper = checkpoint_at_price(1, MPS);
        let fill = fully_filled(&b, &lower, &upper).unwrap();
        assert_eq!(fill.tokens, U256::from(500u32));
        assert_eq!(fill.currency_spent, U256::from(500u32));
    }

    #[test]
    fn exact_out_full_window_pays_clearing() {
        let b = bid(BidSide::ExactOut, 100, 3);
        let lower = Checkpoint::genesis(0, Price::from_integer(1));
        let upper = checkpoint_at_price(2, MPS / 2);
        let fill = fully_filled(&b, &lower, &upper).unwrap();
        assert_eq!(fill.tokens, U256::from(50u32));
        assert_eq!(fill.currency_spent, U256::from(100u32));
        let s = settle(&b, fill).unwrap();
        assert_eq!(s.currency_refunded, 200);
    }

    #[test]
    fn marginal_share_is_pro_rata() {
        let b = bid(BidSide::ExactOut, 200, 2);
        let tick = Demand::token(ValueX7::scale_up(2_000));
        let fill = partially_filled(&b, tick, ValueX7X7::scale_up(1_000)).unwrap();
        assert_eq!(fill.tokens, U256::from(100u32));
        assert_eq!(fill.currency_spent, U256::from(200u32));
    }

    #[test]
    fn marginal_share_zero_when_nothing_sold() {
        let b = bid(BidSide::ExactIn, 200, 2);
        let tick = Demand::currency(ValueX7::scale_up(200));
        assert_eq!(partially_filled(&b, tick, ValueX7X7::ZERO).unwrap(), Fill::ZERO);
        assert_eq!(partially_filled(&b, Demand::ZERO, ValueX7X7::scale_up(5)).unwrap(), Fill::ZERO);
    }

    #[test]
    fn settle_caps_spend_at_commitment() {
        let b = bid(BidSide::ExactIn, 10, 2);
        let fill = Fill {
            tokens: U256::from(5u8),
            currency_spent: U256::from(11u8),
        };
        let s = settle(&b, fill).unwrap();
        assert_eq!(s.currency_spent, 10);
        assert_eq!(s.currency_refunded, 0);
    }

    #[test]
    fn ledger_assigns_dense_ids_and_claims_once() {
        let mut ledger = BidLedger::new();
        let b = bid(BidSide::ExactIn, 10, 2);
        assert_eq!(ledger.push(b.clone()).unwrap(), BidId(0));
        assert!(ledger.push(b).is_err());
        assert!(matches!(ledger.claim(BidId(0)), Err(AuctionError::BidNotExited(_))));

        let settlement = BidSettlement {
            tokens_filled: 5,
            currency_spent: 10,
            currency_refunded: 0,
        };
        ledger.record_exit(BidId(0), 7, settlement).unwrap();
        assert!(matches!(
            ledger.record_exit(BidId(0), 8, settlement),
            Err(AuctionError::BidAlreadyExited(_))
        ));
        assert_eq!(ledger.claim(BidId(0)).unwrap().tokens_filled, 5);
        assert!(matches!(ledger.claim(BidId(0)), Err(AuctionError::AlreadyClaimed(_))));
        assert!(matches!(ledger.get(BidId(3)), Err(AuctionError::BidNotFound(_))));
    }
}
