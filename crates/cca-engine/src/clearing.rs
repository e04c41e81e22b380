//! Clearing price search.
//!
//! The clearing price is the lowest price at which the demand strictly above
//! it, resolved to tokens at that price, fits inside the supply offered. The
//! search starts from the current clearing price and only moves upward:
//!
//! 1. `raw = ceil(currency_above * 2^96 / (supply - token_above))`, or +∞
//!    when token demand alone exhausts supply.
//! 2. While the next active tick is at or below `raw`, its demand can no
//!    longer be served in full above the clearing price: remove it from the
//!    accumulator, remember its price as the new lower bound, recompute.
//! 3. The result is `max(raw, lower bound)`.
//!
//! Each crossed tick is removed once and never revisited, so the cost of all
//! searches over an auction is linear in the number of ticks.

use cca_types::constants::q96;
use cca_types::*;

use crate::tick_ledger::TickLedger;

/// Outcome of a search. Nothing is committed until the caller applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearingSearch {
    pub clearing_price: Price,
    /// Demand strictly above `clearing_price`.
    pub demand_above: Demand,
    /// Lowest initialized tick strictly above `clearing_price`.
    pub next_active_tick: Option<Price>,
    pub ticks_crossed: usize,
}

/// Unconstrained clearing price for `demand` against `supply`.
/// `None` means token-denominated demand alone meets the supply.
fn raw_clearing_price(demand: &Demand, supply: ValueX7) -> Result<Option<Price>> {
    if demand.token_demand >= supply {
        return Ok(None);
    }
    if demand.currency_demand.is_zero() {
        return Ok(Some(Price::ZERO));
    }
    let available = supply.checked_sub(demand.token_demand)?;
    mul_div_up(demand.currency_demand.raw(), q96(), available.raw())
        .map(|raw| Some(Price::from_raw(raw)))
}

/// Search upward from `current` for the new clearing price.
pub fn find_clearing_price(
    ticks: &TickLedger,
    supply: ValueX7,
    current: Price,
    demand_above: Demand,
    next_active_tick: Option<Price>,
) -> Result<ClearingSearch> {
    let mut demand = demand_above;
    let mut next_active = next_active_tick;
    let mut lower_bound = current;
    let mut ticks_crossed = 0usize;

    let raw = loop {
        let raw = raw_clearing_price(&demand, supply)?;
        match next_active {
            Some(next) if raw.is_none_or(|r| r >= next) => {
                let tick = ticks.get(next).ok_or_else(|| {
                    AuctionError::Internal(format!("active tick {next} is not initialized"))
                })?;
                demand = demand.checked_sub(tick.demand)?;
                lower_bound = next;
                next_active = tick.next;
                ticks_crossed += 1;
            }
            _ => break raw,
        }
    };

    let clearing_price = match raw {
        Some(r) if r > lower_bound => r,
        _ => lower_bound,
    };
    Ok(ClearingSearch {
        clearing_price,
        demand_above: demand,
        next_active_tick: next_active,
        ticks_crossed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick_ledger::Placement;

    fn p(n: u64) -> Price {
        Price::from_integer(n)
    }

    /// Ledger with the given (price, demand) levels and the matching
    /// accumulator for a clearing price at the floor.
    fn book(levels: &[(u64, Demand)]) -> (TickLedger, Demand, Option<Price>) {
        let mut ticks = TickLedger::new(p(1), p(1));
        let mut above = Demand::ZERO;
        let mut lowest: Option<Price> = None;
        for (price, demand) in levels {
            let price = p(*price);
            let placement = ticks.locate(price, None).unwrap();
            if placement != Placement::Existing {
                ticks.insert(price, placement).unwrap();
            }
            ticks.add_demand(price, *demand).unwrap();
            above = above.checked_add(*demand).unwrap();
            lowest = Some(lowest.map_or(price, |l| l.min(price)));
        }
        (ticks, above, lowest)
    }

    fn tokens(n: u128) -> Demand {
        Demand::token(ValueX7::scale_up(n))
    }

    fn currency(n: u128) -> Demand {
        Demand::currency(ValueX7::scale_up(n))
    }

    #[test]
    fn undersubscribed_stays_at_floor() {
        let (ticks, above, next) = book(&[(2, currency(500))]);
        let s = find_clearing_price(&ticks, ValueX7::scale_up(1_000), p(1), above, next).unwrap();
        assert_eq!(s.clearing_price, p(1));
        assert_eq!(s.demand_above, above);
        assert_eq!(s.next_active_tick, Some(p(2)));
        assert_eq!(s.ticks_crossed, 0);
    }

    #[test]
    fn exact_subscription_lands_on_tick() {
        let (ticks, above, next) = book(&[(2, tokens(400)), (2, tokens(600))]);
        let s = find_clearing_price(&ticks, ValueX7::scale_up(1_000), p(1), above, next).unwrap();
        assert_eq!(s.clearing_price, p(2));
        assert_eq!(s.demand_above, Demand::ZERO);
        assert_eq!(s.next_active_tick, None);
    }

    #[test]
    fn higher_tick_absorbs_supply() {
        let (ticks, above, next) = book(&[(2, currency(2_000)), (3, currency(3_000))]);
        let s = find_clearing_price(&ticks, ValueX7::scale_up(1_000), p(1), above, next).unwrap();
        assert_eq!(s.clearing_price, p(3));
        assert_eq!(s.ticks_crossed, 2);
    }

    #[test]
    fn price_between_ticks() {
        // 3000 currency above tick 2 against 1000 tokens clears at 3,
        // strictly between ticks 2 and 5.
        let (ticks, above, next) = book(&[(2, currency(1_000)), (5, currency(3_000))]);
        let s = find_clearing_price(&ticks, ValueX7::scale_up(1_000), p(1), above, next).unwrap();
        assert_eq!(s.clearing_price, p(3));
        assert_eq!(s.demand_above, currency(3_000));
        assert_eq!(s.next_active_tick, Some(p(5)));
    }

    #[test]
    fn never_moves_below_current() {
        let (ticks, above, next) = book(&[(4, currency(10))]);
        let s = find_clearing_price(&ticks, ValueX7::scale_up(1_000), p(3), above, next).unwrap();
        assert_eq!(s.clearing_price, p(3));
    }

    #[test]
    fn no_demand_keeps_price() {
        let ticks = TickLedger::new(p(1), p(1));
        let s = find_clearing_price(&ticks, ValueX7::scale_up(10), p(1), Demand::ZERO, None).unwrap();
        assert_eq!(s.clearing_price, p(1));
    }
}
