//! Append-only chain of checkpoints.
//!
//! Each checkpoint closes the interval since its predecessor: the supply
//! released over that interval is sold at the checkpoint's clearing price.
//! Checkpoints are computed by [`CheckpointChain::stage`] without mutation
//! and committed with [`CheckpointChain::commit`], so a failing caller never
//! leaves a half-advanced chain.

use std::collections::HashMap;

use cca_types::constants::{MPS, q96};
use cca_types::*;

/// Inputs for selling one interval.
#[derive(Debug, Clone, Copy)]
pub struct Sale {
    pub clearing_price: Price,
    /// Demand strictly above the clearing price.
    pub demand_above: Demand,
    /// Demand resting exactly at the clearing price.
    pub marginal_demand: Demand,
    pub delta_mps: u32,
    pub total_supply: u128,
}

/// A computed but uncommitted checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCheckpoint {
    pub checkpoint: Checkpoint,
    pub rollover: RolloverMultiplier,
}

#[derive(Debug, Clone)]
pub struct CheckpointChain {
    /// The newest checkpoint.
    latest: Checkpoint,
    /// Every older checkpoint, by block.
    history: HashMap<u64, Checkpoint>,
    rollover: RolloverMultiplier,
}

impl CheckpointChain {
    /// A chain holding only the genesis checkpoint.
    #[must_use]
    pub fn new(start_block: u64, floor_price: Price) -> Self {
        Self {
            latest: Checkpoint::genesis(start_block, floor_price),
            history: HashMap::new(),
            rollover: RolloverMultiplier::UNSET,
        }
    }

    /// Rebuild from persisted checkpoints in chain order, rejecting broken links.
    pub fn from_checkpoints(checkpoints: Vec<Checkpoint>, rollover: RolloverMultiplier) -> Result<Self> {
        let mut iter = checkpoints.into_iter();
        let mut latest = iter.next().ok_or_else(|| AuctionError::DanglingLink {
            reason: "checkpoint chain is empty".into(),
        })?;
        if latest.prev.is_some() {
            return Err(AuctionError::DanglingLink {
                reason: format!("genesis checkpoint {} has a predecessor", latest.block),
            });
        }
        let mut history = HashMap::new();
        for cp in iter {
            let linked = latest.next == Some(cp.block) && cp.prev == Some(latest.block) && cp.block > latest.block;
            if !linked {
                return Err(AuctionError::DanglingLink {
                    reason: format!("checkpoint {} is not linked to {}", cp.block, latest.block),
                });
            }
            history.insert(latest.block, latest);
            latest = cp;
        }
        if latest.next.is_some() {
            return Err(AuctionError::DanglingLink {
                reason: format!("latest checkpoint {} points past the chain", latest.block),
            });
        }
        Ok(Self {
            latest,
            history,
            rollover,
        })
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn latest(&self) -> &Checkpoint {
        &self.latest
    }

    #[must_use]
    pub fn get(&self, block: u64) -> Option<&Checkpoint> {
        if block == self.latest.block {
            Some(&self.latest)
        } else {
            self.history.get(&block)
        }
    }

    #[must_use]
    pub fn rollover(&self) -> RolloverMultiplier {
        self.rollover
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len() + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Walk from the latest checkpoint back to genesis.
    pub fn iter_back(&self) -> impl Iterator<Item = &Checkpoint> {
        std::iter::successors(Some(&self.latest), |cp| cp.prev.and_then(|b| self.history.get(&b)))
    }

    /// Checkpoints from genesis to latest.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Checkpoint> {
        let mut out: Vec<Checkpoint> = self.iter_back().cloned().collect();
        out.reverse();
        out
    }

    // =================================================================
    // Advancement
    // =================================================================

    /// Compute the checkpoint closing `(latest, block]` under `sale`.
    pub fn stage(&self, block: u64, sale: &Sale) -> Result<StagedCheckpoint> {
        let prev = &self.latest;
        if block <= prev.block {
            return Err(AuctionError::CheckpointBlockNotIncreasing {
                block,
                latest: prev.block,
            });
        }
        let mut cp = prev.clone();
        cp.block = block;
        cp.prev = Some(prev.block);
        cp.next = None;
        if sale.clearing_price != prev.clearing_price {
            cp.clearing_price = sale.clearing_price;
            cp.cleared_at_clearing_price = ValueX7X7::ZERO;
        }

        let mut rollover = self.rollover;
        let delta = sale.delta_mps;
        if delta > 0 {
            let price = sale.clearing_price;
            let supply = rollover.supply_for_interval(sale.total_supply, delta)?;

            let above = sale.demand_above.resolve(price)?.mul_rate(delta)?.min(supply);
            let marginal = if sale.marginal_demand.is_zero() {
                ValueX7X7::ZERO
            } else {
                let at_tick = sale.marginal_demand.resolve(price)?.mul_rate(delta)?;
                at_tick.min(supply.saturating_sub(above))
            };
            let cleared = above.checked_add(marginal)?;

            // exact-in demand above pays its currency outright; everything
            // else is tokens priced at the clearing price.
            let currency_above = sale.demand_above.currency_demand.mul_rate(delta)?;
            let token_side = sale
                .demand_above
                .token_demand
                .mul_rate(delta)?
                .checked_add(marginal)?;
            let token_side_currency = token_side.mul_div(price.raw(), q96())?;
            let raised = currency_above.checked_add(token_side_currency)?;

            cp.cumulative_released = cp.cumulative_released.checked_add(supply)?;
            cp.total_cleared = cp.total_cleared.checked_add(cleared)?;
            cp.currency_raised = cp.currency_raised.checked_add(raised)?;
            cp.cleared_at_clearing_price = cp.cleared_at_clearing_price.checked_add(marginal)?;
            cp.cumulative_mps += delta;
            cp.cumulative_mps_per_price = checked_add(
                cp.cumulative_mps_per_price,
                mul_div(U256::from(delta) << 192, U256::one(), price.raw())?,
                "cumulative_mps_per_price",
            )?;
            cp.cumulative_mps_times_price = checked_add(
                cp.cumulative_mps_times_price,
                checked_mul(U256::from(delta), price.raw(), "cumulative_mps_times_price")?,
                "cumulative_mps_times_price",
            )?;

            let fully_subscribed = !supply.is_zero() && cleared == supply;
            if !rollover.is_set && fully_subscribed && cp.cumulative_mps < MPS {
                let total = ValueX7X7::scale_up(sale.total_supply);
                rollover = RolloverMultiplier::set(
                    MPS - cp.cumulative_mps,
                    total.checked_sub(cp.total_cleared)?,
                );
            }
        }
        Ok(StagedCheckpoint {
            checkpoint: cp,
            rollover,
        })
    }

    /// Append a staged checkpoint. It must have been staged against the
    /// current latest checkpoint.
    pub fn commit(&mut self, staged: StagedCheckpoint) -> Result<()> {
        if staged.checkpoint.prev != Some(self.latest.block) {
            return Err(AuctionError::Internal(format!(
                "staged checkpoint {} does not follow {}",
                staged.checkpoint.block, self.latest.block
            )));
        }
        let mut previous = std::mem::replace(&mut self.latest, staged.checkpoint);
        previous.next = Some(self.latest.block);
        self.history.insert(previous.block, previous);
        self.rollover = staged.rollover;
        Ok(())
    }

    /// Read the chain as if `staged` were already committed.
    #[must_use]
    pub fn view<'a>(&'a self, staged: Option<&'a Checkpoint>) -> ChainView<'a> {
        ChainView { chain: self, staged }
    }
}

/// The chain plus an optional staged tail.
#[derive(Debug, Clone, Copy)]
pub struct ChainView<'a> {
    chain: &'a CheckpointChain,
    staged: Option<&'a Checkpoint>,
}

impl<'a> ChainView<'a> {
    #[must_use]
    pub fn latest(&self) -> &'a Checkpoint {
        self.staged.unwrap_or(&self.chain.latest)
    }

    #[must_use]
    pub fn get(&self, block: u64) -> Option<&'a Checkpoint> {
        match self.staged {
            Some(cp) if cp.block == block => Some(cp),
            _ => self.chain.get(block),
        }
    }

    #[must_use]
    pub fn next_of(&self, cp: &Checkpoint) -> Option<&'a Checkpoint> {
        match cp.next {
            Some(block) => self.get(block),
            None => self.staged.filter(|s| s.prev == Some(cp.block)),
        }
    }

    #[must_use]
    pub fn prev_of(&self, cp: &Checkpoint) -> Option<&'a Checkpoint> {
        cp.prev.and_then(|block| self.get(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(price: u64, above: Demand, marginal: Demand, delta_mps: u32) -> Sale {
        Sale {
            clearing_price: Price::from_integer(price),
            demand_above: above,
            marginal_demand: marginal,
            delta_mps,
            total_supply: 1_000,
        }
    }

    fn advance(chain: &mut CheckpointChain, block: u64, s: &Sale) {
        let staged = chain.stage(block, s).unwrap();
        chain.commit(staged).unwrap();
    }

    #[test]
    fn undersubscribed_interval_sells_demand_only() {
        let mut chain = CheckpointChain::new(0, Price::from_integer(1));
        let above = Demand::currency(ValueX7::scale_up(500));
        advance(&mut chain, 10, &sale(1, above, Demand::ZERO, MPS));
        let cp = chain.latest();
        assert_eq!(cp.total_cleared, ValueX7X7::scale_up(500));
        assert_eq!(cp.currency_raised, ValueX7X7::scale_up(500));
        assert_eq!(cp.cumulative_released, ValueX7X7::scale_up(1_000));
        assert!(!chain.rollover().is_set);
    }

    #[test]
    fn marginal_tick_absorbs_remaining_supply() {
        let mut chain = CheckpointChain::new(0, Price::from_integer(1));
        let marginal = Demand::token(ValueX7::scale_up(2_000));
        advance(&mut chain, 1, &sale(2, Demand::ZERO, marginal, MPS / 10));
        let cp = chain.latest();
        assert_eq!(cp.cleared_at_clearing_price, ValueX7X7::scale_up(100));
        assert_eq!(cp.total_cleared, ValueX7X7::scale_up(100));
        assert_eq!(cp.currency_raised, ValueX7X7::scale_up(200));
        // Sold out the interval with rate left: rollover engages.
        let r = chain.rollover();
        assert!(r.is_set);
        assert_eq!(r.remaining_mps, MPS / 10 * 9);
        assert_eq!(r.remaining_supply, ValueX7X7::scale_up(900));
    }

    #[test]
    fn price_change_resets_marginal_accumulator() {
        let mut chain = CheckpointChain::new(0, Price::from_integer(1));
        let marginal = Demand::token(ValueX7::scale_up(2_000));
        advance(&mut chain, 1, &sale(2, Demand::ZERO, marginal, MPS / 10));
        advance(&mut chain, 2, &sale(3, Demand::ZERO, Demand::ZERO, MPS / 10));
        assert!(chain.latest().cleared_at_clearing_price.is_zero());
        assert_eq!(chain.latest().clearing_price, Price::from_integer(3));
    }

    #[test]
    fn stage_is_pure_and_rejects_old_blocks() {
        let chain = CheckpointChain::new(5, Price::from_integer(1));
        let s = sale(1, Demand::ZERO, Demand::ZERO, 0);
        let a = chain.stage(6, &s).unwrap();
        let b = chain.stage(6, &s).unwrap();
        assert_eq!(a, b);
        assert_eq!(chain.len(), 1);
        assert!(matches!(
            chain.stage(5, &s),
            Err(AuctionError::CheckpointBlockNotIncreasing { .. })
        ));
    }

    #[test]
    fn links_and_backward_walk() {
        let mut chain = CheckpointChain::new(0, Price::from_integer(1));
        let s = sale(1, Demand::ZERO, Demand::ZERO, MPS / 10);
        for block in 1..=3 {
            advance(&mut chain, block, &s);
        }
        let blocks: Vec<u64> = chain.iter_back().map(|cp| cp.block).collect();
        assert_eq!(blocks, vec![3, 2, 1, 0]);
        assert_eq!(chain.get(1).unwrap().next, Some(2));
        assert_eq!(chain.get(2).unwrap().prev, Some(1));

        let restored = CheckpointChain::from_checkpoints(chain.to_vec(), chain.rollover()).unwrap();
        assert_eq!(restored.latest(), chain.latest());

        let mut broken = chain.to_vec();
        broken[2].prev = Some(0);
        assert!(CheckpointChain::from_checkpoints(broken, RolloverMultiplier::UNSET).is_err());
    }

    #[test]
    fn view_sees_staged_tail() {
        let chain = CheckpointChain::new(0, Price::from_integer(1));
        let staged = chain.stage(4, &sale(1, Demand::ZERO, Demand::ZERO, MPS / 10)).unwrap();
        let view = chain.view(Some(&staged.checkpoint));
        assert_eq!(view.latest().block, 4);
        let genesis = view.get(0).unwrap();
        assert_eq!(view.next_of(genesis).unwrap().block, 4);
        assert_eq!(view.prev_of(view.latest()).unwrap().block, 0);
    }
}
