//! Serializable engine state.
//!
//! A snapshot captures everything needed to rebuild a [`ClearingEngine`]
//! bit-for-bit. Restoring re-validates every link and the above-clearing
//! accumulator, so a corrupted snapshot is rejected rather than loaded.

use cca_types::*;
use serde::{Deserialize, Serialize};

use crate::bid_ledger::BidLedger;
use crate::checkpoint_chain::CheckpointChain;
use crate::engine::ClearingEngine;
use crate::release_schedule::ReleaseSchedule;
use crate::tick_ledger::{Tick, TickLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub config: AuctionConfig,
    /// Ticks in ascending price order, floor first.
    pub ticks: Vec<Tick>,
    /// Bids in id order.
    pub bids: Vec<Bid>,
    /// Checkpoints from genesis to latest.
    pub checkpoints: Vec<Checkpoint>,
    /// Rollover multiplier in its packed word form.
    pub rollover: U256,
    pub demand_above_clearing: Demand,
    pub next_active_tick: Option<Price>,
    pub tokens_received: bool,
    pub currency_swept: bool,
    pub tokens_swept: bool,
    #[serde(default)]
    pub dust_swept: bool,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl ClearingEngine {
    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        Ok(EngineSnapshot {
            config: self.config.clone(),
            ticks: self.ticks.iter().cloned().collect(),
            bids: self.bids.iter().cloned().collect(),
            checkpoints: self.chain.to_vec(),
            rollover: self.chain.rollover().pack()?,
            demand_above_clearing: self.demand_above_clearing,
            next_active_tick: self.next_active_tick,
            tokens_received: self.tokens_received,
            currency_swept: self.currency_swept,
            tokens_swept: self.tokens_swept,
            dust_swept: self.dust_swept,
        })
    }

    pub fn restore(snapshot: EngineSnapshot) -> Result<Self> {
        let config = snapshot.config;
        config.validate()?;
        let schedule = ReleaseSchedule::new(config.start_block, &config.steps)?;
        let ticks = TickLedger::from_ticks(config.floor_price, config.tick_spacing, snapshot.ticks)?;
        let rollover = RolloverMultiplier::unpack(snapshot.rollover)?;
        let chain = CheckpointChain::from_checkpoints(snapshot.checkpoints, rollover)?;

        let genesis = chain.iter_back().last().map_or(0, |cp| cp.block);
        if genesis != config.start_block || chain.latest().block > schedule.end_block() {
            return Err(AuctionError::DanglingLink {
                reason: format!(
                    "checkpoints span {genesis}..={} outside the schedule",
                    chain.latest().block
                ),
            });
        }

        let bids = BidLedger::from_bids(snapshot.bids)?;
        if let Some(orphan) = bids.iter().find(|b| chain.get(b.start_block).is_none()) {
            return Err(AuctionError::DanglingLink {
                reason: format!("{} starts at missing checkpoint {}", orphan.id, orphan.start_block),
            });
        }

        let engine = Self {
            config,
            schedule,
            ticks,
            bids,
            chain,
            demand_above_clearing: snapshot.demand_above_clearing,
            next_active_tick: snapshot.next_active_tick,
            tokens_received: snapshot.tokens_received,
            currency_swept: snapshot.currency_swept,
            tokens_swept: snapshot.tokens_swept,
            dust_swept: snapshot.dust_swept,
        };
        engine.verify_demand_above()?;
        tracing::debug!(
            bids = engine.bids.len(),
            checkpoints = engine.chain.len(),
            "Engine restored from snapshot"
        );
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: u64) -> Price {
        Price::from_integer(n)
    }

    fn busy_engine() -> ClearingEngine {
        let config = AuctionConfig::linear(1_000, 100, 10, p(1), p(1));
        let mut e = ClearingEngine::new(config).unwrap();
        e.on_tokens_received().unwrap();
        let owner = OwnerId::from_bytes([7; 20]);
        e.submit_bid(100, &BidRequest::new(BidSide::ExactIn, p(3), 900, owner)).unwrap();
        e.submit_bid(102, &BidRequest::new(BidSide::ExactOut, p(2), 700, owner)).unwrap();
        e.checkpoint(104).unwrap();
        e
    }

    #[test]
    fn snapshot_roundtrip_through_json() {
        let e = busy_engine();
        let snap = e.snapshot().unwrap();
        let json = snap.to_json().unwrap();
        let restored = ClearingEngine::restore(EngineSnapshot::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.snapshot().unwrap(), snap);
        assert_eq!(restored.clearing_price(), e.clearing_price());
    }

    #[test]
    fn restored_engine_keeps_running() {
        let mut a = busy_engine();
        let mut b = ClearingEngine::restore(a.snapshot().unwrap()).unwrap();
        a.checkpoint(110).unwrap();
        b.checkpoint(110).unwrap();
        assert_eq!(a.snapshot().unwrap(), b.snapshot().unwrap());
    }

    #[test]
    fn tampered_accumulator_rejected() {
        let mut snap = busy_engine().snapshot().unwrap();
        snap.demand_above_clearing = Demand::ZERO;
        assert!(matches!(ClearingEngine::restore(snap), Err(AuctionError::Internal(_))));
    }

    #[test]
    fn broken_chain_rejected() {
        let mut snap = busy_engine().snapshot().unwrap();
        snap.checkpoints.remove(1);
        assert!(matches!(ClearingEngine::restore(snap), Err(AuctionError::DanglingLink { .. })));
    }
}
