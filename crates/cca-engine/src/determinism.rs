//! State digests for cross-replica verification.
//!
//! Two engines that applied the same operations in the same order must
//! produce the same digest. The digest covers every field that influences
//! future outcomes, in a fixed order, so it can be compared without shipping
//! full snapshots.

use cca_types::*;
use sha2::{Digest, Sha256};

use crate::engine::ClearingEngine;

fn put_u256(hasher: &mut Sha256, value: U256) {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    hasher.update(buf);
}

fn put_opt_u64(hasher: &mut Sha256, value: Option<u64>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update(v.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn put_opt_price(hasher: &mut Sha256, value: Option<Price>) {
    match value {
        Some(p) => {
            hasher.update([1u8]);
            put_u256(hasher, p.raw());
        }
        None => hasher.update([0u8]),
    }
}

fn put_demand(hasher: &mut Sha256, demand: Demand) {
    put_u256(hasher, demand.currency_demand.raw());
    put_u256(hasher, demand.token_demand.raw());
}

fn put_config(hasher: &mut Sha256, config: &AuctionConfig) {
    hasher.update(config.auction_id.0.as_bytes());
    hasher.update(config.total_supply.to_le_bytes());
    hasher.update(config.start_block.to_le_bytes());
    hasher.update(config.claim_block.to_le_bytes());
    put_u256(hasher, config.floor_price.raw());
    put_u256(hasher, config.tick_spacing.raw());
    put_u256(hasher, config.max_bid_price.raw());
    hasher.update(config.required_currency_raised.to_le_bytes());
    hasher.update((config.steps.len() as u64).to_le_bytes());
    for step in &config.steps {
        hasher.update(step.mps.to_le_bytes());
        hasher.update(step.duration.to_le_bytes());
    }
}

fn put_bid(hasher: &mut Sha256, bid: &Bid) {
    hasher.update(bid.id.0.to_le_bytes());
    hasher.update(bid.owner.as_bytes());
    put_u256(hasher, bid.max_price.raw());
    hasher.update(bid.amount.to_le_bytes());
    hasher.update([match bid.side {
        BidSide::ExactIn => 0u8,
        BidSide::ExactOut => 1u8,
    }]);
    hasher.update(bid.start_block.to_le_bytes());
    hasher.update(bid.start_cumulative_mps.to_le_bytes());
    put_u256(hasher, bid.effective_demand.raw());
    hasher.update(bid.committed_currency.to_le_bytes());
    put_opt_u64(hasher, bid.exited_block);
    match bid.settlement {
        Some(s) => {
            hasher.update([1u8]);
            hasher.update(s.tokens_filled.to_le_bytes());
            hasher.update(s.currency_spent.to_le_bytes());
            hasher.update(s.currency_refunded.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update([u8::from(bid.claimed)]);
}

fn put_checkpoint(hasher: &mut Sha256, cp: &Checkpoint) {
    hasher.update(cp.block.to_le_bytes());
    put_u256(hasher, cp.clearing_price.raw());
    hasher.update(cp.cumulative_mps.to_le_bytes());
    put_u256(hasher, cp.cumulative_mps_per_price);
    put_u256(hasher, cp.cumulative_mps_times_price);
    put_u256(hasher, cp.cumulative_released.raw());
    put_u256(hasher, cp.total_cleared.raw());
    put_u256(hasher, cp.currency_raised.raw());
    put_u256(hasher, cp.cleared_at_clearing_price.raw());
    put_opt_u64(hasher, cp.prev);
    put_opt_u64(hasher, cp.next);
}

/// Compute the digest of an engine's full state.
#[must_use]
pub fn state_digest(engine: &ClearingEngine) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"cca:state_digest:v1:");
    put_config(&mut hasher, engine.config());

    hasher.update((engine.ticks().len() as u64).to_le_bytes());
    for tick in engine.ticks().iter() {
        put_u256(&mut hasher, tick.price.raw());
        put_opt_price(&mut hasher, tick.next);
        put_demand(&mut hasher, tick.demand);
    }

    hasher.update((engine.bids().len() as u64).to_le_bytes());
    for bid in engine.bids().iter() {
        put_bid(&mut hasher, bid);
    }

    let checkpoints = engine.chain().to_vec();
    hasher.update((checkpoints.len() as u64).to_le_bytes());
    for cp in &checkpoints {
        put_checkpoint(&mut hasher, cp);
    }

    let rollover = engine.chain().rollover();
    hasher.update([u8::from(rollover.is_set)]);
    hasher.update(rollover.remaining_mps.to_le_bytes());
    put_u256(&mut hasher, rollover.remaining_supply.raw());

    put_demand(&mut hasher, engine.demand_above_clearing());
    put_opt_price(&mut hasher, engine.next_active_tick());
    hasher.update([
        u8::from(engine.tokens_received()),
        u8::from(engine.currency_swept()),
        u8::from(engine.tokens_swept()),
        u8::from(engine.dust_swept()),
    ]);

    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

/// Hex form of [`state_digest`], for logs and operation records.
#[must_use]
pub fn state_digest_hex(engine: &ClearingEngine) -> String {
    hex::encode(state_digest(engine))
}

/// Verify that an engine's state matches the expected digest.
#[must_use]
pub fn verify_state_digest(engine: &ClearingEngine, expected: &[u8; 32]) -> bool {
    state_digest(engine) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: u64) -> Price {
        Price::from_integer(n)
    }

    fn config() -> AuctionConfig {
        let mut config = AuctionConfig::linear(1_000, 100, 10, p(1), p(1));
        config.auction_id = AuctionId::from_bytes([5; 16]);
        config
    }

    fn run(prices: &[u64]) -> ClearingEngine {
        let mut e = ClearingEngine::new(config()).unwrap();
        e.on_tokens_received().unwrap();
        for (i, price) in prices.iter().enumerate() {
            let owner = OwnerId::from_bytes([i as u8 + 1; 20]);
            let req = BidRequest::new(BidSide::ExactIn, p(*price), 400, owner);
            e.submit_bid(100 + i as u64, &req).unwrap();
        }
        e.checkpoint(108).unwrap();
        e
    }

    #[test]
    fn same_operations_same_digest() {
        let a = run(&[2, 3, 4]);
        let b = run(&[2, 3, 4]);
        assert_eq!(state_digest(&a), state_digest(&b));
        assert_eq!(state_digest_hex(&a).len(), 64);
    }

    #[test]
    fn different_operations_different_digest() {
        let a = run(&[2, 3, 4]);
        let b = run(&[2, 4, 3]);
        assert_ne!(state_digest(&a), state_digest(&b));
    }

    #[test]
    fn digest_tracks_flags() {
        let mut e = run(&[2]);
        let before = state_digest(&e);
        e.checkpoint(110).unwrap();
        let mid = state_digest(&e);
        assert_ne!(before, mid);
        e.sweep_currency(110).unwrap();
        assert!(!verify_state_digest(&e, &mid));
        assert!(verify_state_digest(&e, &state_digest(&e)));
    }

    #[test]
    fn digest_survives_restore() {
        let e = run(&[3, 2]);
        let restored = ClearingEngine::restore(e.snapshot().unwrap()).unwrap();
        assert!(verify_state_digest(&restored, &state_digest(&e)));
    }
}
