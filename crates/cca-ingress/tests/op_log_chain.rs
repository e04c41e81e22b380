//! Integration test: operation log chain integrity
//!
//! Random operation sequences must verify after a persistence round trip,
//! and any single tampered entry must be located exactly.

use cca_ingress::{BidIntent, BidValidationHook, Operation, OperationLog, PolicyHook};
use cca_types::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_op(rng: &mut StdRng, block: u64) -> Operation {
    match rng.gen_range(0..5) {
        0 => Operation::SubmitBid {
            block,
            request: BidRequest::new(
                if rng.gen_bool(0.5) { BidSide::ExactIn } else { BidSide::ExactOut },
                Price::from_integer(rng.gen_range(2..10)),
                rng.gen_range(1..1_000u128),
                OwnerId::from_bytes([rng.gen_range(1..=255u8); 20]),
            ),
            policy_data: (0..rng.gen_range(0..8)).map(|_| rng.r#gen::<u8>()).collect(),
        },
        1 => Operation::Checkpoint { block },
        2 => Operation::ExitBid {
            block,
            bid_id: BidId(rng.gen_range(0..10)),
            hints: ExitHints {
                last_fully_filled: Some(block.saturating_sub(2)),
                outbid: None,
            },
        },
        3 => Operation::Claim { block, bid_id: BidId(rng.gen_range(0..10)) },
        _ => Operation::SweepCurrency { block },
    }
}

fn random_log(seed: u64, len: usize) -> OperationLog {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut log = OperationLog::new();
    log.record(Operation::TokensReceived { block: 0 }).unwrap();
    for block in 1..=len as u64 {
        let op = random_op(&mut rng, block);
        log.record(op).unwrap();
    }
    log
}

#[test]
fn random_logs_survive_persistence() {
    for seed in 0..10 {
        let log = random_log(seed, 50);
        let restored = OperationLog::from_json(&log.to_json().unwrap()).unwrap();
        assert_eq!(restored.head_hash(), log.head_hash(), "seed {seed}");
        assert_eq!(restored.len(), 51);
    }
}

#[test]
fn tampering_is_located() {
    let mut rng = StdRng::seed_from_u64(77);
    for seed in 0..10 {
        let log = random_log(seed, 30);
        let mut entries = log.entries().to_vec();
        let victim = rng.gen_range(0..entries.len());
        entries[victim].operation = Operation::Checkpoint { block: 999_999 };
        match OperationLog::from_entries(entries) {
            Err(AuctionError::OperationLogCorrupted { sequence }) => {
                assert_eq!(sequence, victim as u64, "seed {seed}");
            }
            other => panic!("tampered log accepted: {other:?}"),
        }
    }
}

#[test]
fn reordered_entries_rejected() {
    let log = random_log(3, 10);
    let mut entries = log.entries().to_vec();
    entries.swap(2, 3);
    assert!(OperationLog::from_entries(entries).is_err());
}

#[test]
fn policy_quota_tracks_accepted_only() {
    let mut hook = PolicyHook::new().with_max_bids_per_owner(1);
    let owner = OwnerId::from_bytes([4; 20]);
    let req = BidRequest::new(BidSide::ExactIn, Price::from_integer(2), 10, owner);
    let intent = BidIntent { block: 1, request: &req, policy_data: &[] };

    // A bid rejected downstream never reaches on_accepted, so quota remains.
    hook.validate(&intent).unwrap();
    hook.validate(&intent).unwrap();
    hook.on_accepted(&intent, BidId(0));
    assert!(matches!(
        hook.validate(&intent),
        Err(AuctionError::BidRejectedByHook { .. })
    ));
}
