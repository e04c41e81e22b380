//! # cca-engine
//!
//! **Deterministic clearing core for continuous clearing auctions.**
//!
//! The engine takes bids and block numbers and produces clearing prices,
//! checkpoints and per-bid settlements. It has:
//!
//! - **Zero side effects**: no asset transfers, no clocks, no I/O
//! - **Deterministic output**: same operations -> same state digest on every replica
//! - **Atomic operations**: a rejected call leaves the state untouched
//! - **Hint-verified exits**: checkpoint hints are checked, never trusted

pub mod bid_ledger;
pub mod checkpoint_chain;
pub mod clearing;
pub mod determinism;
pub mod engine;
pub mod release_schedule;
pub mod snapshot;
pub mod tick_ledger;

pub use bid_ledger::{BidLedger, Fill};
pub use checkpoint_chain::{ChainView, CheckpointChain};
pub use clearing::{ClearingSearch, find_clearing_price};
pub use determinism::{state_digest, state_digest_hex, verify_state_digest};
pub use engine::ClearingEngine;
pub use release_schedule::ReleaseSchedule;
pub use snapshot::EngineSnapshot;
pub use tick_ledger::{Tick, TickLedger};
