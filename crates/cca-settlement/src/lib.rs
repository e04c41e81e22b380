//! # cca-settlement
//!
//! **Finality**: asset movement, supply conservation, replay and the
//! async service for a continuous clearing auction.
//!
//! ## Architecture
//!
//! The [`Auction`] facade sits between callers and the pure
//! [`cca_engine::ClearingEngine`]:
//! 1. Runs the bid validation hook
//! 2. Pulls bid currency into the vault through an [`AssetGateway`]
//! 3. Commits the engine operation
//! 4. Pushes refunds, fills and sweeps out of the vault
//! 5. Appends the operation to the hash-chained log
//! 6. Checks supply conservation
//!
//! [`replay`] rebuilds an auction from its log. [`AuctionService`] runs one
//! auction on a tokio task with serialized writes.

pub mod auction;
pub mod conservation;
pub mod gateway;
pub mod replay;
pub mod service;

pub use auction::{Auction, AuctionStatus, Recipients};
pub use conservation::{Entitlements, SupplyConservation};
pub use gateway::{Asset, AssetGateway, InMemoryGateway};
pub use replay::{replay, replay_verified};
pub use service::{AuctionCommand, AuctionHandle, AuctionService, DEFAULT_COMMAND_BUFFER};
