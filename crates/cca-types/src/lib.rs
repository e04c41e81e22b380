//! # cca-types
//!
//! Shared types, errors, and configuration for the continuous clearing
//! auction.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`BidId`], [`OwnerId`], [`AuctionId`]
//! - **Fixed point**: [`ValueX7`], [`ValueX7X7`], [`Price`] and the checked
//!   `mul_div` family
//! - **Demand**: [`Demand`] with currency and token components
//! - **Bid model**: [`Bid`], [`BidSide`], [`ExitHints`], [`FillResult`], [`ClaimResult`],
//!   [`DustSweep`]
//! - **Schedule**: [`AuctionStep`] and its packed wire form
//! - **Checkpoints**: [`Checkpoint`], [`CheckpointView`], [`RolloverMultiplier`]
//! - **Configuration**: [`AuctionConfig`]
//! - **Errors**: [`AuctionError`] with `CCA_ERR_` prefix codes
//! - **Constants**: scales and bounds

pub mod bid;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod demand;
pub mod error;
pub mod fixed_point;
pub mod ids;
pub mod price;
pub mod rollover;
pub mod step;

// Re-export all primary types at crate root for ergonomic imports:
//   use cca_types::{Bid, BidSide, Price, ValueX7, ...};

pub use bid::*;
pub use checkpoint::*;
pub use config::*;
pub use demand::*;
pub use error::*;
pub use fixed_point::*;
pub use ids::*;
pub use price::*;
pub use rollover::*;
pub use step::*;

// Constants are accessed via `cca_types::constants::FOO`
// (not re-exported to avoid name collisions).

// The wide integer is part of the public API.
pub use primitive_types::U256;
