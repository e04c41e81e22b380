//! Bid validation hook interface.
//!
//! A hook sees every bid before the engine does and may veto it. It cannot
//! change the bid. Policy data supplied by the bidder is opaque to everything
//! except the hook.

use cca_types::{BidId, BidRequest, Result};

/// A bid as presented to a validation hook.
#[derive(Debug, Clone, Copy)]
pub struct BidIntent<'a> {
    pub block: u64,
    pub request: &'a BidRequest,
    /// Bidder-supplied bytes, passed through uninterpreted.
    pub policy_data: &'a [u8],
}

/// Accept/reject gate run before a bid reaches the engine.
pub trait BidValidationHook: Send {
    /// Reject with [`cca_types::AuctionError::BidRejectedByHook`] to veto the bid.
    fn validate(&self, intent: &BidIntent<'_>) -> Result<()>;

    /// Called once the engine has registered a bid this hook accepted.
    fn on_accepted(&mut self, _intent: &BidIntent<'_>, _bid_id: BidId) {}
}

/// Hook that accepts every bid.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl BidValidationHook for AcceptAll {
    fn validate(&self, _intent: &BidIntent<'_>) -> Result<()> {
        Ok(())
    }
}

impl<H: BidValidationHook + ?Sized> BidValidationHook for Box<H> {
    fn validate(&self, intent: &BidIntent<'_>) -> Result<()> {
        (**self).validate(intent)
    }

    fn on_accepted(&mut self, intent: &BidIntent<'_>, bid_id: BidId) {
        (**self).on_accepted(intent, bid_id);
    }
}
