//! The auction facade.
//!
//! [`Auction`] wires a [`ClearingEngine`] to a bid validation hook, an asset
//! gateway and the operation log. For every mutating call:
//! 1. Run the hook (bids only)
//! 2. Preview the engine outcome to learn the asset movement
//! 3. Check the gateway can perform it
//! 4. Commit the engine change
//! 5. Move assets through the gateway
//! 6. Append the operation to the log
//! 7. Check supply conservation
//!
//! A call that fails before step 4 leaves every component unchanged.

use std::collections::HashSet;

use cca_engine::{ClearingEngine, state_digest};
use cca_ingress::{BidIntent, BidValidationHook, Operation, OperationLog};
use cca_types::*;
use serde::{Deserialize, Serialize};

use crate::conservation::{Entitlements, SupplyConservation};
use crate::gateway::{Asset, AssetGateway};

/// Where sweeps go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
    /// Receives the currency raised.
    pub funds: OwnerId,
    /// Receives unsold tokens.
    pub tokens: OwnerId,
}

impl Recipients {
    /// One owner receives both sweeps.
    #[must_use]
    pub fn single(owner: OwnerId) -> Self {
        Self {
            funds: owner,
            tokens: owner,
        }
    }
}

/// Point-in-time summary of an auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionStatus {
    pub auction_id: AuctionId,
    pub checkpoint: CheckpointView,
    pub graduated: bool,
    pub tokens_received: bool,
    pub bid_count: usize,
    pub operations: usize,
    /// Hex chain hash of the operation log head.
    pub log_head: String,
}

pub struct Auction<G, H> {
    engine: ClearingEngine,
    gateway: G,
    hook: H,
    recipients: Recipients,
    log: OperationLog,
    conservation: SupplyConservation,
}

impl<G: AssetGateway, H: BidValidationHook> Auction<G, H> {
    pub fn new(config: AuctionConfig, recipients: Recipients, gateway: G, hook: H) -> Result<Self> {
        if recipients.funds.is_zero() || recipients.tokens.is_zero() {
            return Err(AuctionError::Configuration("sweep recipients must be set".into()));
        }
        Ok(Self {
            engine: ClearingEngine::new(config)?,
            gateway,
            hook,
            recipients,
            log: OperationLog::new(),
            conservation: SupplyConservation::new(),
        })
    }

    // =================================================================
    // Accessors
    // =================================================================

    #[must_use]
    pub fn engine(&self) -> &ClearingEngine {
        &self.engine
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    #[must_use]
    pub fn hook(&self) -> &H {
        &self.hook
    }

    #[must_use]
    pub fn recipients(&self) -> Recipients {
        self.recipients
    }

    #[must_use]
    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    #[must_use]
    pub fn conservation(&self) -> &SupplyConservation {
        &self.conservation
    }

    // =================================================================
    // Internals
    // =================================================================

    fn ensure_vault(&self, asset: Asset, amount: u128) -> Result<()> {
        let held = match asset {
            Asset::Currency => self.gateway.currency_inventory(),
            Asset::Token => self.gateway.token_inventory(),
        };
        if held < amount {
            return Err(AuctionError::TransferFailed {
                reason: format!("vault holds {held} {asset}, operation pays out {amount}"),
            });
        }
        Ok(())
    }

    fn check_flows(&self) -> Result<()> {
        self.conservation
            .verify(self.gateway.token_inventory(), self.gateway.currency_inventory())
    }

    fn record(&mut self, operation: Operation) -> Result<()> {
        self.log.record(operation)?;
        self.check_flows()
    }

    // =================================================================
    // Operations
    // =================================================================

    /// Confirm the sale inventory has been delivered to the vault.
    pub fn notify_tokens_received(&mut self, block: u64) -> Result<()> {
        let received = self.gateway.token_inventory();
        let required = self.engine.config().total_supply;
        if received < required {
            return Err(AuctionError::InvalidTokenAmountReceived { received, required });
        }
        self.engine.on_tokens_received()?;
        self.conservation.record_tokens_in(received)?;
        self.record(Operation::TokensReceived { block })
    }

    /// Admit a bid: hook, currency pull, then engine registration.
    pub fn submit_bid(
        &mut self,
        block: u64,
        request: BidRequest,
        policy_data: Vec<u8>,
    ) -> Result<BidId> {
        let intent = BidIntent {
            block,
            request: &request,
            policy_data: &policy_data,
        };
        self.hook.validate(&intent)?;
        let committed = self.engine.preview_bid(block, &request)?;
        self.gateway.pull_currency(request.owner, committed)?;
        let bid_id = match self.engine.submit_bid(block, &request) {
            Ok(id) => id,
            Err(err) => {
                self.gateway.push_currency(request.owner, committed)?;
                return Err(err);
            }
        };
        self.conservation.record_currency_in(committed)?;
        self.hook.on_accepted(&intent, bid_id);
        self.record(Operation::SubmitBid {
            block,
            request,
            policy_data,
        })?;
        Ok(bid_id)
    }

    /// Advance the checkpoint chain. Only calls that append are logged.
    pub fn checkpoint(&mut self, block: u64) -> Result<CheckpointView> {
        let before = self.engine.chain().len();
        let view = self.engine.checkpoint(block)?;
        if self.engine.chain().len() != before {
            self.record(Operation::Checkpoint { block })?;
        }
        Ok(view)
    }

    /// Exit a bid and refund its unspent currency.
    pub fn exit_bid(&mut self, block: u64, bid_id: BidId, hints: ExitHints) -> Result<FillResult> {
        let preview = self.engine.preview_exit(block, bid_id, hints)?;
        self.ensure_vault(Asset::Currency, preview.currency_refunded)?;
        let fill = self.engine.exit_bid(block, bid_id, hints)?;
        if fill.currency_refunded > 0 {
            self.gateway.push_currency(fill.owner, fill.currency_refunded)?;
            self.conservation.record_currency_refunded(fill.currency_refunded)?;
        }
        self.record(Operation::ExitBid { block, bid_id, hints })?;
        Ok(fill)
    }

    /// Exit a bid using hints discovered from the chain. The chain is first
    /// advanced to `block` so the hints see the checkpoint the exit uses.
    pub fn exit_bid_auto(&mut self, block: u64, bid_id: BidId) -> Result<FillResult> {
        self.engine.bid(bid_id)?;
        self.checkpoint(block)?;
        let hints = self.engine.exit_hints(bid_id)?;
        self.exit_bid(block, bid_id, hints)
    }

    /// Deliver an exited bid's tokens to its owner.
    pub fn claim(&mut self, block: u64, bid_id: BidId) -> Result<ClaimResult> {
        let owed = self
            .engine
            .bid(bid_id)?
            .settlement
            .map_or(0, |s| s.tokens_filled);
        self.ensure_vault(Asset::Token, owed)?;
        let claim = self.engine.claim(block, bid_id)?;
        if claim.tokens_filled > 0 {
            self.gateway.push_tokens(claim.owner, claim.tokens_filled)?;
            self.conservation.record_tokens_claimed(claim.tokens_filled)?;
        }
        self.record(Operation::Claim { block, bid_id })?;
        Ok(claim)
    }

    /// Claim several bids of one owner with a single token transfer.
    /// All bids are checked before any is claimed.
    pub fn claim_batch(
        &mut self,
        block: u64,
        owner: OwnerId,
        bid_ids: Vec<BidId>,
    ) -> Result<Vec<ClaimResult>> {
        let claim_block = self.engine.config().claim_block;
        if block < claim_block {
            return Err(AuctionError::NotClaimable { claim_block });
        }
        let mut seen = HashSet::new();
        let mut total = 0u128;
        for &id in &bid_ids {
            let bid = self.engine.bid(id)?;
            if bid.owner != owner {
                return Err(AuctionError::BatchClaimDifferentOwner);
            }
            let settlement = bid.settlement.ok_or(AuctionError::BidNotExited(id))?;
            if bid.claimed || !seen.insert(id) {
                return Err(AuctionError::AlreadyClaimed(id));
            }
            total = total
                .checked_add(settlement.tokens_filled)
                .ok_or(AuctionError::ArithmeticOverflow { op: "claim_batch" })?;
        }
        self.ensure_vault(Asset::Token, total)?;

        let mut claims = Vec::with_capacity(bid_ids.len());
        for &id in &bid_ids {
            claims.push(self.engine.claim(block, id)?);
        }
        if total > 0 {
            self.gateway.push_tokens(owner, total)?;
            self.conservation.record_tokens_claimed(total)?;
        }
        tracing::debug!(%owner, bids = claims.len(), tokens = total, "Batch claimed");
        self.record(Operation::ClaimBatch {
            block,
            owner,
            bid_ids,
        })?;
        Ok(claims)
    }

    /// Send the currency raised to the funds recipient.
    pub fn sweep_currency(&mut self, block: u64) -> Result<u128> {
        let mut staged = self.engine.clone();
        let amount = staged.sweep_currency(block)?;
        self.ensure_vault(Asset::Currency, amount)?;
        self.engine = staged;
        if amount > 0 {
            self.gateway.push_currency(self.recipients.funds, amount)?;
            self.conservation.record_currency_swept(amount)?;
        }
        self.record(Operation::SweepCurrency { block })?;
        Ok(amount)
    }

    /// Send unsold tokens to the tokens recipient.
    pub fn sweep_unsold_tokens(&mut self, block: u64) -> Result<u128> {
        let mut staged = self.engine.clone();
        let amount = staged.sweep_unsold_tokens(block)?;
        self.ensure_vault(Asset::Token, amount)?;
        self.engine = staged;
        if amount > 0 {
            self.gateway.push_tokens(self.recipients.tokens, amount)?;
            self.conservation.record_tokens_swept(amount)?;
        }
        self.record(Operation::SweepUnsoldTokens { block })?;
        Ok(amount)
    }

    /// Send the rounding residue to the recipients once every bid has
    /// exited and both sweeps are done.
    pub fn sweep_dust(&mut self, block: u64) -> Result<DustSweep> {
        let mut staged = self.engine.clone();
        let dust = staged.sweep_dust(block)?;
        self.ensure_vault(Asset::Currency, dust.currency)?;
        self.ensure_vault(Asset::Token, dust.tokens)?;
        self.engine = staged;
        if dust.currency > 0 {
            self.gateway.push_currency(self.recipients.funds, dust.currency)?;
            self.conservation.record_currency_swept(dust.currency)?;
        }
        if dust.tokens > 0 {
            self.gateway.push_tokens(self.recipients.tokens, dust.tokens)?;
            self.conservation.record_tokens_swept(dust.tokens)?;
        }
        self.record(Operation::SweepDust { block })?;
        Ok(dust)
    }

    /// Apply a logged operation. Replay goes through the same checks as a
    /// live call.
    pub fn apply(&mut self, operation: &Operation) -> Result<()> {
        match operation {
            Operation::TokensReceived { block } => self.notify_tokens_received(*block),
            Operation::SubmitBid {
                block,
                request,
                policy_data,
            } => self.submit_bid(*block, *request, policy_data.clone()).map(drop),
            Operation::Checkpoint { block } => self.checkpoint(*block).map(drop),
            Operation::ExitBid { block, bid_id, hints } => {
                self.exit_bid(*block, *bid_id, *hints).map(drop)
            }
            Operation::Claim { block, bid_id } => self.claim(*block, *bid_id).map(drop),
            Operation::ClaimBatch {
                block,
                owner,
                bid_ids,
            } => self.claim_batch(*block, *owner, bid_ids.clone()).map(drop),
            Operation::SweepCurrency { block } => self.sweep_currency(*block).map(drop),
            Operation::SweepUnsoldTokens { block } => self.sweep_unsold_tokens(*block).map(drop),
            Operation::SweepDust { block } => self.sweep_dust(*block).map(drop),
        }
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn clearing_price(&self) -> Price {
        self.engine.clearing_price()
    }

    #[must_use]
    pub fn currency_raised(&self) -> U256 {
        self.engine.currency_raised()
    }

    #[must_use]
    pub fn is_graduated(&self) -> bool {
        self.engine.is_graduated()
    }

    pub fn bid(&self, bid_id: BidId) -> Result<&Bid> {
        self.engine.bid(bid_id)
    }

    #[must_use]
    pub fn state_digest(&self) -> [u8; 32] {
        state_digest(&self.engine)
    }

    /// Cheap summary of the auction. The state digest is computed
    /// separately by [`Self::state_digest`].
    #[must_use]
    pub fn status(&self) -> AuctionStatus {
        AuctionStatus {
            auction_id: self.engine.config().auction_id,
            checkpoint: self.engine.latest_checkpoint(),
            graduated: self.engine.is_graduated(),
            tokens_received: self.engine.tokens_received(),
            bid_count: self.engine.bids().len(),
            operations: self.log.len(),
            log_head: self.log.head_hex(),
        }
    }

    /// Check vault balances against recorded flows and against everything
    /// the vault still owes.
    pub fn verify_conservation(&self) -> Result<()> {
        self.check_flows()?;
        let owed = Entitlements::outstanding(&self.engine, self.conservation.currency_swept)?;
        self.conservation.verify_coverage(
            self.gateway.token_inventory(),
            self.gateway.currency_inventory(),
            owed,
        )
    }
}
