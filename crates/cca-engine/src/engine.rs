//! The clearing engine aggregate.
//!
//! [`ClearingEngine`] owns the schedule, tick ledger, bid ledger and
//! checkpoint chain for one auction, plus the running accumulator of demand
//! strictly above the clearing price. It is a pure state machine: callers
//! pass the current block into every operation and perform asset movements
//! themselves.
//!
//! Every mutating operation first stages the checkpoint for its block, then
//! validates, then commits the checkpoint and its own change together.

use cca_types::constants::MPS;
use cca_types::*;

use crate::bid_ledger::{BidLedger, Fill, committed_currency, fully_filled, partially_filled, settle};
use crate::checkpoint_chain::{ChainView, CheckpointChain, Sale, StagedCheckpoint};
use crate::clearing::{ClearingSearch, find_clearing_price};
use crate::release_schedule::ReleaseSchedule;
use crate::tick_ledger::{Placement, Tick, TickLedger};

/// A checkpoint advance that has been computed but not applied.
#[derive(Debug, Clone)]
struct StagedAdvance {
    checkpoint: StagedCheckpoint,
    search: ClearingSearch,
}

/// A validated bid, ready to register.
#[derive(Debug, Clone)]
struct PreparedBid {
    staged: Option<StagedAdvance>,
    bid: Bid,
    placement: Placement,
    demand_above: Demand,
    next_active: Option<Price>,
}

/// A computed exit, ready to record.
#[derive(Debug, Clone)]
struct PreparedExit {
    staged: Option<StagedAdvance>,
    exited_at: u64,
    settlement: BidSettlement,
    result: FillResult,
}

#[derive(Debug, Clone)]
pub struct ClearingEngine {
    pub(crate) config: AuctionConfig,
    pub(crate) schedule: ReleaseSchedule,
    pub(crate) ticks: TickLedger,
    pub(crate) bids: BidLedger,
    pub(crate) chain: CheckpointChain,
    /// Σ demand of ticks strictly above the latest clearing price.
    pub(crate) demand_above_clearing: Demand,
    /// Lowest initialized tick strictly above the latest clearing price.
    pub(crate) next_active_tick: Option<Price>,
    pub(crate) tokens_received: bool,
    pub(crate) currency_swept: bool,
    pub(crate) tokens_swept: bool,
    pub(crate) dust_swept: bool,
}

impl ClearingEngine {
    pub fn new(config: AuctionConfig) -> Result<Self> {
        config.validate()?;
        let schedule = ReleaseSchedule::new(config.start_block, &config.steps)?;
        let ticks = TickLedger::new(config.floor_price, config.tick_spacing);
        let chain = CheckpointChain::new(config.start_block, config.floor_price);
        tracing::info!(
            auction = %config.auction_id,
            total_supply = config.total_supply,
            start_block = schedule.start_block(),
            end_block = schedule.end_block(),
            floor_price = %config.floor_price,
            "Auction created"
        );
        Ok(Self {
            config,
            schedule,
            ticks,
            bids: BidLedger::new(),
            chain,
            demand_above_clearing: Demand::ZERO,
            next_active_tick: None,
            tokens_received: false,
            currency_swept: false,
            tokens_swept: false,
            dust_swept: false,
        })
    }

    // =================================================================
    // Accessors
    // =================================================================

    #[must_use]
    pub fn config(&self) -> &AuctionConfig {
        &self.config
    }

    #[must_use]
    pub fn schedule(&self) -> &ReleaseSchedule {
        &self.schedule
    }

    #[must_use]
    pub fn ticks(&self) -> &TickLedger {
        &self.ticks
    }

    #[must_use]
    pub fn bids(&self) -> &BidLedger {
        &self.bids
    }

    #[must_use]
    pub fn chain(&self) -> &CheckpointChain {
        &self.chain
    }

    #[must_use]
    pub fn demand_above_clearing(&self) -> Demand {
        self.demand_above_clearing
    }

    #[must_use]
    pub fn next_active_tick(&self) -> Option<Price> {
        self.next_active_tick
    }

    #[must_use]
    pub fn tokens_received(&self) -> bool {
        self.tokens_received
    }

    #[must_use]
    pub fn currency_swept(&self) -> bool {
        self.currency_swept
    }

    #[must_use]
    pub fn tokens_swept(&self) -> bool {
        self.tokens_swept
    }

    #[must_use]
    pub fn dust_swept(&self) -> bool {
        self.dust_swept
    }

    // =================================================================
    // Lifecycle
    // =================================================================

    /// Record that the distribution of `total_supply` tokens has arrived.
    pub fn on_tokens_received(&mut self) -> Result<()> {
        if self.tokens_received {
            return Err(AuctionError::TokensAlreadyReceived);
        }
        self.tokens_received = true;
        tracing::info!(auction = %self.config.auction_id, "Distribution received");
        Ok(())
    }

    // =================================================================
    // Advancement
    // =================================================================

    fn search(&self) -> Result<ClearingSearch> {
        let supply = self
            .chain
            .rollover()
            .supply_per_auction(self.config.total_supply)?;
        find_clearing_price(
            &self.ticks,
            supply,
            self.chain.latest().clearing_price,
            self.demand_above_clearing,
            self.next_active_tick,
        )
    }

    fn stage_advance(&self, block: u64) -> Result<Option<StagedAdvance>> {
        let start_block = self.schedule.start_block();
        if block < start_block {
            return Err(AuctionError::AuctionNotStarted { start_block, block });
        }
        let block = block.min(self.schedule.end_block());
        let latest = self.chain.latest();
        if block == latest.block {
            return Ok(None);
        }
        let search = self.search()?;
        let sale = Sale {
            clearing_price: search.clearing_price,
            demand_above: search.demand_above,
            marginal_demand: self.ticks.demand_at(search.clearing_price),
            delta_mps: self.schedule.mps_between(latest.block, block),
            total_supply: self.config.total_supply,
        };
        let checkpoint = self.chain.stage(block, &sale)?;
        Ok(Some(StagedAdvance { checkpoint, search }))
    }

    fn commit_advance(&mut self, staged: StagedAdvance) -> Result<()> {
        let previous_price = self.chain.latest().clearing_price;
        let was_rolled_over = self.chain.rollover().is_set;
        self.chain.commit(staged.checkpoint)?;
        self.demand_above_clearing = staged.search.demand_above;
        self.next_active_tick = staged.search.next_active_tick;

        let latest = self.chain.latest();
        if latest.clearing_price != previous_price {
            tracing::info!(
                block = latest.block,
                from = %previous_price,
                to = %latest.clearing_price,
                ticks_crossed = staged.search.ticks_crossed,
                "Clearing price updated"
            );
        }
        let rollover = self.chain.rollover();
        if rollover.is_set && !was_rolled_over {
            tracing::info!(
                block = latest.block,
                remaining_mps = rollover.remaining_mps,
                remaining_supply = %rollover.remaining_supply.scale_down(),
                "Supply rollover engaged"
            );
        }
        tracing::debug!(
            block = latest.block,
            cumulative_mps = latest.cumulative_mps,
            tokens_cleared = %latest.total_cleared.scale_down(),
            currency_raised = %latest.currency_raised.scale_down(),
            "Checkpoint appended"
        );
        Ok(())
    }

    /// Advance the chain to `block` (clamped to the end block). Idempotent:
    /// an existing checkpoint is returned unchanged.
    pub fn checkpoint(&mut self, block: u64) -> Result<CheckpointView> {
        let clamped = block.min(self.schedule.end_block());
        if let Some(existing) = self.chain.get(clamped) {
            return Ok(existing.view());
        }
        if let Some(staged) = self.stage_advance(block)? {
            self.commit_advance(staged)?;
        }
        Ok(self.chain.latest().view())
    }

    // =================================================================
    // Bids
    // =================================================================

    fn validate_request(&self, request: &BidRequest, checkpoint: &Checkpoint) -> Result<()> {
        if request.amount == 0 {
            return Err(AuctionError::ZeroAmount);
        }
        if request.owner.is_zero() {
            return Err(AuctionError::ZeroOwner);
        }
        let price = request.max_price;
        if price < self.config.floor_price {
            return Err(AuctionError::BidPriceBelowFloor {
                price,
                floor: self.config.floor_price,
            });
        }
        if price > self.config.max_bid_price {
            return Err(AuctionError::BidPriceAboveCeiling {
                price,
                ceiling: self.config.max_bid_price,
            });
        }
        if !price.is_multiple_of(self.config.tick_spacing) {
            return Err(AuctionError::BidPriceNotOnTick(price));
        }
        if price <= checkpoint.clearing_price {
            return Err(AuctionError::BidMustBeAboveClearingPrice {
                price,
                clearing: checkpoint.clearing_price,
            });
        }
        if checkpoint.cumulative_mps >= MPS {
            return Err(AuctionError::AuctionIsOver);
        }
        if checkpoint.total_cleared >= ValueX7X7::scale_up(self.config.total_supply) {
            return Err(AuctionError::AuctionSoldOut);
        }
        Ok(())
    }

    fn prepare_bid(&self, block: u64, request: &BidRequest) -> Result<PreparedBid> {
        if !self.tokens_received {
            return Err(AuctionError::TokensNotReceived);
        }
        if block >= self.schedule.end_block() {
            return Err(AuctionError::AuctionIsOver);
        }
        let staged = self.stage_advance(block)?;
        let (checkpoint, base_demand, base_next) = match &staged {
            Some(s) => (&s.checkpoint.checkpoint, s.search.demand_above, s.search.next_active_tick),
            None => (self.chain.latest(), self.demand_above_clearing, self.next_active_tick),
        };
        self.validate_request(request, checkpoint)?;

        let price = request.max_price;
        let placement = self.ticks.locate(price, request.prev_tick_hint)?;
        let bid = Bid {
            id: self.bids.next_id(),
            owner: request.owner,
            max_price: price,
            amount: request.amount,
            side: request.side,
            start_block: checkpoint.block,
            start_cumulative_mps: checkpoint.cumulative_mps,
            effective_demand: effective_amount(request.amount, checkpoint.cumulative_mps)?,
            committed_currency: committed_currency(request.side, request.amount, price)?,
            exited_block: None,
            settlement: None,
            claimed: false,
        };
        let demand = bid.demand();
        // Overflow checks before anything is committed.
        let _ = self.ticks.demand_at(price).checked_add(demand)?;
        let demand_above = base_demand.checked_add(demand)?;
        let next_active = Some(base_next.map_or(price, |next| next.min(price)));
        Ok(PreparedBid {
            staged,
            bid,
            placement,
            demand_above,
            next_active,
        })
    }

    /// Run every check [`Self::submit_bid`] would, without registering the
    /// bid. Returns the currency the bid commits.
    pub fn preview_bid(&self, block: u64, request: &BidRequest) -> Result<u128> {
        self.prepare_bid(block, request).map(|p| p.bid.committed_currency)
    }

    /// Register a bid at `block`.
    pub fn submit_bid(&mut self, block: u64, request: &BidRequest) -> Result<BidId> {
        let prepared = self.prepare_bid(block, request)?;
        let bid = prepared.bid;
        let price = bid.max_price;
        if let Some(staged) = prepared.staged {
            self.commit_advance(staged)?;
        }
        self.ticks.insert(price, prepared.placement)?;
        self.ticks.add_demand(price, bid.demand())?;
        self.demand_above_clearing = prepared.demand_above;
        self.next_active_tick = prepared.next_active;

        tracing::debug!(
            bid = %bid.id,
            owner = %bid.owner,
            side = %bid.side,
            price = %bid.max_price,
            amount = bid.amount,
            block = bid.start_block,
            "Bid submitted"
        );
        self.bids.push(bid)
    }

    fn graduated_at(&self, checkpoint: &Checkpoint) -> bool {
        checkpoint.currency_raised.scale_down() >= U256::from(self.config.required_currency_raised)
    }

    fn verify_last_fully_filled<'a>(
        &self,
        bid: &Bid,
        view: &ChainView<'a>,
        block: u64,
    ) -> Result<&'a Checkpoint> {
        let valid = view.get(block).filter(|cp| {
            cp.clearing_price < bid.max_price
                && cp.block >= bid.start_block
                && view
                    .next_of(cp)
                    .is_some_and(|next| next.clearing_price >= bid.max_price)
        });
        valid.ok_or_else(|| {
            tracing::warn!(bid = %bid.id, block, "Rejected last fully filled checkpoint hint");
            AuctionError::InvalidLastFullyFilledCheckpointHint(block)
        })
    }

    /// Verify the outbid hint and return the checkpoint just before it.
    fn verify_outbid<'a>(
        &self,
        bid: &Bid,
        view: &ChainView<'a>,
        block: u64,
        last_fully_filled: u64,
    ) -> Result<&'a Checkpoint> {
        let upper = view
            .get(block)
            .filter(|cp| cp.clearing_price > bid.max_price && cp.block > last_fully_filled)
            .and_then(|cp| view.prev_of(cp))
            .filter(|prev| prev.clearing_price <= bid.max_price);
        upper.ok_or_else(|| {
            tracing::warn!(bid = %bid.id, block, "Rejected outbid checkpoint hint");
            AuctionError::InvalidOutbidCheckpointHint(block)
        })
    }

    fn exit_fill(&self, bid: &Bid, view: &ChainView<'_>, ended: bool, hints: ExitHints) -> Result<Fill> {
        let final_cp = view.latest();
        let graduated = self.graduated_at(final_cp);
        if ended && !graduated {
            return Ok(Fill::ZERO);
        }
        let start = view.get(bid.start_block).ok_or_else(|| {
            AuctionError::Internal(format!("{} has no start checkpoint", bid.id))
        })?;

        if bid.max_price > final_cp.clearing_price {
            if !ended {
                return Err(AuctionError::CannotExitBid(bid.id));
            }
            return fully_filled(bid, start, final_cp);
        }

        let lff_block = hints.last_fully_filled.ok_or(AuctionError::MissingCheckpointHint {
            bid: bid.id,
            which: "last fully filled",
        })?;
        let last_fully_filled = self.verify_last_fully_filled(bid, view, lff_block)?;
        let fill = fully_filled(bid, start, last_fully_filled)?;
        let tick_demand = self.ticks.demand_at(bid.max_price);

        if final_cp.clearing_price > bid.max_price {
            if !graduated {
                return Err(AuctionError::CannotPartiallyExitBidBeforeGraduation(bid.id));
            }
            let outbid_block = hints.outbid.ok_or(AuctionError::MissingCheckpointHint {
                bid: bid.id,
                which: "outbid",
            })?;
            let upper = self.verify_outbid(bid, view, outbid_block, last_fully_filled.block)?;
            if upper.clearing_price == bid.max_price {
                let marginal = partially_filled(bid, tick_demand, upper.cleared_at_clearing_price)?;
                return fill.checked_add(marginal);
            }
            return Ok(fill);
        }

        if !ended {
            return Err(AuctionError::CannotPartiallyExitBidBeforeEndBlock(bid.id));
        }
        let marginal = partially_filled(bid, tick_demand, final_cp.cleared_at_clearing_price)?;
        fill.checked_add(marginal)
    }

    fn prepare_exit(&self, block: u64, bid_id: BidId, hints: ExitHints) -> Result<PreparedExit> {
        let staged = self.stage_advance(block)?;
        let bid = self.bids.get(bid_id)?;
        if bid.is_exited() {
            return Err(AuctionError::BidAlreadyExited(bid_id));
        }
        let view = self.chain.view(staged.as_ref().map(|s| &s.checkpoint.checkpoint));
        let ended = block >= self.schedule.end_block();
        let fill = self.exit_fill(bid, &view, ended, hints)?;
        let settlement = settle(bid, fill)?;
        let result = FillResult {
            bid_id,
            owner: bid.owner,
            tokens_filled: settlement.tokens_filled,
            currency_spent: settlement.currency_spent,
            currency_refunded: settlement.currency_refunded,
        };
        let exited_at = view.latest().block;
        Ok(PreparedExit {
            staged,
            exited_at,
            settlement,
            result,
        })
    }

    /// Compute the outcome [`Self::exit_bid`] would produce, without
    /// recording the exit.
    pub fn preview_exit(&self, block: u64, bid_id: BidId, hints: ExitHints) -> Result<FillResult> {
        self.prepare_exit(block, bid_id, hints).map(|p| p.result)
    }

    /// Settle a bid: compute its fill and refund from the checkpoint chain.
    pub fn exit_bid(&mut self, block: u64, bid_id: BidId, hints: ExitHints) -> Result<FillResult> {
        let prepared = self.prepare_exit(block, bid_id, hints)?;
        if let Some(staged) = prepared.staged {
            self.commit_advance(staged)?;
        }
        self.bids.record_exit(bid_id, prepared.exited_at, prepared.settlement)?;
        let result = prepared.result;
        tracing::info!(
            bid = %bid_id,
            block = prepared.exited_at,
            tokens_filled = result.tokens_filled,
            currency_spent = result.currency_spent,
            currency_refunded = result.currency_refunded,
            "Bid exited"
        );
        Ok(result)
    }

    /// Release an exited bid's entitlement.
    pub fn claim(&mut self, block: u64, bid_id: BidId) -> Result<ClaimResult> {
        if block < self.config.claim_block {
            return Err(AuctionError::NotClaimable {
                claim_block: self.config.claim_block,
            });
        }
        let claim = self.bids.claim(bid_id)?;
        tracing::debug!(bid = %bid_id, tokens = claim.tokens_filled, "Tokens claimed");
        Ok(claim)
    }

    // =================================================================
    // Sweeps
    // =================================================================

    fn stage_final(&self, block: u64) -> Result<Option<StagedAdvance>> {
        let end_block = self.schedule.end_block();
        if block < end_block {
            return Err(AuctionError::AuctionIsNotOver { end_block, block });
        }
        self.stage_advance(block)
    }

    fn unsold_at(&self, checkpoint: &Checkpoint) -> Result<u128> {
        let total = self.config.total_supply;
        if !self.graduated_at(checkpoint) {
            return Ok(total);
        }
        let sold = to_u128(checkpoint.total_cleared.scale_down_up()?, "unsold_tokens")?;
        Ok(total - sold.min(total))
    }

    /// Currency raised, releasable to the seller once the auction graduated.
    pub fn sweep_currency(&mut self, block: u64) -> Result<u128> {
        let staged = self.stage_final(block)?;
        if self.currency_swept {
            return Err(AuctionError::AlreadySwept { resource: "currency" });
        }
        let final_cp = staged
            .as_ref()
            .map_or(self.chain.latest(), |s| &s.checkpoint.checkpoint);
        if !self.graduated_at(final_cp) {
            return Err(AuctionError::NotGraduated);
        }
        let amount = raised_at(final_cp)?;
        if let Some(staged) = staged {
            self.commit_advance(staged)?;
        }
        self.currency_swept = true;
        tracing::info!(amount, "Currency swept");
        Ok(amount)
    }

    /// Tokens no bid can claim: all of them if the auction failed.
    pub fn sweep_unsold_tokens(&mut self, block: u64) -> Result<u128> {
        let staged = self.stage_final(block)?;
        if self.tokens_swept {
            return Err(AuctionError::AlreadySwept { resource: "unsold tokens" });
        }
        let final_cp = staged
            .as_ref()
            .map_or(self.chain.latest(), |s| &s.checkpoint.checkpoint);
        let amount = self.unsold_at(final_cp)?;
        if let Some(staged) = staged {
            self.commit_advance(staged)?;
        }
        self.tokens_swept = true;
        tracing::info!(amount, "Unsold tokens swept");
        Ok(amount)
    }

    /// Release the rounding residue left between the settled bids and the
    /// chain's aggregates. Requires every bid exited and both sweeps done
    /// (the currency sweep only if the auction graduated).
    pub fn sweep_dust(&mut self, block: u64) -> Result<DustSweep> {
        let staged = self.stage_final(block)?;
        if self.dust_swept {
            return Err(AuctionError::AlreadySwept { resource: "dust" });
        }
        let final_cp = staged
            .as_ref()
            .map_or(self.chain.latest(), |s| &s.checkpoint.checkpoint);
        let graduated = self.graduated_at(final_cp);
        if !self.tokens_swept || (graduated && !self.currency_swept) {
            return Err(AuctionError::DustNotReleasable {
                reason: "sweeps still pending".into(),
            });
        }
        let mut spent = 0u128;
        let mut filled = 0u128;
        for bid in self.bids.iter() {
            let settlement = bid.settlement.ok_or(AuctionError::BidNotExited(bid.id))?;
            spent = spent
                .checked_add(settlement.currency_spent)
                .ok_or(AuctionError::ArithmeticOverflow { op: "sweep_dust" })?;
            filled = filled
                .checked_add(settlement.tokens_filled)
                .ok_or(AuctionError::ArithmeticOverflow { op: "sweep_dust" })?;
        }
        let raised = if graduated { raised_at(final_cp)? } else { 0 };
        let sold = self.config.total_supply - self.unsold_at(final_cp)?;
        let dust = DustSweep {
            currency: spent.saturating_sub(raised),
            tokens: sold.saturating_sub(filled),
        };
        if let Some(staged) = staged {
            self.commit_advance(staged)?;
        }
        self.dust_swept = true;
        tracing::info!(currency = dust.currency, tokens = dust.tokens, "Dust swept");
        Ok(dust)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Clearing price of the latest checkpoint.
    #[must_use]
    pub fn clearing_price(&self) -> Price {
        self.chain.latest().clearing_price
    }

    /// Clearing price the next checkpoint would use, given current demand.
    pub fn projected_clearing_price(&self) -> Result<Price> {
        self.search().map(|s| s.clearing_price)
    }

    #[must_use]
    pub fn currency_raised(&self) -> U256 {
        self.chain.latest().currency_raised.scale_down()
    }

    #[must_use]
    pub fn total_cleared(&self) -> U256 {
        self.chain.latest().total_cleared.scale_down()
    }

    #[must_use]
    pub fn is_graduated(&self) -> bool {
        self.graduated_at(self.chain.latest())
    }

    #[must_use]
    pub fn latest_checkpoint(&self) -> CheckpointView {
        self.chain.latest().view()
    }

    #[must_use]
    pub fn checkpoint_at(&self, block: u64) -> Option<CheckpointView> {
        self.chain.get(block).map(Checkpoint::view)
    }

    pub fn bid(&self, bid_id: BidId) -> Result<&Bid> {
        self.bids.get(bid_id)
    }

    #[must_use]
    pub fn tick(&self, price: Price) -> Option<&Tick> {
        self.ticks.get(price)
    }

    /// Discover exit hints by walking back from the latest checkpoint.
    pub fn exit_hints(&self, bid_id: BidId) -> Result<ExitHints> {
        let bid = self.bids.get(bid_id)?;
        let mut hints = ExitHints::default();
        for cp in self.chain.iter_back() {
            if cp.clearing_price > bid.max_price {
                hints.outbid = Some(cp.block);
            } else if cp.clearing_price < bid.max_price {
                hints.last_fully_filled = Some(cp.block);
                break;
            }
        }
        Ok(hints)
    }

    /// Recompute the above-clearing accumulator from a full tick scan and
    /// compare it with the incrementally maintained one.
    pub fn verify_demand_above(&self) -> Result<()> {
        let clearing = self.clearing_price();
        let mut sum = Demand::ZERO;
        let mut lowest = None;
        for tick in self.ticks.iter().filter(|t| t.price > clearing) {
            sum = sum.checked_add(tick.demand)?;
            lowest = lowest.or(Some(tick.price));
        }
        if sum != self.demand_above_clearing || lowest != self.next_active_tick {
            return Err(AuctionError::Internal(format!(
                "demand above clearing diverged: tracked next {:?}, scanned next {:?}",
                self.next_active_tick, lowest
            )));
        }
        Ok(())
    }
}

fn raised_at(checkpoint: &Checkpoint) -> Result<u128> {
    to_u128(checkpoint.currency_raised.scale_down(), "currency_raised")
}
