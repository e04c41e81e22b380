//! Error types for the clearing auction.
//!
//! All errors use the `CCA_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Bid validation errors
//! - 2xx: Tick ledger errors
//! - 3xx: Schedule / configuration errors
//! - 4xx: Temporal (auction lifecycle) errors
//! - 5xx: Exit / claim errors
//! - 6xx: Settlement errors
//! - 8xx: Arithmetic errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{BidId, Price};

/// Central error enum for all auction operations.
///
/// Every variant is terminal for the operation that produced it: no state
/// from a failed operation is retained.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuctionError {
    // =================================================================
    // Bid Validation Errors (1xx)
    // =================================================================
    /// Bids must commit a non-zero amount.
    #[error("CCA_ERR_100: Bid amount must be non-zero")]
    ZeroAmount,

    /// The bid price is below the auction's floor price.
    #[error("CCA_ERR_101: Bid price {price} is below floor price {floor}")]
    BidPriceBelowFloor { price: Price, floor: Price },

    /// The bid price is not a multiple of the tick spacing.
    #[error("CCA_ERR_102: Bid price {0} is not on a tick boundary")]
    BidPriceNotOnTick(Price),

    /// The bid price exceeds the configured ceiling.
    #[error("CCA_ERR_103: Bid price {price} is above the ceiling {ceiling}")]
    BidPriceAboveCeiling { price: Price, ceiling: Price },

    /// A new bid must be strictly above the current clearing price.
    #[error("CCA_ERR_104: Bid price {price} must be above clearing price {clearing}")]
    BidMustBeAboveClearingPrice { price: Price, clearing: Price },

    /// The bid owner is the zero address.
    #[error("CCA_ERR_105: Bid owner cannot be the zero address")]
    ZeroOwner,

    /// The external validation hook rejected the bid.
    #[error("CCA_ERR_106: Bid rejected by validation hook: {reason}")]
    BidRejectedByHook { reason: String },

    /// The whole supply has already been cleared.
    #[error("CCA_ERR_107: Auction is sold out")]
    AuctionSoldOut,

    // =================================================================
    // Tick Ledger Errors (2xx)
    // =================================================================
    /// The insertion hint does not name an initialized tick.
    #[error("CCA_ERR_200: Tick hint {0} is not an initialized tick")]
    TickHintNotInitialized(Price),

    /// The insertion hint does not bracket the new price.
    #[error("CCA_ERR_201: Tick hint {hint} does not bracket price {price}")]
    TickHintDoesNotBracket { hint: Price, price: Price },

    /// Demand was added to a price level that has not been initialized.
    #[error("CCA_ERR_202: Cannot update uninitialized tick {0}")]
    CannotUpdateUninitializedTick(Price),

    /// A persisted tick or checkpoint link points at nothing.
    #[error("CCA_ERR_203: Dangling link: {reason}")]
    DanglingLink { reason: String },

    // =================================================================
    // Schedule / Configuration Errors (3xx)
    // =================================================================
    /// The release schedule is malformed.
    #[error("CCA_ERR_300: Invalid release schedule: {reason}")]
    InvalidSchedule { reason: String },

    /// The auction configuration is invalid.
    #[error("CCA_ERR_301: Configuration error: {0}")]
    Configuration(String),

    // =================================================================
    // Temporal Errors (4xx)
    // =================================================================
    /// The operation requires the auction to have started.
    #[error("CCA_ERR_400: Auction has not started (start block {start_block}, now {block})")]
    AuctionNotStarted { start_block: u64, block: u64 },

    /// The operation is not allowed once the auction has ended.
    #[error("CCA_ERR_401: Auction is over")]
    AuctionIsOver,

    /// The operation requires the auction to have ended.
    #[error("CCA_ERR_402: Auction is not over (end block {end_block}, now {block})")]
    AuctionIsNotOver { end_block: u64, block: u64 },

    /// Bids are rejected until the token distribution has been received.
    #[error("CCA_ERR_403: Tokens for distribution have not been received")]
    TokensNotReceived,

    /// The distribution notification was already processed.
    #[error("CCA_ERR_404: Tokens already received")]
    TokensAlreadyReceived,

    /// A checkpoint was requested for a block before the latest checkpoint.
    #[error("CCA_ERR_405: Checkpoint block {block} precedes latest checkpoint {latest}")]
    CheckpointBlockNotIncreasing { block: u64, latest: u64 },

    /// Tokens cannot be claimed before the claim block.
    #[error("CCA_ERR_406: Not claimable before block {claim_block}")]
    NotClaimable { claim_block: u64 },

    // =================================================================
    // Exit / Claim Errors (5xx)
    // =================================================================
    /// No bid with that identifier exists.
    #[error("CCA_ERR_500: Bid not found: {0}")]
    BidNotFound(BidId),

    /// The bid has already been exited.
    #[error("CCA_ERR_501: Bid already exited: {0}")]
    BidAlreadyExited(BidId),

    /// The bid is still active and cannot be exited yet.
    #[error("CCA_ERR_502: Bid {0} cannot be exited while it is still active")]
    CannotExitBid(BidId),

    /// A bid at the clearing price can only exit after the auction ends.
    #[error("CCA_ERR_503: Bid {0} is at the clearing price and cannot exit before the end block")]
    CannotPartiallyExitBidBeforeEndBlock(BidId),

    /// An outbid bid can only exit early once the auction has graduated.
    #[error("CCA_ERR_504: Bid {0} cannot exit before the auction graduates")]
    CannotPartiallyExitBidBeforeGraduation(BidId),

    /// A checkpoint hint required for this exit was not supplied.
    #[error("CCA_ERR_505: Missing {which} checkpoint hint for bid {bid}")]
    MissingCheckpointHint { bid: BidId, which: &'static str },

    /// The last-fully-filled checkpoint hint failed verification.
    #[error("CCA_ERR_506: Invalid last fully filled checkpoint hint at block {0}")]
    InvalidLastFullyFilledCheckpointHint(u64),

    /// The outbid checkpoint hint failed verification.
    #[error("CCA_ERR_507: Invalid outbid checkpoint hint at block {0}")]
    InvalidOutbidCheckpointHint(u64),

    /// Claims require the bid to have been exited first.
    #[error("CCA_ERR_508: Bid not exited: {0}")]
    BidNotExited(BidId),

    /// The bid's tokens have already been claimed.
    #[error("CCA_ERR_509: Bid already claimed: {0}")]
    AlreadyClaimed(BidId),

    /// A batch claim named bids belonging to different owners.
    #[error("CCA_ERR_510: Batch claim spans different owners")]
    BatchClaimDifferentOwner,

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// The resource was already swept.
    #[error("CCA_ERR_600: Already swept: {resource}")]
    AlreadySwept { resource: &'static str },

    /// The operation requires the auction to have graduated.
    #[error("CCA_ERR_601: Auction did not graduate")]
    NotGraduated,

    /// An asset transfer failed at the gateway.
    #[error("CCA_ERR_602: Transfer failed: {reason}")]
    TransferFailed { reason: String },

    /// The distribution inventory is smaller than the total supply.
    #[error("CCA_ERR_603: Invalid token amount received: have {received}, need {required}")]
    InvalidTokenAmountReceived { received: u128, required: u128 },

    /// Supply conservation invariant violated.
    #[error("CCA_ERR_604: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    /// The operation log's hash chain does not verify.
    #[error("CCA_ERR_605: Operation log corrupted at sequence {sequence}")]
    OperationLogCorrupted { sequence: u64 },

    /// Replaying a log produced a different state.
    #[error("CCA_ERR_606: Determinism violation: expected {expected}, got {actual}")]
    DeterminismViolation { expected: String, actual: String },

    /// Rounding residue is released only after every other payout.
    #[error("CCA_ERR_607: Dust not releasable: {reason}")]
    DustNotReleasable { reason: String },

    // =================================================================
    // Arithmetic Errors (8xx)
    // =================================================================
    /// A fixed-point result did not fit its width.
    #[error("CCA_ERR_800: Arithmetic overflow in {op}")]
    ArithmeticOverflow { op: &'static str },

    /// A fixed-point division had a zero denominator.
    #[error("CCA_ERR_801: Division by zero in {op}")]
    DivisionByZero { op: &'static str },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CCA_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CCA_ERR_901: Serialization error: {0}")]
    Serialization(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, AuctionError>;

impl From<serde_json::Error> for AuctionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
