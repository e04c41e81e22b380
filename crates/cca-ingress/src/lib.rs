//! # cca-ingress
//!
//! **Bid envelope**: everything a bid passes through before and after the
//! clearing engine sees it.
//!
//! ## Architecture
//!
//! 1. **BidValidationHook**: pluggable accept/reject gate, receives the
//!    caller's opaque policy data untouched
//! 2. **PolicyHook**: allowlist and size limits, fail-closed
//! 3. **OperationLog**: every accepted operation, sequence-numbered and
//!    hash-chained so a replica can replay and verify it
//!
//! ## Bid Flow
//!
//! ```text
//! caller → BidValidationHook.validate() → AssetGateway.pull() → ClearingEngine.submit_bid()
//!        → OperationLog.record()
//! ```

pub mod hook;
pub mod op_log;
pub mod policy;

pub use hook::{AcceptAll, BidIntent, BidValidationHook};
pub use op_log::{LoggedOperation, Operation, OperationLog};
pub use policy::{PolicyConfig, PolicyHook};
