//! Operation log: the accepted-operation sequence, hash-chained.
//!
//! Each accepted mutating call is appended with a sequence number and a chain
//! hash `H(prev_hash || sequence || operation)`. Replaying the log in order on
//! a cold engine reproduces the live state; the chain hash lets a replica
//! check it holds the same log before replaying it.

use cca_types::{AuctionError, BidId, BidRequest, ExitHints, OwnerId, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An operation the auction accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    TokensReceived {
        block: u64,
    },
    SubmitBid {
        block: u64,
        request: BidRequest,
        #[serde(default)]
        policy_data: Vec<u8>,
    },
    Checkpoint {
        block: u64,
    },
    ExitBid {
        block: u64,
        bid_id: BidId,
        hints: ExitHints,
    },
    Claim {
        block: u64,
        bid_id: BidId,
    },
    ClaimBatch {
        block: u64,
        owner: OwnerId,
        bid_ids: Vec<BidId>,
    },
    SweepCurrency {
        block: u64,
    },
    SweepUnsoldTokens {
        block: u64,
    },
    SweepDust {
        block: u64,
    },
}

impl Operation {
    #[must_use]
    pub fn block(&self) -> u64 {
        match self {
            Self::TokensReceived { block }
            | Self::SubmitBid { block, .. }
            | Self::Checkpoint { block }
            | Self::ExitBid { block, .. }
            | Self::Claim { block, .. }
            | Self::ClaimBatch { block, .. }
            | Self::SweepCurrency { block }
            | Self::SweepUnsoldTokens { block }
            | Self::SweepDust { block } => *block,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TokensReceived { .. } => "tokens_received",
            Self::SubmitBid { .. } => "submit_bid",
            Self::Checkpoint { .. } => "checkpoint",
            Self::ExitBid { .. } => "exit_bid",
            Self::Claim { .. } => "claim",
            Self::ClaimBatch { .. } => "claim_batch",
            Self::SweepCurrency { .. } => "sweep_currency",
            Self::SweepUnsoldTokens { .. } => "sweep_unsold_tokens",
            Self::SweepDust { .. } => "sweep_dust",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedOperation {
    pub sequence: u64,
    pub operation: Operation,
    /// Chain hash up to and including this entry.
    pub chain_hash: [u8; 32],
}

/// Append-only, hash-chained log of accepted operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationLog {
    entries: Vec<LoggedOperation>,
}

impl OperationLog {
    /// Chain hash of the empty log.
    pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, verifying the chain.
    pub fn from_entries(entries: Vec<LoggedOperation>) -> Result<Self> {
        let log = Self { entries };
        log.verify()?;
        Ok(log)
    }

    fn link(prev: &[u8; 32], sequence: u64, operation: &Operation) -> Result<[u8; 32]> {
        let mut hasher = Sha256::new();
        hasher.update(b"cca:oplog:v1:");
        hasher.update(prev);
        hasher.update(sequence.to_le_bytes());
        hasher.update(serde_json::to_vec(operation)?);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Ok(hash)
    }

    /// Append an accepted operation. Returns its sequence number.
    pub fn record(&mut self, operation: Operation) -> Result<u64> {
        let sequence = self.entries.len() as u64;
        let chain_hash = Self::link(&self.head_hash(), sequence, &operation)?;
        tracing::debug!(sequence, op = operation.kind(), block = operation.block(), "Operation recorded");
        self.entries.push(LoggedOperation {
            sequence,
            operation,
            chain_hash,
        });
        Ok(sequence)
    }

    /// Chain hash of the latest entry.
    #[must_use]
    pub fn head_hash(&self) -> [u8; 32] {
        self.entries
            .last()
            .map_or(Self::GENESIS_HASH, |e| e.chain_hash)
    }

    #[must_use]
    pub fn head_hex(&self) -> String {
        hex::encode(self.head_hash())
    }

    /// Recompute every link. Fails at the first entry that does not match.
    pub fn verify(&self) -> Result<()> {
        let mut prev = Self::GENESIS_HASH;
        for (i, entry) in self.entries.iter().enumerate() {
            let expected_sequence = i as u64;
            if entry.sequence != expected_sequence
                || Self::link(&prev, expected_sequence, &entry.operation)? != entry.chain_hash
            {
                return Err(AuctionError::OperationLogCorrupted {
                    sequence: expected_sequence,
                });
            }
            prev = entry.chain_hash;
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[LoggedOperation] {
        &self.entries
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter().map(|e| &e.operation)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_entries(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use cca_types::*;

    use super::*;

    fn submit(block: u64) -> Operation {
        Operation::SubmitBid {
            block,
            request: BidRequest::new(
                BidSide::ExactOut,
                Price::from_integer(2),
                100,
                OwnerId::from_bytes([1; 20]),
            ),
            policy_data: b"kyc:ok".to_vec(),
        }
    }

    fn sample_log() -> OperationLog {
        let mut log = OperationLog::new();
        log.record(Operation::TokensReceived { block: 0 }).unwrap();
        log.record(submit(1)).unwrap();
        log.record(Operation::Checkpoint { block: 2 }).unwrap();
        log
    }

    #[test]
    fn empty_log_has_genesis_head() {
        let log = OperationLog::new();
        assert_eq!(log.head_hash(), OperationLog::GENESIS_HASH);
        assert!(log.verify().is_ok());
    }

    #[test]
    fn sequences_are_dense() {
        let log = sample_log();
        let seqs: Vec<u64> = log.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(log.head_hex().len(), 64);
    }

    #[test]
    fn same_operations_same_head() {
        assert_eq!(sample_log().head_hash(), sample_log().head_hash());
    }

    #[test]
    fn order_changes_head() {
        let mut a = OperationLog::new();
        a.record(submit(1)).unwrap();
        a.record(Operation::Checkpoint { block: 2 }).unwrap();
        let mut b = OperationLog::new();
        b.record(Operation::Checkpoint { block: 2 }).unwrap();
        b.record(submit(1)).unwrap();
        assert_ne!(a.head_hash(), b.head_hash());
    }

    #[test]
    fn tampered_entry_detected() {
        let mut entries = sample_log().entries().to_vec();
        entries[1].operation = submit(5);
        let err = OperationLog::from_entries(entries).unwrap_err();
        assert!(matches!(err, AuctionError::OperationLogCorrupted { sequence: 1 }));
    }

    #[test]
    fn json_roundtrip_verifies() {
        let log = sample_log();
        let json = log.to_json().unwrap();
        let restored = OperationLog::from_json(&json).unwrap();
        assert_eq!(restored, log);
        assert!(json.contains("\"submit_bid\""));
    }

    #[test]
    fn operation_block_and_kind() {
        let op = Operation::ClaimBatch {
            block: 9,
            owner: OwnerId::from_bytes([2; 20]),
            bid_ids: vec![BidId(0), BidId(1)],
        };
        assert_eq!(op.block(), 9);
        assert_eq!(op.kind(), "claim_batch");
    }
}
