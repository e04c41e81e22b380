//! Replay of an operation log on a cold auction.
//!
//! The log's hash chain is verified before anything is applied. Each
//! operation then goes through the live code path, so a replica fed the same
//! log and an identically funded gateway ends in the same state.

use cca_ingress::{BidValidationHook, OperationLog};
use cca_types::{AuctionConfig, AuctionError, Result};

use crate::auction::{Auction, Recipients};
use crate::gateway::AssetGateway;

/// Rebuild an auction from `log`.
///
/// `gateway` must be in the state the live auction's gateway was in when
/// the auction was created.
pub fn replay<G: AssetGateway, H: BidValidationHook>(
    config: AuctionConfig,
    recipients: Recipients,
    gateway: G,
    hook: H,
    log: &OperationLog,
) -> Result<Auction<G, H>> {
    log.verify()?;
    let mut auction = Auction::new(config, recipients, gateway, hook)?;
    for entry in log.entries() {
        if let Err(err) = auction.apply(&entry.operation) {
            tracing::error!(sequence = entry.sequence, op = entry.operation.kind(), %err, "Replay failed");
            return Err(err);
        }
    }
    let (expected, actual) = (log.head_hex(), auction.log().head_hex());
    if expected != actual {
        return Err(AuctionError::DeterminismViolation { expected, actual });
    }
    tracing::info!(operations = log.len(), head = %actual, "Log replayed");
    Ok(auction)
}

/// Replay `log` and require the resulting engine state digest to equal
/// `expected_digest`.
pub fn replay_verified<G: AssetGateway, H: BidValidationHook>(
    config: AuctionConfig,
    recipients: Recipients,
    gateway: G,
    hook: H,
    log: &OperationLog,
    expected_digest: &[u8; 32],
) -> Result<Auction<G, H>> {
    let auction = replay(config, recipients, gateway, hook, log)?;
    let actual = auction.state_digest();
    if &actual != expected_digest {
        return Err(AuctionError::DeterminismViolation {
            expected: hex::encode(expected_digest),
            actual: hex::encode(actual),
        });
    }
    Ok(auction)
}

#[cfg(test)]
mod tests {
    use cca_ingress::{AcceptAll, Operation};
    use cca_types::*;

    use super::*;
    use crate::gateway::InMemoryGateway;

    fn config() -> AuctionConfig {
        let mut config = AuctionConfig::linear(1_000, 100, 10, Price::from_integer(1), Price::from_integer(1));
        config.auction_id = AuctionId::from_bytes([3; 16]);
        config
    }

    fn owner(n: u8) -> OwnerId {
        OwnerId::from_bytes([n; 20])
    }

    fn funded() -> InMemoryGateway {
        let mut gw = InMemoryGateway::new();
        gw.fund_tokens(1_000);
        gw.deposit_currency(owner(1), 1_000);
        gw
    }

    fn live() -> Auction<InMemoryGateway, AcceptAll> {
        let mut a = Auction::new(config(), Recipients::single(owner(9)), funded(), AcceptAll).unwrap();
        a.notify_tokens_received(99).unwrap();
        let req = BidRequest::new(BidSide::ExactIn, Price::from_integer(2), 400, owner(1));
        a.submit_bid(100, req, Vec::new()).unwrap();
        a.checkpoint(104).unwrap();
        a
    }

    #[test]
    fn replay_reproduces_state() {
        let a = live();
        let b = replay_verified(
            config(),
            Recipients::single(owner(9)),
            funded(),
            AcceptAll,
            a.log(),
            &a.state_digest(),
        )
        .unwrap();
        assert_eq!(b.log().head_hash(), a.log().head_hash());
        assert_eq!(b.gateway().currency_inventory(), 400);
    }

    #[test]
    fn digest_mismatch_reported() {
        let a = live();
        let result = replay_verified(config(), Recipients::single(owner(9)), funded(), AcceptAll, a.log(), &[0; 32]);
        assert!(matches!(result, Err(AuctionError::DeterminismViolation { .. })));
    }

    #[test]
    fn underfunded_replica_fails() {
        let a = live();
        let mut gw = InMemoryGateway::new();
        gw.fund_tokens(1_000);
        let result = replay(config(), Recipients::single(owner(9)), gw, AcceptAll, a.log());
        assert!(matches!(result, Err(AuctionError::TransferFailed { .. })));
    }

    #[test]
    fn corrupted_log_rejected_before_replay() {
        let a = live();
        let mut entries = a.log().entries().to_vec();
        entries[1].operation = Operation::Checkpoint { block: 101 };
        let forged = OperationLog::from_entries(entries);
        assert!(matches!(forged, Err(AuctionError::OperationLogCorrupted { sequence: 1 })));
    }
}
