//! Integration test: async auction service
//!
//! Concurrent clients share one service task. Writes are serialized, reads
//! come from the published status, and the auction handed back at shutdown
//! replays to the same state.

use std::sync::Arc;

use cca_ingress::{AcceptAll, OperationLog};
use cca_settlement::{Auction, AuctionService, InMemoryGateway, Recipients, replay_verified};
use cca_types::*;

const START: u64 = 100;
const END: u64 = 110;

fn owner(n: u8) -> OwnerId {
    OwnerId::from_bytes([n; 20])
}

fn config() -> AuctionConfig {
    let mut config = AuctionConfig::linear(1_000, START, END - START, Price::from_integer(1), Price::from_integer(1));
    config.auction_id = AuctionId::from_bytes([7; 16]);
    config
}

fn gateway() -> InMemoryGateway {
    let mut gw = InMemoryGateway::new();
    gw.fund_tokens(1_000);
    for n in 1..=8 {
        gw.deposit_currency(owner(n), 10_000);
    }
    gw
}

fn auction() -> Auction<InMemoryGateway, AcceptAll> {
    Auction::new(config(), Recipients::single(owner(99)), gateway(), AcceptAll).unwrap()
}

#[tokio::test]
async fn commands_round_trip() {
    let service = AuctionService::spawn(auction());
    let handle = service.handle();

    assert!(matches!(
        handle.submit_bid(START, BidRequest::new(BidSide::ExactIn, Price::from_integer(2), 10, owner(1)), Vec::new()).await,
        Err(AuctionError::TokensNotReceived)
    ));
    handle.notify_tokens_received(START).await.unwrap();
    let id = handle
        .submit_bid(START, BidRequest::new(BidSide::ExactIn, Price::from_integer(2), 500, owner(1)), Vec::new())
        .await
        .unwrap();
    let view = handle.checkpoint(105).await.unwrap();
    assert_eq!(view.block, 105);
    assert_eq!(handle.status().checkpoint.block, 105);
    assert_eq!(handle.status().bid_count, 1);

    let fill = handle.exit_bid_auto(END, id).await.unwrap();
    assert_eq!(fill.tokens_filled, 500);
    assert_eq!(handle.claim(END, id).await.unwrap().tokens_filled, 500);
    assert_eq!(handle.sweep_currency(END).await.unwrap(), 500);
    assert_eq!(handle.sweep_unsold_tokens(END).await.unwrap(), 500);
    assert_eq!(handle.sweep_dust(END).await.unwrap(), DustSweep::default());

    let auction = service.shutdown().await.unwrap();
    assert_eq!(auction.gateway().token_balance(owner(1)), 500);
    assert_eq!(auction.gateway().currency_balance(owner(99)), 500);
    auction.verify_conservation().unwrap();
}

#[tokio::test]
async fn concurrent_clients_are_serialized() {
    let service = AuctionService::spawn_with_buffer(auction(), 8);
    let handle = service.handle();
    handle.notify_tokens_received(START).await.unwrap();

    let barrier = Arc::new(tokio::sync::Barrier::new(8));
    let mut tasks = Vec::new();
    for n in 1..=8u8 {
        let handle = handle.clone();
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut ids = Vec::new();
            for i in 0..5u64 {
                let request = BidRequest::new(BidSide::ExactOut, Price::from_integer(2 + i), 10, owner(n));
                ids.push(handle.submit_bid(START, request, Vec::new()).await.unwrap());
            }
            ids
        }));
    }
    let mut all = Vec::new();
    for task in tasks {
        all.extend(task.await.unwrap());
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 40);
    assert_eq!(handle.status().bid_count, 40);

    let json = handle.export_log().await.unwrap();
    let log = OperationLog::from_json(&json).unwrap();
    assert_eq!(log.len(), 41);

    let live = service.shutdown().await.unwrap();
    let replayed = replay_verified(config(), Recipients::single(owner(99)), gateway(), AcceptAll, &log, &live.state_digest()).unwrap();
    assert_eq!(replayed.log().head_hash(), live.log().head_hash());
}

#[tokio::test]
async fn status_watch_observes_writes() {
    let service = AuctionService::spawn(auction());
    let handle = service.handle();
    let mut updates = handle.subscribe();
    assert!(!handle.status().tokens_received);

    handle.notify_tokens_received(START).await.unwrap();
    updates.changed().await.unwrap();
    assert!(updates.borrow_and_update().tokens_received);

    // Rejected commands still publish, with the state unchanged.
    let before = handle.status();
    let digest = handle.state_digest().await.unwrap();
    assert!(handle.checkpoint(START - 1).await.is_err());
    assert_eq!(handle.status(), before);
    assert_eq!(handle.state_digest().await.unwrap(), digest);
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn stopped_service_reports_errors() {
    let service = AuctionService::spawn(auction());
    let handle = service.handle();
    service.shutdown().await.unwrap();
    assert!(matches!(
        handle.checkpoint(START).await,
        Err(AuctionError::Internal(_))
    ));
}
