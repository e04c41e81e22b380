//! Single-writer async service around an [`Auction`].
//!
//! One tokio task owns the auction. Mutating calls are sent as
//! [`AuctionCommand`]s over a bounded mpsc channel and answered on a oneshot;
//! commands are applied strictly in arrival order. Before each reply the
//! task publishes a fresh [`AuctionStatus`] on a watch channel, so reads never
//! wait behind writes.

use cca_ingress::BidValidationHook;
use cca_types::*;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::auction::{Auction, AuctionStatus};
use crate::gateway::AssetGateway;

/// Default command queue depth.
pub const DEFAULT_COMMAND_BUFFER: usize = 1024;

type Reply<T> = oneshot::Sender<Result<T>>;

pub enum AuctionCommand {
    NotifyTokensReceived {
        block: u64,
        reply: Reply<()>,
    },
    SubmitBid {
        block: u64,
        request: BidRequest,
        policy_data: Vec<u8>,
        reply: Reply<BidId>,
    },
    Checkpoint {
        block: u64,
        reply: Reply<CheckpointView>,
    },
    /// Exit with explicit hints, or discover them when `hints` is `None`.
    ExitBid {
        block: u64,
        bid_id: BidId,
        hints: Option<ExitHints>,
        reply: Reply<FillResult>,
    },
    Claim {
        block: u64,
        bid_id: BidId,
        reply: Reply<ClaimResult>,
    },
    ClaimBatch {
        block: u64,
        owner: OwnerId,
        bid_ids: Vec<BidId>,
        reply: Reply<Vec<ClaimResult>>,
    },
    SweepCurrency {
        block: u64,
        reply: Reply<u128>,
    },
    SweepUnsoldTokens {
        block: u64,
        reply: Reply<u128>,
    },
    SweepDust {
        block: u64,
        reply: Reply<DustSweep>,
    },
    /// Engine state digest, computed when asked for.
    StateDigest {
        reply: Reply<[u8; 32]>,
    },
    /// Serialized operation log.
    ExportLog {
        reply: Reply<String>,
    },
    Shutdown,
}

fn stopped() -> AuctionError {
    AuctionError::Internal("auction service stopped".into())
}

/// Cloneable client for a running [`AuctionService`].
#[derive(Clone)]
pub struct AuctionHandle {
    commands: mpsc::Sender<AuctionCommand>,
    status: watch::Receiver<AuctionStatus>,
}

impl AuctionHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> AuctionCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).await.map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())?
    }

    pub async fn notify_tokens_received(&self, block: u64) -> Result<()> {
        self.request(|reply| AuctionCommand::NotifyTokensReceived { block, reply })
            .await
    }

    pub async fn submit_bid(
        &self,
        block: u64,
        request: BidRequest,
        policy_data: Vec<u8>,
    ) -> Result<BidId> {
        self.request(|reply| AuctionCommand::SubmitBid {
            block,
            request,
            policy_data,
            reply,
        })
        .await
    }

    pub async fn checkpoint(&self, block: u64) -> Result<CheckpointView> {
        self.request(|reply| AuctionCommand::Checkpoint { block, reply })
            .await
    }

    pub async fn exit_bid(&self, block: u64, bid_id: BidId, hints: ExitHints) -> Result<FillResult> {
        self.request(|reply| AuctionCommand::ExitBid {
            block,
            bid_id,
            hints: Some(hints),
            reply,
        })
        .await
    }

    pub async fn exit_bid_auto(&self, block: u64, bid_id: BidId) -> Result<FillResult> {
        self.request(|reply| AuctionCommand::ExitBid {
            block,
            bid_id,
            hints: None,
            reply,
        })
        .await
    }

    pub async fn claim(&self, block: u64, bid_id: BidId) -> Result<ClaimResult> {
        self.request(|reply| AuctionCommand::Claim { block, bid_id, reply })
            .await
    }

    pub async fn claim_batch(
        &self,
        block: u64,
        owner: OwnerId,
        bid_ids: Vec<BidId>,
    ) -> Result<Vec<ClaimResult>> {
        self.request(|reply| AuctionCommand::ClaimBatch {
            block,
            owner,
            bid_ids,
            reply,
        })
        .await
    }

    pub async fn sweep_currency(&self, block: u64) -> Result<u128> {
        self.request(|reply| AuctionCommand::SweepCurrency { block, reply })
            .await
    }

    pub async fn sweep_unsold_tokens(&self, block: u64) -> Result<u128> {
        self.request(|reply| AuctionCommand::SweepUnsoldTokens { block, reply })
            .await
    }

    pub async fn sweep_dust(&self, block: u64) -> Result<DustSweep> {
        self.request(|reply| AuctionCommand::SweepDust { block, reply })
            .await
    }

    pub async fn state_digest(&self) -> Result<[u8; 32]> {
        self.request(|reply| AuctionCommand::StateDigest { reply }).await
    }

    pub async fn export_log(&self) -> Result<String> {
        self.request(|reply| AuctionCommand::ExportLog { reply }).await
    }

    /// Latest published status. Never blocks on the writer.
    #[must_use]
    pub fn status(&self) -> AuctionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified after every applied command.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuctionStatus> {
        self.status.clone()
    }
}

/// A running auction task.
pub struct AuctionService<G, H> {
    handle: AuctionHandle,
    task: JoinHandle<Auction<G, H>>,
}

impl<G, H> AuctionService<G, H>
where
    G: AssetGateway + 'static,
    H: BidValidationHook + 'static,
{
    /// Move `auction` onto its own task. Must be called within a tokio runtime.
    pub fn spawn(auction: Auction<G, H>) -> Self {
        Self::spawn_with_buffer(auction, DEFAULT_COMMAND_BUFFER)
    }

    pub fn spawn_with_buffer(auction: Auction<G, H>, buffer: usize) -> Self {
        let (commands, receiver) = mpsc::channel(buffer.max(1));
        let (status_tx, status) = watch::channel(auction.status());
        tracing::info!(auction = %auction.engine().config().auction_id, buffer, "Auction service started");
        let task = tokio::spawn(run(auction, receiver, status_tx));
        Self {
            handle: AuctionHandle { commands, status },
            task,
        }
    }

    #[must_use]
    pub fn handle(&self) -> AuctionHandle {
        self.handle.clone()
    }

    /// Stop after the commands already queued and hand the auction back.
    pub async fn shutdown(self) -> Result<Auction<G, H>> {
        self.handle
            .commands
            .send(AuctionCommand::Shutdown)
            .await
            .map_err(|_| stopped())?;
        self.task
            .await
            .map_err(|err| AuctionError::Internal(format!("auction task failed: {err}")))
    }
}

async fn run<G: AssetGateway, H: BidValidationHook>(
    mut auction: Auction<G, H>,
    mut commands: mpsc::Receiver<AuctionCommand>,
    status: watch::Sender<AuctionStatus>,
) -> Auction<G, H> {
    while let Some(command) = commands.recv().await {
        if matches!(command, AuctionCommand::Shutdown) {
            break;
        }
        dispatch(&mut auction, &status, command);
    }
    tracing::info!(operations = auction.log().len(), "Auction service stopped");
    auction
}

/// Publish the post-command status, then answer. A caller that sees its
/// reply also sees the matching status.
fn respond<T, G: AssetGateway, H: BidValidationHook>(
    auction: &Auction<G, H>,
    status: &watch::Sender<AuctionStatus>,
    reply: Reply<T>,
    result: Result<T>,
) {
    status.send_replace(auction.status());
    // The caller may have stopped waiting; the command is applied regardless.
    let _ = reply.send(result);
}

fn dispatch<G: AssetGateway, H: BidValidationHook>(
    auction: &mut Auction<G, H>,
    status: &watch::Sender<AuctionStatus>,
    command: AuctionCommand,
) {
    match command {
        AuctionCommand::NotifyTokensReceived { block, reply } => {
            let result = auction.notify_tokens_received(block);
            respond(auction, status, reply, result);
        }
        AuctionCommand::SubmitBid {
            block,
            request,
            policy_data,
            reply,
        } => {
            let result = auction.submit_bid(block, request, policy_data);
            respond(auction, status, reply, result);
        }
        AuctionCommand::Checkpoint { block, reply } => {
            let result = auction.checkpoint(block);
            respond(auction, status, reply, result);
        }
        AuctionCommand::ExitBid {
            block,
            bid_id,
            hints,
            reply,
        } => {
            let result = match hints {
                Some(hints) => auction.exit_bid(block, bid_id, hints),
                None => auction.exit_bid_auto(block, bid_id),
            };
            respond(auction, status, reply, result);
        }
        AuctionCommand::Claim { block, bid_id, reply } => {
            let result = auction.claim(block, bid_id);
            respond(auction, status, reply, result);
        }
        AuctionCommand::ClaimBatch {
            block,
            owner,
            bid_ids,
            reply,
        } => {
            let result = auction.claim_batch(block, owner, bid_ids);
            respond(auction, status, reply, result);
        }
        AuctionCommand::SweepCurrency { block, reply } => {
            let result = auction.sweep_currency(block);
            respond(auction, status, reply, result);
        }
        AuctionCommand::SweepUnsoldTokens { block, reply } => {
            let result = auction.sweep_unsold_tokens(block);
            respond(auction, status, reply, result);
        }
        AuctionCommand::SweepDust { block, reply } => {
            let result = auction.sweep_dust(block);
            respond(auction, status, reply, result);
        }
        AuctionCommand::StateDigest { reply } => {
            let _ = reply.send(Ok(auction.state_digest()));
        }
        AuctionCommand::ExportLog { reply } => {
            let result = auction.log().to_json();
            respond(auction, status, reply, result);
        }
        AuctionCommand::Shutdown => {}
    }
}
