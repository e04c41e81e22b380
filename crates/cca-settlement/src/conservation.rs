//! Supply conservation checker.
//!
//! Invariants checked after every settling operation:
//! ```text
//! vault_tokens   == tokens_in   - tokens_claimed    - tokens_swept
//! vault_currency == currency_in - currency_refunded - currency_swept
//! vault          >= outstanding entitlements
//! ```
//!
//! A violation means the gateway and the engine disagree about who owns
//! what. The facade refuses to continue past one.

use cca_engine::ClearingEngine;
use cca_types::{AuctionError, Result};
use serde::{Deserialize, Serialize};

/// What the vault still owes to participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Entitlements {
    /// Filled tokens of exited bids not yet claimed.
    pub tokens: u128,
    /// Currency of live bids plus spends of exited bids the seller has not
    /// swept yet.
    pub currency: u128,
}

impl Entitlements {
    /// Derive outstanding entitlements from engine state.
    pub fn outstanding(engine: &ClearingEngine, currency_swept: u128) -> Result<Self> {
        let mut tokens = 0u128;
        let mut currency = 0u128;
        for bid in engine.bids().iter() {
            let owed = match bid.settlement {
                Some(settlement) => {
                    if !bid.claimed {
                        tokens = add(tokens, settlement.tokens_filled, "tokens owed")?;
                    }
                    settlement.currency_spent
                }
                None => bid.committed_currency,
            };
            currency = add(currency, owed, "currency owed")?;
        }
        Ok(Self {
            tokens,
            currency: currency.saturating_sub(currency_swept),
        })
    }
}

fn add(a: u128, b: u128, what: &str) -> Result<u128> {
    a.checked_add(b).ok_or_else(|| AuctionError::SupplyInvariantViolation {
        reason: format!("{what} overflowed"),
    })
}

/// Running ledger of every asset movement through the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupplyConservation {
    pub tokens_in: u128,
    pub tokens_claimed: u128,
    pub tokens_swept: u128,
    pub currency_in: u128,
    pub currency_refunded: u128,
    pub currency_swept: u128,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tokens_in(&mut self, amount: u128) -> Result<()> {
        self.tokens_in = add(self.tokens_in, amount, "tokens in")?;
        Ok(())
    }

    pub fn record_tokens_claimed(&mut self, amount: u128) -> Result<()> {
        self.tokens_claimed = add(self.tokens_claimed, amount, "tokens claimed")?;
        Ok(())
    }

    pub fn record_tokens_swept(&mut self, amount: u128) -> Result<()> {
        self.tokens_swept = add(self.tokens_swept, amount, "tokens swept")?;
        Ok(())
    }

    pub fn record_currency_in(&mut self, amount: u128) -> Result<()> {
        self.currency_in = add(self.currency_in, amount, "currency in")?;
        Ok(())
    }

    pub fn record_currency_refunded(&mut self, amount: u128) -> Result<()> {
        self.currency_refunded = add(self.currency_refunded, amount, "currency refunded")?;
        Ok(())
    }

    pub fn record_currency_swept(&mut self, amount: u128) -> Result<()> {
        self.currency_swept = add(self.currency_swept, amount, "currency swept")?;
        Ok(())
    }

    /// Tokens the vault should hold. `None` if more left than arrived.
    #[must_use]
    pub fn expected_tokens(&self) -> Option<u128> {
        self.tokens_in
            .checked_sub(self.tokens_claimed)?
            .checked_sub(self.tokens_swept)
    }

    /// Currency the vault should hold. `None` if more left than arrived.
    #[must_use]
    pub fn expected_currency(&self) -> Option<u128> {
        self.currency_in
            .checked_sub(self.currency_refunded)?
            .checked_sub(self.currency_swept)
    }

    /// Verify the vault balances match the recorded flows.
    ///
    /// # Errors
    /// Returns [`AuctionError::SupplyInvariantViolation`] on any mismatch.
    pub fn verify(&self, vault_tokens: u128, vault_currency: u128) -> Result<()> {
        let expected_tokens = self.expected_tokens();
        if expected_tokens != Some(vault_tokens) {
            tracing::error!(?expected_tokens, vault_tokens, "Token supply invariant violated");
            return Err(AuctionError::SupplyInvariantViolation {
                reason: format!(
                    "vault holds {vault_tokens} tokens, expected {expected_tokens:?} \
                     (in={}, claimed={}, swept={})",
                    self.tokens_in, self.tokens_claimed, self.tokens_swept
                ),
            });
        }
        let expected_currency = self.expected_currency();
        if expected_currency != Some(vault_currency) {
            tracing::error!(?expected_currency, vault_currency, "Currency supply invariant violated");
            return Err(AuctionError::SupplyInvariantViolation {
                reason: format!(
                    "vault holds {vault_currency} currency, expected {expected_currency:?} \
                     (in={}, refunded={}, swept={})",
                    self.currency_in, self.currency_refunded, self.currency_swept
                ),
            });
        }
        Ok(())
    }

    /// Verify the vault can pay out everything it still owes.
    pub fn verify_coverage(
        &self,
        vault_tokens: u128,
        vault_currency: u128,
        owed: Entitlements,
    ) -> Result<()> {
        if vault_tokens < owed.tokens {
            return Err(AuctionError::SupplyInvariantViolation {
                reason: format!("vault holds {vault_tokens} tokens but owes {}", owed.tokens),
            });
        }
        if vault_currency < owed.currency {
            return Err(AuctionError::SupplyInvariantViolation {
                reason: format!("vault holds {vault_currency} currency but owes {}", owed.currency),
            });
        }
        Ok(())
    }
}
