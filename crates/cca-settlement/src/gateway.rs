//! Asset transfer gateway.
//!
//! The engine never moves assets. The [`Auction`](crate::Auction) facade
//! asks a gateway to pull bid currency into the auction vault and to push
//! refunds, fills and sweeps out of it.

use std::collections::HashMap;
use std::fmt;

use cca_types::{AuctionError, OwnerId, Result};
use serde::{Deserialize, Serialize};

/// The two assets an auction handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// What bidders pay with.
    Currency,
    /// What the auction sells.
    Token,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Currency => write!(f, "currency"),
            Self::Token => write!(f, "token"),
        }
    }
}

/// Moves assets between participants and the auction vault.
///
/// A push must succeed whenever the vault holds at least the pushed amount;
/// the facade checks vault inventory before committing an operation that
/// pays out.
pub trait AssetGateway: Send {
    /// Move `amount` currency from `from` into the vault.
    fn pull_currency(&mut self, from: OwnerId, amount: u128) -> Result<()>;

    /// Move `amount` currency from the vault to `to`.
    fn push_currency(&mut self, to: OwnerId, amount: u128) -> Result<()>;

    /// Move `amount` tokens from the vault to `to`.
    fn push_tokens(&mut self, to: OwnerId, amount: u128) -> Result<()>;

    /// Tokens currently held by the vault.
    fn token_inventory(&self) -> u128;

    /// Currency currently held by the vault.
    fn currency_inventory(&self) -> u128;
}

/// Gateway over in-process balances, for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    /// Per-(owner, asset) balances outside the vault.
    balances: HashMap<(OwnerId, Asset), u128>,
    vault_currency: u128,
    vault_tokens: u128,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an owner's currency balance.
    pub fn deposit_currency(&mut self, owner: OwnerId, amount: u128) {
        *self.balances.entry((owner, Asset::Currency)).or_insert(0) += amount;
    }

    /// Deliver sale inventory straight into the vault.
    pub fn fund_tokens(&mut self, amount: u128) {
        self.vault_tokens += amount;
    }

    #[must_use]
    pub fn balance(&self, owner: OwnerId, asset: Asset) -> u128 {
        self.balances.get(&(owner, asset)).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn currency_balance(&self, owner: OwnerId) -> u128 {
        self.balance(owner, Asset::Currency)
    }

    #[must_use]
    pub fn token_balance(&self, owner: OwnerId) -> u128 {
        self.balance(owner, Asset::Token)
    }

    fn vault_mut(&mut self, asset: Asset) -> &mut u128 {
        match asset {
            Asset::Currency => &mut self.vault_currency,
            Asset::Token => &mut self.vault_tokens,
        }
    }

    fn push(&mut self, to: OwnerId, asset: Asset, amount: u128) -> Result<()> {
        let vault = self.vault_mut(asset);
        if *vault < amount {
            return Err(AuctionError::TransferFailed {
                reason: format!("vault holds {vault} {asset}, cannot push {amount}"),
            });
        }
        *vault -= amount;
        *self.balances.entry((to, asset)).or_insert(0) += amount;
        Ok(())
    }
}

impl AssetGateway for InMemoryGateway {
    fn pull_currency(&mut self, from: OwnerId, amount: u128) -> Result<()> {
        let available = self.currency_balance(from);
        if available < amount {
            return Err(AuctionError::TransferFailed {
                reason: format!("{from} holds {available} currency, needs {amount}"),
            });
        }
        self.balances.insert((from, Asset::Currency), available - amount);
        self.vault_currency += amount;
        Ok(())
    }

    fn push_currency(&mut self, to: OwnerId, amount: u128) -> Result<()> {
        self.push(to, Asset::Currency, amount)
    }

    fn push_tokens(&mut self, to: OwnerId, amount: u128) -> Result<()> {
        self.push(to, Asset::Token, amount)
    }

    fn token_inventory(&self) -> u128 {
        self.vault_tokens
    }

    fn currency_inventory(&self) -> u128 {
        self.vault_currency
    }
}
