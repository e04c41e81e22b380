//! Policy hook: configurable gate for bid admission.
//!
//! Enforces an optional owner allowlist, a per-bid size cap, a price cap and a
//! per-owner bid count. Any check that cannot be evaluated rejects the bid.

use std::collections::{HashMap, HashSet};

use cca_types::{AuctionError, BidId, OwnerId, Price, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::hook::{BidIntent, BidValidationHook};

/// Serializable policy limits. All limits are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Hex owner addresses allowed to bid. Empty means anyone.
    pub allowlist: Vec<String>,
    pub max_bids_per_owner: Option<usize>,
    /// Largest bid amount, in the bid's own denomination.
    pub max_bid_amount: Option<u128>,
    /// Highest accepted bid price, in currency per token.
    pub max_price: Option<Decimal>,
}

pub struct PolicyHook {
    allowlist: Option<HashSet<OwnerId>>,
    max_bids_per_owner: usize,
    max_bid_amount: u128,
    max_price: Option<Price>,
    /// Accepted bids per owner.
    bid_counts: HashMap<OwnerId, usize>,
}

impl PolicyHook {
    /// A hook with no limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowlist: None,
            max_bids_per_owner: usize::MAX,
            max_bid_amount: u128::MAX,
            max_price: None,
            bid_counts: HashMap::new(),
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        let allowlist = if config.allowlist.is_empty() {
            None
        } else {
            Some(
                config
                    .allowlist
                    .iter()
                    .map(|s| OwnerId::from_hex(s))
                    .collect::<Result<HashSet<_>>>()?,
            )
        };
        let max_price = config.max_price.map(Price::from_decimal).transpose()?;
        Ok(Self {
            allowlist,
            max_bids_per_owner: config.max_bids_per_owner.unwrap_or(usize::MAX),
            max_bid_amount: config.max_bid_amount.unwrap_or(u128::MAX),
            max_price,
            bid_counts: HashMap::new(),
        })
    }

    #[must_use]
    pub fn with_allowlist(mut self, owners: impl IntoIterator<Item = OwnerId>) -> Self {
        self.allowlist = Some(owners.into_iter().collect());
        self
    }

    #[must_use]
    pub fn with_max_bids_per_owner(mut self, max: usize) -> Self {
        self.max_bids_per_owner = max;
        self
    }

    #[must_use]
    pub fn with_max_bid_amount(mut self, max: u128) -> Self {
        self.max_bid_amount = max;
        self
    }

    #[must_use]
    pub fn with_max_price(mut self, max: Price) -> Self {
        self.max_price = Some(max);
        self
    }

    /// Bids accepted so far for `owner`.
    #[must_use]
    pub fn bid_count(&self, owner: &OwnerId) -> usize {
        self.bid_counts.get(owner).copied().unwrap_or(0)
    }

    fn reject(intent: &BidIntent<'_>, reason: String) -> AuctionError {
        tracing::warn!(owner = %intent.request.owner, block = intent.block, %reason, "Bid rejected by policy");
        AuctionError::BidRejectedByHook { reason }
    }
}

impl Default for PolicyHook {
    fn default() -> Self {
        Self::new()
    }
}

impl BidValidationHook for PolicyHook {
    fn validate(&self, intent: &BidIntent<'_>) -> Result<()> {
        let request = intent.request;

        // 1. Allowlist
        if let Some(allowlist) = &self.allowlist {
            if !allowlist.contains(&request.owner) {
                return Err(Self::reject(intent, format!("owner {} is not allowlisted", request.owner)));
            }
        }

        // 2. Bid size
        if request.amount > self.max_bid_amount {
            return Err(Self::reject(
                intent,
                format!("amount {} exceeds maximum {}", request.amount, self.max_bid_amount),
            ));
        }

        // 3. Price cap
        if let Some(max_price) = self.max_price {
            if request.max_price > max_price {
                return Err(Self::reject(
                    intent,
                    format!("price {} exceeds maximum {max_price}", request.max_price),
                ));
            }
        }

        // 4. Per-owner bid count
        let count = self.bid_count(&request.owner);
        if count >= self.max_bids_per_owner {
            return Err(Self::reject(
                intent,
                format!("owner already has {count} bids (max {})", self.max_bids_per_owner),
            ));
        }

        Ok(())
    }

    fn on_accepted(&mut self, intent: &BidIntent<'_>, _bid_id: BidId) {
        *self.bid_counts.entry(intent.request.owner).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use cca_types::*;

    use super::*;

    fn owner(n: u8) -> OwnerId {
        OwnerId::from_bytes([n; 20])
    }

    fn request(who: u8, price: u64, amount: u128) -> BidRequest {
        BidRequest::new(BidSide::ExactIn, Price::from_integer(price), amount, owner(who))
    }

    fn check(hook: &PolicyHook, req: &BidRequest) -> Result<()> {
        hook.validate(&BidIntent { block: 1, request: req, policy_data: &[] })
    }

    #[test]
    fn unlimited_policy_accepts() {
        let hook = PolicyHook::new();
        assert!(check(&hook, &request(1, 5, u128::MAX)).is_ok());
    }

    #[test]
    fn allowlist_enforced() {
        let hook = PolicyHook::new().with_allowlist([owner(1)]);
        assert!(check(&hook, &request(1, 2, 10)).is_ok());
        let err = check(&hook, &request(2, 2, 10)).unwrap_err();
        assert!(matches!(err, AuctionError::BidRejectedByHook { .. }));
    }

    #[test]
    fn size_and_price_caps() {
        let hook = PolicyHook::new()
            .with_max_bid_amount(100)
            .with_max_price(Price::from_integer(4));
        assert!(check(&hook, &request(1, 4, 100)).is_ok());
        assert!(check(&hook, &request(1, 4, 101)).is_err());
        assert!(check(&hook, &request(1, 5, 100)).is_err());
    }

    #[test]
    fn per_owner_cap_counts_accepted_bids() {
        let mut hook = PolicyHook::new().with_max_bids_per_owner(2);
        let req = request(1, 2, 10);
        let intent = BidIntent { block: 1, request: &req, policy_data: &[] };
        for i in 0..2 {
            hook.validate(&intent).unwrap();
            hook.on_accepted(&intent, BidId(i));
        }
        assert_eq!(hook.bid_count(&owner(1)), 2);
        assert!(hook.validate(&intent).is_err());
        // Validation alone does not consume quota.
        assert!(check(&hook, &request(2, 2, 10)).is_ok());
        assert!(check(&hook, &request(2, 2, 10)).is_ok());
    }

    #[test]
    fn from_config_parses_limits() {
        let json = format!(
            r#"{{"allowlist":["{}"],"max_bid_amount":50,"max_price":"2.5"}}"#,
            owner(3)
        );
        let config: PolicyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.max_price, Some(Decimal::new(25, 1)));
        assert_eq!(config.max_bids_per_owner, None);
        let hook = PolicyHook::from_config(&config).unwrap();
        assert!(check(&hook, &request(3, 2, 50)).is_ok());
        assert!(check(&hook, &request(3, 3, 50)).is_err());
        assert!(check(&hook, &request(3, 2, 51)).is_err());
        assert!(check(&hook, &request(4, 2, 50)).is_err());
    }

    #[test]
    fn bad_allowlist_entry_rejected() {
        let config = PolicyConfig {
            allowlist: vec!["not-hex".into()],
            ..PolicyConfig::default()
        };
        assert!(PolicyHook::from_config(&config).is_err());
    }
}
