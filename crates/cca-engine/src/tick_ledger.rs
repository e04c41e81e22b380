//! Price levels as a singly linked list over an arena.
//!
//! Ticks live in a `HashMap<Price, Tick>` and link upward through `next`
//! (`None` is the +∞ sentinel). The floor tick always exists, so every
//! initialized price is reachable by walking `next` from the floor. Ticks are
//! never removed.

use std::collections::HashMap;

use cca_types::*;
use serde::{Deserialize, Serialize};

/// One initialized price level and the demand resting at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub price: Price,
    pub next: Option<Price>,
    pub demand: Demand,
}

/// Where a price sits in the list, as verified by [`TickLedger::locate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The price is already initialized.
    Existing,
    /// The price links in directly after this tick.
    After(Price),
}

#[derive(Debug, Clone)]
pub struct TickLedger {
    ticks: HashMap<Price, Tick>,
    floor: Price,
    spacing: Price,
}

impl TickLedger {
    /// A ledger holding only the floor tick.
    #[must_use]
    pub fn new(floor: Price, spacing: Price) -> Self {
        let mut ticks = HashMap::new();
        ticks.insert(
            floor,
            Tick {
                price: floor,
                next: None,
                demand: Demand::ZERO,
            },
        );
        Self {
            ticks,
            floor,
            spacing,
        }
    }

    /// Rebuild from persisted ticks, rejecting dangling or unordered links.
    pub fn from_ticks(floor: Price, spacing: Price, ticks: Vec<Tick>) -> Result<Self> {
        let count = ticks.len();
        let map: HashMap<Price, Tick> = ticks.into_iter().map(|t| (t.price, t)).collect();
        if map.len() != count {
            return Err(AuctionError::DanglingLink { reason: "duplicate tick price".into() });
        }
        if !map.contains_key(&floor) {
            return Err(AuctionError::DanglingLink { reason: "floor tick missing".into() });
        }
        let ledger = Self {
            ticks: map,
            floor,
            spacing,
        };
        let mut visited = 0usize;
        let mut cursor = Some(floor);
        while let Some(price) = cursor {
            let tick = ledger.ticks.get(&price).ok_or_else(|| AuctionError::DanglingLink {
                reason: format!("tick link to uninitialized price {price}"),
            })?;
            if price != floor && !price.is_multiple_of(spacing) {
                return Err(AuctionError::BidPriceNotOnTick(price));
            }
            if tick.next.is_some_and(|next| next <= price) {
                return Err(AuctionError::DanglingLink {
                    reason: format!("tick {price} links downward"),
                });
            }
            visited += 1;
            cursor = tick.next;
        }
        if visited != ledger.ticks.len() {
            return Err(AuctionError::DanglingLink {
                reason: "ticks unreachable from the floor".into(),
            });
        }
        Ok(ledger)
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn floor(&self) -> Price {
        self.floor
    }

    #[must_use]
    pub fn spacing(&self) -> Price {
        self.spacing
    }

    #[must_use]
    pub fn get(&self, price: Price) -> Option<&Tick> {
        self.ticks.get(&price)
    }

    #[must_use]
    pub fn contains(&self, price: Price) -> bool {
        self.ticks.contains_key(&price)
    }

    /// Demand resting at `price`, zero when the price is not initialized.
    #[must_use]
    pub fn demand_at(&self, price: Price) -> Demand {
        self.ticks.get(&price).map_or(Demand::ZERO, |t| t.demand)
    }

    /// Next initialized price above an initialized `price`.
    #[must_use]
    pub fn next_of(&self, price: Price) -> Option<Price> {
        self.ticks.get(&price).and_then(|t| t.next)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Ticks in ascending price order.
    pub fn iter(&self) -> TickIter<'_> {
        TickIter {
            ledger: self,
            cursor: Some(self.floor),
        }
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Verify where `price` belongs without touching the ledger.
    ///
    /// A hint must be an initialized tick with `hint < price < next(hint)`.
    /// Without a hint the list is walked from the floor.
    pub fn locate(&self, price: Price, hint: Option<Price>) -> Result<Placement> {
        if !price.is_multiple_of(self.spacing) {
            return Err(AuctionError::BidPriceNotOnTick(price));
        }
        if price < self.floor {
            return Err(AuctionError::BidPriceBelowFloor {
                price,
                floor: self.floor,
            });
        }
        if self.ticks.contains_key(&price) {
            return Ok(Placement::Existing);
        }
        match hint {
            Some(hint) => {
                let tick = self
                    .ticks
                    .get(&hint)
                    .ok_or(AuctionError::TickHintNotInitialized(hint))?;
                let below_next = tick.next.is_none_or(|next| price < next);
                if hint < price && below_next {
                    Ok(Placement::After(hint))
                } else {
                    Err(AuctionError::TickHintDoesNotBracket { hint, price })
                }
            }
            None => {
                let mut prev = self.floor;
                while let Some(next) = self.next_of(prev) {
                    if next > price {
                        break;
                    }
                    prev = next;
                }
                Ok(Placement::After(prev))
            }
        }
    }

    /// Link a located price into the list. Returns true when newly inserted.
    pub fn insert(&mut self, price: Price, placement: Placement) -> Result<bool> {
        let Placement::After(prev) = placement else {
            return Ok(false);
        };
        let prev_tick = self
            .ticks
            .get_mut(&prev)
            .ok_or(AuctionError::TickHintNotInitialized(prev))?;
        let next = prev_tick.next;
        prev_tick.next = Some(price);
        self.ticks.insert(
            price,
            Tick {
                price,
                next,
                demand: Demand::ZERO,
            },
        );
        Ok(true)
    }

    /// Add demand to an initialized tick.
    pub fn add_demand(&mut self, price: Price, demand: Demand) -> Result<()> {
        let tick = self
            .ticks
            .get_mut(&price)
            .ok_or(AuctionError::CannotUpdateUninitializedTick(price))?;
        tick.demand = tick.demand.checked_add(demand)?;
        Ok(())
    }
}

/// Ascending walk along `next` links.
pub struct TickIter<'a> {
    ledger: &'a TickLedger,
    cursor: Option<Price>,
}

impl<'a> Iterator for TickIter<'a> {
    type Item = &'a Tick;

    fn next(&mut self) -> Option<Self::Item> {
        let tick = self.ledger.ticks.get(&self.cursor?)?;
        self.cursor = tick.next;
        Some(tick)
    }
}
