//! System-wide constants for the clearing auction.

use primitive_types::U256;

/// Rate units that make up the whole supply ("milli-bips"): 1e7 == 100%.
pub const MPS: u32 = 10_000_000;

/// Fractional bits of Q96 fixed-point prices.
pub const RESOLUTION: u32 = 96;

/// Largest total supply the arithmetic is sized for.
pub const MAX_TOTAL_SUPPLY: u128 = 1 << 100;

/// Smallest floor price, in raw Q96 units.
pub const MIN_FLOOR_PRICE_RAW: u64 = 1 << 32;

/// Smallest tick spacing, in raw Q96 units.
pub const MIN_TICK_SPACING_RAW: u64 = 2;

/// Bits of the raw Q96 ceiling price (roughly 2^64 currency per token).
pub const MAX_BID_PRICE_BITS: usize = 160;

/// Decimal places used when rendering prices for humans.
pub const PRICE_DISPLAY_SCALE: u32 = 8;

/// Bytes per packed schedule step: `u24` mps followed by a `u40` block delta.
pub const PACKED_STEP_LEN: usize = 8;

/// `2^96`, the Q96 unit.
#[must_use]
pub fn q96() -> U256 {
    U256::one() << RESOLUTION
}

/// `MPS` widened.
#[must_use]
pub fn mps() -> U256 {
    U256::from(MPS)
}

/// `MPS²`, the double-scaled unit.
#[must_use]
pub fn mps_squared() -> U256 {
    mps() * mps()
}

/// Largest accepted raw bid price.
#[must_use]
pub fn max_bid_price_ceiling() -> U256 {
    U256::one() << MAX_BID_PRICE_BITS
}
