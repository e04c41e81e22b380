//! Release schedule steps and their packed wire form.

use serde::{Deserialize, Serialize};

use crate::constants::{MPS, PACKED_STEP_LEN};
use crate::error::{AuctionError, Result};

const MAX_PACKED_MPS: u32 = (1 << 24) - 1;
const MAX_PACKED_DURATION: u64 = (1 << 40) - 1;

/// A run of blocks releasing supply at a constant rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuctionStep {
    /// Rate released per block, in MPS units.
    pub mps: u32,
    /// Number of blocks the step lasts.
    pub duration: u64,
}

impl AuctionStep {
    #[must_use]
    pub fn new(mps: u32, duration: u64) -> Self {
        Self { mps, duration }
    }

    /// Total rate this step releases.
    #[must_use]
    pub fn total_mps(&self) -> u128 {
        u128::from(self.mps) * u128::from(self.duration)
    }
}

/// Check that `steps` is non-empty, has no zero-length step and releases
/// exactly [`MPS`] in total.
pub fn validate_steps(steps: &[AuctionStep]) -> Result<()> {
    if steps.is_empty() {
        return Err(AuctionError::InvalidSchedule { reason: "no steps".into() });
    }
    let mut total: u128 = 0;
    for (i, step) in steps.iter().enumerate() {
        if step.duration == 0 {
            return Err(AuctionError::InvalidSchedule {
                reason: format!("step {i} has zero duration"),
            });
        }
        if step.mps > MPS {
            return Err(AuctionError::InvalidSchedule {
                reason: format!("step {i} rate {} exceeds {MPS}", step.mps),
            });
        }
        total = total.saturating_add(step.total_mps());
    }
    if total != u128::from(MPS) {
        return Err(AuctionError::InvalidSchedule {
            reason: format!("steps release {total} mps, expected {MPS}"),
        });
    }
    Ok(())
}

/// Pack steps as big-endian `u24 mps || u40 duration` records.
pub fn encode_steps(steps: &[AuctionStep]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(steps.len() * PACKED_STEP_LEN);
    for (i, step) in steps.iter().enumerate() {
        if step.mps > MAX_PACKED_MPS || step.duration > MAX_PACKED_DURATION {
            return Err(AuctionError::InvalidSchedule {
                reason: format!("step {i} does not fit the packed layout"),
            });
        }
        let word = (u64::from(step.mps) << 40) | step.duration;
        out.extend_from_slice(&word.to_be_bytes());
    }
    Ok(out)
}

/// Inverse of [`encode_steps`].
pub fn decode_steps(bytes: &[u8]) -> Result<Vec<AuctionStep>> {
    if bytes.is_empty() || bytes.len() % PACKED_STEP_LEN != 0 {
        return Err(AuctionError::InvalidSchedule {
            reason: format!("packed length {} is not a multiple of {PACKED_STEP_LEN}", bytes.len()),
        });
    }
    bytes
        .chunks_exact(PACKED_STEP_LEN)
        .enumerate()
        .map(|(i, chunk)| {
            let mut word = [0u8; PACKED_STEP_LEN];
            word.copy_from_slice(chunk);
            let word = u64::from_be_bytes(word);
            let duration = word & MAX_PACKED_DURATION;
            if duration == 0 {
                return Err(AuctionError::InvalidSchedule {
                    reason: format!("step {i} has zero duration"),
                });
            }
            #[allow(clippy::cast_possible_truncation)]
            let mps = (word >> 40) as u32;
            Ok(AuctionStep { mps, duration })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_steps_roundtrip() {
        let steps = vec![AuctionStep::new(0, 100), AuctionStep::new(100_000, 50), AuctionStep::new(50_000, 100)];
        let bytes = encode_steps(&steps).unwrap();
        assert_eq!(bytes.len(), 3 * PACKED_STEP_LEN);
        assert_eq!(decode_steps(&bytes).unwrap(), steps);
    }

    #[test]
    fn packed_rejects_bad_lengths_and_zero_durations() {
        assert!(decode_steps(&[]).is_err());
        assert!(decode_steps(&[0u8; 7]).is_err());
        let zero = (5u64 << 40).to_be_bytes();
        assert!(decode_steps(&zero).is_err());
    }

    #[test]
    fn steps_must_release_exactly_mps() {
        assert!(validate_steps(&[AuctionStep::new(MPS, 1)]).is_ok());
        assert!(validate_steps(&[AuctionStep::new(MPS / 2, 2)]).is_ok());
        assert!(validate_steps(&[]).is_err());
        assert!(validate_steps(&[AuctionStep::new(MPS, 0)]).is_err());
        assert!(validate_steps(&[AuctionStep::new(MPS - 1, 1)]).is_err());
        assert!(validate_steps(&[AuctionStep::new(MPS, 2)]).is_err());
    }

    #[test]
    fn oversized_step_cannot_pack() {
        assert!(encode_steps(&[AuctionStep::new(1 << 24, 1)]).is_err());
    }
}
