//! Supply release schedule.
//!
//! The schedule is an ordered list of steps, each releasing a constant rate
//! per block. Queries are expressed as the cumulative rate released by a
//! block; the step containing a block is found by binary search.

use cca_types::constants::MPS;
use cca_types::{AuctionError, AuctionStep, Result, validate_steps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledStep {
    mps: u32,
    start_block: u64,
    end_block: u64,
    /// Rate released by all earlier steps.
    cumulative_before: u32,
}

/// The validated schedule of an auction.
#[derive(Debug, Clone)]
pub struct ReleaseSchedule {
    steps: Vec<ScheduledStep>,
    start_block: u64,
    end_block: u64,
}

impl ReleaseSchedule {
    pub fn new(start_block: u64, steps: &[AuctionStep]) -> Result<Self> {
        validate_steps(steps)?;
        let mut scheduled = Vec::with_capacity(steps.len());
        let mut block = start_block;
        let mut cumulative: u32 = 0;
        for step in steps {
            let end_block = block.checked_add(step.duration).ok_or_else(|| {
                AuctionError::InvalidSchedule { reason: "end block overflows".into() }
            })?;
            scheduled.push(ScheduledStep {
                mps: step.mps,
                start_block: block,
                end_block,
                cumulative_before: cumulative,
            });
            // Bounded by MPS once the steps validated.
            #[allow(clippy::cast_possible_truncation)]
            let released = step.total_mps() as u32;
            cumulative += released;
            block = end_block;
        }
        Ok(Self {
            steps: scheduled,
            start_block,
            end_block: block,
        })
    }

    #[must_use]
    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    #[must_use]
    pub fn end_block(&self) -> u64 {
        self.end_block
    }

    /// The step active at `block`, if the auction is running.
    #[must_use]
    pub fn step_at(&self, block: u64) -> Option<AuctionStep> {
        if block < self.start_block || block >= self.end_block {
            return None;
        }
        let step = self.steps[self.locate(block)];
        Some(AuctionStep::new(step.mps, step.end_block - step.start_block))
    }

    /// Rate released from the start up to (not including) `block`.
    #[must_use]
    pub fn cumulative_mps_at(&self, block: u64) -> u32 {
        if block <= self.start_block {
            return 0;
        }
        if block >= self.end_block {
            return MPS;
        }
        let step = self.steps[self.locate(block)];
        // mps * elapsed never exceeds the step's own share of MPS.
        #[allow(clippy::cast_possible_truncation)]
        let within = (u64::from(step.mps) * (block - step.start_block)) as u32;
        step.cumulative_before + within
    }

    /// Rate released over `[from, to)`.
    #[must_use]
    pub fn mps_between(&self, from: u64, to: u64) -> u32 {
        if to <= from {
            return 0;
        }
        self.cumulative_mps_at(to) - self.cumulative_mps_at(from)
    }

    /// Index of the step containing `block` (`start <= block < end`).
    fn locate(&self, block: u64) -> usize {
        self.steps
            .partition_point(|s| s.end_block <= block)
            .min(self.steps.len() - 1)
    }
}
