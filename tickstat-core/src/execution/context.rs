//! Per-computation position tracking and gap planning.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatError};

/// How far back a gap replay may reach, as a multiple of the formula period.
///
/// A gap of any size costs at most `factor * period` steps. For recursive
/// formulas a truncated replay is an approximation of the full history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillPolicy {
    pub factor: usize,
}

impl BackfillPolicy {
    pub fn new(factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(StatError::invalid("backfill factor must be >= 1"));
        }
        Ok(Self { factor })
    }

    /// Maximum number of bars replayed for one request, target included.
    pub fn limit(&self, period: usize) -> usize {
        self.factor.saturating_mul(period).max(1)
    }
}

/// What `advance` has to do to reach a target index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPlan {
    /// Target is exactly one past the last processed index.
    Sequential,
    /// Replay `from..target` before stepping the target. `skipped` bars
    /// between the last processed index and `from` are never replayed.
    Backfill { from: usize, skipped: usize },
}

/// Tracks the last fully processed bar of one computation instance.
///
/// Between public calls `last_index == current_index` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    last_index: Option<usize>,
    current_index: Option<usize>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Index the next sequential step would process.
    pub fn next_index(&self) -> usize {
        self.last_index.map_or(0, |i| i + 1)
    }

    pub fn reset(&mut self) {
        self.last_index = None;
        self.current_index = None;
    }

    /// Decide how to reach `target` when at most `limit` bars may be stepped.
    pub fn plan(&self, target: usize, limit: usize) -> Result<StepPlan> {
        let next = self.next_index();
        if target < next {
            return Err(StatError::OutOfRange {
                what: "rewind to bar",
                index: target,
                len: next,
            });
        }
        if target == next {
            return Ok(StepPlan::Sequential);
        }
        let from = next.max((target + 1).saturating_sub(limit.max(1)));
        Ok(StepPlan::Backfill {
            from,
            skipped: from - next,
        })
    }

    pub(crate) fn begin(&mut self, target: usize) {
        self.current_index = Some(target);
    }

    pub(crate) fn commit(&mut self) {
        self.last_index = self.current_index;
    }
}
