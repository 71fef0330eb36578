//! Scalar indicators that run on the incremental engine.
//!
//! Each indicator is a [`Stepper`]: it keeps its own rolling state and is fed
//! one raw input per bar. [`IndicatorKind`] is the serializable dispatch
//! table the host uses to build them; the engine does not care which formula
//! runs inside `advance`.

pub mod ama;
pub mod ema;
pub mod sma;

pub use ama::Ama;
pub use ema::Ema;
pub use sma::Sma;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::execution::{BackfillPolicy, IncrementalComputation, Stepper};

fn default_fast() -> usize {
    2
}

fn default_slow() -> usize {
    30
}

/// Indicator selection with its parameters.
///
/// `backfill` overrides the per-indicator backfill factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma {
        period: usize,
        #[serde(default)]
        backfill: Option<usize>,
    },
    Ema {
        period: usize,
        #[serde(default)]
        backfill: Option<usize>,
    },
    Ama {
        period: usize,
        #[serde(default = "default_fast")]
        fast: usize,
        #[serde(default = "default_slow")]
        slow: usize,
        #[serde(default)]
        backfill: Option<usize>,
    },
}

impl IndicatorKind {
    pub fn build(&self) -> Result<Box<dyn Stepper>> {
        Ok(match *self {
            Self::Sma { period, backfill } => {
                Box::new(Sma::new(period, policy(backfill, Sma::DEFAULT_BACKFILL)?)?)
            }
            Self::Ema { period, backfill } => {
                Box::new(Ema::new(period, policy(backfill, Ema::DEFAULT_BACKFILL)?)?)
            }
            Self::Ama {
                period,
                fast,
                slow,
                backfill,
            } => Box::new(Ama::new(
                period,
                fast,
                slow,
                policy(backfill, Ama::DEFAULT_BACKFILL)?,
            )?),
        })
    }

    /// Build and wrap in a fresh, uninitialized computation.
    pub fn computation(&self) -> Result<IncrementalComputation> {
        Ok(IncrementalComputation::new(self.build()?))
    }
}

fn policy(factor: Option<usize>, default: usize) -> Result<BackfillPolicy> {
    BackfillPolicy::new(factor.unwrap_or(default))
}

/// Create synthetic bars from close prices for testing.
///
/// One bar per minute from 2024-01-02 09:30, flat at the close.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar::flat(start + chrono::TimeDelta::minutes(i as i64), close))
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
