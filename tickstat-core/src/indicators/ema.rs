//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1]
//! Seed: EMA at the `period`-th input = mean of the first `period` inputs.
//! A NaN input taints every later value until the next reset.

use crate::error::{Result, StatError};
use crate::execution::{BackfillPolicy, Stepper};

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    policy: BackfillPolicy,
    seen: usize,
    seed_sum: f64,
    prev: Option<f64>,
    tainted: bool,
    name: String,
}

impl Ema {
    /// Influence of inputs older than four periods is below 2%.
    pub const DEFAULT_BACKFILL: usize = 4;

    pub fn new(period: usize, policy: BackfillPolicy) -> Result<Self> {
        if period == 0 {
            return Err(StatError::invalid("EMA period must be >= 1"));
        }
        Ok(Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            policy,
            seen: 0,
            seed_sum: 0.0,
            prev: None,
            tainted: false,
            name: format!("ema_{period}"),
        })
    }
}

impl Stepper for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.seed_sum = 0.0;
        self.prev = None;
        self.tainted = false;
    }

    fn step(&mut self, input: f64) -> f64 {
        if self.tainted || input.is_nan() {
            self.tainted = true;
            return f64::NAN;
        }
        match self.prev {
            Some(prev) => {
                let ema = self.alpha * input + (1.0 - self.alpha) * prev;
                self.prev = Some(ema);
                ema
            }
            None => {
                self.seen += 1;
                self.seed_sum += input;
                if self.seen < self.period {
                    return f64::NAN;
                }
                let seed = self.seed_sum / self.period as f64;
                self.prev = Some(seed);
                seed
            }
        }
    }

    fn backfill_limit(&self) -> usize {
        self.policy.limit(self.period)
    }
}
