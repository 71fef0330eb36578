//! Simple Moving Average (SMA).
//!
//! Rolling mean over the last `period` inputs, kept as a running sum over a
//! history buffer. NaN until the window is full, and while any NaN is inside it.

use crate::buffer::HistoryBuffer;
use crate::error::{Result, StatError};
use crate::execution::{BackfillPolicy, Stepper};

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    policy: BackfillPolicy,
    window: HistoryBuffer<f64>,
    sum: f64,
    nan_count: usize,
    name: String,
}

impl Sma {
    /// One full window replays the exact value.
    pub const DEFAULT_BACKFILL: usize = 1;

    pub fn new(period: usize, policy: BackfillPolicy) -> Result<Self> {
        if period == 0 {
            return Err(StatError::invalid("SMA period must be >= 1"));
        }
        Ok(Self {
            period,
            policy,
            window: HistoryBuffer::new(period)?,
            sum: 0.0,
            nan_count: 0,
            name: format!("sma_{period}"),
        })
    }
}

impl Stepper for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.nan_count = 0;
    }

    fn release(&mut self) {
        self.reset();
        self.window.release();
    }

    fn step(&mut self, input: f64) -> f64 {
        if let Some(leaving) = self.window.push(input) {
            if leaving.is_nan() {
                self.nan_count -= 1;
            } else {
                self.sum -= leaving;
            }
        }
        if input.is_nan() {
            self.nan_count += 1;
        } else {
            self.sum += input;
        }

        if !self.window.is_full() || self.nan_count > 0 {
            return f64::NAN;
        }
        self.sum / self.period as f64
    }

    fn backfill_limit(&self) -> usize {
        self.policy.limit(self.period)
    }
}
