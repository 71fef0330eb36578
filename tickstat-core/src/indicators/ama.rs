//! Kaufman Adaptive Moving Average (AMA).
//!
//! ER  = |x[t] - x[t-period]| / sum(|x[i] - x[i-1]|) over the last `period` changes
//! SC  = (ER * (fastSC - slowSC) + slowSC)^2, with fastSC = 2/(fast+1), slowSC = 2/(slow+1)
//! AMA = AMA[t-1] + SC * (x[t] - AMA[t-1])
//!
//! Needs `period + 1` trailing inputs; NaN until the window is full. The first
//! value is seeded from the previous input. NaN inputs are skipped.

use crate::buffer::HistoryBuffer;
use crate::error::{Result, StatError};
use crate::execution::{BackfillPolicy, Stepper};

#[derive(Debug, Clone)]
pub struct Ama {
    period: usize,
    fast_sc: f64,
    slow_sc: f64,
    policy: BackfillPolicy,
    window: HistoryBuffer<f64>,
    prev: Option<f64>,
    name: String,
}

impl Ama {
    pub const DEFAULT_BACKFILL: usize = 4;

    pub fn new(period: usize, fast: usize, slow: usize, policy: BackfillPolicy) -> Result<Self> {
        if period == 0 || fast == 0 {
            return Err(StatError::invalid("AMA period and fast length must be >= 1"));
        }
        if slow <= fast {
            return Err(StatError::invalid(format!(
                "AMA slow length ({slow}) must exceed fast length ({fast})"
            )));
        }
        let inputs = period
            .checked_add(1)
            .ok_or_else(|| StatError::invalid(format!("AMA period {period} is too large")))?;
        Ok(Self {
            period,
            fast_sc: 2.0 / (fast as f64 + 1.0),
            slow_sc: 2.0 / (slow as f64 + 1.0),
            policy,
            window: HistoryBuffer::new(inputs)?,
            prev: None,
            name: format!("ama_{period}_{fast}_{slow}"),
        })
    }

    fn current(&self) -> f64 {
        self.prev.unwrap_or(f64::NAN)
    }
}

impl Stepper for Ama {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.window.clear();
        self.prev = None;
    }

    fn release(&mut self) {
        self.reset();
        self.window.release();
    }

    fn step(&mut self, input: f64) -> f64 {
        if input.is_nan() {
            return self.current();
        }
        self.window.push(input);
        if !self.window.is_full() {
            return f64::NAN;
        }

        let values = self.window.to_vec();
        let volatility: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        let base = self.prev.unwrap_or(values[self.period - 1]);

        // Flat window: nothing to adapt to, hold the level.
        if volatility == 0.0 {
            self.prev = Some(base);
            return base;
        }

        let change = (values[self.period] - values[0]).abs();
        let er = change / volatility;
        let sc = (er * (self.fast_sc - self.slow_sc) + self.slow_sc).powi(2);
        let ama = base + sc * (input - base);
        self.prev = Some(ama);
        ama
    }

    fn backfill_limit(&self) -> usize {
        self.policy.limit(self.window.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn ama(period: usize) -> Ama {
        Ama::new(period, 2, 30, BackfillPolicy::new(Ama::DEFAULT_BACKFILL).unwrap()).unwrap()
    }

    #[test]
    fn warmup_is_period_inputs() {
        let mut a = ama(3);
        assert!(a.step(1.0).is_nan());
        assert!(a.step(2.0).is_nan());
        assert!(a.step(3.0).is_nan());
        assert!(!a.step(4.0).is_nan());
    }

    #[test]
    fn trending_window_uses_fast_constant() {
        // Straight line: ER = 1, SC = (2/3)^2
        let mut a = ama(2);
        a.step(10.0);
        a.step(11.0);
        let sc = (2.0_f64 / 3.0).powi(2);
        let expected = 11.0 + sc * (12.0 - 11.0);
        assert_approx(a.step(12.0), expected, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_inputs_hold_constant() {
        let mut a = ama(3);
        for _ in 0..3 {
            a.step(50.0);
        }
        assert_approx(a.step(50.0), 50.0, DEFAULT_EPSILON);
        assert_approx(a.step(50.0), 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_input_carries_last_value() {
        let mut a = ama(2);
        a.step(10.0);
        a.step(11.0);
        let v = a.step(12.0);
        assert_eq!(a.step(f64::NAN), v);
    }

    #[test]
    fn rejects_bad_lengths() {
        let p = BackfillPolicy::new(1).unwrap();
        assert!(Ama::new(0, 2, 30, p).is_err());
        assert!(Ama::new(10, 5, 5, p).is_err());
    }

    #[test]
    fn backfill_limit_covers_buffer() {
        assert_eq!(ama(10).backfill_limit(), 44);
    }
}
