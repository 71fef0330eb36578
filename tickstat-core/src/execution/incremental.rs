//! Lifecycle of a stateful computation advanced one bar at a time.
//!
//! ```text
//! Uninitialized --init--> Ready(none)
//! Ready(i) --advance(i+1)--> Ready(i+1)
//! Ready(i) --advance(j > i+1)--> bounded replay --> Ready(j)
//! Ready(i) --advance(j <= i)--> error, stays Ready(i)
//! any --teardown--> Disposed          (init starts over from Ready(none))
//! ```

use tracing::debug;

use super::context::{ExecutionContext, StepPlan};
use super::BarComputation;
use crate::error::{Result, StatError};
use crate::source::{BarSource, BufferPool, MarketData};

/// One-step update of a formula.
///
/// `step` sees only the newest raw input; anything older must be kept in the
/// stepper's own rolling state.
pub trait Stepper: Send {
    fn name(&self) -> &str;

    /// Drop all rolling state (buffers, running totals).
    fn reset(&mut self);

    /// Drop rolling state and free its storage.
    fn release(&mut self) {
        self.reset();
    }

    fn step(&mut self, input: f64) -> f64;

    /// Maximum bars replayed for a gap, target included.
    fn backfill_limit(&self) -> usize;
}

impl Stepper for Box<dyn Stepper> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn step(&mut self, input: f64) -> f64 {
        (**self).step(input)
    }

    fn backfill_limit(&self) -> usize {
        (**self).backfill_limit()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationState {
    Uninitialized,
    Ready,
    Disposed,
}

impl ComputationState {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Disposed => "disposed",
        }
    }
}

/// Drives a [`Stepper`] through the bar sequence, replaying gaps.
pub struct IncrementalComputation<S: Stepper = Box<dyn Stepper>> {
    stepper: S,
    context: ExecutionContext,
    state: ComputationState,
}

impl<S: Stepper> IncrementalComputation<S> {
    pub fn new(stepper: S) -> Self {
        Self {
            stepper,
            context: ExecutionContext::new(),
            state: ComputationState::Uninitialized,
        }
    }

    pub fn name(&self) -> &str {
        self.stepper.name()
    }

    pub fn state(&self) -> ComputationState {
        self.state
    }

    pub fn last_index(&self) -> Option<usize> {
        self.context.last_index()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Start (or restart) serving a session from an empty state.
    pub fn init(&mut self) {
        self.stepper.reset();
        self.context.reset();
        self.state = ComputationState::Ready;
    }

    /// Release retained buffers. Only `init` leaves this state.
    pub fn teardown(&mut self) {
        self.stepper.release();
        self.context.reset();
        self.state = ComputationState::Disposed;
    }

    /// Compute the value at `target`, replaying any skipped bars first.
    pub fn advance<B: BarSource + ?Sized>(&mut self, target: usize, source: &B) -> Result<f64> {
        if self.state != ComputationState::Ready {
            return Err(StatError::InvalidState {
                operation: "advance",
                state: self.state.label(),
            });
        }
        let count = source.count();
        if target >= count {
            return Err(StatError::OutOfRange {
                what: "bar",
                index: target,
                len: count,
            });
        }

        let plan = self
            .context
            .plan(target, self.stepper.backfill_limit())?;
        self.context.begin(target);

        if let StepPlan::Backfill { from, skipped } = plan {
            debug!(
                computation = self.stepper.name(),
                from,
                target,
                skipped,
                "backfilling gap"
            );
            for index in from..target {
                self.stepper.step(source.value(index));
            }
        }

        let value = self.stepper.step(source.value(target));
        self.context.commit();
        Ok(value)
    }

    /// Evaluate every bar of `source` from a fresh start into a pooled buffer.
    pub fn compute_series<B: BarSource + ?Sized>(
        &mut self,
        source: &B,
        pool: &dyn BufferPool,
    ) -> Result<Vec<f64>> {
        self.init();
        let mut out = pool.allocate(source.count());
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = self.advance(index, source)?;
        }
        Ok(out)
    }
}

impl<S: Stepper> BarComputation for IncrementalComputation<S> {
    fn name(&self) -> &str {
        self.stepper.name()
    }

    fn init(&mut self) {
        IncrementalComputation::init(self)
    }

    fn teardown(&mut self) {
        IncrementalComputation::teardown(self)
    }

    fn evaluate(&mut self, source: &dyn MarketData, index: usize) -> Result<f64> {
        self.advance(index, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;
    use crate::source::HeapPool;

    /// Sums every input it is fed and records the inputs.
    struct Recorder {
        limit: usize,
        seen: Vec<f64>,
        total: f64,
        released: bool,
    }

    impl Recorder {
        fn new(limit: usize) -> Self {
            Self {
                limit,
                seen: Vec::new(),
                total: 0.0,
                released: false,
            }
        }
    }

    impl Stepper for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn reset(&mut self) {
            self.seen.clear();
            self.total = 0.0;
        }

        fn release(&mut self) {
            self.reset();
            self.released = true;
        }

        fn step(&mut self, input: f64) -> f64 {
            self.seen.push(input);
            self.total += input;
            self.total
        }

        fn backfill_limit(&self) -> usize {
            self.limit
        }
    }

    fn closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn advance_before_init_fails() {
        let bars = make_bars(&closes(3));
        let mut comp = IncrementalComputation::new(Recorder::new(10));
        assert!(matches!(
            comp.advance(0, &bars),
            Err(StatError::InvalidState { state: "uninitialized", .. })
        ));
    }

    #[test]
    fn sequential_steps_use_fast_path() {
        let bars = make_bars(&closes(4));
        let mut comp = IncrementalComputation::new(Recorder::new(10));
        comp.init();
        for i in 0..4 {
            comp.advance(i, &bars).unwrap();
        }
        assert_eq!(comp.stepper.seen, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(comp.last_index(), Some(3));
        assert_eq!(comp.context().current_index(), Some(3));
    }

    #[test]
    fn truncated_gap_replays_only_the_window() {
        let bars = make_bars(&closes(12));
        let mut comp = IncrementalComputation::new(Recorder::new(2));
        comp.init();
        for i in 0..=5 {
            comp.advance(i, &bars).unwrap();
        }
        comp.stepper.seen.clear();

        comp.advance(9, &bars).unwrap();
        // bars 6 and 7 are skipped: the result is an approximation on purpose
        assert_eq!(comp.stepper.seen, vec![8.0, 9.0]);
        assert_eq!(comp.last_index(), Some(9));
    }

    #[test]
    fn gap_within_limit_matches_sequential() {
        let bars = make_bars(&closes(8));

        let mut seq = IncrementalComputation::new(Recorder::new(10));
        seq.init();
        let mut expected = 0.0;
        for i in 0..=6 {
            expected = seq.advance(i, &bars).unwrap();
        }

        let mut jump = IncrementalComputation::new(Recorder::new(10));
        jump.init();
        assert_eq!(jump.advance(6, &bars).unwrap(), expected);
    }

    #[test]
    fn rewind_is_rejected_and_state_kept() {
        let bars = make_bars(&closes(5));
        let mut comp = IncrementalComputation::new(Recorder::new(10));
        comp.init();
        comp.advance(0, &bars).unwrap();
        comp.advance(1, &bars).unwrap();
        assert!(matches!(
            comp.advance(1, &bars),
            Err(StatError::OutOfRange { .. })
        ));
        assert_eq!(comp.last_index(), Some(1));
        assert_eq!(comp.context().current_index(), Some(1));
        assert_eq!(comp.advance(2, &bars).unwrap(), 3.0);
    }

    #[test]
    fn target_past_source_is_out_of_range() {
        let bars = make_bars(&closes(3));
        let mut comp = IncrementalComputation::new(Recorder::new(10));
        comp.init();
        assert!(matches!(
            comp.advance(3, &bars),
            Err(StatError::OutOfRange { what: "bar", .. })
        ));
        assert_eq!(comp.last_index(), None);
    }

    #[test]
    fn teardown_is_terminal_until_init() {
        let bars = make_bars(&closes(3));
        let mut comp = IncrementalComputation::new(Recorder::new(10));
        comp.init();
        comp.advance(0, &bars).unwrap();
        comp.teardown();
        assert_eq!(comp.state(), ComputationState::Disposed);
        assert!(comp.stepper.released);
        assert!(comp.advance(1, &bars).is_err());

        comp.init();
        assert_eq!(comp.state(), ComputationState::Ready);
        assert_eq!(comp.last_index(), None);
        assert_eq!(comp.advance(0, &bars).unwrap(), 0.0);
    }

    #[test]
    fn repeated_sessions_are_identical() {
        let bars = make_bars(&closes(6));
        let mut comp = IncrementalComputation::new(Recorder::new(10));
        let first = comp.compute_series(&bars, &HeapPool).unwrap();
        comp.teardown();
        let second = comp.compute_series(&bars, &HeapPool).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[5], 15.0);
    }
}
