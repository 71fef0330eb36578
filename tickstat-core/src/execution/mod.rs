//! Bar-by-bar execution: the per-instance context, the replay plan for gaps,
//! and the computation lifecycle built on top of them.

pub mod context;
pub mod incremental;

pub use context::{BackfillPolicy, ExecutionContext, StepPlan};
pub use incremental::{ComputationState, IncrementalComputation, Stepper};

use crate::error::Result;
use crate::source::MarketData;

/// Anything the host can ask for one value per bar.
///
/// Scalar indicators and trade-statistics consumers both implement this, so
/// a host can keep a heterogeneous list of `Box<dyn BarComputation>`.
pub trait BarComputation: Send {
    fn name(&self) -> &str;

    /// Prepare for a new session.
    fn init(&mut self) {}

    /// Release per-instance state at the end of a session.
    fn teardown(&mut self) {}

    fn evaluate(&mut self, source: &dyn MarketData, index: usize) -> Result<f64>;
}
