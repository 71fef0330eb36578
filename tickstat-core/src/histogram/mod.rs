//! Price-bucketed trade histograms.
//!
//! One [`TradeHistogramAggregator`] exists per (security, bucket width) in a
//! session. It reads each bar's trades exactly once and keeps the resulting
//! [`HistogramBar`]s for the rest of the session.

pub mod aggregator;
pub mod bar;

pub use aggregator::TradeHistogramAggregator;
pub use bar::{merge_levels, HistogramBar};
