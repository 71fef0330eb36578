//! tickstat core: incremental bar computations and trade statistics.
//!
//! This crate contains:
//! - Domain types (securities, trades, bars, in-memory market series)
//! - Bounded history buffers and the per-instance execution context
//! - Incremental computations with bounded gap replay, plus an indicator catalog
//! - A keyed, session-scoped aggregation cache
//! - Per-bar trade histograms bucketed by tick multiples
//! - Windowed trade statistics with extremum, edge and aggregate queries

pub mod buffer;
pub mod cache;
pub mod domain;
pub mod error;
pub mod execution;
pub mod histogram;
pub mod indicators;
pub mod session;
pub mod source;
pub mod statistics;

pub use error::{Result, StatError};
pub use session::Session;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across panes is Send + Sync.
    ///
    /// The runner evaluates panes on a thread pool against one session, so a
    /// non-Sync field in any of these breaks the build here first.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Security>();
        require_sync::<domain::Security>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::MarketSeries>();
        require_sync::<domain::MarketSeries>();

        // Shared aggregation state
        require_send::<Session>();
        require_sync::<Session>();
        require_send::<cache::AggregationCache<u64>>();
        require_sync::<cache::AggregationCache<u64>>();
        require_send::<histogram::TradeHistogramAggregator>();
        require_sync::<histogram::TradeHistogramAggregator>();
        require_send::<statistics::TradeStatistics>();
        require_sync::<statistics::TradeStatistics>();
        require_send::<source::RecyclingPool>();
        require_sync::<source::RecyclingPool>();

        // Per-instance computations only need to move between threads
        require_send::<execution::IncrementalComputation>();
        require_send::<statistics::ExtremumHandler>();
        require_send::<statistics::EdgeHandler>();
        require_send::<statistics::AggregateHandler>();
        require_send::<Box<dyn execution::BarComputation>>();
    }
}
