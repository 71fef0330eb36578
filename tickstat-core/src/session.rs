//! Session context: the shared aggregations of one evaluation session.
//!
//! Everything that must be shared between computations lives here and is
//! handed out by key. Nothing is process-global; two sessions never see
//! each other's aggregations.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::cache::AggregationCache;
use crate::domain::Security;
use crate::error::Result;
use crate::histogram::TradeHistogramAggregator;
use crate::statistics::{TradeStatistics, WindowSpec};

pub type SharedHistograms = Arc<RwLock<TradeHistogramAggregator>>;

#[derive(Default)]
pub struct Session {
    histograms: AggregationCache<RwLock<TradeHistogramAggregator>>,
    statistics: AggregationCache<TradeStatistics>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The aggregator for `(security, bucket_width)`, created on first request.
    pub fn histograms(&self, security: &Security, bucket_width: u32) -> Result<SharedHistograms> {
        let key = TradeHistogramAggregator::key(&security.id, bucket_width);
        self.histograms.get_or_compute(&key, || {
            TradeHistogramAggregator::new(security, bucket_width).map(RwLock::new)
        })
    }

    /// The statistics for `(security, bucket_width, window)`, created on first request.
    pub fn trade_statistics(
        &self,
        security: &Security,
        bucket_width: u32,
        window: &WindowSpec,
    ) -> Result<Arc<TradeStatistics>> {
        window.validate()?;
        let key = TradeStatistics::key(&security.id, bucket_width, window);
        self.statistics.get_or_compute(&key, || {
            let histograms = self.histograms(security, bucket_width)?;
            TradeStatistics::new(security, histograms, window.clone())
        })
    }

    /// Histogram aggregator factory invocations so far.
    pub fn histograms_built(&self) -> usize {
        self.histograms.builds()
    }

    /// Trade statistics factory invocations so far.
    pub fn statistics_built(&self) -> usize {
        self.statistics.builds()
    }

    pub fn cached_histograms(&self) -> usize {
        self.histograms.len()
    }

    pub fn cached_statistics(&self) -> usize {
        self.statistics.len()
    }

    /// Drop every shared aggregation.
    pub fn end(&self) {
        info!(
            histograms = self.histograms.len(),
            statistics = self.statistics.len(),
            "ending session"
        );
        self.statistics.clear();
        self.histograms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::{TimeFrameKind, TimeFrameUnit};

    fn es() -> Security {
        Security::new("ES", 0.25).unwrap()
    }

    #[test]
    fn same_parameters_share_one_aggregator() {
        let session = Session::new();
        let a = session.histograms(&es(), 4).unwrap();
        let b = session.histograms(&es(), 4).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = session.histograms(&es(), 2).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(session.histograms_built(), 2);
    }

    #[test]
    fn statistics_with_different_windows_share_histograms() {
        let session = Session::new();
        let all = session
            .trade_statistics(&es(), 4, &WindowSpec::AllTime)
            .unwrap();
        let hour = session
            .trade_statistics(
                &es(),
                4,
                &WindowSpec::TimeFrame {
                    unit: TimeFrameUnit::Hour,
                    count: 1,
                    kind: TimeFrameKind::RollingSpan,
                    shift_seconds: 0,
                },
            )
            .unwrap();
        let again = session
            .trade_statistics(&es(), 4, &WindowSpec::AllTime)
            .unwrap();
        assert!(Arc::ptr_eq(&all, &again));
        assert!(Arc::ptr_eq(all.histograms(), hour.histograms()));
        assert_eq!(session.statistics_built(), 2);
        assert_eq!(session.histograms_built(), 1);
    }

    #[test]
    fn invalid_inputs_are_not_cached() {
        let session = Session::new();
        assert!(session.histograms(&es(), 0).is_err());
        assert_eq!(session.cached_histograms(), 0);
        assert!(session
            .trade_statistics(&es(), 4, &WindowSpec::LastContracts { contracts: -1.0 })
            .is_err());
        assert_eq!(session.cached_statistics(), 0);
    }

    #[test]
    fn end_clears_everything() {
        let session = Session::new();
        let held = session
            .trade_statistics(&es(), 4, &WindowSpec::AllTime)
            .unwrap();
        session.end();
        assert_eq!(session.cached_histograms(), 0);
        assert_eq!(session.cached_statistics(), 0);

        let fresh = session
            .trade_statistics(&es(), 4, &WindowSpec::AllTime)
            .unwrap();
        assert!(!Arc::ptr_eq(&held, &fresh));
    }
}
