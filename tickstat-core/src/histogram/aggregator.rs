//! Incremental per-bar bucketing of the trade tape.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::bar::HistogramBar;
use crate::cache::StateKey;
use crate::domain::Security;
use crate::error::{Result, StatError};
use crate::source::MarketData;

/// Keeps `floor(price / bucket_size)` stable for prices sitting on a boundary.
const BUCKET_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct TradeHistogramAggregator {
    security_id: String,
    bucket_width: u32,
    bucket_size: f64,
    /// Histogram of bar `i` lives at `bars[i]`, ascending by bucket.
    bars: Vec<Vec<HistogramBar>>,
    quantities: Vec<f64>,
}

impl TradeHistogramAggregator {
    pub fn new(security: &Security, bucket_width: u32) -> Result<Self> {
        if bucket_width == 0 {
            return Err(StatError::invalid("bucket width must be >= 1 tick"));
        }
        Ok(Self {
            security_id: security.id.clone(),
            bucket_width,
            bucket_size: security.bucket_size(bucket_width),
            bars: Vec::new(),
            quantities: Vec::new(),
        })
    }

    /// Cache key shared by every consumer of this security and bucket width.
    pub fn key(security_id: &str, bucket_width: u32) -> StateKey {
        StateKey::new("histograms")
            .with(security_id)
            .with(bucket_width)
    }

    pub fn security_id(&self) -> &str {
        &self.security_id
    }

    pub fn bucket_width(&self) -> u32 {
        self.bucket_width
    }

    pub fn bucket_size(&self) -> f64 {
        self.bucket_size
    }

    /// Number of bars aggregated so far.
    pub fn aggregated_len(&self) -> usize {
        self.bars.len()
    }

    pub fn aggregated_through(&self) -> Option<usize> {
        self.bars.len().checked_sub(1)
    }

    pub fn bucket_of(&self, price: f64) -> i64 {
        (price / self.bucket_size + BUCKET_EPSILON).floor() as i64
    }

    /// Aggregate every bar not yet seen up to and including `through`.
    ///
    /// Bars already aggregated are never read again.
    pub fn ensure_aggregated(&mut self, source: &dyn MarketData, through: usize) -> Result<()> {
        if source.security_id() != self.security_id {
            return Err(StatError::invalid(format!(
                "histograms for {} fed with trades of {}",
                self.security_id,
                source.security_id()
            )));
        }
        let count = source.count();
        if through >= count {
            return Err(StatError::OutOfRange {
                what: "bar",
                index: through,
                len: count,
            });
        }
        if through < self.bars.len() {
            return Ok(());
        }

        let from = self.bars.len();
        for index in from..=through {
            let histogram = self.bucketize(index, source);
            self.quantities
                .push(histogram.iter().map(|b| b.quantity).sum());
            self.bars.push(histogram);
        }
        debug!(
            security = %self.security_id,
            bucket_width = self.bucket_width,
            from,
            through,
            "aggregated trade histograms"
        );
        Ok(())
    }

    fn bucketize(&self, index: usize, source: &dyn MarketData) -> Vec<HistogramBar> {
        let mut buckets: BTreeMap<i64, HistogramBar> = BTreeMap::new();
        for trade in source.trades_for_bar(index) {
            if !trade.is_valid() {
                warn!(
                    security = %self.security_id,
                    bar = index,
                    price = trade.price,
                    quantity = trade.quantity,
                    "skipping malformed trade"
                );
                continue;
            }
            let bucket = self.bucket_of(trade.price);
            buckets
                .entry(bucket)
                .and_modify(|b| b.add(trade))
                .or_insert_with(|| HistogramBar::from_trade(index, bucket, trade));
        }
        buckets
            .into_values()
            .filter(|b| b.quantity > 0.0)
            .collect()
    }

    /// Histogram of one aggregated bar, ascending by price.
    pub fn histogram(&self, bar_index: usize) -> Result<&[HistogramBar]> {
        self.bars
            .get(bar_index)
            .map(Vec::as_slice)
            .ok_or(StatError::OutOfRange {
                what: "aggregated bar",
                index: bar_index,
                len: self.bars.len(),
            })
    }

    /// Total traded quantity of one aggregated bar.
    pub fn bar_quantity(&self, bar_index: usize) -> Result<f64> {
        self.quantities
            .get(bar_index)
            .copied()
            .ok_or(StatError::OutOfRange {
                what: "aggregated bar",
                index: bar_index,
                len: self.quantities.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, MarketSeries, Trade, TradeDirection};
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn series(groups: Vec<Vec<(f64, f64, TradeDirection)>>) -> MarketSeries {
        let security = Security::new("ES", 0.25).unwrap();
        let bars = (0..groups.len())
            .map(|i| Bar::flat(start() + TimeDelta::minutes(i as i64), 100.0))
            .collect();
        let trades = groups
            .into_iter()
            .enumerate()
            .map(|(i, g)| {
                g.into_iter()
                    .map(|(price, quantity, direction)| Trade {
                        timestamp: start() + TimeDelta::minutes(i as i64),
                        price,
                        quantity,
                        direction,
                        bar_index: i,
                    })
                    .collect()
            })
            .collect();
        MarketSeries::new(security, bars, trades).unwrap()
    }

    fn aggregator(width: u32) -> TradeHistogramAggregator {
        TradeHistogramAggregator::new(&Security::new("ES", 0.25).unwrap(), width).unwrap()
    }

    #[test]
    fn zero_bucket_width_rejected() {
        let sec = Security::new("ES", 0.25).unwrap();
        assert!(TradeHistogramAggregator::new(&sec, 0).is_err());
    }

    #[test]
    fn buckets_by_tick_multiple() {
        use TradeDirection::*;
        let data = series(vec![vec![
            (100.00, 1.0, Buy),
            (100.25, 2.0, Sell),
            (100.75, 3.0, Buy),
            (101.00, 4.0, Buy),
        ]]);
        let mut agg = aggregator(4); // 1.0 price per bucket
        agg.ensure_aggregated(&data, 0).unwrap();
        let hist = agg.histogram(0).unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[0].bucket, 100);
        assert_eq!(hist[0].trade_count, 3);
        assert_eq!(hist[0].quantity, 6.0);
        assert_eq!(hist[0].min_price, 100.0);
        assert_eq!(hist[0].max_price, 100.75);
        assert_eq!(hist[1].bucket, 101);
        assert_eq!(agg.bar_quantity(0).unwrap(), 10.0);
    }

    #[test]
    fn boundary_prices_land_in_their_own_bucket() {
        let security = Security::new("X", 0.1).unwrap();
        let agg = TradeHistogramAggregator::new(&security, 1).unwrap();
        assert_eq!(agg.bucket_of(100.1), 1001);
        assert_eq!(agg.bucket_of(0.3), 3);
    }

    #[test]
    fn aggregation_is_monotonic() {
        use TradeDirection::*;
        let data = series(vec![
            vec![(100.0, 1.0, Buy)],
            vec![(100.0, 2.0, Sell)],
            vec![(100.0, 3.0, Buy)],
        ]);
        let mut agg = aggregator(1);
        agg.ensure_aggregated(&data, 1).unwrap();
        assert_eq!(agg.aggregated_through(), Some(1));
        assert!(agg.histogram(2).is_err());

        agg.ensure_aggregated(&data, 0).unwrap();
        assert_eq!(agg.aggregated_len(), 2);

        agg.ensure_aggregated(&data, 2).unwrap();
        assert_eq!(agg.histogram(2).unwrap()[0].quantity, 3.0);
    }

    #[test]
    fn empty_bar_has_empty_histogram() {
        let data = series(vec![vec![]]);
        let mut agg = aggregator(1);
        agg.ensure_aggregated(&data, 0).unwrap();
        assert!(agg.histogram(0).unwrap().is_empty());
        assert_eq!(agg.bar_quantity(0).unwrap(), 0.0);
    }

    #[test]
    fn malformed_trades_are_skipped() {
        use TradeDirection::*;
        let data = series(vec![vec![(100.0, 0.0, Buy), (f64::NAN, 1.0, Buy), (100.0, 1.0, Buy)]]);
        let mut agg = aggregator(1);
        agg.ensure_aggregated(&data, 0).unwrap();
        let hist = agg.histogram(0).unwrap();
        assert_eq!(hist.len(), 1);
        assert_eq!(hist[0].trade_count, 1);
    }

    #[test]
    fn rejects_other_security_and_out_of_range() {
        let data = series(vec![vec![]]);
        let other = Security::new("NQ", 0.25).unwrap();
        let mut agg = TradeHistogramAggregator::new(&other, 1).unwrap();
        assert!(matches!(
            agg.ensure_aggregated(&data, 0),
            Err(StatError::InvalidArgument(_))
        ));
        let mut agg = aggregator(1);
        assert!(matches!(
            agg.ensure_aggregated(&data, 1),
            Err(StatError::OutOfRange { .. })
        ));
    }

    #[test]
    fn key_includes_security_and_width() {
        assert_eq!(
            TradeHistogramAggregator::key("ES", 4).as_str(),
            "histograms|ES|4"
        );
    }
}
