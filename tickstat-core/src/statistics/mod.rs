//! Trade statistics over windows of per-bar price histograms.
//!
//! A [`TradeStatistics`] is shared by every consumer asking for the same
//! security, bucket width and window. It owns no trades: the bars come from
//! the shared histogram aggregator and the source passed on each call.

pub mod handlers;
pub mod query;
pub mod window;

pub use handlers::{AggregateHandler, EdgeHandler, ExtremumHandler, ExtremumOutput};
pub use query::{
    aggregate, edge_price, find_extremum, AggregateKind, EdgeKind, Extremum, ExtremumKind,
    ExtremumQuery,
};
pub use window::{StatisticsWindow, TimeFrameKind, TimeFrameUnit, WindowSpec};

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::cache::StateKey;
use crate::domain::Security;
use crate::error::{Result, StatError};
use crate::histogram::{merge_levels, HistogramBar, TradeHistogramAggregator};
use crate::source::MarketData;

/// Which per-level figure a query ranks or sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticKind {
    TradesCount,
    Quantity,
    BuyCount,
    SellCount,
    /// Buy count minus sell count.
    BuySellCount,
    BuyQuantity,
    SellQuantity,
    /// Buy quantity minus sell quantity.
    BuySellQuantity,
}

impl StatisticKind {
    pub fn of(self, bar: &HistogramBar) -> f64 {
        match self {
            Self::TradesCount => bar.trade_count as f64,
            Self::Quantity => bar.quantity,
            Self::BuyCount => bar.buy_count as f64,
            Self::SellCount => bar.sell_count as f64,
            Self::BuySellCount => bar.count_delta(),
            Self::BuyQuantity => bar.buy_quantity,
            Self::SellQuantity => bar.sell_quantity,
            Self::BuySellQuantity => bar.quantity_delta(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TradesCount => "trades",
            Self::Quantity => "quantity",
            Self::BuyCount => "buys",
            Self::SellCount => "sells",
            Self::BuySellCount => "count_delta",
            Self::BuyQuantity => "buy_quantity",
            Self::SellQuantity => "sell_quantity",
            Self::BuySellQuantity => "quantity_delta",
        }
    }
}

pub struct TradeStatistics {
    key: StateKey,
    security_id: String,
    histograms: Arc<RwLock<TradeHistogramAggregator>>,
    window: Mutex<StatisticsWindow>,
}

impl TradeStatistics {
    pub fn new(
        security: &Security,
        histograms: Arc<RwLock<TradeHistogramAggregator>>,
        spec: WindowSpec,
    ) -> Result<Self> {
        let bucket_width = {
            let hist = histograms.read();
            if hist.security_id() != security.id {
                return Err(StatError::invalid(format!(
                    "statistics for {} built on histograms of {}",
                    security.id,
                    hist.security_id()
                )));
            }
            hist.bucket_width()
        };
        Ok(Self {
            key: Self::key(&security.id, bucket_width, &spec),
            security_id: security.id.clone(),
            histograms,
            window: Mutex::new(StatisticsWindow::new(spec)?),
        })
    }

    pub fn key(security_id: &str, bucket_width: u32, spec: &WindowSpec) -> StateKey {
        StateKey::new("statistics")
            .with(security_id)
            .with(bucket_width)
            .with(spec)
    }

    pub fn state_key(&self) -> &StateKey {
        &self.key
    }

    pub fn security_id(&self) -> &str {
        &self.security_id
    }

    pub fn histograms(&self) -> &Arc<RwLock<TradeHistogramAggregator>> {
        &self.histograms
    }

    /// Histogram bars of every source bar inside the window at `target`.
    pub fn in_scope(&self, source: &dyn MarketData, target: usize) -> Result<Vec<HistogramBar>> {
        if source.security_id() != self.security_id {
            return Err(StatError::invalid(format!(
                "statistics for {} queried with {}",
                self.security_id,
                source.security_id()
            )));
        }

        let behind = self.histograms.read().aggregated_len() <= target;
        if behind {
            self.histograms.write().ensure_aggregated(source, target)?;
        }

        let hist = self.histograms.read();
        let range = self.window.lock().select(&*hist, source, target)?;
        let Some(range) = range else {
            return Ok(Vec::new());
        };

        let mut bars = Vec::new();
        for index in range {
            bars.extend_from_slice(hist.histogram(index)?);
        }
        Ok(bars)
    }

    /// In-scope bars merged into one level per bucket, ascending by price.
    pub fn levels(&self, source: &dyn MarketData, target: usize) -> Result<Vec<HistogramBar>> {
        let bars = self.in_scope(source, target)?;
        Ok(merge_levels(&bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, MarketSeries, Trade, TradeDirection};
    use chrono::{NaiveDate, TimeDelta};

    fn series(id: &str, quantities: &[f64]) -> MarketSeries {
        let security = Security::new(id, 1.0).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let bars = (0..quantities.len())
            .map(|i| Bar::flat(start + TimeDelta::minutes(i as i64), 100.0))
            .collect();
        let trades = quantities
            .iter()
            .enumerate()
            .map(|(i, &q)| {
                vec![Trade {
                    timestamp: start + TimeDelta::minutes(i as i64),
                    price: 100.0 + (i % 2) as f64,
                    quantity: q,
                    direction: TradeDirection::Buy,
                    bar_index: i,
                }]
            })
            .collect();
        MarketSeries::new(security, bars, trades).unwrap()
    }

    fn statistics(data: &MarketSeries, spec: WindowSpec) -> TradeStatistics {
        let hist = TradeHistogramAggregator::new(data.security(), 1).unwrap();
        TradeStatistics::new(data.security(), Arc::new(RwLock::new(hist)), spec).unwrap()
    }

    #[test]
    fn statistic_kinds_read_the_right_fields() {
        let bar = HistogramBar {
            bar_index: 0,
            bucket: 1,
            min_price: 1.0,
            max_price: 1.0,
            average_price: 1.0,
            trade_count: 5,
            buy_count: 3,
            sell_count: 1,
            quantity: 10.0,
            buy_quantity: 7.0,
            sell_quantity: 2.0,
            notional: 10.0,
        };
        assert_eq!(StatisticKind::TradesCount.of(&bar), 5.0);
        assert_eq!(StatisticKind::BuySellCount.of(&bar), 2.0);
        assert_eq!(StatisticKind::SellQuantity.of(&bar), 2.0);
        assert_eq!(StatisticKind::BuySellQuantity.of(&bar), 5.0);
    }

    #[test]
    fn in_scope_aggregates_lazily() {
        let data = series("ES", &[1.0, 2.0, 3.0, 4.0]);
        let stats = statistics(&data, WindowSpec::AllTime);
        let bars = stats.in_scope(&data, 2).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(stats.histograms().read().aggregated_len(), 3);
    }

    #[test]
    fn levels_merge_buckets() {
        let data = series("ES", &[1.0, 2.0, 3.0, 4.0]);
        let stats = statistics(&data, WindowSpec::AllTime);
        let levels = stats.levels(&data, 3).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].quantity, 4.0);
        assert_eq!(levels[1].quantity, 6.0);
    }

    #[test]
    fn other_security_rejected() {
        let data = series("ES", &[1.0]);
        let other = series("NQ", &[1.0]);
        let stats = statistics(&data, WindowSpec::AllTime);
        assert!(matches!(
            stats.in_scope(&other, 0),
            Err(StatError::InvalidArgument(_))
        ));
    }

    #[test]
    fn key_names_every_parameter() {
        let key = TradeStatistics::key("ES", 2, &WindowSpec::LastContracts { contracts: 50.0 });
        assert_eq!(key.as_str(), "statistics|ES|2|last_contracts=50");
    }
}
