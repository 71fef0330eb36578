//! HistogramBar: trades of one source bar that fell into one price bucket.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Trade, TradeDirection};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBar {
    /// Source bar. For merged levels, the newest contributing bar.
    pub bar_index: usize,
    /// `floor(price / bucket_size)`.
    pub bucket: i64,
    pub min_price: f64,
    pub max_price: f64,
    /// Volume-weighted average price.
    pub average_price: f64,
    pub trade_count: u64,
    pub buy_count: u64,
    pub sell_count: u64,
    pub quantity: f64,
    pub buy_quantity: f64,
    pub sell_quantity: f64,
    /// Sum of price * quantity.
    pub notional: f64,
}

impl HistogramBar {
    pub(crate) fn from_trade(bar_index: usize, bucket: i64, trade: &Trade) -> Self {
        let mut bar = Self {
            bar_index,
            bucket,
            min_price: trade.price,
            max_price: trade.price,
            average_price: trade.price,
            trade_count: 0,
            buy_count: 0,
            sell_count: 0,
            quantity: 0.0,
            buy_quantity: 0.0,
            sell_quantity: 0.0,
            notional: 0.0,
        };
        bar.add(trade);
        bar
    }

    pub(crate) fn add(&mut self, trade: &Trade) {
        self.min_price = self.min_price.min(trade.price);
        self.max_price = self.max_price.max(trade.price);
        self.trade_count += 1;
        self.quantity += trade.quantity;
        self.notional += trade.price * trade.quantity;
        match trade.direction {
            TradeDirection::Buy => {
                self.buy_count += 1;
                self.buy_quantity += trade.quantity;
            }
            TradeDirection::Sell => {
                self.sell_count += 1;
                self.sell_quantity += trade.quantity;
            }
            TradeDirection::Unknown => {}
        }
        self.average_price = self.notional / self.quantity;
    }

    /// Fold another bar of the same bucket into this one.
    pub fn merge(&mut self, other: &HistogramBar) {
        debug_assert_eq!(self.bucket, other.bucket);
        self.bar_index = self.bar_index.max(other.bar_index);
        self.min_price = self.min_price.min(other.min_price);
        self.max_price = self.max_price.max(other.max_price);
        self.trade_count += other.trade_count;
        self.buy_count += other.buy_count;
        self.sell_count += other.sell_count;
        self.quantity += other.quantity;
        self.buy_quantity += other.buy_quantity;
        self.sell_quantity += other.sell_quantity;
        self.notional += other.notional;
        self.average_price = self.notional / self.quantity;
    }

    /// Buy count minus sell count.
    pub fn count_delta(&self) -> f64 {
        self.buy_count as f64 - self.sell_count as f64
    }

    /// Buy quantity minus sell quantity.
    pub fn quantity_delta(&self) -> f64 {
        self.buy_quantity - self.sell_quantity
    }
}

/// Merge bars from many source bars into one level per bucket, ascending by price.
pub fn merge_levels<'a>(bars: impl IntoIterator<Item = &'a HistogramBar>) -> Vec<HistogramBar> {
    let mut levels: BTreeMap<i64, HistogramBar> = BTreeMap::new();
    for bar in bars {
        levels
            .entry(bar.bucket)
            .and_modify(|level| level.merge(bar))
            .or_insert(*bar);
    }
    levels.into_values().collect()
}
