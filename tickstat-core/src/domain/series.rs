//! In-memory market series: bars plus the trades that built them.

use chrono::{DateTime, NaiveDateTime};

use super::{Bar, Security, Trade};
use crate::error::{Result, StatError};
use crate::source::{BarSource, TradeSource};

#[derive(Debug, Clone)]
pub struct MarketSeries {
    security: Security,
    bars: Vec<Bar>,
    trades: Vec<Vec<Trade>>,
}

impl MarketSeries {
    /// Assemble a series from pre-built bars and their per-bar trades.
    pub fn new(security: Security, bars: Vec<Bar>, trades: Vec<Vec<Trade>>) -> Result<Self> {
        if bars.len() != trades.len() {
            return Err(StatError::invalid(format!(
                "{} bars but {} trade groups",
                bars.len(),
                trades.len()
            )));
        }
        if let Some(i) = bars
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(StatError::invalid(format!(
                "bar timestamps decrease at index {}",
                i + 1
            )));
        }
        let trades = trades
            .into_iter()
            .enumerate()
            .map(|(i, group)| {
                group
                    .into_iter()
                    .map(|t| Trade { bar_index: i, ..t })
                    .collect()
            })
            .collect();
        Ok(Self {
            security,
            bars,
            trades,
        })
    }

    /// Group a time-ordered tape into bars of `bar_seconds`.
    ///
    /// Bars are aligned to multiples of `bar_seconds` since the epoch; slices
    /// without trades produce no bar.
    pub fn from_trades(security: Security, tape: Vec<Trade>, bar_seconds: i64) -> Result<Self> {
        if bar_seconds <= 0 {
            return Err(StatError::invalid(format!(
                "bar length must be positive, got {bar_seconds}s"
            )));
        }
        let mut bars: Vec<Bar> = Vec::new();
        let mut groups: Vec<Vec<Trade>> = Vec::new();
        let mut last_ts: Option<NaiveDateTime> = None;

        for trade in tape {
            if last_ts.is_some_and(|prev| trade.timestamp < prev) {
                return Err(StatError::invalid(format!(
                    "trade tape is not time ordered at {}",
                    trade.timestamp
                )));
            }
            last_ts = Some(trade.timestamp);

            let open_time = align(trade.timestamp, bar_seconds)?;
            if bars.last().map(|b| b.timestamp) != Some(open_time) {
                bars.push(Bar::flat(open_time, trade.price));
                groups.push(Vec::new());
            }
            let index = bars.len() - 1;
            if trade.is_valid() {
                bars[index].absorb(trade.price, trade.quantity);
            }
            groups[index].push(Trade {
                bar_index: index,
                ..trade
            });
        }

        Ok(Self {
            security,
            bars,
            trades: groups,
        })
    }

    pub fn security(&self) -> &Security {
        &self.security
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Trades of bar `index`, in tape order.
    pub fn trades(&self, index: usize) -> &[Trade] {
        &self.trades[index]
    }

    pub fn trade_count(&self) -> usize {
        self.trades.iter().map(Vec::len).sum()
    }
}

fn align(ts: NaiveDateTime, bar_seconds: i64) -> Result<NaiveDateTime> {
    let secs = ts.and_utc().timestamp();
    let start = secs.div_euclid(bar_seconds) * bar_seconds;
    DateTime::from_timestamp(start, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| StatError::invalid(format!("timestamp {ts} cannot be aligned")))
}

impl BarSource for MarketSeries {
    fn count(&self) -> usize {
        self.bars.len()
    }

    fn value(&self, index: usize) -> f64 {
        self.bars[index].close
    }

    fn timestamp(&self, index: usize) -> NaiveDateTime {
        self.bars[index].timestamp
    }
}

impl TradeSource for MarketSeries {
    fn security_id(&self) -> &str {
        &self.security.id
    }

    fn trades_for_bar(&self, index: usize) -> &[Trade] {
        &self.trades[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeDirection;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn trade(ts: NaiveDateTime, price: f64, qty: f64) -> Trade {
        Trade {
            timestamp: ts,
            price,
            quantity: qty,
            direction: TradeDirection::Buy,
            bar_index: 0,
        }
    }

    #[test]
    fn groups_trades_into_minute_bars() {
        let sec = Security::new("ES", 0.25).unwrap();
        let tape = vec![
            trade(at(10, 0, 5), 100.0, 1.0),
            trade(at(10, 0, 30), 101.0, 2.0),
            trade(at(10, 1, 0), 100.5, 1.0),
            trade(at(10, 3, 59), 99.0, 4.0),
        ];
        let series = MarketSeries::from_trades(sec, tape, 60).unwrap();
        assert_eq!(series.count(), 3);
        assert_eq!(series.timestamp(0), at(10, 0, 0));
        assert_eq!(series.timestamp(2), at(10, 3, 0));
        assert_eq!(series.value(0), 101.0);
        assert_eq!(series.bars()[0].volume, 3.0);
        assert_eq!(series.trades_for_bar(2)[0].bar_index, 2);
        assert_eq!(series.trade_count(), 4);
    }

    #[test]
    fn rejects_unordered_tape() {
        let sec = Security::new("ES", 0.25).unwrap();
        let tape = vec![trade(at(10, 1, 0), 100.0, 1.0), trade(at(10, 0, 0), 100.0, 1.0)];
        assert!(MarketSeries::from_trades(sec, tape, 60).is_err());
    }

    #[test]
    fn new_rejects_length_mismatch() {
        let sec = Security::new("ES", 0.25).unwrap();
        let bars = vec![Bar::flat(at(10, 0, 0), 1.0)];
        assert!(MarketSeries::new(sec, bars, vec![]).is_err());
    }

    #[test]
    fn new_reassigns_bar_indices() {
        let sec = Security::new("ES", 0.25).unwrap();
        let bars = vec![Bar::flat(at(10, 0, 0), 1.0), Bar::flat(at(10, 1, 0), 1.0)];
        let trades = vec![vec![], vec![trade(at(10, 1, 2), 1.0, 1.0)]];
        let series = MarketSeries::new(sec, bars, trades).unwrap();
        assert_eq!(series.trades_for_bar(1)[0].bar_index, 1);
    }
}
