//! Bar: one time slice of the session's price series.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV bar. `timestamp` is the bar's open time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Flat bar with no volume, used for slices that saw no trades.
    pub fn flat(timestamp: NaiveDateTime, price: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// Fold a trade price into the bar's range and volume.
    pub fn absorb(&mut self, price: f64, quantity: f64) {
        if self.volume == 0.0 {
            self.open = price;
            self.high = price;
            self.low = price;
        } else {
            self.high = self.high.max(price);
            self.low = self.low.min(price);
        }
        self.close = price;
        self.volume += quantity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn absorb_tracks_range() {
        let mut bar = Bar::flat(ts(), 100.0);
        bar.absorb(101.0, 2.0);
        bar.absorb(99.5, 1.0);
        bar.absorb(100.5, 3.0);
        assert_eq!(bar.open, 101.0);
        assert_eq!(bar.high, 101.0);
        assert_eq!(bar.low, 99.5);
        assert_eq!(bar.close, 100.5);
        assert_eq!(bar.volume, 6.0);
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = Bar::flat(ts(), 42.0);
        let json = serde_json::to_string(&bar).unwrap();
        let back: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, back);
    }
}
