//! Trade: one immutable print from the tape.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub quantity: f64,
    pub direction: TradeDirection,
    /// Index of the bar this trade belongs to.
    pub bar_index: usize,
}

impl Trade {
    /// A trade can be bucketed only with a finite price and a positive quantity.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.quantity.is_finite() && self.quantity > 0.0
    }
}
