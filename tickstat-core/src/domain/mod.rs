//! Domain types for tickstat

pub mod bar;
pub mod security;
pub mod series;
pub mod trade;

pub use bar::Bar;
pub use security::Security;
pub use series::MarketSeries;
pub use trade::{Trade, TradeDirection};
