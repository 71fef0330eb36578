//! Queries over merged price levels (ascending by price).

use serde::{Deserialize, Serialize};

use super::StatisticKind;
use crate::error::{Result, StatError};
use crate::histogram::HistogramBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremumKind {
    /// Ties go to the lowest price.
    Minimum,
    /// Ties go to the highest price.
    Maximum,
}

impl ExtremumKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimum => "min",
            Self::Maximum => "max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    /// Volume-weighted average price of the winning level.
    pub price: f64,
    /// Signed statistic value of the winning level.
    pub value: f64,
}

/// Level with the largest absolute statistic, or `None` for no levels.
pub fn find_extremum(
    levels: &[HistogramBar],
    stat: StatisticKind,
    kind: ExtremumKind,
) -> Option<Extremum> {
    let pick = |best: Option<Extremum>, level: &HistogramBar| {
        let value = stat.of(level);
        match best {
            Some(b) if b.value.abs() >= value.abs() => Some(b),
            _ => Some(Extremum {
                price: level.average_price,
                value,
            }),
        }
    };
    match kind {
        ExtremumKind::Minimum => levels.iter().fold(None, pick),
        ExtremumKind::Maximum => levels.iter().rev().fold(None, pick),
    }
}

/// Extremum lookup that carries the last found price across empty windows.
#[derive(Debug, Clone)]
pub struct ExtremumQuery {
    last_price: f64,
}

impl Default for ExtremumQuery {
    fn default() -> Self {
        Self {
            last_price: f64::NAN,
        }
    }
}

impl ExtremumQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    pub fn reset(&mut self) {
        self.last_price = f64::NAN;
    }

    /// With no levels: the previous price and a NaN value.
    pub fn find(
        &mut self,
        levels: &[HistogramBar],
        stat: StatisticKind,
        kind: ExtremumKind,
    ) -> Extremum {
        match find_extremum(levels, stat, kind) {
            Some(found) => {
                self.last_price = found.price;
                found
            }
            None => Extremum {
                price: self.last_price,
                value: f64::NAN,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Accumulate from the lowest price upwards.
    Lower,
    /// Accumulate from the highest price downwards.
    Upper,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
        }
    }
}

/// Price at which fraction `coefficient` of the total statistic weight is reached.
///
/// Weights are absolute statistic values. Inside the level where the target
/// falls, the first half of its weight spans the outer price to the average
/// and the second half spans the average to the inner price. NaN when the
/// levels carry no weight.
pub fn edge_price(
    levels: &[HistogramBar],
    stat: StatisticKind,
    kind: EdgeKind,
    coefficient: f64,
) -> Result<f64> {
    if !(0.0..=1.0).contains(&coefficient) {
        return Err(StatError::invalid(format!(
            "edge coefficient must be within [0, 1], got {coefficient}"
        )));
    }

    let total: f64 = levels.iter().map(|l| stat.of(l).abs()).sum();
    if total <= 0.0 {
        return Ok(f64::NAN);
    }
    let target = coefficient * total;

    let ordered: Box<dyn Iterator<Item = &HistogramBar>> = match kind {
        EdgeKind::Lower => Box::new(levels.iter()),
        EdgeKind::Upper => Box::new(levels.iter().rev()),
    };

    let mut accumulated = 0.0;
    let mut last = None;
    for level in ordered {
        let weight = stat.of(level).abs();
        if weight <= 0.0 {
            continue;
        }
        last = Some(level);
        if accumulated + weight >= target {
            let fraction = ((target - accumulated) / weight).clamp(0.0, 1.0);
            return Ok(interpolate(level, kind, fraction));
        }
        accumulated += weight;
    }

    // Rounding left the target just past the last weighted level.
    Ok(last
        .map(|level| interpolate(level, kind, 1.0))
        .unwrap_or(f64::NAN))
}

fn interpolate(level: &HistogramBar, kind: EdgeKind, fraction: f64) -> f64 {
    let (outer, inner) = match kind {
        EdgeKind::Lower => (level.min_price, level.max_price),
        EdgeKind::Upper => (level.max_price, level.min_price),
    };
    let average = level.average_price;
    if fraction <= 0.5 {
        outer + (average - outer) * (fraction / 0.5)
    } else {
        average + (inner - average) * ((fraction - 0.5) / 0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    /// Sum of the statistic over every level.
    Sum,
    /// Number of price levels with trades.
    LevelCount,
}

impl AggregateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::LevelCount => "levels",
        }
    }
}

pub fn aggregate(levels: &[HistogramBar], stat: StatisticKind, kind: AggregateKind) -> f64 {
    match kind {
        AggregateKind::Sum => levels.iter().map(|l| stat.of(l)).sum(),
        AggregateKind::LevelCount => levels.len() as f64,
    }
}
