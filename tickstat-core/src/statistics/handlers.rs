//! Per-bar consumers of shared trade statistics.
//!
//! Handlers keep only their own small state (carry-forward price, lifecycle)
//! and go through the shared [`TradeStatistics`] for everything else. Any
//! bar index may be queried in any order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::query::{aggregate, edge_price, AggregateKind, EdgeKind, ExtremumKind, ExtremumQuery};
use super::{StatisticKind, TradeStatistics};
use crate::error::{Result, StatError};
use crate::execution::{BarComputation, ComputationState};
use crate::source::MarketData;

fn ensure_ready(state: ComputationState) -> Result<()> {
    if state == ComputationState::Ready {
        Ok(())
    } else {
        Err(StatError::InvalidState {
            operation: "evaluate",
            state: state.label(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremumOutput {
    /// Representative price of the extreme level.
    #[default]
    Price,
    /// Statistic value of the extreme level.
    Value,
}

pub struct ExtremumHandler {
    name: String,
    statistics: Arc<TradeStatistics>,
    stat: StatisticKind,
    kind: ExtremumKind,
    output: ExtremumOutput,
    query: ExtremumQuery,
    state: ComputationState,
}

impl ExtremumHandler {
    pub fn new(
        statistics: Arc<TradeStatistics>,
        stat: StatisticKind,
        kind: ExtremumKind,
        output: ExtremumOutput,
    ) -> Self {
        let name = format!("{}_{}", kind.as_str(), stat.as_str());
        Self {
            name,
            statistics,
            stat,
            kind,
            output,
            query: ExtremumQuery::new(),
            state: ComputationState::Uninitialized,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl BarComputation for ExtremumHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) {
        self.query.reset();
        self.state = ComputationState::Ready;
    }

    fn teardown(&mut self) {
        self.query.reset();
        self.state = ComputationState::Disposed;
    }

    fn evaluate(&mut self, source: &dyn MarketData, index: usize) -> Result<f64> {
        ensure_ready(self.state)?;
        let levels = self.statistics.levels(source, index)?;
        let found = self.query.find(&levels, self.stat, self.kind);
        Ok(match self.output {
            ExtremumOutput::Price => found.price,
            ExtremumOutput::Value => found.value,
        })
    }
}

pub struct EdgeHandler {
    name: String,
    statistics: Arc<TradeStatistics>,
    stat: StatisticKind,
    kind: EdgeKind,
    coefficient: f64,
    state: ComputationState,
}

impl EdgeHandler {
    pub fn new(
        statistics: Arc<TradeStatistics>,
        stat: StatisticKind,
        kind: EdgeKind,
        coefficient: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&coefficient) {
            return Err(StatError::invalid(format!(
                "edge coefficient must be within [0, 1], got {coefficient}"
            )));
        }
        Ok(Self {
            name: format!("{}_edge_{}_{coefficient}", kind.as_str(), stat.as_str()),
            statistics,
            stat,
            kind,
            coefficient,
            state: ComputationState::Uninitialized,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl BarComputation for EdgeHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) {
        self.state = ComputationState::Ready;
    }

    fn teardown(&mut self) {
        self.state = ComputationState::Disposed;
    }

    fn evaluate(&mut self, source: &dyn MarketData, index: usize) -> Result<f64> {
        ensure_ready(self.state)?;
        let levels = self.statistics.levels(source, index)?;
        edge_price(&levels, self.stat, self.kind, self.coefficient)
    }
}

pub struct AggregateHandler {
    name: String,
    statistics: Arc<TradeStatistics>,
    stat: StatisticKind,
    kind: AggregateKind,
    state: ComputationState,
}

impl AggregateHandler {
    pub fn new(statistics: Arc<TradeStatistics>, stat: StatisticKind, kind: AggregateKind) -> Self {
        Self {
            name: format!("{}_{}", kind.as_str(), stat.as_str()),
            statistics,
            stat,
            kind,
            state: ComputationState::Uninitialized,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl BarComputation for AggregateHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) {
        self.state = ComputationState::Ready;
    }

    fn teardown(&mut self) {
        self.state = ComputationState::Disposed;
    }

    fn evaluate(&mut self, source: &dyn MarketData, index: usize) -> Result<f64> {
        ensure_ready(self.state)?;
        let levels = self.statistics.levels(source, index)?;
        Ok(aggregate(&levels, self.stat, self.kind))
    }
}
