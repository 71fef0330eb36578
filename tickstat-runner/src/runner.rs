//! Session runner: evaluates configured computations over a series.
//!
//! Every computation of a run shares one [`Session`], so statistics with the
//! same security, bucket width and window are built once. Panes run in
//! parallel against one session to share aggregation work across configs.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tickstat_core::domain::MarketSeries;
use tickstat_core::execution::BarComputation;
use tickstat_core::{Session, StatError};
use tracing::{debug, info};

use crate::config::{ConfigError, Fingerprint, SessionConfig};
use crate::data_loader::{load_series, LoadError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] LoadError),

    #[error("computation failed: {0}")]
    Compute(#[from] StatError),

    #[error("config is for '{config}' but the data is '{data}'")]
    SecurityMismatch { config: String, data: String },

    #[error("stride must be >= 1")]
    InvalidStride,
}

/// Values of one computation at the evaluated bars. `None` marks NaN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Shared-aggregation counters of the session at the end of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    pub histograms_built: usize,
    pub statistics_built: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionReport {
    pub fingerprint: Fingerprint,
    pub security: String,
    pub bars: usize,
    pub trades: usize,
    pub stride: usize,
    /// Bar indices evaluated, ascending.
    pub indices: Vec<usize>,
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<OutputColumn>,
    pub cache: CacheStats,
}

impl SessionReport {
    pub fn column(&self, name: &str) -> Option<&OutputColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Bars visited with `stride`: every `stride`-th bar plus the last one.
pub fn evaluation_indices(count: usize, stride: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..count).step_by(stride.max(1)).collect();
    if let Some(last) = count.checked_sub(1) {
        if indices.last() != Some(&last) {
            indices.push(last);
        }
    }
    indices
}

/// Load a config's data and run it in a fresh session.
pub fn run_config(config: &SessionConfig, stride: usize) -> Result<SessionReport, RunError> {
    let security = config.security.security()?;
    let series = load_series(&config.data, security)?;
    run_session(config, &series, stride)
}

/// Run one config over `series` in a fresh session.
///
/// A `stride` above 1 skips bars, so incremental computations take their
/// gap path.
pub fn run_session(
    config: &SessionConfig,
    series: &MarketSeries,
    stride: usize,
) -> Result<SessionReport, RunError> {
    let session = Session::new();
    let report = evaluate(config, series, stride, &session);
    session.end();
    report
}

/// Run several configs in parallel against one shared session.
pub fn run_panes(
    panes: &[SessionConfig],
    series: &MarketSeries,
    stride: usize,
) -> Result<Vec<SessionReport>, RunError> {
    let session = Session::new();
    info!(panes = panes.len(), "running panes");
    let reports = panes
        .par_iter()
        .map(|config| evaluate(config, series, stride, &session))
        .collect::<Result<Vec<_>, _>>();
    session.end();
    reports
}

fn evaluate(
    config: &SessionConfig,
    series: &MarketSeries,
    stride: usize,
    session: &Session,
) -> Result<SessionReport, RunError> {
    if stride == 0 {
        return Err(RunError::InvalidStride);
    }
    let security = config.security.security()?;
    if security.id != series.security().id {
        return Err(RunError::SecurityMismatch {
            config: security.id,
            data: series.security().id.clone(),
        });
    }
    let fingerprint = config.fingerprint()?;
    info!(%fingerprint, security = %security.id, stride, "starting session run");

    let mut computations: Vec<(String, Box<dyn BarComputation>)> = Vec::new();
    for spec in &config.computations {
        let mut computation = spec.build(session, &security)?;
        computation.init();
        let label = spec.label(computation.as_ref());
        debug!(column = %label, "computation ready");
        computations.push((label, computation));
    }

    let indices = evaluation_indices(series.bars().len(), stride);
    let mut columns: Vec<OutputColumn> = computations
        .iter()
        .map(|(name, _)| OutputColumn {
            name: name.clone(),
            values: Vec::with_capacity(indices.len()),
        })
        .collect();

    for &index in &indices {
        for ((_, computation), column) in computations.iter_mut().zip(columns.iter_mut()) {
            let value = computation.evaluate(series, index)?;
            column.values.push((!value.is_nan()).then_some(value));
        }
    }

    for (_, computation) in &mut computations {
        computation.teardown();
    }

    let report = SessionReport {
        fingerprint,
        security: security.id,
        bars: series.bars().len(),
        trades: series.trade_count(),
        stride,
        timestamps: indices
            .iter()
            .map(|&i| series.bars()[i].timestamp)
            .collect(),
        indices,
        columns,
        cache: CacheStats {
            histograms_built: session.histograms_built(),
            statistics_built: session.statistics_built(),
        },
    };
    info!(
        fingerprint = %report.fingerprint,
        evaluated = report.indices.len(),
        columns = report.columns.len(),
        "session run complete"
    );
    Ok(report)
}
