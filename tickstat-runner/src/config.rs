//! Serializable session configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tickstat_core::domain::Security;
use tickstat_core::execution::BarComputation;
use tickstat_core::indicators::IndicatorKind;
use tickstat_core::statistics::{
    AggregateHandler, AggregateKind, EdgeHandler, EdgeKind, ExtremumHandler, ExtremumKind,
    ExtremumOutput, StatisticKind, WindowSpec,
};
use tickstat_core::{Session, StatError};

/// Content hash of a session config.
pub type Fingerprint = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("duplicate computation name '{0}'")]
    DuplicateName(String),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything needed to reproduce one evaluation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub security: SecurityConfig,
    pub data: DataConfig,
    pub computations: Vec<ComputationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    pub id: String,
    pub tick_size: f64,
}

impl SecurityConfig {
    pub fn security(&self) -> Result<Security, StatError> {
        Security::new(self.id.clone(), self.tick_size)
    }
}

fn default_bar_seconds() -> i64 {
    60
}

fn default_start_price() -> f64 {
    4_500.0
}

/// Where the trade tape comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataConfig {
    /// Trade CSV; a relative path is resolved against the config file.
    Csv {
        path: PathBuf,
        #[serde(default = "default_bar_seconds")]
        bar_seconds: i64,
    },
    /// Seeded random walk on the tick grid.
    Synthetic {
        bars: usize,
        trades_per_bar: usize,
        seed: u64,
        #[serde(default = "default_bar_seconds")]
        bar_seconds: i64,
        #[serde(default = "default_start_price")]
        start_price: f64,
    },
}

/// One output column of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputationConfig {
    Indicator {
        #[serde(default)]
        name: Option<String>,
        indicator: IndicatorKind,
    },
    Extremum {
        #[serde(default)]
        name: Option<String>,
        bucket_width: u32,
        window: WindowSpec,
        statistic: StatisticKind,
        extremum: ExtremumKind,
        #[serde(default)]
        output: ExtremumOutput,
    },
    Edge {
        #[serde(default)]
        name: Option<String>,
        bucket_width: u32,
        window: WindowSpec,
        statistic: StatisticKind,
        edge: EdgeKind,
        coefficient: f64,
    },
    Aggregate {
        #[serde(default)]
        name: Option<String>,
        bucket_width: u32,
        window: WindowSpec,
        statistic: StatisticKind,
        aggregate: AggregateKind,
    },
}

impl ComputationConfig {
    fn explicit_name(&self) -> Option<&str> {
        match self {
            Self::Indicator { name, .. }
            | Self::Extremum { name, .. }
            | Self::Edge { name, .. }
            | Self::Aggregate { name, .. } => name.as_deref(),
        }
    }

    /// Build the computation, sharing aggregations through `session`.
    pub fn build(
        &self,
        session: &Session,
        security: &Security,
    ) -> Result<Box<dyn BarComputation>, StatError> {
        let name = self.explicit_name();
        let computation: Box<dyn BarComputation> = match self {
            Self::Indicator { indicator, .. } => {
                // Indicators are named by their stepper; an explicit name is
                // applied by the runner's column label instead.
                Box::new(indicator.computation()?)
            }
            Self::Extremum {
                bucket_width,
                window,
                statistic,
                extremum,
                output,
                ..
            } => {
                let stats = session.trade_statistics(security, *bucket_width, window)?;
                let handler = ExtremumHandler::new(stats, *statistic, *extremum, *output);
                match name {
                    Some(n) => Box::new(handler.with_name(n)),
                    None => Box::new(handler),
                }
            }
            Self::Edge {
                bucket_width,
                window,
                statistic,
                edge,
                coefficient,
                ..
            } => {
                let stats = session.trade_statistics(security, *bucket_width, window)?;
                let handler = EdgeHandler::new(stats, *statistic, *edge, *coefficient)?;
                match name {
                    Some(n) => Box::new(handler.with_name(n)),
                    None => Box::new(handler),
                }
            }
            Self::Aggregate {
                bucket_width,
                window,
                statistic,
                aggregate,
                ..
            } => {
                let stats = session.trade_statistics(security, *bucket_width, window)?;
                let handler = AggregateHandler::new(stats, *statistic, *aggregate);
                match name {
                    Some(n) => Box::new(handler.with_name(n)),
                    None => Box::new(handler),
                }
            }
        };
        Ok(computation)
    }

    /// Column label: the configured name, else the computation's own name.
    pub fn label(&self, computation: &dyn BarComputation) -> String {
        self.explicit_name()
            .map(str::to_string)
            .unwrap_or_else(|| computation.name().to_string())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |e: StatError| ConfigError::Invalid(e.to_string());
        match self {
            Self::Indicator { indicator, .. } => {
                indicator.build().map_err(invalid)?;
            }
            Self::Extremum {
                bucket_width,
                window,
                ..
            }
            | Self::Aggregate {
                bucket_width,
                window,
                ..
            } => {
                check_width(*bucket_width)?;
                window.validate().map_err(invalid)?;
            }
            Self::Edge {
                bucket_width,
                window,
                coefficient,
                ..
            } => {
                check_width(*bucket_width)?;
                window.validate().map_err(invalid)?;
                if !(0.0..=1.0).contains(coefficient) {
                    return Err(ConfigError::Invalid(format!(
                        "edge coefficient must be within [0, 1], got {coefficient}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_width(bucket_width: u32) -> Result<(), ConfigError> {
    if bucket_width == 0 {
        return Err(ConfigError::Invalid("bucket_width must be >= 1".into()));
    }
    Ok(())
}

impl SessionConfig {
    /// Parse and validate a TOML config.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config; a relative CSV path becomes relative to the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        if let DataConfig::Csv { path: csv, .. } = &mut config.data {
            if csv.is_relative() {
                if let Some(dir) = path.parent() {
                    *csv = dir.join(&*csv);
                }
            }
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.security
            .security()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        match &self.data {
            DataConfig::Csv { bar_seconds, .. } => check_bar_seconds(*bar_seconds)?,
            DataConfig::Synthetic {
                bars,
                trades_per_bar,
                bar_seconds,
                start_price,
                ..
            } => {
                check_bar_seconds(*bar_seconds)?;
                if *bars == 0 || *trades_per_bar == 0 {
                    return Err(ConfigError::Invalid(
                        "synthetic data needs at least one bar and one trade per bar".into(),
                    ));
                }
                if !(start_price.is_finite() && *start_price > 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "start_price must be positive, got {start_price}"
                    )));
                }
            }
        }

        if self.computations.is_empty() {
            return Err(ConfigError::Invalid("no computations configured".into()));
        }
        let mut names = HashSet::new();
        for computation in &self.computations {
            computation.validate()?;
            if let Some(name) = computation.explicit_name() {
                if !names.insert(name) {
                    return Err(ConfigError::DuplicateName(name.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    ///
    /// Two configs with the same fingerprint produce the same report on the
    /// same data.
    pub fn fingerprint(&self) -> Result<Fingerprint, ConfigError> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }
}

fn check_bar_seconds(bar_seconds: i64) -> Result<(), ConfigError> {
    if bar_seconds <= 0 {
        return Err(ConfigError::Invalid(format!(
            "bar_seconds must be positive, got {bar_seconds}"
        )));
    }
    Ok(())
}
