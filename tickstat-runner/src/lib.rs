//! tickstat runner: session orchestration on top of `tickstat-core`.
//!
//! This crate provides:
//! - TOML session configs with BLAKE3 fingerprints
//! - Trade tape loading from CSV and seeded synthetic tapes
//! - Session runs (optionally strided to exercise gap replay)
//! - Parallel panes sharing one session's aggregations

pub mod config;
pub mod data_loader;
pub mod runner;

pub use config::{
    ComputationConfig, ConfigError, DataConfig, Fingerprint, SecurityConfig, SessionConfig,
};
pub use data_loader::{load_series, load_trades_csv, synthetic_series, write_trades_csv, LoadError};
pub use runner::{
    evaluation_indices, run_config, run_panes, run_session, CacheStats, OutputColumn, RunError,
    SessionReport,
};
