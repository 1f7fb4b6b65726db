//! Domain error types.
//!
//! Data-shape problems abort a run. Statistical edge cases (short history,
//! zero variance, thin cross-sections) are not errors at all; they resolve to
//! neutral values and are tallied in [`Diagnostics`](super::pipeline::Diagnostics).

use std::fmt;

/// Pipeline stage, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Signals,
    Portfolio,
    Backtest,
    Analyze,
    Blend,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Signals => "signals",
            Stage::Portfolio => "portfolio",
            Stage::Backtest => "backtest",
            Stage::Analyze => "analyze",
            Stage::Blend => "blend",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

/// Top-level error type for quantpipe.
#[derive(Debug, thiserror::Error)]
pub enum QuantError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("required column '{column}' missing from {source_name}")]
    MissingData { source_name: String, column: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("run cancelled during {stage} stage")]
    Cancelled { stage: Stage },

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<QuantError>,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuantError {
    /// Attach the failing stage. Already-staged and cancellation errors pass through.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            QuantError::StageFailed { .. } | QuantError::Cancelled { .. } => self,
            other => QuantError::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping stage wrappers.
    pub fn root(&self) -> &QuantError {
        match self {
            QuantError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<&QuantError> for std::process::ExitCode {
    fn from(err: &QuantError) -> Self {
        let code: u8 = match err.root() {
            QuantError::Io(_) | QuantError::Csv(_) => 1,
            QuantError::ConfigParse { .. }
            | QuantError::ConfigMissing { .. }
            | QuantError::ConfigInvalid { .. } => 2,
            QuantError::Database { .. } | QuantError::DatabaseQuery { .. } => 3,
            QuantError::MissingData { .. }
            | QuantError::NoData { .. }
            | QuantError::InsufficientData { .. } => 5,
            QuantError::Cancelled { .. } => 6,
            QuantError::StageFailed { .. } => 1,
        };
        std::process::ExitCode::from(code)
    }
}
