//! Result artefact port.

use crate::domain::blend::Blend;
use crate::domain::error::QuantError;
use crate::domain::pipeline::StrategyRun;
use std::path::Path;

/// Port for writing run artefacts into an output directory.
pub trait ReportPort {
    /// Equity curve, signals and yearly breakdown of one run.
    fn write_run(&self, run: &StrategyRun, directory: &Path) -> Result<(), QuantError>;

    /// Side-by-side equity curves of several runs.
    fn write_comparison(&self, runs: &[StrategyRun], directory: &Path) -> Result<(), QuantError>;

    fn write_blend(&self, blend: &Blend, directory: &Path) -> Result<(), QuantError>;
}
