//! Durable output of a finished harvest.

mod json_file;

pub use json_file::{run_label, JsonFileSink};

use crate::harvest::HarvestReport;
use anyhow::Result;
use std::path::PathBuf;

/// Destination for a finalized harvest report.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait ResultSink: Send + Sync {
    /// Persist the report, returning where it was written.
    fn write(&self, report: &HarvestReport) -> Result<PathBuf>;
}
