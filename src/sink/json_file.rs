use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::ResultSink;
use crate::harvest::{HarvestOutput, HarvestReport, HarvestSource};

/// Writes the report as pretty JSON to
/// `{output_dir}/harvest_{label}_{YYYYmmdd_HHMMSS}.json`.
pub struct JsonFileSink {
    output_dir: PathBuf,
    label: String,
}

impl JsonFileSink {
    pub fn new(output_dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            label: label.into(),
        }
    }

    fn file_name(&self) -> String {
        format!(
            "harvest_{}_{}.json",
            self.label,
            Local::now().format("%Y%m%d_%H%M%S")
        )
    }

    /// Read back the harvested entities of a file written by this sink.
    pub fn read_output(path: &Path) -> Result<HarvestOutput> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read harvest file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse harvest file: {:?}", path))
    }
}

impl ResultSink for JsonFileSink {
    fn write(&self, report: &HarvestReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory: {:?}", self.output_dir)
        })?;

        let path = self.output_dir.join(self.file_name());
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to create harvest file: {:?}", path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report)
            .with_context(|| format!("Failed to serialize harvest to {:?}", path))?;
        writer.flush()?;

        info!(
            "Wrote {} tracks and {} artists to {:?}",
            report.output.tracks.len(),
            report.output.artists.len(),
            path
        );
        Ok(path)
    }
}

/// File label for a run over `sources`, e.g. `by_year_2000-2004`.
pub fn run_label(sources: &[HarvestSource]) -> String {
    let years: Vec<u16> = sources
        .iter()
        .filter_map(|s| match s {
            HarvestSource::Year(year) => Some(*year),
            HarvestSource::Playlist(_) => None,
        })
        .collect();
    let has_playlists = sources
        .iter()
        .any(|s| matches!(s, HarvestSource::Playlist(_)));

    let year_label = match (years.iter().min(), years.iter().max()) {
        (Some(min), Some(max)) if min == max => Some(format!("by_year_{}", min)),
        (Some(min), Some(max)) => Some(format!("by_year_{}-{}", min, max)),
        _ => None,
    };

    match (year_label, has_playlists) {
        (Some(label), true) => format!("{}_and_playlists", label),
        (Some(label), false) => label,
        (None, _) => "playlists".to_string(),
    }
}
