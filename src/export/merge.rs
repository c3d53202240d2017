use anyhow::{bail, Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub path: PathBuf,
    pub files: usize,
    pub rows: usize,
}

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {:?}", dir))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenate every CSV file in `input_dir`, in name order, into
/// `{output_dir}/merged_{YYYYmmdd_HHMMSS}.csv`.
///
/// All inputs must share the same header, which is written once.
pub fn merge_csv_dir(input_dir: &Path, output_dir: &Path) -> Result<MergeSummary> {
    let files = csv_files(input_dir)?;
    if files.is_empty() {
        bail!("No CSV files found in {:?}", input_dir);
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
    let path = output_dir.join(format!(
        "merged_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ));

    let mut header: Option<csv::StringRecord> = None;
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create merged file: {:?}", path))?;
    let mut rows = 0;

    for file in &files {
        let mut reader = csv::Reader::from_path(file)
            .with_context(|| format!("Failed to open CSV file: {:?}", file))?;
        let file_header = reader.headers()?.clone();

        match &header {
            None => {
                writer.write_record(&file_header)?;
                header = Some(file_header);
            }
            Some(expected) if *expected != file_header => {
                drop(writer);
                let _ = fs::remove_file(&path);
                bail!(
                    "Header of {:?} does not match the first file: {:?} vs {:?}",
                    file,
                    file_header,
                    expected
                );
            }
            Some(_) => {}
        }

        let mut file_rows = 0;
        for record in reader.records() {
            let record = record.with_context(|| format!("Failed to read {:?}", file))?;
            writer.write_record(&record)?;
            file_rows += 1;
        }
        debug!("Merged {} rows from {:?}", file_rows, file);
        rows += file_rows;
    }
    writer.flush()?;

    info!("Merged {} files ({} rows) into {:?}", files.len(), rows, path);
    Ok(MergeSummary {
        path,
        files: files.len(),
        rows,
    })
}
