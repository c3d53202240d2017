use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pezzottify_harvester::export::{flatten_file, merge_csv_dir};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(about = "Turn harvest files into CSV tables")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flattens a harvest JSON file into tracks.csv, artists.csv and
    /// relationships.csv. A directory input uses its most recent JSON file.
    Flatten {
        #[clap(long, value_parser = parse_path, default_value = "./raw_data")]
        input: PathBuf,

        #[clap(long, value_parser = parse_path, default_value = "./processed_data")]
        output_dir: PathBuf,
    },

    /// Concatenates every CSV file in a directory into one merged file.
    /// All files must share the same header.
    Merge {
        #[clap(long, value_parser = parse_path, default_value = "./processed_data")]
        input_dir: PathBuf,

        #[clap(long, value_parser = parse_path, default_value = "./merged_data")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    match cli_args.command {
        Command::Flatten { input, output_dir } => {
            let summary = flatten_file(&input, &output_dir)?;
            info!("Tracks: {:?}", summary.tracks_path);
            info!("Artists: {:?}", summary.artists_path);
            info!("Relationships: {:?}", summary.relationships_path);
        }
        Command::Merge {
            input_dir,
            output_dir,
        } => {
            let summary = merge_csv_dir(&input_dir, &output_dir)?;
            info!(
                "Merged {} files into {:?} ({} rows)",
                summary.files, summary.path, summary.rows
            );
        }
    }

    Ok(())
}
