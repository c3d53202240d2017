use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pezzottify_harvester::config::{self, DEFAULT_API_BASE_URL};
use pezzottify_harvester::export::flatten_output;
use pezzottify_harvester::harvest::{HarvestContext, HarvestOrchestrator, HarvestReport, RunStatus};
use pezzottify_harvester::sink::{run_label, JsonFileSink, ResultSink};
use pezzottify_harvester::WebCatalogClient;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[command(about = "Harvest tracks, audio features and artists from the music catalog")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Root URL of the catalog web API.
    #[clap(long, default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Bearer token for the catalog API.
    /// Can also be specified in config file.
    #[clap(long, env = "CATALOG_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Timeout in seconds for a single catalog request.
    #[clap(long, default_value_t = 15)]
    pub request_timeout_sec: u64,

    /// Years to harvest, comma separated.
    #[clap(long, value_delimiter = ',')]
    pub years: Vec<u16>,

    /// First year of an inclusive range to harvest.
    #[clap(long)]
    pub year_start: Option<u16>,

    /// Last year of an inclusive range to harvest.
    #[clap(long, requires = "year_start")]
    pub year_end: Option<u16>,

    /// Playlist ids to harvest after the years, comma separated.
    #[clap(long, value_delimiter = ',')]
    pub playlists: Vec<String>,

    /// Number of playlists searched per year.
    #[clap(long, default_value_t = 5)]
    pub playlists_per_year: usize,

    /// Keep going when a source fails instead of aborting the run.
    #[clap(long)]
    pub continue_on_source_failure: bool,

    /// Do not look up related artists.
    #[clap(long)]
    pub skip_related_artists: bool,

    /// Directory where harvest JSON files are written.
    #[clap(long, value_parser = parse_path, default_value = "./raw_data")]
    pub output_dir: PathBuf,

    /// When set, the harvest is also flattened to CSV tables in this directory.
    #[clap(long, value_parser = parse_path)]
    pub export_dir: Option<PathBuf>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            api_base_url: args.api_base_url.clone(),
            access_token: args.access_token.clone(),
            request_timeout_sec: args.request_timeout_sec,
            years: args.years.clone(),
            year_start: args.year_start,
            year_end: args.year_end,
            playlists: args.playlists.clone(),
            playlists_per_year: args.playlists_per_year,
            continue_on_source_failure: args.continue_on_source_failure,
            skip_related_artists: args.skip_related_artists,
            output_dir: args.output_dir.clone(),
            export_dir: args.export_dir.clone(),
        }
    }
}

fn log_report(report: &HarvestReport) {
    for source in &report.sources {
        info!(
            "  {}: {:?} ({} new tracks, {} duplicates)",
            source.label, source.outcome, source.new_tracks, source.duplicate_tracks
        );
    }
    for failed in report.failed_sources() {
        warn!("Source {} did not complete: {:?}", failed.label, failed.outcome);
    }
    info!(
        "  total: {} tracks, {} artists, {} related-artist edges",
        report.output.tracks.len(),
        report.output.artists.len(),
        report.output.related_artist_edges.len()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
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

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  api_base_url: {}", app_config.api_base_url);
    info!("  sources: {}", app_config.harvest.sources.len());
    info!("  output_dir: {:?}", app_config.output_dir);
    info!("  export_dir: {:?}", app_config.export_dir);
    info!("  enrichment: {:?}", app_config.harvest.enrichment);

    let catalog = WebCatalogClient::new(
        app_config.api_base_url.clone(),
        app_config.access_token.clone(),
        app_config.request_timeout,
    )?;

    let shutdown_token = CancellationToken::new();
    tokio::spawn({
        let token = shutdown_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, stopping harvest after the current step");
                token.cancel();
            }
        }
    });

    let ctx = HarvestContext::from_config(&app_config, Arc::new(catalog), shutdown_token);
    let orchestrator = HarvestOrchestrator::new(ctx, app_config.harvest.clone())?;
    let sink = JsonFileSink::new(
        &app_config.output_dir,
        run_label(&app_config.harvest.sources),
    );

    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(aborted) => {
            error!("{}", aborted);
            let path = sink.write(&aborted.partial)?;
            warn!("Partial harvest written to {:?}", path);
            log_report(&aborted.partial);
            return Err(aborted.into());
        }
    };

    let path = sink.write(&report)?;
    if report.status == RunStatus::Cancelled {
        warn!("Harvest cancelled, partial result written to {:?}", path);
    } else {
        info!("Harvest written to {:?}", path);
    }
    log_report(&report);

    if let Some(export_dir) = &app_config.export_dir {
        flatten_output(&report.output, export_dir)?;
    }

    Ok(())
}
