use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dicom_roi_copy::{
    CrossSeriesCopy, RoiCopier, RoiLoader, RoiObject, RoiSaver, SeriesLoader, config::AppConfig,
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "roi-copy")]
#[command(about = "Copy RTSTRUCT contours and SEG masks between slices and DICOM series")]
#[command(version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, default_value = "roi-copy.toml")]
    config: String,

    /// Export directory (defaults to export.directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy an annotated slice to another slice of the same series
    Within {
        /// Directory holding the image series
        #[arg(long)]
        series: PathBuf,
        /// RTSTRUCT or SEG file annotating the series
        #[arg(long)]
        roi: PathBuf,
        #[arg(long)]
        from: usize,
        #[arg(long)]
        to: usize,
    },
    /// Copy an annotated slice into another series
    Across {
        #[arg(long)]
        source_series: PathBuf,
        #[arg(long)]
        source_roi: PathBuf,
        #[arg(long)]
        from: usize,
        #[arg(long)]
        target_series: PathBuf,
        /// Existing ROI of the target series to add to
        #[arg(long)]
        target_roi: Option<PathBuf>,
        /// Destination slice (defaults by geometry)
        #[arg(long)]
        to: Option<usize>,
    },
}

fn init_logger(level: &str) {
    let level = level.parse().unwrap_or(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true)
                .with_file(false)
                .with_line_number(false)
                .with_target(false),
        )
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_file(&cli.config).context("failed to load configuration")?;
    init_logger(&config.logging.level);

    let copier = RoiCopier::new(config.copy.clone())?;
    let sort_by = config.copy.sort_by;

    let (copied, source_path) = match &cli.command {
        Command::Within {
            series,
            roi,
            from,
            to,
        } => {
            let series = SeriesLoader::load_from_directory(series, sort_by)
                .with_context(|| format!("failed to load series from {}", series.display()))?;
            let source = load_roi(roi)?;
            let copied = copier.copy_within_series(&series, &source, *from, *to)?;
            (copied, roi)
        }
        Command::Across {
            source_series,
            source_roi,
            from,
            target_series,
            target_roi,
            to,
        } => {
            let source_series = SeriesLoader::load_from_directory(source_series, sort_by)
                .with_context(|| {
                    format!("failed to load series from {}", source_series.display())
                })?;
            let target_series = SeriesLoader::load_from_directory(target_series, sort_by)
                .with_context(|| {
                    format!("failed to load series from {}", target_series.display())
                })?;
            let source = load_roi(source_roi)?;
            let target = target_roi.as_deref().map(load_roi).transpose()?;

            let mut request = CrossSeriesCopy::new(&source_series, &source, *from, &target_series);
            if let Some(target) = &target {
                request = request.with_target_roi(target);
            }
            if let Some(to) = to {
                request = request.with_to_slice(*to);
            }
            (copier.copy_across_series(&request)?, source_roi)
        }
    };

    let export_dir = cli.output.unwrap_or(config.export.directory);
    let path = RoiSaver::export(
        &copied,
        source_path,
        config.export.name_prefix.as_deref(),
        &export_dir,
        Utc::now(),
    )?;
    info!(path = %path.display(), entries = copied.len(), "Done");
    Ok(())
}

fn load_roi(path: &Path) -> anyhow::Result<RoiObject> {
    RoiLoader::load(path).with_context(|| format!("failed to load ROI from {}", path.display()))
}
