use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mammo_prep::config::{OutputFormat, PreprocessConfig, TargetSize};
use mammo_prep::state::{ImageSource, MetadataTable};
use mammo_prep::{batch, BatchProcessor, BatchSummary, Preprocessor};

/// Convert mammography DICOM files into fixed-size 8-bit images
#[derive(Parser, Debug)]
#[command(name = "mammo-prep", version, about)]
struct Cli {
    /// Root containing train_images/ and test_images/
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Metadata CSV (patient_id, image_id, view, laterality, ...)
    #[arg(long)]
    metadata: PathBuf,

    /// Output root; images land in <output>/<view>/<laterality>/
    #[arg(long)]
    output: PathBuf,

    /// Source tree to read from
    #[arg(long, default_value = "train")]
    source: ImageSource,

    /// Target canvas as HxW (or a single edge for a square canvas)
    #[arg(long)]
    target_size: Option<TargetSize>,

    /// Output format: png, jpg or jpeg
    #[arg(long)]
    format: Option<String>,

    /// Only process the first N records
    #[arg(long)]
    num_samples: Option<usize>,

    /// Process records on N worker threads (0 = one per core)
    #[arg(long)]
    jobs: Option<usize>,

    /// Fail any record that takes longer than this
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// JSON file with preprocessing options; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a JSON batch report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Merge the optional config file with command-line overrides
    fn preprocess_config(&self) -> Result<PreprocessConfig> {
        let mut config = match &self.config {
            Some(path) => PreprocessConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PreprocessConfig::default(),
        };

        if let Some(base_path) = &self.base_path {
            config.base_path = base_path.clone();
        } else if self.config.is_none() {
            anyhow::bail!("--base-path is required when no --config is given");
        }
        if let Some(target_size) = self.target_size {
            config.target_size = target_size;
        }
        if let Some(format) = &self.format {
            config.output_format = format.clone();
        }
        if self.timeout_secs.is_some() {
            config.record_timeout_secs = self.timeout_secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.preprocess_config()?;
    let timeout = config.record_timeout_secs.map(Duration::from_secs);
    let preprocessor = Preprocessor::new(config).context("Invalid preprocessing configuration")?;
    let format: OutputFormat = preprocessor.output_format();

    let table = MetadataTable::from_csv_path(&cli.metadata)
        .with_context(|| format!("Failed to read metadata {}", cli.metadata.display()))?;
    info!(
        "🎨 mammo-prep: {} records, {} output, canvas {}",
        table.len(),
        format,
        preprocessor.config().target_size
    );

    let summary = match (timeout, cli.jobs) {
        (Some(timeout), jobs) => {
            if jobs.is_some() {
                warn!("⚠️  --jobs is ignored when a per-record timeout is set");
            }
            batch::process_with_timeout(
                Arc::new(preprocessor),
                cli.source,
                table.records().to_vec(),
                cli.output.clone(),
                cli.num_samples,
                timeout,
            )
            .await?
        }
        (None, Some(jobs)) => BatchProcessor::new(&preprocessor)
            .with_source(cli.source)
            .with_progress(cli.progress)
            .process_parallel(table.records(), &cli.output, cli.num_samples, jobs)?,
        (None, None) => BatchProcessor::new(&preprocessor)
            .with_source(cli.source)
            .with_progress(cli.progress)
            .process_and_save(table.records(), &cli.output, cli.num_samples)?,
    };

    if let Some(report) = &cli.report {
        write_report(&summary, report)?;
    }

    let (processed, failed) = summary.counts();
    println!("Processed: {}, Failed: {}", processed, failed);
    Ok(())
}

fn write_report(summary: &BatchSummary, path: &Path) -> Result<()> {
    let json = summary.to_json().context("Failed to serialize batch report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    info!("📝 Report written to {}", path.display());
    Ok(())
}
