/// CLI обучения модели с логированием в трекер экспериментов

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use a23_ml::{PipelineConfig, TrainingPipeline};

#[derive(Parser, Debug)]
#[command(name = "a23-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train a random forest on the A23 dataset and log the run", long_about = None)]
struct Args {
    /// Input dataset (.xlsx, .xls, .ods or .csv)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// JSON pipeline configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracking URI: a directory, file:// URI or http(s) server
    #[arg(long, env = "MLFLOW_TRACKING_URI")]
    tracking_uri: Option<String>,

    /// Bearer token for the tracking server
    #[arg(long, env = "MLFLOW_TRACKING_TOKEN", hide_env_values = true)]
    tracking_token: Option<String>,

    /// Experiment name
    #[arg(long)]
    experiment: Option<String>,

    /// Run name
    #[arg(long)]
    run_name: Option<String>,

    /// Share of rows held out for testing
    #[arg(long)]
    test_size: Option<f64>,

    /// Seed for the split and the forest
    #[arg(long)]
    seed: Option<u64>,

    /// Number of trees
    #[arg(long)]
    n_estimators: Option<usize>,

    /// Maximum tree depth (unlimited by default)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Field delimiter for CSV input
    #[arg(long)]
    csv_delimiter: Option<char>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(data) = self.data {
            config.data_path = data;
        }
        if let Some(uri) = self.tracking_uri {
            config.tracking_uri = uri;
        }
        if let Some(token) = self.tracking_token {
            config.tracking_token = Some(token);
        }
        if let Some(experiment) = self.experiment {
            config.experiment_name = experiment;
        }
        if let Some(run_name) = self.run_name {
            config.run_name = Some(run_name);
        }
        if let Some(test_size) = self.test_size {
            config.test_size = test_size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
            config.forest.seed = seed;
        }
        if let Some(n) = self.n_estimators {
            config.forest.n_estimators = n;
        }
        if let Some(depth) = self.max_depth {
            config.forest.max_depth = Some(depth);
        }
        if let Some(delimiter) = self.csv_delimiter {
            config.csv_delimiter = delimiter;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Инициализация логирования: RUST_LOG имеет приоритет над --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::info!("A23 trainer v{}", env!("CARGO_PKG_VERSION"));

    let config = args.into_config()?;
    let pipeline = TrainingPipeline::new(config).context("Invalid pipeline configuration")?;
    tracing::info!("Loading dataset from {}", pipeline.config().data_path.display());

    let outcome = pipeline.run().context("Training pipeline failed")?;

    tracing::info!(
        "Rows: {} loaded, {} after cleaning, {} train / {} test",
        outcome.rows_loaded,
        outcome.rows_clean,
        outcome.train_size,
        outcome.test_size
    );
    tracing::info!("MSE: {:.4}", outcome.metrics.mse);
    tracing::info!("R2: {:.4}", outcome.metrics.r2);
    tracing::info!("Artifacts: {}", outcome.artifact_uri);
    println!("{}", outcome.run_id);

    Ok(())
}
