//! LeafScan
//!
//! Plant leaf disease recognition from a single photo.
//!
//! `leafscan predict` classifies one image from disk; `leafscan serve` exposes
//! the same pipeline over HTTP.

use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use leafscan_classifiers::{InferencePipeline, LeafScanConfig, ModelSource};
use leafscan_server::{create_router, AppState};
use metrics_exporter_prometheus::PrometheusHandle;
use std::cmp::Ordering;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "leafscan")]
#[command(about = "Recognize plant leaf diseases from photos", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "leafscan.yaml")]
    config: PathBuf,

    /// Download the model from this URL
    #[arg(long, global = true, env = "LEAFSCAN_MODEL_URL")]
    model_url: Option<String>,

    /// Load the model from a local ONNX file
    #[arg(long, global = true, env = "LEAFSCAN_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Expected SHA-256 of the model artifact
    #[arg(long, global = true)]
    model_sha256: Option<String>,

    /// Label table path
    #[arg(long, global = true)]
    labels: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a single image file
    Predict {
        /// Image to classify (JPEG, PNG, GIF, BMP, WebP or TIFF)
        image: PathBuf,

        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the HTTP prediction server
    Serve {
        /// Listen address
        #[arg(short = 'l', long, default_value = "0.0.0.0")]
        listen: String,

        /// Listen port
        #[arg(short = 'P', long, default_value = "8080")]
        port: u16,

        /// Defer the model download to the first request
        #[arg(long)]
        lazy: bool,

        /// Maximum upload size in megabytes
        #[arg(long, default_value = "20")]
        max_upload_mb: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    init_tracing(cli.verbose);

    let source = resolve_source_override(
        cli.model_url
            .clone()
            .zip(matches.value_source("model_url")),
        cli.model_path
            .clone()
            .zip(matches.value_source("model_path")),
    )?;
    let config = load_config(&cli, source)?;
    match &config.model.source {
        Some(source) => info!("Model source: {}", source.location()),
        None => warn!("No model source configured; set model.source, --model-path or --model-url"),
    }
    info!("Label table: {}", config.labels.path.display());

    match cli.command {
        Commands::Predict { ref image, json } => predict(&config, image, json).await,
        Commands::Serve {
            ref listen,
            port,
            lazy,
            max_upload_mb,
        } => serve(&config, listen, port, lazy, max_upload_mb).await,
    }
}

/// Pick the model source requested by `--model-url` / `--model-path`.
///
/// When both are present, a value given on the command line beats one taken
/// from the environment. Two values from the same place are ambiguous.
fn resolve_source_override(
    url: Option<(String, ValueSource)>,
    path: Option<(PathBuf, ValueSource)>,
) -> Result<Option<ModelSource>> {
    match (url, path) {
        (None, None) => Ok(None),
        (Some((url, _)), None) => Ok(Some(ModelSource::url(url))),
        (None, Some((path, _))) => Ok(Some(ModelSource::local(path))),
        (Some((url, url_from)), Some((path, path_from))) => match url_from.cmp(&path_from) {
            Ordering::Greater => Ok(Some(ModelSource::url(url))),
            Ordering::Less => Ok(Some(ModelSource::local(path))),
            Ordering::Equal => anyhow::bail!(
                "--model-url and --model-path were both given; pick one model source"
            ),
        },
    }
}

/// Load the config file (or defaults) and apply command-line overrides
fn load_config(cli: &Cli, source: Option<ModelSource>) -> Result<LeafScanConfig> {
    let mut config = LeafScanConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    if let Some(source) = source {
        config.model.source = Some(source);
    }
    if let Some(digest) = &cli.model_sha256 {
        let source = config
            .model
            .source
            .take()
            .context("--model-sha256 needs a model source to pin")?;
        config.model.source = Some(source.with_sha256(digest.clone()));
    }
    if let Some(labels) = &cli.labels {
        config.labels.path = labels.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn predict(config: &LeafScanConfig, image: &Path, json: bool) -> Result<()> {
    let pipeline = InferencePipeline::from_config(config)?;

    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    let prediction = pipeline.predict_bytes(&bytes).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
    } else {
        println!("Disease: {}", prediction.label.name);
        println!("Cause:   {}", prediction.label.cause);
        println!("Cure:    {}", prediction.label.cure);
    }
    Ok(())
}

async fn serve(
    config: &LeafScanConfig,
    listen: &str,
    port: u16,
    lazy: bool,
    max_upload_mb: usize,
) -> Result<()> {
    info!("Starting LeafScan server");

    let metrics_handle = init_metrics()?;

    let pipeline = InferencePipeline::from_config(config)?;
    info!("Label table loaded: {} classes", pipeline.labels().len());

    if lazy {
        info!("Model will be fetched on the first request");
    } else {
        info!("Fetching model...");
        pipeline.warm_up().await?;
        info!("Model ready");
    }

    let state = AppState::new(pipeline)
        .with_metrics(metrics_handle)
        .with_max_upload_bytes(max_upload_mb.saturating_mul(1024 * 1024));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("leafscan=debug,leafscan_classifiers=debug,leafscan_server=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("leafscan=info,leafscan_classifiers=info,leafscan_server=info")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "leafscan_requests_total",
        "Total number of prediction requests received"
    );
    metrics::describe_counter!(
        "leafscan_predictions_total",
        "Total number of predictions by outcome"
    );
    metrics::describe_histogram!(
        "leafscan_predict_latency_us",
        metrics::Unit::Microseconds,
        "Preprocess, classify and label lookup latency in microseconds"
    );
    metrics::describe_counter!(
        "leafscan_model_fetches_total",
        "Total number of model artifact fetch attempts"
    );
    metrics::describe_counter!(
        "leafscan_model_load_failures_total",
        "Total number of failed model acquisitions by kind"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
