//! Background removal server CLI
//!
//! Parses flags, installs the tracing subscriber, loads the extractor and
//! serves until interrupted.

use super::config::CliConfigBuilder;
use crate::tracing_config::{TracingConfig, TracingFormat};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, info};

/// Background removal HTTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "voidground")]
pub struct Cli {
    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Foreground extractor backend
    #[arg(short, long, value_enum, default_value_t = CliBackend::Onnx)]
    pub backend: CliBackend,

    /// Path to the ONNX segmentation model (required for the onnx backend)
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Square input size expected by the model
    #[arg(long, default_value_t = 320)]
    pub model_input_size: u32,

    /// Number of intra-op threads for inference (0 = runtime default)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Largest accepted request body, in MiB
    #[arg(long, default_value_t = 20)]
    pub max_upload_mb: usize,

    /// Per-request conversion timeout in seconds (0 disables the timeout)
    #[arg(long, default_value_t = 120)]
    pub extraction_timeout_secs: u64,

    /// Largest accepted image width or height, in pixels
    #[arg(long, default_value_t = 16_384)]
    pub max_image_dimension: u32,

    /// Conversions allowed to run at once (defaults to the CPU count)
    #[arg(long, value_name = "N")]
    pub max_concurrent_conversions: Option<usize>,

    /// JSON file with ALLOW_ORIGINS / ALLOW_METHODS / ALLOW_HEADERS / ALLOW_CREDENTIALS
    #[arg(long, value_name = "PATH")]
    pub cors_config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Explicit tracing filter directive (overrides -v and RUST_LOG)
    #[arg(long, value_name = "DIRECTIVE")]
    pub log_filter: Option<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    /// ONNX Runtime segmentation model
    Onnx,
    /// Return the image unchanged (smoke tests without a model)
    Passthrough,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid server configuration")?;
    let extractor = CliConfigBuilder::build_extractor(&cli).context("Failed to load extractor")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.bind_address(),
        extractor = extractor.name(),
        "Starting background removal server"
    );
    debug!(?config, "Effective configuration");

    crate::server::serve(config, extractor)
        .await
        .context("Server terminated with an error")
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let mut tracing = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format.into());
    if let Some(filter) = &cli.log_filter {
        tracing = tracing.with_env_filter(filter);
    }

    tracing
        .init()
        .context("Failed to initialize tracing subscriber")?;

    debug!(verbosity = cli.verbose, "Tracing initialized");
    Ok(())
}
