//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliBackend};
use crate::{
    backends::IdentityExtractor,
    config::{CorsConfig, PipelineConfig, ServerConfig},
    extractor::SharedExtractor,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};

const MIB: usize = 1024 * 1024;

/// Convert CLI arguments to the server configuration and extractor
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `ServerConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let cors = match &cli.cors_config {
            Some(path) => CorsConfig::from_json_file(path)
                .with_context(|| format!("Failed to load CORS config {}", path.display()))?,
            None => CorsConfig::default(),
        };

        let max_upload_bytes = cli
            .max_upload_mb
            .checked_mul(MIB)
            .context("Upload limit overflows")?;

        let extraction_timeout = match cli.extraction_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let mut pipeline = PipelineConfig::default()
            .with_extraction_timeout(extraction_timeout)
            .with_max_image_dimension(cli.max_image_dimension);
        if let Some(max) = cli.max_concurrent_conversions {
            pipeline = pipeline.with_max_concurrent_conversions(max);
        }

        let config = ServerConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .max_upload_bytes(max_upload_bytes)
            .cors(cors)
            .pipeline(pipeline)
            .build()
            .context("Invalid configuration")?;

        Ok(config)
    }

    /// Instantiate the selected extractor
    ///
    /// Model loading happens here, once, before the listener is bound.
    pub(crate) fn build_extractor(cli: &Cli) -> Result<SharedExtractor> {
        match cli.backend {
            CliBackend::Passthrough => Ok(Arc::new(IdentityExtractor)),
            CliBackend::Onnx => Self::build_onnx_extractor(cli),
        }
    }

    #[cfg(feature = "onnx")]
    fn build_onnx_extractor(cli: &Cli) -> Result<SharedExtractor> {
        use crate::backends::{OnnxExtractor, OnnxSettings};

        let model = cli
            .model
            .as_ref()
            .context("The onnx backend requires --model <PATH>")?;

        let settings = OnnxSettings::u2net(model)
            .with_input_size(cli.model_input_size)
            .with_intra_threads(cli.threads);
        let extractor = OnnxExtractor::new(settings)
            .with_context(|| format!("Failed to load model {}", model.display()))?;

        Ok(Arc::new(extractor))
    }

    #[cfg(not(feature = "onnx"))]
    fn build_onnx_extractor(_cli: &Cli) -> Result<SharedExtractor> {
        anyhow::bail!("ONNX backend not available. Please rebuild with --features onnx")
    }
}
