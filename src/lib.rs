#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

//! # Voidground
//!
//! A small HTTP service that removes the background of an uploaded image and
//! answers with a transparent PNG.
//!
//! The service owns request handling, decoding, RGBA normalization, PNG
//! encoding and the cross-origin policy. Foreground extraction itself sits
//! behind the [`ForegroundExtractor`] trait: the bundled ONNX Runtime adapter
//! runs a U²-Net style segmentation model, and stub extractors cover tests
//! and smoke checks.
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime extractor
//! - `cli` (default): `voidground` binary and tracing subscriber setup
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`: JSON log output
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voidground::{remove_background_from_bytes, IdentityExtractor};
//!
//! # fn example() -> voidground::Result<()> {
//! let upload = std::fs::read("portrait.jpg")?;
//! let result = remove_background_from_bytes(&upload, Arc::new(IdentityExtractor))?;
//! std::fs::write("portrait.png", result.into_bytes())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Serving
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voidground::{serve, IdentityExtractor, ServerConfig};
//!
//! # async fn example() -> voidground::Result<()> {
//! let config = ServerConfig::builder().host("0.0.0.0").port(8000).build()?;
//! serve(config, Arc::new(IdentityExtractor)).await
//! # }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;

#[cfg(feature = "onnx")]
pub use backends::{OnnxExtractor, OnnxSettings};
pub use backends::{FailingExtractor, FixedAlphaExtractor, IdentityExtractor, RecordingExtractor};
pub use config::{CorsConfig, PipelineConfig, ServerConfig, ServerConfigBuilder};
pub use error::{BgRemovalError, Result};
pub use extractor::{ForegroundExtractor, SharedExtractor};
pub use pipeline::{remove_background_from_bytes, ConversionPipeline};
pub use server::{build_app, serve, serve_with_shutdown};
pub use services::ImageCodec;
pub use tracing_config::{TracingConfig, TracingFormat};
pub use types::{DecodedImage, ImageRequest, ResultImage};
