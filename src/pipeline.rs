//! Image conversion pipeline
//!
//! One request flows through four steps: decode the uploaded bytes, normalize
//! to RGBA, hand the buffer to the foreground extractor, encode the result as
//! PNG. Each step fails with its own error kind so the HTTP layer can map it
//! to a status code.
//!
//! Async conversions wait for one of a fixed number of slots before any work
//! starts, and skip the extractor once their deadline has passed, so callers
//! that already timed out do not keep the extractor busy.

use crate::{
    config::PipelineConfig,
    error::{BgRemovalError, Result},
    extractor::SharedExtractor,
    services::ImageCodec,
    tracing_config::spans,
    types::{ImageRequest, ResultImage},
};
use image::RgbaImage;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};

/// Runs decode → normalize → extract → encode for single uploads
pub struct ConversionPipeline {
    extractor: SharedExtractor,
    codec: ImageCodec,
    config: PipelineConfig,
    slots: Arc<Semaphore>,
    concurrency: usize,
}

impl std::fmt::Debug for ConversionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPipeline")
            .field("extractor", &self.extractor.name())
            .field("config", &self.config)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl ConversionPipeline {
    /// Create a pipeline around an extractor
    ///
    /// # Errors
    /// - Invalid pipeline configuration
    pub fn new(extractor: SharedExtractor, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(extractor, config))
    }

    /// Pipeline with default limits and timeout
    #[must_use]
    pub fn with_defaults(extractor: SharedExtractor) -> Self {
        Self::assemble(extractor, PipelineConfig::default())
    }

    fn assemble(extractor: SharedExtractor, config: PipelineConfig) -> Self {
        let concurrency = extractor
            .max_concurrency()
            .map_or(config.max_concurrent_conversions, |hint| {
                hint.min(config.max_concurrent_conversions)
            })
            .max(1);

        Self {
            codec: ImageCodec::new(&config),
            slots: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            extractor,
            config,
        }
    }

    #[must_use]
    pub fn extractor_name(&self) -> &str {
        self.extractor.name()
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of async conversions allowed to run at once
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Convert one upload synchronously on the calling thread
    ///
    /// # Errors
    /// - `Decode` when the bytes are empty, unrecognized, corrupt or too large;
    ///   the extractor is not called in that case
    /// - `Extraction` when the extractor fails, panics or changes the
    ///   image dimensions
    /// - `Encode` when the PNG encoder fails
    pub fn convert(&self, request: &ImageRequest) -> Result<ResultImage> {
        self.convert_until(request, None)
    }

    fn convert_until(
        &self,
        request: &ImageRequest,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<ResultImage> {
        let total_start = Instant::now();

        let decode_start = Instant::now();
        let decoded = self.codec.decode(&request.bytes)?;
        let source_format = decoded.format;
        let rgba = ImageCodec::normalize(decoded);
        let decode_ms = decode_start.elapsed().as_millis();

        let (width, height) = rgba.dimensions();

        if let Some((at, limit)) = deadline {
            if Instant::now() >= at {
                debug!(
                    extractor = self.extractor.name(),
                    "Deadline passed before extraction, skipping"
                );
                return Err(BgRemovalError::ExtractionTimeout(limit));
            }
        }

        let extract_start = Instant::now();
        let extracted = self.run_extractor(rgba)?;
        let extract_ms = extract_start.elapsed().as_millis();

        if extracted.dimensions() != (width, height) {
            let (out_w, out_h) = extracted.dimensions();
            return Err(BgRemovalError::extraction(format!(
                "Extractor '{}' returned {out_w}x{out_h} for a {width}x{height} input",
                self.extractor.name()
            )));
        }

        let encode_start = Instant::now();
        let png = ImageCodec::encode_png(&extracted)?;
        let encode_ms = encode_start.elapsed().as_millis();

        info!(
            file_name = request.file_name.as_deref().unwrap_or("<unnamed>"),
            format = ?source_format,
            width,
            height,
            input_bytes = request.len(),
            output_bytes = png.len(),
            total_ms = total_start.elapsed().as_millis() as u64,
            "Background removed"
        );
        debug!(
            decode_ms = decode_ms as u64,
            extract_ms = extract_ms as u64,
            encode_ms = encode_ms as u64,
            "Conversion timings"
        );

        Ok(ResultImage { png, width, height })
    }

    fn run_extractor(&self, rgba: RgbaImage) -> Result<RgbaImage> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.extractor.extract(rgba)));
        match outcome {
            Ok(result) => result.map_err(BgRemovalError::into_extraction),
            Err(payload) => Err(BgRemovalError::extraction(format!(
                "Extractor '{}' panicked: {}",
                self.extractor.name(),
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Convert one upload on Tokio's blocking pool
    ///
    /// The request first waits for a conversion slot, then runs on the
    /// blocking pool. The configured timeout covers both. A request that
    /// times out while queued never starts; one that times out mid-flight
    /// skips the extractor if it has not reached it yet, otherwise it runs to
    /// completion with its result discarded.
    ///
    /// # Errors
    /// Same as [`ConversionPipeline::convert`], plus `ExtractionTimeout`.
    pub async fn convert_async(self: Arc<Self>, request: ImageRequest) -> Result<ResultImage> {
        let span = spans::conversion(self.extractor.name(), request.len());
        let timeout = self.config.extraction_timeout;
        let deadline = timeout.map(|limit| (Instant::now() + limit, limit));

        let work = Arc::clone(&self).run_in_slot(request, deadline, span.clone());

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, work).instrument(span).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        extractor = self.extractor.name(),
                        timeout_ms = limit.as_millis() as u64,
                        available_slots = self.slots.available_permits(),
                        "Conversion timed out"
                    );
                    Err(BgRemovalError::ExtractionTimeout(limit))
                },
            },
            None => work.instrument(span).await,
        }
    }

    async fn run_in_slot(
        self: Arc<Self>,
        request: ImageRequest,
        deadline: Option<(Instant, Duration)>,
        span: tracing::Span,
    ) -> Result<ResultImage> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| BgRemovalError::internal("Conversion slots closed"))?;

        let task = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            span.in_scope(|| self.convert_until(&request, deadline))
        });

        task.await.map_err(|e| {
            if e.is_panic() {
                BgRemovalError::extraction(format!(
                    "Conversion panicked: {}",
                    panic_message(e.into_panic().as_ref())
                ))
            } else {
                BgRemovalError::internal(format!("Conversion task failed: {e}"))
            }
        })?
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Remove the background of one encoded image with default settings
///
/// # Errors
/// See [`ConversionPipeline::convert`].
pub fn remove_background_from_bytes(
    bytes: &[u8],
    extractor: SharedExtractor,
) -> Result<ResultImage> {
    ConversionPipeline::with_defaults(extractor).convert(&ImageRequest::new(bytes.to_vec()))
}
