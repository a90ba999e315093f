//! ONNX Runtime adapter for salient-object segmentation models
//!
//! Wraps a U²-Net style model (one RGB input, first output is a
//! single-channel saliency map) behind `ForegroundExtractor`. The model
//! weights and the runtime stay opaque; this module only moves pixels into a
//! tensor and the predicted map back into the alpha channel.

use crate::{
    error::{BgRemovalError, Result},
    extractor::ForegroundExtractor,
};
use image::{imageops::FilterType, GrayImage, Luma, RgbaImage};
use ndarray::{Array4, ArrayView2, Axis, Ix4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Model-specific preprocessing and runtime options
#[derive(Debug, Clone, PartialEq)]
pub struct OnnxSettings {
    /// Path to the `.onnx` model file
    pub model_path: PathBuf,
    /// Square input edge the model expects, in pixels
    pub input_size: u32,
    /// Per-channel normalization mean (RGB, 0..1 scale)
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub std: [f32; 3],
    /// Intra-op thread count (0 = let ONNX Runtime decide)
    pub intra_threads: usize,
}

impl OnnxSettings {
    /// Settings for the general-purpose U²-Net model (320×320, ImageNet stats)
    #[must_use]
    pub fn u2net<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: 320,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            intra_threads: 0,
        }
    }

    #[must_use]
    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    #[must_use]
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(BgRemovalError::config_value_error(
                "model input size",
                0,
                "1-4096",
                Some(320),
            ));
        }

        if self.std.iter().any(|s| *s <= 0.0) {
            return Err(BgRemovalError::invalid_config(
                "Normalization std values must be positive",
            ));
        }

        if !self.model_path.is_file() {
            return Err(BgRemovalError::model(format!(
                "Model file not found: {}",
                self.model_path.display()
            )));
        }

        Ok(())
    }
}

/// Foreground extractor backed by an ONNX Runtime session
pub struct OnnxExtractor {
    session: Mutex<Session>,
    settings: OnnxSettings,
    name: String,
}

impl std::fmt::Debug for OnnxExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxExtractor")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OnnxExtractor {
    /// Load the model and create the inference session
    ///
    /// # Errors
    /// - Invalid settings or missing model file
    /// - ONNX Runtime session creation failures
    pub fn new(settings: OnnxSettings) -> Result<Self> {
        settings.validate()?;
        let load_start = Instant::now();

        let mut builder = Session::builder()
            .map_err(|e| BgRemovalError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to set optimization level: {e}"))
            })?;

        if settings.intra_threads > 0 {
            builder = builder
                .with_intra_threads(settings.intra_threads)
                .map_err(|e| BgRemovalError::model(format!("Failed to set intra threads: {e}")))?;
        }

        let session = builder.commit_from_file(&settings.model_path).map_err(|e| {
            BgRemovalError::model(format!(
                "Failed to load model '{}': {e}",
                settings.model_path.display()
            ))
        })?;

        let stem = settings
            .model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        let name = format!("onnx:{stem}");

        info!(
            model = %settings.model_path.display(),
            input_size = settings.input_size,
            load_ms = load_start.elapsed().as_millis() as u64,
            "ONNX model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            settings,
            name,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &OnnxSettings {
        &self.settings
    }

    /// Resize to the model's square input and normalize into an NCHW tensor
    ///
    /// Channels are scaled by the brightest channel value in the resized
    /// image before mean/std normalization.
    #[allow(clippy::indexing_slicing)] // c < 3 by construction of the tensor shape
    fn to_input_tensor(image: &RgbaImage, settings: &OnnxSettings) -> Array4<f32> {
        let size = settings.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Lanczos3);

        let max_value = resized
            .pixels()
            .flat_map(|p| p.0[..3].iter().copied())
            .max()
            .map_or(1.0, |m| f32::from(m).max(1e-6));

        let edge = size as usize;
        Array4::from_shape_fn((1, 3, edge, edge), |(_, c, y, x)| {
            let value = f32::from(resized.get_pixel(x as u32, y as u32)[c]);
            (value / max_value - settings.mean[c]) / settings.std[c]
        })
    }

    /// Min-max normalize the predicted map and scale it to the source size
    fn mask_from_prediction(prediction: ArrayView2<'_, f32>, width: u32, height: u32) -> GrayImage {
        let (rows, cols) = prediction.dim();
        let (min, max) = prediction
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let range = max - min;

        let small = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
            let raw = prediction
                .get((y as usize, x as usize))
                .copied()
                .unwrap_or(0.0);
            let normalized = if range > f32::EPSILON {
                (raw - min) / range
            } else {
                raw.clamp(0.0, 1.0)
            };
            Luma([(normalized * 255.0).round().clamp(0.0, 255.0) as u8])
        });

        image::imageops::resize(&small, width, height, FilterType::Lanczos3)
    }

    /// Write the mask into the alpha channel
    ///
    /// Existing transparency is kept (alpha is multiplied, never raised), and
    /// fully transparent pixels are cleared to `[0, 0, 0, 0]`.
    fn apply_alpha_mask(mut image: RgbaImage, mask: &GrayImage) -> RgbaImage {
        for (pixel, mask_value) in image.pixels_mut().zip(mask.pixels()) {
            let alpha = (u16::from(pixel[3]) * u16::from(mask_value[0]) + 127) / 255;
            if alpha == 0 {
                pixel.0 = [0, 0, 0, 0];
            } else {
                pixel[3] = alpha as u8;
            }
        }
        image
    }

    fn predict(&self, tensor: Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
        let input = Value::from_array(tensor).map_err(|e| {
            BgRemovalError::extraction(format!("Failed to convert input tensor: {e}"))
        })?;

        let mut session = lock_session(&self.session);

        let inference_start = Instant::now();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| BgRemovalError::extraction(format!("ONNX inference failed: {e}")))?;
        debug!(
            inference_ms = inference_start.elapsed().as_millis() as u64,
            "ONNX inference finished"
        );

        // First output holds the finest saliency map for U²-Net models
        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| BgRemovalError::extraction("Model produced no outputs"))?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| BgRemovalError::extraction("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgRemovalError::extraction(format!("Failed to extract output tensor: {e}"))
            })?;

        let output = output.into_dimensionality::<Ix4>().map_err(|e| {
            BgRemovalError::extraction(format!("Expected 4D output tensor: {e}"))
        })?;
        if output.shape().first() == Some(&0) || output.shape().get(1) == Some(&0) {
            return Err(BgRemovalError::extraction("Output tensor is empty"));
        }

        let prediction = output.index_axis(Axis(0), 0);
        let prediction = prediction.index_axis(Axis(0), 0);
        Ok(Self::mask_from_prediction(prediction, width, height))
    }
}

impl ForegroundExtractor for OnnxExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, image), fields(model = %self.name, width = image.width(), height = image.height()))]
    fn extract(&self, image: RgbaImage) -> Result<RgbaImage> {
        let (width, height) = image.dimensions();
        let tensor = Self::to_input_tensor(&image, &self.settings);
        let mask = self.predict(tensor, width, height)?;
        Ok(Self::apply_alpha_mask(image, &mask))
    }

    fn max_concurrency(&self) -> Option<usize> {
        // One session, one run at a time
        Some(1)
    }
}

/// Take the session lock, recovering it if an earlier run panicked
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(|poisoned| {
        warn!("ONNX session lock poisoned by a panicked run, recovering");
        session.clear_poison();
        PoisonError::into_inner(poisoned)
    })
}
