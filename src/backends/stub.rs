//! Model-free extractors
//!
//! These implement `ForegroundExtractor` without any inference so the
//! service can be exercised deterministically: in tests, and through the
//! `passthrough` backend when smoke-testing a deployment.

use crate::{
    error::{BgRemovalError, Result},
    extractor::ForegroundExtractor,
};
use image::RgbaImage;
use std::sync::{Arc, Mutex};

/// Returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityExtractor;

impl ForegroundExtractor for IdentityExtractor {
    fn name(&self) -> &str {
        "identity"
    }

    fn extract(&self, image: RgbaImage) -> Result<RgbaImage> {
        Ok(image)
    }
}

/// Overwrites every pixel's alpha with a constant, keeping RGB
#[derive(Debug, Clone, Copy)]
pub struct FixedAlphaExtractor {
    alpha: u8,
}

impl FixedAlphaExtractor {
    #[must_use]
    pub fn new(alpha: u8) -> Self {
        Self { alpha }
    }

    #[must_use]
    pub fn alpha(&self) -> u8 {
        self.alpha
    }
}

impl ForegroundExtractor for FixedAlphaExtractor {
    fn name(&self) -> &str {
        "fixed-alpha"
    }

    fn extract(&self, mut image: RgbaImage) -> Result<RgbaImage> {
        for pixel in image.pixels_mut() {
            pixel[3] = self.alpha;
        }
        Ok(image)
    }
}

/// Always fails with the configured message
#[derive(Debug, Clone)]
pub struct FailingExtractor {
    message: String,
}

impl FailingExtractor {
    #[must_use]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ForegroundExtractor for FailingExtractor {
    fn name(&self) -> &str {
        "failing"
    }

    fn extract(&self, _image: RgbaImage) -> Result<RgbaImage> {
        Err(BgRemovalError::extraction(self.message.clone()))
    }
}

/// Wraps another extractor and records the dimensions of every call
#[derive(Clone)]
pub struct RecordingExtractor<E> {
    inner: E,
    calls: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl<E: ForegroundExtractor> RecordingExtractor<E> {
    #[must_use]
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Dimensions of each image handed to the inner extractor, in call order
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

impl<E: ForegroundExtractor> ForegroundExtractor for RecordingExtractor<E> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn extract(&self, image: RgbaImage) -> Result<RgbaImage> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(image.dimensions());
        }
        self.inner.extract(image)
    }

    fn max_concurrency(&self) -> Option<usize> {
        self.inner.max_concurrency()
    }
}
