//! Foreground extraction capability
//!
//! The service never looks inside segmentation. Anything that can turn an
//! RGBA buffer into an RGBA buffer whose alpha separates subject from
//! background plugs in here: a model-backed adapter in production, stubs in
//! tests.

use crate::error::Result;
use image::RgbaImage;
use std::sync::Arc;

/// Trait for foreground extractors
pub trait ForegroundExtractor: Send + Sync {
    /// Short human-readable name, reported by the health endpoint and logs
    fn name(&self) -> &str;

    /// Rewrite the alpha channel of `image` to separate foreground from
    /// background
    ///
    /// Implementations must return a buffer with the same pixel dimensions
    /// as the input. Alpha approaches 0 for background and 255 for
    /// foreground, with intermediate values on soft edges; RGB is
    /// normally preserved for foreground pixels.
    ///
    /// # Errors
    /// - Model inference failures
    /// - Any other failure internal to the extractor
    fn extract(&self, image: RgbaImage) -> Result<RgbaImage>;

    /// Largest number of `extract` calls worth running at once
    ///
    /// Extractors that serialize internally (a single model session behind
    /// a lock) report `Some(1)` so callers queue before committing work
    /// rather than inside the extractor. `None` leaves the limit to the
    /// caller's configuration.
    fn max_concurrency(&self) -> Option<usize> {
        None
    }
}

/// Extractor handle shared by all request handlers
pub type SharedExtractor = Arc<dyn ForegroundExtractor>;

impl<T: ForegroundExtractor + ?Sized> ForegroundExtractor for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn extract(&self, image: RgbaImage) -> Result<RgbaImage> {
        (**self).extract(image)
    }

    fn max_concurrency(&self) -> Option<usize> {
        (**self).max_concurrency()
    }
}

impl<T: ForegroundExtractor + ?Sized> ForegroundExtractor for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn extract(&self, image: RgbaImage) -> Result<RgbaImage> {
        (**self).extract(image)
    }

    fn max_concurrency(&self) -> Option<usize> {
        (**self).max_concurrency()
    }
}
