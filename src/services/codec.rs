//! Image codec service
//!
//! Thin layer over the `image` crate: content-sniffed decoding with
//! resource limits, RGBA normalization and in-memory PNG encoding.

use crate::{
    config::PipelineConfig,
    error::{BgRemovalError, Result},
    types::DecodedImage,
};
use image::{error::ImageError, ImageFormat, ImageReader, Limits, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Decoder/encoder pair used by the conversion pipeline
#[derive(Debug, Clone)]
pub struct ImageCodec {
    max_image_dimension: u32,
    max_decode_alloc_bytes: u64,
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl ImageCodec {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_image_dimension: config.max_image_dimension,
            max_decode_alloc_bytes: config.max_decode_alloc_bytes,
        }
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_image_dimension);
        limits.max_image_height = Some(self.max_image_dimension);
        limits.max_alloc = Some(self.max_decode_alloc_bytes);
        limits
    }

    /// Decode an uploaded byte sequence
    ///
    /// The format is detected from the content; filenames and declared
    /// content types are never consulted.
    ///
    /// # Errors
    /// - Empty input
    /// - Unrecognized, unsupported, truncated or corrupt data
    /// - Image dimensions or allocation beyond the configured limits
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::decode("Upload is empty"));
        }

        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BgRemovalError::decode(format!("Failed to read image header: {e}")))?;

        let format = reader
            .format()
            .ok_or_else(|| BgRemovalError::decode("Unrecognized image format"))?;
        reader.limits(self.limits());

        let image = reader.decode().map_err(|e| match e {
            ImageError::Limits(limit) => {
                BgRemovalError::decode(format!("Image exceeds decoder limits: {limit}"))
            },
            ImageError::Unsupported(unsupported) => {
                BgRemovalError::decode(format!("Unsupported image: {unsupported}"))
            },
            other => BgRemovalError::decode(format!("Failed to decode {format:?} image: {other}")),
        })?;

        debug!(
            format = ?format,
            color = ?image.color(),
            width = image.width(),
            height = image.height(),
            "Decoded upload"
        );

        Ok(DecodedImage { image, format })
    }

    /// Convert to 4-channel RGBA8
    ///
    /// Sources without an alpha channel get a fully opaque one; 16-bit and
    /// float sources are scaled down to 8 bits per channel.
    #[must_use]
    pub fn normalize(decoded: DecodedImage) -> RgbaImage {
        decoded.image.into_rgba8()
    }

    /// Serialize an RGBA buffer as PNG, entirely in memory
    ///
    /// # Errors
    /// - PNG encoder failures (e.g. zero-sized buffers)
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut png_buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png_buffer), ImageFormat::Png)
            .map_err(|e| BgRemovalError::encode(format!("Failed to encode PNG: {e}")))?;
        Ok(png_buffer)
    }
}
