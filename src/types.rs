//! Per-request data carried through the conversion pipeline

use image::{ColorType, DynamicImage, ImageFormat};

/// Raw upload as received by the endpoint
#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    /// Uploaded file content
    pub bytes: Vec<u8>,
    /// Filename reported by the multipart part, if any (logging only)
    pub file_name: Option<String>,
    /// Content type reported by the multipart part, if any (logging only)
    pub content_type: Option<String>,
}

impl ImageRequest {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: None,
            content_type: None,
        }
    }

    #[must_use]
    pub fn with_file_name<S: Into<String>>(mut self, file_name: S) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    #[must_use]
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Size of the upload in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Image decoded from an upload, before color normalization
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Decoded pixels in their source color model
    pub image: DynamicImage,
    /// Container format detected from the content
    pub format: ImageFormat,
}

impl DecodedImage {
    /// Color model of the source, before RGBA normalization
    #[must_use]
    pub fn color_type(&self) -> ColorType {
        self.image.color()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Encoded output of one pipeline run
#[derive(Debug, Clone)]
pub struct ResultImage {
    /// PNG byte stream
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ResultImage {
    /// MIME type of the encoded bytes
    pub const CONTENT_TYPE: &'static str = "image/png";

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Consume the result, yielding the encoded bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.png
    }
}
