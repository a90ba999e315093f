//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error types for every stage between the uploaded bytes and the PNG response
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (socket bind, config file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Uploaded bytes are not a decodable image
    #[error("Decode error: {0}")]
    Decode(String),

    /// The foreground extractor failed or returned an unusable buffer
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The extractor did not finish within the configured bound
    #[error("Extraction timed out after {0:?}")]
    ExtractionTimeout(std::time::Duration),

    /// The result buffer could not be serialized as PNG
    #[error("Encode error: {0}")]
    Encode(String),

    /// The multipart request body could not be parsed
    #[error("Malformed upload: {0}")]
    Upload(String),

    /// The multipart body did not contain a file part
    #[error("Missing file part '{0}' in multipart body")]
    MissingFile(String),

    /// The request body exceeded the configured upload limit
    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new extraction error
    pub fn extraction<S: Into<String>>(msg: S) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new malformed upload error
    pub fn upload<S: Into<String>>(msg: S) -> Self {
        Self::Upload(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Re-label any failure raised inside the extractor as an extraction error.
    ///
    /// Extractors are opaque, so whatever they report (model errors, I/O,
    /// their own decode problems) is a server-side failure from the caller's
    /// point of view.
    #[must_use]
    pub fn into_extraction(self) -> Self {
        match self {
            Self::Extraction(_) | Self::ExtractionTimeout(_) => self,
            other => Self::Extraction(other.to_string()),
        }
    }

    /// Stable machine-readable name of the error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Decode(_) => "decode",
            Self::Extraction(_) => "extraction",
            Self::ExtractionTimeout(_) => "extraction_timeout",
            Self::Encode(_) => "encode",
            Self::Upload(_) => "upload",
            Self::MissingFile(_) => "missing_file",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Model(_) => "model",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status code for this error kind
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Decode(_) | Self::Upload(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::MissingFile(_) => 422,
            Self::ExtractionTimeout(_) => 503,
            Self::Io(_)
            | Self::Extraction(_)
            | Self::Encode(_)
            | Self::InvalidConfig(_)
            | Self::Model(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Whether the caller sent something unusable (4xx) rather than the
    /// service failing (5xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
