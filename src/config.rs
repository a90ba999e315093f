//! Configuration types for the background removal service
//!
//! All configuration is built once at process start and handed to the
//! components by value; nothing here is mutated while serving.

use crate::{
    error::{BgRemovalError, Result},
    server::REQUEST_ID_HEADER,
};
use axum::http::{HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

const WILDCARD: &str = "*";

/// Cross-origin policy applied to every response
///
/// Field names serialize to the keys of the service's legacy config file
/// (`ALLOW_ORIGINS`, `ALLOW_METHODS`, ...), so an existing config can be
/// loaded unchanged with [`CorsConfig::from_json_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any origin
    pub allow_origins: Vec<String>,
    /// Allowed HTTP methods; `"*"` allows any method
    pub allow_methods: Vec<String>,
    /// Allowed request headers; `"*"` allows any header
    pub allow_headers: Vec<String>,
    /// Whether credentialed cross-origin requests are permitted
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds (header omitted when `None`)
    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec![WILDCARD.to_string()],
            allow_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_headers: vec!["Content-Type".to_string(), "Set-Cookie".to_string()],
            allow_credentials: true,
            max_age_secs: None,
        }
    }
}

impl CorsConfig {
    /// Parse a JSON document using the legacy config keys
    ///
    /// Missing keys fall back to the defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BgRemovalError::invalid_config(format!("Invalid CORS config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON CORS config file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BgRemovalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read CORS config '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&content)
    }

    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allow_origins.iter().any(|o| o == WILDCARD)
    }

    /// Wildcard origin combined with credentialed requests.
    ///
    /// Browsers reject `Access-Control-Allow-Origin: *` on credentialed
    /// requests, so this combination cannot be honored literally. The layer
    /// built by [`CorsConfig::to_layer`] reflects the request's `Origin`
    /// instead, which admits every origin *with* credentials. Callers that
    /// consider that too permissive can refuse the config on this check.
    #[must_use]
    pub fn wildcard_with_credentials(&self) -> bool {
        self.allow_credentials && self.allows_any_origin()
    }

    /// Check that every origin, method and header is well-formed
    pub fn validate(&self) -> Result<()> {
        self.parsed_origins()?;
        self.parsed_methods()?;
        self.parsed_headers()?;
        Ok(())
    }

    fn parsed_origins(&self) -> Result<Vec<HeaderValue>> {
        self.allow_origins
            .iter()
            .filter(|o| o.as_str() != WILDCARD)
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| {
                    BgRemovalError::invalid_config(format!("Invalid CORS origin: {origin:?}"))
                })
            })
            .collect()
    }

    fn parsed_methods(&self) -> Result<Vec<Method>> {
        self.allow_methods
            .iter()
            .filter(|m| m.as_str() != WILDCARD)
            .map(|method| {
                Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
                    BgRemovalError::invalid_config(format!("Invalid CORS method: {method:?}"))
                })
            })
            .collect()
    }

    fn parsed_headers(&self) -> Result<Vec<HeaderName>> {
        self.allow_headers
            .iter()
            .filter(|h| h.as_str() != WILDCARD)
            .map(|header| {
                HeaderName::from_bytes(header.trim().as_bytes()).map_err(|_| {
                    BgRemovalError::invalid_config(format!("Invalid CORS header: {header:?}"))
                })
            })
            .collect()
    }

    /// Build the `tower-http` layer enforcing this policy
    ///
    /// Wildcards become "any" for anonymous requests. With credentials
    /// enabled they become "mirror the request", since `*` is not a valid
    /// answer to a credentialed request.
    pub fn to_layer(&self) -> Result<CorsLayer> {
        let credentials = self.allow_credentials;

        let origin = if self.allows_any_origin() {
            if credentials {
                AllowOrigin::mirror_request()
            } else {
                AllowOrigin::any()
            }
        } else {
            AllowOrigin::list(self.parsed_origins()?)
        };

        let methods = if self.allow_methods.iter().any(|m| m == WILDCARD) {
            if credentials {
                AllowMethods::mirror_request()
            } else {
                AllowMethods::any()
            }
        } else {
            AllowMethods::list(self.parsed_methods()?)
        };

        let headers = if self.allow_headers.iter().any(|h| h == WILDCARD) {
            if credentials {
                AllowHeaders::mirror_request()
            } else {
                AllowHeaders::any()
            }
        } else {
            AllowHeaders::list(self.parsed_headers()?)
        };

        let mut layer = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(credentials)
            .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]);

        if let Some(secs) = self.max_age_secs {
            layer = layer.max_age(Duration::from_secs(secs));
        }

        Ok(layer)
    }
}

/// Bounds applied while converting a single upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upper bound on the extractor call (`None` waits indefinitely)
    pub extraction_timeout: Option<Duration>,
    /// Largest accepted width or height, in pixels
    pub max_image_dimension: u32,
    /// Largest allocation the decoder may make, in bytes
    pub max_decode_alloc_bytes: u64,
    /// Conversions allowed to run at once; the rest wait for a slot
    /// (further capped by the extractor's own concurrency hint)
    pub max_concurrent_conversions: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction_timeout: Some(Duration::from_secs(120)),
            max_image_dimension: 16_384,
            max_decode_alloc_bytes: 512 * 1024 * 1024,
            max_concurrent_conversions: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

impl PipelineConfig {
    #[must_use]
    pub fn with_extraction_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_image_dimension(mut self, max: u32) -> Self {
        self.max_image_dimension = max;
        self
    }

    #[must_use]
    pub fn with_max_decode_alloc_bytes(mut self, max: u64) -> Self {
        self.max_decode_alloc_bytes = max;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_conversions(mut self, max: usize) -> Self {
        self.max_concurrent_conversions = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.extraction_timeout == Some(Duration::ZERO) {
            return Err(BgRemovalError::invalid_config(
                "Extraction timeout must be positive (use None to disable)",
            ));
        }

        if self.max_image_dimension == 0 {
            return Err(BgRemovalError::config_value_error(
                "max image dimension",
                0,
                "1-4294967295",
                Some(16_384),
            ));
        }

        if self.max_decode_alloc_bytes == 0 {
            return Err(BgRemovalError::invalid_config(
                "Decoder allocation limit must be positive",
            ));
        }

        if self.max_concurrent_conversions == 0 {
            return Err(BgRemovalError::config_value_error(
                "max concurrent conversions",
                0,
                "1-usize::MAX",
                Some(default_concurrency()),
            ));
        }

        Ok(())
    }
}

/// Configuration for the HTTP service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
    /// Cross-origin policy
    pub cors: CorsConfig,
    /// Per-request conversion bounds
    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
            cors: CorsConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use voidground::ServerConfig;
    ///
    /// let config = ServerConfig::builder()
    ///     .port(9000)
    ///     .max_upload_bytes(5 * 1024 * 1024)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.bind_address(), "127.0.0.1:9000");
    /// ```
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// `host:port` string suitable for binding
    #[must_use]
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Empty host
    /// - Zero upload limit
    /// - Invalid pipeline bounds or CORS entries
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(BgRemovalError::invalid_config("Host must not be empty"));
        }

        if self.max_upload_bytes == 0 {
            return Err(BgRemovalError::config_value_error(
                "max upload bytes",
                0,
                "1-usize::MAX",
                Some(20 * 1024 * 1024),
            ));
        }

        self.pipeline.validate()?;
        self.cors.validate()
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    #[must_use]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.config.pipeline = pipeline;
        self
    }

    /// Set the extraction timeout (convenience for the pipeline config)
    #[must_use]
    pub fn extraction_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pipeline.extraction_timeout = timeout;
        self
    }

    /// Set the largest accepted image side (convenience for the pipeline config)
    #[must_use]
    pub fn max_image_dimension(mut self, max: u32) -> Self {
        self.config.pipeline.max_image_dimension = max;
        self
    }

    /// Set how many conversions may run at once (convenience for the pipeline config)
    #[must_use]
    pub fn max_concurrent_conversions(mut self, max: usize) -> Self {
        self.config.pipeline.max_concurrent_conversions = max;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ServerConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
