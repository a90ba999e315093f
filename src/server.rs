//! HTTP endpoint
//!
//! One conversion route plus a health probe, wrapped in the cross-origin,
//! request-id, tracing and body-limit layers.

use crate::{
    config::ServerConfig,
    error::{BgRemovalError, Result},
    extractor::SharedExtractor,
    pipeline::ConversionPipeline,
    tracing_config::spans,
    types::{ImageRequest, ResultImage},
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Conversion route
pub const REMOVE_BACKGROUND_PATH: &str = "/remove-background/";
/// Health probe route
pub const HEALTH_PATH: &str = "/health";
/// Response header carrying the per-request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Multipart field expected to carry the upload
pub const FILE_FIELD: &str = "file";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ConversionPipeline>,
    max_upload_bytes: usize,
}

/// Id assigned to every request, available as a request extension
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
    pub kind: String,
}

/// Health probe response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub extractor: String,
    pub version: String,
}

/// Error response wrapper
#[derive(Debug)]
pub struct ApiError(pub BgRemovalError);

impl From<BgRemovalError> for ApiError {
    fn from(err: BgRemovalError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(kind = self.0.kind(), status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(kind = self.0.kind(), status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            detail: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router serving the background-removal endpoint
///
/// # Errors
/// - Invalid server, pipeline or CORS configuration
pub fn build_app(config: &ServerConfig, extractor: SharedExtractor) -> Result<Router> {
    config.validate()?;

    let pipeline = ConversionPipeline::new(extractor, config.pipeline.clone())?;
    debug!(
        extractor = pipeline.extractor_name(),
        concurrency = pipeline.concurrency(),
        "Conversion pipeline ready"
    );
    let state = AppState {
        pipeline: Arc::new(pipeline),
        max_upload_bytes: config.max_upload_bytes,
    };

    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map_or("-", |id| id.0.as_str());
        spans::http_request(request.method().as_str(), &request.uri().to_string(), request_id)
    });

    let app = Router::new()
        .route(REMOVE_BACKGROUND_PATH, post(remove_background))
        .route(
            "/remove-background",
            post(|| async { Redirect::temporary(REMOVE_BACKGROUND_PATH) }),
        )
        .route(HEALTH_PATH, get(health))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(trace_layer)
        .layer(middleware::from_fn(assign_request_id))
        .layer(config.cors.to_layer()?)
        .with_state(state);

    Ok(app)
}

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        extractor: state.pipeline.extractor_name().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn remove_background(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            BgRemovalError::PayloadTooLarge {
                limit: state.max_upload_bytes,
            }
        } else {
            BgRemovalError::upload(rejection.body_text())
        }
    })?;

    let request = read_upload(&mut multipart, state.max_upload_bytes).await?;
    debug!(
        file_name = request.file_name.as_deref().unwrap_or("<unnamed>"),
        content_type = request.content_type.as_deref().unwrap_or("<none>"),
        bytes = request.len(),
        "Received upload"
    );

    let result = Arc::clone(&state.pipeline).convert_async(request).await?;

    Ok((
        [(header::CONTENT_TYPE, ResultImage::CONTENT_TYPE)],
        result.into_bytes(),
    )
        .into_response())
}

/// Pick the uploaded file out of the multipart body
///
/// The part named `file` wins; otherwise the first part carrying a filename.
async fn read_upload(multipart: &mut Multipart, limit: usize) -> Result<ImageRequest> {
    let mut fallback: Option<ImageRequest> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let is_file_field = field.name() == Some(FILE_FIELD);
        if !is_file_field && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;

        let mut request = ImageRequest::new(bytes.to_vec());
        request.file_name = file_name;
        request.content_type = content_type;

        if is_file_field {
            return Ok(request);
        }
        fallback = Some(request);
    }

    fallback.ok_or_else(|| BgRemovalError::MissingFile(FILE_FIELD.to_string()))
}

fn multipart_error(err: MultipartError, limit: usize) -> BgRemovalError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        BgRemovalError::PayloadTooLarge { limit }
    } else {
        BgRemovalError::upload(err.body_text())
    }
}

/// Bind the configured address and serve until Ctrl-C or SIGTERM
///
/// # Errors
/// - Invalid configuration
/// - Failure to bind the listening socket
pub async fn serve(config: ServerConfig, extractor: SharedExtractor) -> Result<()> {
    let app = build_app(&config, extractor)?;
    let listener = TcpListener::bind(config.bind_address()).await?;

    if config.cors.wildcard_with_credentials() {
        warn!(
            "CORS allows any origin together with credentials; \
             the request Origin is reflected, so every site may send credentialed requests"
        );
    }

    serve_with_shutdown(listener, app, shutdown_signal()).await
}

/// Serve an already-built router on a bound listener until `shutdown` resolves
///
/// # Errors
/// - I/O failures of the listening socket
pub async fn serve_with_shutdown<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(address = %listener.local_addr()?, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
