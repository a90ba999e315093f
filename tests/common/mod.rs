//! Shared helpers for the integration tests

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tower::ServiceExt;
use voidground::{build_app, ForegroundExtractor, Result, ServerConfig};

pub(crate) const BOUNDARY: &str = "voidground-test-boundary";

/// Encode an image in the given container format
pub(crate) fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("fixture encoding");
    bytes
}

/// Gradient RGB image, so JPEG output is not a single flat block
pub(crate) fn gradient_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    })
}

pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(gradient_rgb(width, height)), ImageFormat::Jpeg)
}

pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(gradient_rgb(width, height)), ImageFormat::Png)
}

pub(crate) fn decode_png(bytes: &[u8]) -> RgbaImage {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .expect("response must be a PNG");
    assert_eq!(image.color(), image::ColorType::Rgba8);
    image.into_rgba8()
}

/// One part of a multipart/form-data body
pub(crate) struct Part<'a> {
    pub(crate) name: &'a str,
    pub(crate) file_name: Option<&'a str>,
    pub(crate) content_type: Option<&'a str>,
    pub(crate) bytes: &'a [u8],
}

impl<'a> Part<'a> {
    pub(crate) fn file(name: &'a str, file_name: &'a str, bytes: &'a [u8]) -> Self {
        Self {
            name,
            file_name: Some(file_name),
            content_type: Some("application/octet-stream"),
            bytes,
        }
    }

    pub(crate) fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: None,
            bytes: value.as_bytes(),
        }
    }
}

pub(crate) fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(file_name) = part.file_name {
            disposition.push_str(&format!("; filename=\"{file_name}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub(crate) fn upload_request(path: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::post(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("valid request")
}

pub(crate) fn upload_file(bytes: &[u8]) -> Request<Body> {
    upload_request(
        "/remove-background/",
        &[Part::file("file", "upload.jpg", bytes)],
    )
}

pub(crate) fn app<E: ForegroundExtractor + 'static>(extractor: E) -> Router {
    app_with(ServerConfig::default(), extractor)
}

pub(crate) fn app_with<E: ForegroundExtractor + 'static>(config: ServerConfig, extractor: E) -> Router {
    build_app(&config, Arc::new(extractor)).expect("valid test configuration")
}

pub(crate) struct TestResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl TestResponse {
    pub(crate) fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub(crate) async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.expect("infallible router");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Sleeps before returning its input unchanged
pub(crate) struct SlowExtractor(pub(crate) Duration);

impl ForegroundExtractor for SlowExtractor {
    fn name(&self) -> &str {
        "slow"
    }

    fn extract(&self, image: RgbaImage) -> Result<RgbaImage> {
        std::thread::sleep(self.0);
        Ok(image)
    }
}

/// Keeps the left half of the image, clears the right half
pub(crate) struct LeftHalfExtractor;

impl ForegroundExtractor for LeftHalfExtractor {
    fn name(&self) -> &str {
        "left-half"
    }

    fn extract(&self, mut image: RgbaImage) -> Result<RgbaImage> {
        let half = image.width() / 2;
        for (x, _, pixel) in image.enumerate_pixels_mut() {
            if x >= half {
                pixel.0 = [0, 0, 0, 0];
            }
        }
        Ok(image)
    }
}

/// Runs one extraction at a time behind a lock and counts every run
#[derive(Clone)]
pub(crate) struct SerializedExtractor {
    delay: Duration,
    lock: Arc<Mutex<()>>,
    runs: Arc<AtomicUsize>,
}

impl SerializedExtractor {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            lock: Arc::new(Mutex::new(())),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl ForegroundExtractor for SerializedExtractor {
    fn name(&self) -> &str {
        "serialized"
    }

    fn extract(&self, image: RgbaImage) -> Result<RgbaImage> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.runs.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(image)
    }

    fn max_concurrency(&self) -> Option<usize> {
        Some(1)
    }
}
