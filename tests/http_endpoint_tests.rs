//! End-to-end tests of the background-removal endpoint
//!
//! The router is driven in-process through `tower::ServiceExt::oneshot`
//! with model-free extractors.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::*;
use image::Rgba;
use std::time::Duration;
use voidground::{
    FailingExtractor, FixedAlphaExtractor, IdentityExtractor, RecordingExtractor, ServerConfig,
};

#[tokio::test]
async fn test_jpeg_upload_returns_rgba_png_of_same_size() {
    let response = send(app(IdentityExtractor), upload_file(&jpeg_bytes(100, 100))).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/png"));

    let output = decode_png(&response.body);
    assert_eq!(output.dimensions(), (100, 100));
    assert!(output.pixels().all(|p| p[3] == 255));
}

#[tokio::test]
async fn test_alpha_comes_from_the_extractor() {
    let response = send(app(FixedAlphaExtractor::new(0)), upload_file(&png_bytes(8, 8))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(decode_png(&response.body).pixels().all(|p| p[3] == 0));

    let response = send(app(LeftHalfExtractor), upload_file(&png_bytes(10, 4))).await;
    assert_eq!(response.status, StatusCode::OK);
    let output = decode_png(&response.body);
    assert_eq!(output.get_pixel(9, 0), &Rgba([0, 0, 0, 0]));
    assert_eq!(output.get_pixel(0, 0)[3], 255);
}

#[tokio::test]
async fn test_png_with_alpha_keeps_four_channels() {
    let source = image::RgbaImage::from_pixel(5, 5, Rgba([200, 100, 50, 90]));
    let bytes = encode(&image::DynamicImage::ImageRgba8(source.clone()), image::ImageFormat::Png);

    let response = send(app(IdentityExtractor), upload_file(&bytes)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(decode_png(&response.body), source);
}

#[tokio::test]
async fn test_empty_file_part_is_a_client_error() {
    let recorder = RecordingExtractor::new(IdentityExtractor);
    let response = send(app(recorder.clone()), upload_file(&[])).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "decode");
    assert_eq!(recorder.call_count(), 0);
}

#[tokio::test]
async fn test_non_image_bytes_are_rejected_without_calling_extractor() {
    let recorder = RecordingExtractor::new(IdentityExtractor);
    let response = send(
        app(recorder.clone()),
        upload_file(b"%PDF-1.7 this is a document, not a picture"),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["kind"], "decode");
    assert!(body["detail"].as_str().unwrap().starts_with("Decode error"));
    assert_eq!(recorder.call_count(), 0);
}

#[tokio::test]
async fn test_truncated_png_is_rejected() {
    let png = png_bytes(64, 64);
    let response = send(app(IdentityExtractor), upload_file(&png[..png.len() / 2])).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_dimensions_are_rejected() {
    let config = ServerConfig::builder().max_image_dimension(32).build().unwrap();
    let response = send(app_with(config, IdentityExtractor), upload_file(&png_bytes(64, 4))).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "decode");
}

#[tokio::test]
async fn test_missing_file_part_is_unprocessable() {
    let request = upload_request("/remove-background/", &[Part::text("note", "no file here")]);
    let response = send(app(IdentityExtractor), request).await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["kind"], "missing_file");
}

#[tokio::test]
async fn test_first_named_file_is_used_when_no_file_field() {
    let recorder = RecordingExtractor::new(IdentityExtractor);
    let request = upload_request(
        "/remove-background/",
        &[
            Part::text("note", "hello"),
            Part::file("image", "first.png", &png_bytes(3, 2)),
            Part::file("image", "second.png", &png_bytes(7, 7)),
        ],
    );
    let response = send(app(recorder.clone()), request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(recorder.calls(), vec![(3, 2)]);
}

#[tokio::test]
async fn test_file_field_wins_over_other_uploads() {
    let recorder = RecordingExtractor::new(IdentityExtractor);
    let request = upload_request(
        "/remove-background/",
        &[
            Part::file("attachment", "broken.bin", b"not an image"),
            Part::file("file", "real.png", &png_bytes(4, 6)),
        ],
    );
    let response = send(app(recorder.clone()), request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(recorder.calls(), vec![(4, 6)]);
}

#[tokio::test]
async fn test_upload_over_limit_is_payload_too_large() {
    let config = ServerConfig::builder().max_upload_bytes(1024).build().unwrap();
    let oversized = vec![0xAB_u8; 64 * 1024];

    let response = send(app_with(config, IdentityExtractor), upload_file(&oversized)).await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json()["kind"], "payload_too_large");
}

#[tokio::test]
async fn test_malformed_multipart_is_bad_request() {
    let request = Request::post("/remove-background/")
        .header(header::CONTENT_TYPE, "multipart/form-data")
        .body(Body::from("garbage"))
        .unwrap();
    let response = send(app(IdentityExtractor), request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["kind"], "upload");
}

#[tokio::test]
async fn test_empty_request_body_is_bad_request() {
    let with_boundary = Request::post("/remove-background/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::empty())
        .unwrap();
    let without_content_type = Request::post("/remove-background/")
        .body(Body::empty())
        .unwrap();

    for request in [with_boundary, without_content_type] {
        let recorder = RecordingExtractor::new(IdentityExtractor);
        let response = send(app(recorder.clone()), request).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["kind"], "upload");
        assert_eq!(recorder.call_count(), 0);
    }
}

#[tokio::test]
async fn test_extractor_failure_is_server_error_without_image_bytes() {
    let response = send(
        app(FailingExtractor::new("model unavailable")),
        upload_file(&jpeg_bytes(16, 16)),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.header("content-type"), Some("application/json"));
    let body = response.json();
    assert_eq!(body["kind"], "extraction");
    assert!(body["detail"].as_str().unwrap().contains("model unavailable"));
}

#[tokio::test]
async fn test_slow_extractor_times_out() {
    let config = ServerConfig::builder()
        .extraction_timeout(Some(Duration::from_millis(50)))
        .build()
        .unwrap();
    let app = app_with(config, SlowExtractor(Duration::from_millis(500)));

    let response = send(app, upload_file(&png_bytes(4, 4))).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json()["kind"], "extraction_timeout");
}

#[tokio::test]
async fn test_timed_out_burst_does_not_starve_later_requests() {
    let extractor = SerializedExtractor::new(Duration::from_millis(100));
    let config = ServerConfig::builder()
        .extraction_timeout(Some(Duration::from_millis(250)))
        .build()
        .unwrap();
    let app = app_with(config, extractor.clone());

    let burst: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { send(app, upload_file(&png_bytes(4, 4))).await.status })
        })
        .collect();

    let mut served = 0;
    for handle in burst {
        match handle.await.unwrap() {
            StatusCode::OK => served += 1,
            status => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
        }
    }
    assert!(served >= 1);
    assert!(served < 8);

    let follow_up = send(app, upload_file(&png_bytes(4, 4))).await;
    assert_eq!(follow_up.status, StatusCode::OK);

    // Queued requests whose caller gave up never ran; at most one was
    // already inside the extractor when its deadline passed
    let runs = extractor.runs();
    assert!(runs <= served + 2, "{runs} runs for {served} served requests");
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let app = app(IdentityExtractor);
    let sizes = [(3_u32, 5_u32), (17, 2), (9, 9), (1, 1)];

    let handles: Vec<_> = sizes
        .iter()
        .map(|&(w, h)| {
            let app = app.clone();
            tokio::spawn(async move { (w, h, send(app, upload_file(&png_bytes(w, h))).await) })
        })
        .collect();

    for handle in handles {
        let (w, h, response) = handle.await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(decode_png(&response.body).dimensions(), (w, h));
    }
}

#[tokio::test]
async fn test_missing_trailing_slash_redirects() {
    let response = send(
        app(IdentityExtractor),
        upload_request("/remove-background", &[Part::file("file", "a.png", &png_bytes(2, 2))]),
    )
    .await;

    assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.header("location"), Some("/remove-background/"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let request = Request::get("/remove-background/extra")
        .body(Body::empty())
        .unwrap();
    let response = send(app(IdentityExtractor), request).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_every_response_carries_a_request_id() {
    let ok = send(app(IdentityExtractor), upload_file(&png_bytes(2, 2))).await;
    let failed = send(app(IdentityExtractor), upload_file(b"nope")).await;

    let ok_id = ok.header("x-request-id").unwrap().to_string();
    let failed_id = failed.header("x-request-id").unwrap().to_string();
    assert_eq!(ok_id.len(), 36);
    assert_ne!(ok_id, failed_id);
}

#[tokio::test]
async fn test_health_endpoint() {
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = send(app(FixedAlphaExtractor::new(1)), request).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["extractor"], "fixed-alpha");
}

struct CroppingExtractor;

impl voidground::ForegroundExtractor for CroppingExtractor {
    fn name(&self) -> &str {
        "cropping"
    }

    fn extract(&self, image: image::RgbaImage) -> voidground::Result<image::RgbaImage> {
        Ok(image::imageops::crop_imm(&image, 0, 0, 1, 1).to_image())
    }
}

#[tokio::test]
async fn test_extractor_changing_dimensions_is_server_error() {
    let response = send(app(CroppingExtractor), upload_file(&png_bytes(6, 6))).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["kind"], "extraction");
}
