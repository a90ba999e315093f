//! Foreground extractor implementations
//!
//! - ONNX Runtime adapter for segmentation models (feature `onnx`)
//! - Model-free stubs for tests and smoke checks

#[cfg(feature = "onnx")]
pub mod onnx;

pub mod stub;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxExtractor, OnnxSettings};

pub use self::stub::{FailingExtractor, FixedAlphaExtractor, IdentityExtractor, RecordingExtractor};
