//! Stateless services used by the conversion pipeline

pub mod codec;

pub use self::codec::ImageCodec;
