//! Transparent compression of stored raw text
//!
//! A store picks one codec when it is created and records the choice in its
//! log header. Every row is encoded with that codec on write and decoded on
//! every read path, so callers only ever see the original text.
//!
//! The stored form is always a string because rows are JSON lines; the zlib
//! codec base64-encodes its compressed bytes.

use std::io::{Read, Write};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while encoding or decoding stored raw text
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("zlib stream error: {0}")]
    Zlib(#[from] std::io::Error),
}

/// Which codec a store uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    Plain,
    Zlib,
}

impl CodecKind {
    /// Instantiate the codec; `level` only matters for compressing codecs
    pub fn build(self, level: u32) -> Arc<dyn Codec> {
        match self {
            CodecKind::Plain => Arc::new(PlainCodec),
            CodecKind::Zlib => Arc::new(ZlibCodec::new(level)),
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecKind::Plain => write!(f, "plain"),
            CodecKind::Zlib => write!(f, "zlib"),
        }
    }
}

/// Reversible transform between raw text and its stored form
pub trait Codec: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> CodecKind;

    fn encode(&self, raw: &str) -> Result<String, CodecError>;

    fn decode(&self, stored: &str) -> Result<String, CodecError>;
}

/// Identity codec
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl Codec for PlainCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Plain
    }

    fn encode(&self, raw: &str) -> Result<String, CodecError> {
        Ok(raw.to_string())
    }

    fn decode(&self, stored: &str) -> Result<String, CodecError> {
        Ok(stored.to_string())
    }
}

/// zlib (deflate) compression, base64 encoded for storage
#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: Compression,
}

impl ZlibCodec {
    /// Create a codec with a compression level in `0..=9`
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for ZlibCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Zlib
    }

    fn encode(&self, raw: &str) -> Result<String, CodecError> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder.write_all(raw.as_bytes())?;
        let compressed = encoder.finish()?;
        Ok(STANDARD.encode(compressed))
    }

    fn decode(&self, stored: &str) -> Result<String, CodecError> {
        let compressed = STANDARD.decode(stored)?;
        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut raw = String::new();
        // Invalid UTF-8 surfaces as an InvalidData io::Error
        decoder.read_to_string(&mut raw)?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<String> {
        vec![
            String::new(),
            "level=error code=500".to_string(),
            "héllo wörld ✓ 日本語 🚀".to_string(),
            "abcdefghij".repeat(10_000),
        ]
    }

    #[test]
    fn test_plain_is_identity() {
        let codec = PlainCodec;
        for raw in samples() {
            assert_eq!(codec.encode(&raw).unwrap(), raw);
            assert_eq!(codec.decode(&raw).unwrap(), raw);
        }
    }

    #[test]
    fn test_zlib_round_trip() {
        let codec = ZlibCodec::new(6);
        for raw in samples() {
            let stored = codec.encode(&raw).unwrap();
            assert_eq!(codec.decode(&stored).unwrap(), raw);
        }
    }

    #[test]
    fn test_zlib_shrinks_repetitive_text() {
        let codec = ZlibCodec::default();
        let raw = "GET /index.html 200 ".repeat(500);
        let stored = codec.encode(&raw).unwrap();
        assert!(stored.len() < raw.len() / 4);
    }

    #[test]
    fn test_zlib_rejects_garbage() {
        let codec = ZlibCodec::default();
        assert!(matches!(codec.decode("not base64!!"), Err(CodecError::Base64(_))));

        // Valid base64, not a zlib stream
        let bogus = STANDARD.encode(b"definitely not zlib");
        assert!(matches!(codec.decode(&bogus), Err(CodecError::Zlib(_))));
    }

    #[test]
    fn test_kind_builds_matching_codec() {
        assert_eq!(CodecKind::Plain.build(6).kind(), CodecKind::Plain);
        assert_eq!(CodecKind::Zlib.build(6).kind(), CodecKind::Zlib);
        assert_eq!(CodecKind::Zlib.to_string(), "zlib");
    }
}
