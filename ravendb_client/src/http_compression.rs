//! Request body compression.
//!
//! Response decompression is negotiated by the transport (`Accept-Encoding: gzip`); this module
//! only covers the bodies the client sends.
use std::io::Write;

use flate2::{write::GzEncoder, Compression};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HttpCompressionAlgorithm {
    #[default]
    Gzip,
    Zstd,
}

impl HttpCompressionAlgorithm {
    /// Value of the `Content-Encoding` header for bodies compressed with this algorithm.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            HttpCompressionAlgorithm::Gzip => "gzip",
            HttpCompressionAlgorithm::Zstd => "zstd",
        }
    }

    pub fn compress(&self, body: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            HttpCompressionAlgorithm::Gzip => {
                let mut encoder =
                    GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::fast());
                encoder.write_all(body)?;
                encoder.finish()
            }
            HttpCompressionAlgorithm::Zstd => zstd::encode_all(body, 3),
        }
    }
}
