//! Serialized cache entries
//!
//! An entry records which files a cached invocation produced (by role id),
//! the captured standard streams and the exit code. Payload files live
//! out-of-band next to the serialized entry, gzip-compressed when the
//! entry's compression mode says so.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bcache_core::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Compression applied to an entry's payload files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    None,
    All,
}

/// A cache entry as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Role ids of the files captured for this entry
    pub file_ids: Vec<String>,
    pub compression: CompressionMode,
    #[serde(with = "b64")]
    pub stdout: Vec<u8>,
    #[serde(with = "b64")]
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl CacheEntry {
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Json {
            message: "Failed to serialize cache entry".to_string(),
            source: e,
        })
    }

    pub fn deserialize(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Json {
            message: "Failed to parse cache entry".to_string(),
            source: e,
        })
    }
}

/// Gzip-compress a payload
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::storage(format!("compression failed: {e}")))
}

/// Decompress a gzip payload
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::storage(format!("decompression failed: {e}")))?;
    Ok(out)
}

mod b64 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
