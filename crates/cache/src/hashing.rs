//! Cache key computation
//!
//! A [`Hasher`] absorbs everything that can influence a tool's output and
//! finalizes to a [`Digest`], the sole cache key. Two hasher sequences
//! produce equal digests iff their absorb sequences are equal as framed
//! byte streams.
//!
//! Framing rules:
//! - `update` absorbs raw bytes with no framing.
//! - `update_seq` absorbs each element followed by a single NUL byte.
//!   Command-line and environment strings can never contain NUL, so
//!   element boundaries are unambiguous and identical between insert and
//!   lookup.
//! - `inject_separator` absorbs a fixed marker containing NUL bytes that
//!   no `update_seq` input can produce, giving domain separation between
//!   logically distinct sections of the stream (in particular between
//!   direct-mode and preprocessor-mode keys).

use bcache_core::{Error, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

// NUL-delimited so that no argv or environment string can forge it.
const SEPARATOR: &[u8] = b"\x00\x1bbcache\x1b\x00";

/// A finalized cache key with a canonical lowercase hex representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a canonical lowercase hex digest string
    pub fn from_hex(hash: &str) -> Option<Self> {
        let valid = hash.len() == 64
            && hash
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        valid.then(|| Self(hash.to_string()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Streaming hash state for cache key computation
///
/// Cloning forks the state: the clone and the original produce equal
/// digests when fed the same subsequent inputs.
#[derive(Debug, Clone)]
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Absorb raw bytes
    pub fn update(&mut self, bytes: impl AsRef<[u8]>) {
        self.inner.update(bytes.as_ref());
    }

    /// Absorb an ordered sequence of strings, NUL-terminating each element
    pub fn update_seq<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for item in items {
            self.inner.update(item.as_ref().as_bytes());
            self.inner.update([0u8]);
        }
    }

    /// Absorb the contents of a file
    pub fn update_from_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| Error::missing_input(path, e))?;
        let mut reader = BufReader::with_capacity(8192, file);
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::missing_input(path, e))?;
            if bytes_read == 0 {
                break;
            }
            self.inner.update(&buffer[..bytes_read]);
        }

        Ok(())
    }

    /// Absorb the domain separation marker
    pub fn inject_separator(&mut self) {
        self.inner.update(SEPARATOR);
    }

    /// Finalize the hash calculation
    pub fn finalize(self) -> Digest {
        Digest(hex::encode(self.inner.finalize()))
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Digest of a byte slice, for one-shot hashing
pub fn digest_bytes(bytes: impl AsRef<[u8]>) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Digest of a file's contents
pub fn digest_file(path: &Path) -> Result<Digest> {
    let mut hasher = Hasher::new();
    hasher.update_from_file(path)?;
    Ok(hasher.finalize())
}
