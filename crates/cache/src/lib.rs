//! Hashing and storage for bcache
//!
//! The [`Hasher`] facade produces the cache keys; [`CacheStore`] is the
//! two-level (direct and preprocessor mode) content-addressed store with
//! file materialization; [`DataStore`] is the small TTL key/value store
//! backing the program-ID cache.

mod commit;
pub mod data_store;
pub mod entry;
pub mod expected;
pub mod hashing;
pub mod store;

pub use data_store::DataStore;
pub use entry::{CacheEntry, CompressionMode};
pub use expected::{ExpectedFile, ExpectedFiles};
pub use hashing::{digest_bytes, digest_file, Digest, Hasher};
pub use store::{CacheStore, CachedRun, ImplicitInput};
