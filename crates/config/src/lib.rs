//! Configuration loading for bcache
//!
//! The pipeline consumes a read-only snapshot of the user options,
//! assembled from built-in defaults, the `config.json` file in the cache
//! directory and `BCACHE_*` environment variable overrides.

pub mod config;

pub use config::Config;
