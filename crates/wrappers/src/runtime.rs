//! Process-wide state
//!
//! The configuration snapshot and the cache handles are constructed once
//! at startup and passed down explicitly.

use bcache_cache::{CacheStore, DataStore};
use bcache_config::Config;

/// Name of the data store holding cached program IDs.
pub const PROGRAM_ID_CACHE_NAME: &str = "prgid";

/// Everything the pipeline needs besides the wrapper itself
#[derive(Debug)]
pub struct Runtime {
    pub config: Config,
    pub cache: CacheStore,
    pub prgid: DataStore,
}

impl Runtime {
    pub fn new(config: Config) -> Self {
        let cache = CacheStore::new(&config.cache_dir);
        let prgid = DataStore::new(&config.cache_dir, PROGRAM_ID_CACHE_NAME);
        Self {
            config,
            cache,
            prgid,
        }
    }
}
