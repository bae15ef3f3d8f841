//! Read-only configuration snapshot
//!
//! Precedence, lowest to highest: built-in defaults, `config.json` in the
//! cache directory, `BCACHE_*` environment variables. The snapshot is
//! taken once at startup and never reloaded.

use bcache_core::{Error, Result};
use bcache_utils::xdg::XdgPaths;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Immutable view of the user configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the cache
    pub cache_dir: PathBuf,
    /// Permit direct-mode (input-file hashing) lookups
    pub direct_mode: bool,
    /// Permit hard-link materialization of cached files
    pub hard_links: bool,
    /// Compress stored cache entries
    pub compress: bool,
    /// Suppress cache insertion; lookups still run
    pub read_only: bool,
    /// Fail fast on a cache miss instead of running the tool
    pub terminate_on_miss: bool,
    /// Additional files absorbed into every cache key
    pub hash_extra_files: Vec<PathBuf>,
    /// Command prepended when running the tool on a miss (e.g. icecc)
    pub prefix: Option<String>,
    /// Log level filter (trace, debug, info, warn, error, off)
    pub log_level: String,
    /// Log destination; stderr when unset
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: XdgPaths::cache_dir(),
            direct_mode: false,
            hard_links: false,
            compress: false,
            read_only: false,
            terminate_on_miss: false,
            hash_extra_files: Vec::new(),
            prefix: None,
            log_level: "warn".to_string(),
            log_file: None,
        }
    }
}

/// On-disk configuration file (`<cache_dir>/config.json`), all fields optional
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub direct_mode: Option<bool>,
    pub hard_links: Option<bool>,
    pub compress: Option<bool>,
    pub read_only: Option<bool>,
    pub terminate_on_miss: Option<bool>,
    pub hash_extra_files: Option<Vec<PathBuf>>,
    pub prefix: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load the configuration snapshot from the process environment
    pub fn load() -> Result<Self> {
        let env_vars: HashMap<String, String> = env::vars().collect();

        let cache_dir = env_vars
            .get("BCACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(XdgPaths::cache_dir);

        let file_config = Self::read_file_config(&cache_dir)?;
        Ok(Self::from_sources(cache_dir, file_config, &env_vars))
    }

    fn read_file_config(cache_dir: &std::path::Path) -> Result<FileConfig> {
        let path = cache_dir.join("config.json");
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("failed to parse '{}': {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(Error::file_system(path, "read configuration file", e)),
        }
    }

    /// Merge defaults, file options and environment overrides.
    /// Environment variables always win.
    pub fn from_sources(
        cache_dir: PathBuf,
        file: FileConfig,
        env_vars: &HashMap<String, String>,
    ) -> Self {
        let defaults = Config::default();

        let bool_option = |env_key: &str, file_value: Option<bool>, default: bool| {
            match env_vars.get(env_key) {
                Some(raw) => parse_bool(raw).unwrap_or_else(|| {
                    tracing::error!("invalid boolean value for {env_key}: '{raw}'");
                    file_value.unwrap_or(default)
                }),
                None => file_value.unwrap_or(default),
            }
        };

        let hash_extra_files = match env_vars.get("BCACHE_HASH_EXTRA_FILES") {
            Some(raw) => env::split_paths(raw).collect(),
            None => file.hash_extra_files.unwrap_or(defaults.hash_extra_files),
        };

        Self {
            cache_dir,
            direct_mode: bool_option("BCACHE_DIRECT_MODE", file.direct_mode, defaults.direct_mode),
            hard_links: bool_option("BCACHE_HARD_LINKS", file.hard_links, defaults.hard_links),
            compress: bool_option("BCACHE_COMPRESS", file.compress, defaults.compress),
            read_only: bool_option("BCACHE_READ_ONLY", file.read_only, defaults.read_only),
            terminate_on_miss: bool_option(
                "BCACHE_TERMINATE_ON_MISS",
                file.terminate_on_miss,
                defaults.terminate_on_miss,
            ),
            hash_extra_files,
            prefix: env_vars
                .get("BCACHE_PREFIX")
                .cloned()
                .or(file.prefix),
            log_level: env_vars
                .get("BCACHE_LOG_LEVEL")
                .cloned()
                .or(file.log_level)
                .unwrap_or(defaults.log_level),
            log_file: env_vars
                .get("BCACHE_LOG_FILE")
                .map(PathBuf::from)
                .or(file.log_file),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
