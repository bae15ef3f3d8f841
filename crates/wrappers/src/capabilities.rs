//! Wrapper capability flags
//!
//! Capabilities are opt-in: a wrapper publishes the ones it supports and
//! the user configuration masks them. A capability the wrapper does not
//! publish is never active, whatever the configuration says.

use bcache_config::Config;
use tracing::error;

/// The active capability set for one invocation
#[derive(Debug, Default, Clone, Copy)]
pub struct Capabilities {
    create_target_dirs: bool,
    direct_mode: bool,
    hard_links: bool,
}

impl Capabilities {
    pub fn from_strings(cap_strings: &[String], config: &Config) -> Self {
        let mut caps = Self::default();
        for cap in cap_strings {
            match cap.as_str() {
                "create_target_dirs" => caps.create_target_dirs = true,
                // Only enable if enabled in the config.
                "direct_mode" => caps.direct_mode = caps.direct_mode || config.direct_mode,
                "force_direct_mode" => caps.direct_mode = true,
                "hard_links" => caps.hard_links = config.hard_links,
                other => error!("invalid capability string: {other}"),
            }
        }
        caps
    }

    pub fn create_target_dirs(&self) -> bool {
        self.create_target_dirs
    }

    pub fn direct_mode(&self) -> bool {
        self.direct_mode
    }

    pub fn hard_links(&self) -> bool {
        self.hard_links
    }
}
