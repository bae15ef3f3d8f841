//! Expected build files
//!
//! Wrappers declare the files a command is expected to produce as a map
//! from a stable role id (e.g. `"object"`, `"dep"`) to a target path and
//! a required flag. A `BTreeMap` keeps iteration ordered by role id.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// A target output file, identified by a role id distinct from its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    pub path: PathBuf,
    pub required: bool,
}

impl ExpectedFile {
    pub fn new(path: impl Into<PathBuf>, required: bool) -> Self {
        Self {
            path: path.into(),
            required,
        }
    }
}

/// Role id -> expected file, iterated in role-id order
pub type ExpectedFiles = BTreeMap<String, ExpectedFile>;
