//! The wrapper contract
//!
//! Each tool family implements [`ProgramWrapper`]. Every hook except
//! [`can_handle_command`](ProgramWrapper::can_handle_command) has a
//! default; wrappers override the parts that are relevant for their
//! tool. A wrapper is responsible for the correctness of the keying:
//! anything that can affect outputs but is not covered by a hook will
//! cause false hits.

use bcache_cache::{ExpectedFiles, Hasher};
use bcache_core::{ArgList, Result, RunResult};
use bcache_utils::sys;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-invocation wrapper state
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Resolved path of the wrapped executable
    pub exe_path: PathBuf,
    /// The command line exactly as given
    pub unresolved_args: ArgList,
    /// The command line after response-file expansion
    pub args: ArgList,
}

impl Invocation {
    pub fn new(exe_path: impl Into<PathBuf>, unresolved_args: ArgList) -> Self {
        Self {
            exe_path: exe_path.into(),
            unresolved_args,
            args: ArgList::new(),
        }
    }
}

/// Capability hooks for one family of tools
pub trait ProgramWrapper {
    fn invocation(&self) -> &Invocation;

    fn invocation_mut(&mut self) -> &mut Invocation;

    /// True iff this wrapper claims the command
    fn can_handle_command(&self) -> bool;

    /// Expand response files and normalize the argument list
    fn resolve_args(&mut self) -> Result<()> {
        let invocation = self.invocation_mut();
        invocation.args = invocation.unresolved_args.clone();
        Ok(())
    }

    /// Capability names published by this wrapper
    fn get_capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// The files the command is expected to produce
    fn get_build_files(&mut self) -> Result<ExpectedFiles> {
        Ok(ExpectedFiles::new())
    }

    /// Identity of the tool as a version. The default hashes the program
    /// binary itself.
    fn get_program_id(&mut self) -> Result<String> {
        let mut hasher = Hasher::new();
        hasher.update_from_file(&self.invocation().exe_path)?;
        Ok(hasher.finalize().as_str().to_string())
    }

    /// Arguments that affect the output given the preprocessed source
    fn get_relevant_arguments(&mut self) -> Result<ArgList> {
        Ok(self.invocation().args.clone())
    }

    /// Environment variables that affect the output. Sorted by key, which
    /// the pipeline relies on for deterministic hashing.
    fn get_relevant_env_vars(&mut self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    /// Input files hashed in direct mode
    fn get_input_files(&mut self) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Preprocessor output used as preprocessor-mode key material
    fn preprocess_source(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Implicit dependencies stamped into a direct-mode entry
    fn get_implicit_input_files(&mut self) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Execute the tool on a cache miss
    fn run_for_miss(&mut self, prefix: Option<&str>) -> Result<RunResult> {
        sys::run_with_prefix(&self.invocation().unresolved_args, prefix)
    }
}
