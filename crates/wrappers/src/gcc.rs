//! Wrapper for GCC-style compiler drivers (gcc, g++)
//!
//! Caches object-file compilations (`-c`). The preprocessor-mode key
//! absorbs the output of `-E -P`, which covers all included headers and
//! macro expansion; direct mode hashes the source files named on the
//! command line and records the headers from a `-M` dependency query as
//! implicit inputs.

use crate::wrapper::{Invocation, ProgramWrapper};
use bcache_cache::{ExpectedFile, ExpectedFiles};
use bcache_core::args::{basename, extension};
use bcache_core::{ArgList, Error, Result};
use bcache_utils::response_file::expand_response_files;
use bcache_utils::sys;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

// Tick this to a new value if the keying format changes in a
// non-backwards-compatible way.
const HASH_VERSION: &str = "1";

const SOURCE_EXTENSIONS: &[&str] = &[".c", ".cc", ".cpp", ".cxx", ".c++"];

// Arguments whose following token names a file.
const TWO_PART_FILE_ARGS: &[&str] = &["-I", "-MF", "-MT", "-o"];

fn is_source_file(arg: &str) -> bool {
    let ext = extension(arg).to_ascii_lowercase();
    SOURCE_EXTENSIONS.contains(&ext.as_str())
}

pub struct GccWrapper {
    invocation: Invocation,
}

impl GccWrapper {
    pub fn new(invocation: Invocation) -> Self {
        Self { invocation }
    }

    pub fn boxed(invocation: Invocation) -> Box<dyn ProgramWrapper> {
        Box::new(Self::new(invocation))
    }

    fn args(&self) -> &ArgList {
        &self.invocation.args
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.args().iter().any(|arg| arg == flag)
    }

    fn flag_value(&self, flag: &str) -> Option<&str> {
        let args = self.args();
        (0..args.len()).find_map(|i| {
            if args[i] == flag {
                args.get(i + 1)
            } else {
                None
            }
        })
    }

    fn source_files(&self) -> Vec<PathBuf> {
        let args = self.args();
        let mut sources = Vec::new();
        let mut skip_next = true; // always skip the compiler binary itself
        for arg in args {
            if skip_next {
                skip_next = false;
                continue;
            }
            if TWO_PART_FILE_ARGS.contains(&arg.as_str()) {
                skip_next = true;
                continue;
            }
            if !arg.starts_with('-') && is_source_file(arg) {
                sources.push(PathBuf::from(arg));
            }
        }
        sources
    }

    /// The compile command turned into its preprocessor variant
    fn make_preprocessor_cmd(&self, preprocessed_file: &str) -> ArgList {
        let mut preprocess_args = ArgList::new();

        // Drop arguments that we do not want/need.
        let mut drop_next_arg = false;
        for arg in self.args() {
            let drop_this_arg = std::mem::replace(&mut drop_next_arg, false);
            if drop_this_arg {
                continue;
            }
            match arg.as_str() {
                "-c" => {}
                "-o" => drop_next_arg = true,
                _ => preprocess_args.push(arg.clone()),
            }
        }

        // Append the required arguments for producing preprocessed output.
        preprocess_args.push("-E");
        preprocess_args.push("-P");
        preprocess_args.push("-o");
        preprocess_args.push(preprocessed_file);

        preprocess_args
    }

    /// The compile command turned into a dependency query
    fn make_dep_cmd(&self, dep_file: &str) -> ArgList {
        let mut dep_args = ArgList::new();

        let mut drop_next_arg = false;
        for arg in self.args() {
            let drop_this_arg = std::mem::replace(&mut drop_next_arg, false);
            if drop_this_arg {
                continue;
            }
            match arg.as_str() {
                "-c" | "-MD" | "-MMD" => {}
                "-o" | "-MF" | "-MT" => drop_next_arg = true,
                _ => dep_args.push(arg.clone()),
            }
        }

        dep_args.push("-M");
        dep_args.push("-MF");
        dep_args.push(dep_file);

        dep_args
    }
}

/// Extract the dependency paths from a make rule
fn parse_dep_file(content: &str) -> Vec<PathBuf> {
    let joined = content.replace("\\\r\n", " ").replace("\\\n", " ");
    let mut deps = Vec::new();
    for rule in joined.lines() {
        let Some((_, prerequisites)) = rule.split_once(':') else {
            continue;
        };
        deps.extend(prerequisites.split_whitespace().map(PathBuf::from));
    }
    deps
}

impl ProgramWrapper for GccWrapper {
    fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    fn invocation_mut(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn can_handle_command(&self) -> bool {
        // Is this the right compiler?
        let cmd = basename(&self.invocation.exe_path.to_string_lossy()).to_ascii_lowercase();
        cmd.contains("gcc") || cmd.contains("g++")
    }

    fn resolve_args(&mut self) -> Result<()> {
        self.invocation.args = expand_response_files(&self.invocation.unresolved_args)?;
        Ok(())
    }

    fn get_capabilities(&self) -> Vec<String> {
        ["direct_mode", "hard_links", "create_target_dirs"]
            .map(String::from)
            .to_vec()
    }

    fn get_build_files(&mut self) -> Result<ExpectedFiles> {
        let object = self
            .flag_value("-o")
            .ok_or_else(|| Error::unsupported("unable to get the target object file"))?;

        let mut build_files = ExpectedFiles::new();
        build_files.insert("object".to_string(), ExpectedFile::new(object, true));
        // The dep file is only written for some -M flag combinations, so
        // capture it opportunistically.
        if let Some(dep) = self.flag_value("-MF") {
            build_files.insert("dep".to_string(), ExpectedFile::new(dep, false));
        }
        Ok(build_files)
    }

    fn get_program_id(&mut self) -> Result<String> {
        // Get the version string for the compiler.
        let mut version_args = ArgList::new();
        version_args.push(self.args()[0].clone());
        version_args.push("--version");
        let result = sys::run(&version_args)?;
        if !result.success() {
            return Err(Error::tool_exec(
                self.args()[0].as_str(),
                "unable to get the compiler version information string",
            ));
        }

        let mut id = String::from(HASH_VERSION);
        id.push_str(&String::from_utf8_lossy(&result.stdout));
        Ok(id)
    }

    fn get_relevant_arguments(&mut self) -> Result<ArgList> {
        let args = self.args();
        let mut filtered_args = ArgList::new();

        // The first argument is the compiler binary without the path.
        filtered_args.push(basename(&args[0]));

        // Note: We always skip the first arg since we have handled it already.
        let mut skip_next_arg = true;
        for arg in args {
            if std::mem::replace(&mut skip_next_arg, false) {
                continue;
            }

            // Does this argument specify a file (we don't want to hash those)?
            if TWO_PART_FILE_ARGS.contains(&arg.as_str()) {
                skip_next_arg = true;
                continue;
            }

            // Generally unwanted arguments: things that will not change
            // how we go from preprocessed code to the object file.
            let is_unwanted =
                arg.starts_with("-I") || arg.starts_with("-D") || is_source_file(arg);
            if !is_unwanted {
                filtered_args.push(arg.clone());
            }
        }

        Ok(filtered_args)
    }

    fn get_input_files(&mut self) -> Result<Vec<PathBuf>> {
        Ok(self.source_files())
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>> {
        // Are we compiling an object file?
        if !self.has_flag("-c") {
            return Err(Error::unsupported(
                "not an object file compilation command",
            ));
        }

        // Run the preprocessor step into a scoped temp file.
        let preprocessed_file = tempfile::Builder::new()
            .prefix("bcache")
            .suffix(".pp")
            .tempfile()
            .map_err(|e| Error::preprocess(format!("cannot create temp file: {e}")))?;
        let preprocessor_args =
            self.make_preprocessor_cmd(&preprocessed_file.path().to_string_lossy());

        let result = sys::run(&preprocessor_args)?;
        if !result.success() {
            return Err(Error::preprocess(format!(
                "preprocessing command was unsuccessful: {}",
                String::from_utf8_lossy(&result.stderr)
            )));
        }

        fs::read(preprocessed_file.path())
            .map_err(|e| Error::preprocess(format!("cannot read preprocessed output: {e}")))
    }

    fn get_implicit_input_files(&mut self) -> Result<Vec<PathBuf>> {
        let dep_file = tempfile::Builder::new()
            .prefix("bcache")
            .suffix(".d")
            .tempfile()
            .map_err(|e| Error::preprocess(format!("cannot create temp file: {e}")))?;
        let dep_args = self.make_dep_cmd(&dep_file.path().to_string_lossy());

        let result = sys::run(&dep_args)?;
        if !result.success() {
            return Err(Error::preprocess(format!(
                "dependency query was unsuccessful: {}",
                String::from_utf8_lossy(&result.stderr)
            )));
        }

        let content = fs::read_to_string(dep_file.path())
            .map_err(|e| Error::preprocess(format!("cannot read dependency output: {e}")))?;

        // The sources themselves are direct inputs, not implicit ones.
        let sources: HashSet<PathBuf> = self.source_files().into_iter().collect();
        let mut implicit: Vec<PathBuf> = parse_dep_file(&content)
            .into_iter()
            .filter(|dep| !sources.contains(dep))
            .collect();
        implicit.sort();
        implicit.dedup();
        Ok(implicit)
    }
}
