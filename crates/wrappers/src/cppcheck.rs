//! Wrapper for the Cppcheck static analyzer
//!
//! Cppcheck has no object files; the cached artifact is the analysis
//! report (`--output-file`) together with the captured streams. Only an
//! allowlisted set of arguments is cacheable; anything else makes the
//! wrapper bail out so the command runs uncached.

use crate::wrapper::{Invocation, ProgramWrapper};
use bcache_cache::{ExpectedFile, ExpectedFiles};
use bcache_core::args::{basename, extension};
use bcache_core::{ArgList, Error, Result};
use bcache_utils::sys;

// Tick this to a new value if the keying format changes in a
// non-backwards-compatible way.
const HASH_VERSION: &str = "1";

fn is_source_file(arg: &str) -> bool {
    const SOURCE_EXTENSIONS: &[&str] = &[
        ".cpp", ".cxx", ".cc", ".c++", ".c", ".ipp", ".ixx", ".tpp", ".txx",
    ];
    let ext = extension(arg).to_ascii_lowercase();
    SOURCE_EXTENSIONS.contains(&ext.as_str())
}

fn is_two_part_arg(arg: &str) -> bool {
    const FIRST_OF_TWO: &[&str] = &["-D", "-U", "-I", "-i", "-j", "-l"];
    FIRST_OF_TWO.contains(&arg)
}

fn is_supported_arg(arg: &str) -> bool {
    const SUPPORTED: &[&str] = &[
        "--check-level",
        "--check-library",
        "--disable",
        "-D",
        "--enable",
        "--error-exitcode",
        "--exitcode-suppressions",
        "--file-filter",
        "-f",
        "--force",
        "--fsigned-char",
        "--funsigned-char",
        "-I",
        "-i",
        "--inconclusive",
        "--inline-suppr",
        "--language",
        "--max-configs",
        "--max-ctu-depth",
        "--output-file",
        "--platform",
        "--premium",
        "-q",
        "--quiet",
        "-rp",
        "--relative-paths",
        "--rule",
        "--showtime",
        "--std",
        "--suppress",
        "--template",
        "--template-location",
        "-U",
        "-v",
        "--verbose",
        "--xml",
    ];
    SUPPORTED.contains(&arg) || is_source_file(arg)
}

/// One parsed argument, possibly with an attached option value
#[derive(Debug, Clone)]
struct ArgPair {
    arg: String,
    opt: String,
    equal_separator: bool,
}

impl ArgPair {
    fn tokens(&self) -> Vec<String> {
        if self.equal_separator {
            vec![format!("{}={}", self.arg, self.opt)]
        } else if self.opt.is_empty() {
            vec![self.arg.clone()]
        } else {
            vec![self.arg.clone(), self.opt.clone()]
        }
    }
}

pub struct CppcheckWrapper {
    invocation: Invocation,
    arg_pairs: Vec<ArgPair>,
}

impl CppcheckWrapper {
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            arg_pairs: Vec::new(),
        }
    }

    pub fn boxed(invocation: Invocation) -> Box<dyn ProgramWrapper> {
        Box::new(Self::new(invocation))
    }

    /// Split the arguments into (argument, option) pairs and verify that
    /// only supported arguments are present.
    fn parse_arguments(&mut self) -> Result<()> {
        let args = &self.invocation.args;
        let mut arg_pairs = Vec::new();

        // Note: We always skip the first "arg" since it is the program name.
        let mut i = 1;
        while i < args.len() {
            let arg = &args[i];
            if is_two_part_arg(arg) && i + 1 < args.len() {
                arg_pairs.push(ArgPair {
                    arg: arg.clone(),
                    opt: args[i + 1].clone(),
                    equal_separator: false,
                });
                i += 1;
            } else if arg.len() > 2 && arg.is_char_boundary(2) && is_two_part_arg(&arg[..2]) {
                // A pair written as a single token (e.g. -DFOO).
                arg_pairs.push(ArgPair {
                    arg: arg[..2].to_string(),
                    opt: arg[2..].to_string(),
                    equal_separator: false,
                });
            } else if let Some((name, value)) = arg.split_once('=') {
                arg_pairs.push(ArgPair {
                    arg: name.to_string(),
                    opt: value.to_string(),
                    equal_separator: true,
                });
            } else {
                arg_pairs.push(ArgPair {
                    arg: arg.clone(),
                    opt: String::new(),
                    equal_separator: false,
                });
            }
            i += 1;
        }

        for pair in &arg_pairs {
            if !is_supported_arg(&pair.arg) {
                return Err(Error::unsupported(format!(
                    "unsupported argument: {}",
                    pair.tokens().join(" ")
                )));
            }
        }

        self.arg_pairs = arg_pairs;
        Ok(())
    }

    fn make_preprocessor_cmd(&self) -> ArgList {
        let mut preprocess_args = ArgList::new();

        // Start with the program.
        preprocess_args.push(self.invocation.args[0].clone());

        // Drop arguments that we do not want/need.
        for pair in &self.arg_pairs {
            if pair.arg == "--output-file" {
                continue;
            }
            for token in pair.tokens() {
                preprocess_args.push(token);
            }
        }

        // Append the required arguments for producing preprocessed output.
        preprocess_args.push("-E");

        preprocess_args
    }
}

impl ProgramWrapper for CppcheckWrapper {
    fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    fn invocation_mut(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn can_handle_command(&self) -> bool {
        let cmd = basename(&self.invocation.exe_path.to_string_lossy()).to_ascii_lowercase();
        cmd.contains("cppcheck")
    }

    fn resolve_args(&mut self) -> Result<()> {
        // Use the default resolver, then parse the arguments into a more
        // intelligible form to be used internally.
        self.invocation.args = self.invocation.unresolved_args.clone();
        self.parse_arguments()
    }

    fn get_build_files(&mut self) -> Result<ExpectedFiles> {
        let mut files = ExpectedFiles::new();
        for pair in &self.arg_pairs {
            if pair.arg == "--output-file" {
                if files.contains_key("output_file") {
                    return Err(Error::unsupported(
                        "only a single output file can be specified",
                    ));
                }
                files.insert(
                    "output_file".to_string(),
                    ExpectedFile::new(pair.opt.clone(), true),
                );
            }
        }
        Ok(files)
    }

    fn get_program_id(&mut self) -> Result<String> {
        // Get the version string for the analyzer.
        let mut version_args = ArgList::new();
        version_args.push(self.invocation.args[0].clone());
        version_args.push("--version");
        let result = sys::run(&version_args)?;
        if !result.success() {
            return Err(Error::tool_exec(
                self.invocation.args[0].as_str(),
                "unable to get the Cppcheck version information string",
            ));
        }

        let mut id = String::from(HASH_VERSION);
        id.push_str(&String::from_utf8_lossy(&result.stdout));
        Ok(id)
    }

    fn get_relevant_arguments(&mut self) -> Result<ArgList> {
        let mut filtered_args = ArgList::new();

        // The first argument is the analyzer binary without the path.
        filtered_args.push(basename(&self.invocation.args[0]));

        for pair in &self.arg_pairs {
            // Include paths and macro definitions do not change how we go
            // from preprocessed code to the analysis result.
            let is_unwanted = pair.arg == "-I" || pair.arg == "-D" || pair.arg == "-U";
            if is_unwanted {
                continue;
            }
            if pair.arg == "--output-file" {
                // We want to know that --output-file was used, as it
                // affects the program output, but not the file name.
                filtered_args.push(pair.arg.clone());
            } else {
                for token in pair.tokens() {
                    filtered_args.push(token);
                }
            }
        }

        Ok(filtered_args)
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>> {
        // Run the preprocessor step and capture its output.
        let preprocessor_args = self.make_preprocessor_cmd();
        let result = sys::run(&preprocessor_args)?;
        if !result.success() {
            return Err(Error::preprocess(format!(
                "preprocessing command was unsuccessful: {}",
                String::from_utf8_lossy(&result.stderr)
            )));
        }

        Ok(result.stdout)
    }
}
