//! Wrapper for rustc as invoked by cargo
//!
//! rustc has no preprocessor, so caching runs in direct mode over the
//! single source file and the extern libraries named on the command
//! line, with the full source dependency list (from a dep-info query)
//! recorded as implicit inputs. Only plain lib/rlib/staticlib builds
//! with `--emit=link,metadata[,dep-info]` are cacheable; anything else
//! makes the wrapper bail out so the compilation runs uncached.

use crate::wrapper::{Invocation, ProgramWrapper};
use bcache_cache::{ExpectedFile, ExpectedFiles, Hasher};
use bcache_core::args::extension;
use bcache_core::{ArgList, Error, Result, RunResult};
use bcache_utils::sys;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

// Tick this to a new value if the keying format changes in a
// non-backwards-compatible way.
const HASH_VERSION: &str = "1";

// Host state that must not leak into the compilation.
const SCRUBBED_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "RUNNING_UNDER_RR",
    "HOSTNAME",
    "PWD",
    "HOST",
    "RPM_BUILD_ROOT",
    "SOURCE_DATE_EPOCH",
    "RPM_PACKAGE_RELEASE",
    "MINICOM",
    "RPM_PACKAGE_VERSION",
];

fn run_rustc(args: &ArgList) -> Result<RunResult> {
    sys::run_with_env_removed(args, SCRUBBED_ENV_VARS)
}

/// How an option is treated for caching purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionClass {
    Unsupported,
    Unhandled,
    Ignored,
    LibraryPath,
    Library,
    CrateType,
    CrateName,
    Emit,
    CodeGen,
    OutDir,
    Target,
    Extern,
    ResponseFile,
    Input,
}

fn classify(option: &str) -> (OptionClass, bool) {
    use OptionClass::*;
    match option {
        "-" => (Unsupported, false),
        "-o" | "--sysroot" | "--remap-path-prefix" => (Unsupported, true),
        "-h" | "--help" | "--test" | "-V" | "--version" => (Unhandled, false),
        "--print" | "--explain" => (Unhandled, true),
        "-v" | "--verbose" => (Ignored, false),
        "--cfg" | "--edition" | "-A" | "--allow" | "-W" | "--warn" | "--force-warn" | "-D"
        | "--deny" | "-F" | "--forbid" | "--cap-lints" | "--error-format" | "--json"
        | "--color" | "--diagnostic-width" => (Ignored, true),
        "-L" => (LibraryPath, true),
        "-l" => (Library, true),
        "--crate-type" => (CrateType, true),
        "--crate-name" => (CrateName, true),
        "--emit" => (Emit, true),
        "-g" | "-O" => (CodeGen, false),
        "-C" | "--codegen" => (CodeGen, true),
        "--out-dir" => (OutDir, true),
        "--target" => (Target, true),
        "--extern" => (Extern, true),
        "@" => (ResponseFile, false),
        _ => (Input, false),
    }
}

// Single-character options that may carry their value attached (-Cfoo).
const SHORT_OPTION_CHARS: &[char] = &[
    'h', 'L', 'l', 'g', 'O', 'o', 'A', 'W', 'D', 'F', 'C', 'V', 'v',
];

#[derive(Debug)]
struct ParsedOption {
    class: OptionClass,
    needs_value: bool,
    option: String,
    value: String,
}

/// Split one command-line token into option and attached value
fn parse_argument(token: &str) -> ParsedOption {
    let (option, value) = if token == "-" {
        ("-".to_string(), String::new())
    } else if token.starts_with("--") {
        match token.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (token.to_string(), String::new()),
        }
    } else if let Some(path) = token.strip_prefix('@') {
        ("@".to_string(), path.to_string())
    } else if token.starts_with('-')
        && token
            .chars()
            .nth(1)
            .is_some_and(|c| SHORT_OPTION_CHARS.contains(&c))
    {
        (token[..2].to_string(), token[2..].to_string())
    } else {
        (token.to_string(), String::new())
    };

    let (class, needs_value) = classify(&option);
    ParsedOption {
        class,
        needs_value,
        option,
        value,
    }
}

/// Split "kind=value" option payloads; the kind defaults to empty
fn split_kind(value: &str) -> (&str, &str) {
    match value.split_once('=') {
        Some((kind, rest)) => (kind, rest),
        None => ("", value),
    }
}

/// Dep-info derived state, computed once per invocation
struct DepState {
    implicit_inputs: Vec<PathBuf>,
    env_vars: BTreeMap<String, String>,
}

pub struct RustcWrapper {
    invocation: Invocation,
    relevant_args: ArgList,
    output_dir: PathBuf,
    externs: Vec<PathBuf>,
    static_libraries: Vec<PathBuf>,
    crate_name: String,
    emit: Vec<String>,
    dep_info_file: Option<String>,
    input: PathBuf,
    dep_state: Option<DepState>,
}

impl RustcWrapper {
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            relevant_args: ArgList::new(),
            output_dir: PathBuf::new(),
            externs: Vec::new(),
            static_libraries: Vec::new(),
            crate_name: String::new(),
            emit: Vec::new(),
            dep_info_file: None,
            input: PathBuf::new(),
            dep_state: None,
        }
    }

    pub fn boxed(invocation: Invocation) -> Box<dyn ProgramWrapper> {
        Box::new(Self::new(invocation))
    }

    /// An error prefixed with the crate under compilation
    fn bail(&self, message: impl Into<String>) -> Error {
        let crate_name = if self.crate_name.is_empty() {
            "<unknown crate>"
        } else {
            self.crate_name.as_str()
        };
        Error::unsupported(format!("{crate_name}: {}", message.into()))
    }

    fn rustc_cmd(&self, extra: &[&str]) -> ArgList {
        let mut args = ArgList::new();
        args.push(self.invocation.args[0].clone());
        for arg in extra {
            args.push(*arg);
        }
        args
    }

    /// Parse and verify the whole command line, collecting the state the
    /// other hooks need. Problems are gathered rather than reported one
    /// at a time.
    fn parse_options(&mut self) -> Result<()> {
        let unresolved = self.invocation.unresolved_args.clone();
        if unresolved.is_empty() {
            return Err(self.bail("empty command line"));
        }

        let mut parsed_args = ArgList::new();
        parsed_args.push(unresolved[0].clone());

        let mut relevant_args = ArgList::new();
        let mut static_library_paths: Vec<PathBuf> = Vec::new();
        let mut static_library_names: Vec<String> = Vec::new();
        let mut crate_type_rlib = false;
        let mut crate_type_staticlib = false;
        let mut crate_name = String::new();
        let mut emit: Vec<String> = Vec::new();
        let mut extra_filename = String::new();
        let mut output_dir = PathBuf::new();
        let mut externs: Vec<PathBuf> = Vec::new();
        let mut input = PathBuf::new();
        let mut errors: Vec<String> = Vec::new();

        let cwd = env::current_dir()
            .map_err(|e| Error::file_system(PathBuf::from("."), "read working directory", e))?;

        let mut i = 1;
        while i < unresolved.len() {
            let mut option = parse_argument(&unresolved[i]);
            if option.needs_value && option.value.is_empty() {
                i += 1;
                match unresolved.get(i) {
                    Some(next) => option.value = next.to_string(),
                    None => {
                        errors.push(format!("missing argument for {}", option.option));
                        break;
                    }
                }
            }
            i += 1;

            parsed_args.push(option.option.clone());
            if !option.value.is_empty() {
                parsed_args.push(option.value.clone());
            }

            match option.class {
                OptionClass::Unsupported => {
                    errors.push(format!("unsupported compiler argument {}", option.option));
                    continue;
                }
                OptionClass::Unhandled => {
                    errors.push(format!("unhandled compiler argument {}", option.option));
                    continue;
                }
                OptionClass::Ignored => continue,
                OptionClass::ResponseFile => {
                    errors.push(format!("cannot handle response file @{}", option.value));
                    continue;
                }
                OptionClass::LibraryPath => {
                    // Only native search paths matter, and they feed the
                    // program id rather than the relevant arguments.
                    let (kind, path) = split_kind(&option.value);
                    if kind.is_empty() || kind == "native" || kind == "all" {
                        static_library_paths.push(PathBuf::from(path));
                    }
                    continue;
                }
                OptionClass::Library => {
                    let (kind, name) = split_kind(&option.value);
                    if kind == "static" {
                        static_library_names.push(name.to_string());
                    }
                }
                OptionClass::CrateType => {
                    // lib implies rlib; everything else is uncacheable.
                    for crate_type in option.value.split(',') {
                        crate_type_rlib =
                            crate_type_rlib || crate_type == "lib" || crate_type == "rlib";
                        crate_type_staticlib = crate_type_staticlib || crate_type == "staticlib";
                    }
                }
                OptionClass::CrateName => crate_name = option.value.clone(),
                OptionClass::Emit => {
                    if !emit.is_empty() {
                        errors.push("cannot handle more than one --emit".to_string());
                        continue;
                    }
                    emit = option.value.split(',').map(str::to_string).collect();
                    emit.sort();
                }
                OptionClass::CodeGen => {
                    let (key, value) = option
                        .value
                        .split_once('=')
                        .unwrap_or((option.value.as_str(), ""));
                    if key == "incremental" {
                        errors.push("cannot cache incremental builds".to_string());
                        continue;
                    }
                    if key == "extra-filename" {
                        if value.is_empty() {
                            errors.push("cannot cache an empty extra-filename".to_string());
                            continue;
                        }
                        extra_filename = value.to_string();
                    }
                }
                OptionClass::OutDir => {
                    // Where the result is stored is not relevant to the hash.
                    output_dir = PathBuf::from(&option.value);
                    continue;
                }
                OptionClass::Target => {
                    if extension(&option.value) == ".json"
                        || Path::new(&format!("{}.json", option.value)).exists()
                    {
                        errors.push(format!("cannot cache target {}", option.value));
                        continue;
                    }
                }
                OptionClass::Extern => {
                    // Extern contents feed the program id; their location
                    // is not a relevant argument.
                    if let Some((_, path)) = option.value.split_once('=') {
                        if !path.is_empty() {
                            externs.push(cwd.join(path));
                        }
                    }
                    continue;
                }
                OptionClass::Input => {
                    if input.as_os_str().is_empty() {
                        input = PathBuf::from(&option.option);
                    } else {
                        errors.push(format!("cannot handle multiple inputs {}", option.option));
                        continue;
                    }
                }
            }

            relevant_args.push(option.option);
            if !option.value.is_empty() {
                relevant_args.push(option.value);
            }
        }

        // Verification. The crate name is stored first so error messages
        // carry it.
        self.crate_name = crate_name;

        if !errors.is_empty() {
            return Err(self.bail(errors.join("\n")));
        }
        if input.as_os_str().is_empty() {
            return Err(self.bail("an input file is required to cache a rustc compilation"));
        }
        let allowed_emit = ["dep-info", "link", "metadata"];
        let emit_ok = emit.iter().any(|kind| kind == "link")
            && emit.iter().any(|kind| kind == "metadata")
            && emit.iter().all(|kind| allowed_emit.contains(&kind.as_str()));
        if !emit_ok {
            return Err(self.bail("--emit=link,metadata is required to cache a rustc compilation"));
        }
        if output_dir.as_os_str().is_empty() {
            return Err(self.bail("--out-dir is required to cache a rustc compilation"));
        }
        if self.crate_name.is_empty() {
            return Err(self.bail("--crate-name is required to cache a rustc compilation"));
        }
        if !crate_type_rlib && !crate_type_staticlib {
            return Err(self.bail(
                "--crate-type lib, rlib or staticlib is required to cache a rustc compilation",
            ));
        }

        // Resolve the static libraries named on the command line.
        let mut static_libraries = Vec::new();
        for name in &static_library_names {
            for dir in &static_library_paths {
                for candidate in [
                    dir.join(format!("lib{name}.a")),
                    dir.join(format!("{name}.lib")),
                    dir.join(format!("{name}.a")),
                ] {
                    if candidate.is_file() {
                        static_libraries.push(candidate);
                    }
                }
            }
        }

        if emit.iter().any(|kind| kind == "dep-info") {
            self.dep_info_file = Some(format!("{}{extra_filename}.d", self.crate_name));
        }

        // Cargo does not guarantee the order of externs.
        externs.sort();
        static_libraries.sort();

        self.invocation.args = parsed_args;
        self.relevant_args = relevant_args;
        self.output_dir = output_dir;
        self.externs = externs;
        self.static_libraries = static_libraries;
        self.emit = emit;
        self.input = input;
        Ok(())
    }

    /// Turn the file names reported by rustc into the expected-files
    /// table, adding the metadata and dep-info artifacts.
    fn assemble_build_files(&self, mut names: Vec<String>) -> ExpectedFiles {
        if self.emit.iter().any(|kind| kind == "metadata") {
            // The metadata file names cannot be queried, but they mirror
            // the .rlib names.
            let mut metadata = Vec::new();
            for name in &names {
                if let Some(stem) = name.strip_suffix(".rlib") {
                    let rmeta = format!("{stem}.rmeta");
                    if !names.contains(&rmeta) && !metadata.contains(&rmeta) {
                        metadata.push(rmeta);
                    }
                }
            }
            names.extend(metadata);
        }
        if let Some(dep_info) = &self.dep_info_file {
            names.push(dep_info.clone());
        }

        let mut build_files = ExpectedFiles::new();
        for name in names {
            let path = self.output_dir.join(&name);
            build_files.insert(name, ExpectedFile::new(path, true));
        }
        build_files
    }

    /// The implicit input files and part of the relevant environment
    /// variables both come out of rustc's dep-info output, so they are
    /// computed together and memoized.
    fn process_dep_info(&mut self) -> Result<()> {
        if self.dep_state.is_some() {
            return Ok(());
        }

        let dep_file = tempfile::Builder::new()
            .prefix("bcache")
            .suffix(".d")
            .tempfile()
            .map_err(|e| Error::preprocess(format!("cannot create temp file: {e}")))?;

        // Re-run with --emit=dep-info only; the original --emit,
        // --out-dir and -C options must not apply to the query.
        let mut query = ArgList::new();
        let mut drop_next = false;
        for arg in &self.invocation.args {
            if std::mem::replace(&mut drop_next, false) {
                continue;
            }
            match arg.as_str() {
                "--emit" | "--out-dir" | "-C" => drop_next = true,
                _ => query.push(arg.clone()),
            }
        }
        query.push("-o");
        query.push(dep_file.path().to_string_lossy());
        query.push("--emit=dep-info");

        let result = run_rustc(&query)?;
        if !result.success() {
            return Err(self.bail(format!(
                "failed to emit dependency information: {}",
                String::from_utf8_lossy(&result.stderr)
            )));
        }

        let content = fs::read_to_string(dep_file.path())
            .map_err(|e| Error::preprocess(format!("cannot read dependency output: {e}")))?;

        let mut implicit_inputs = Vec::new();
        let mut env_vars = BTreeMap::new();

        let mut lines = content.lines();
        // The first rule lists all source dependencies.
        if let Some(rule) = lines.next() {
            if let Some((_, prerequisites)) = rule.split_once(':') {
                implicit_inputs.extend(prerequisites.split_whitespace().map(PathBuf::from));
            }
        }
        // Environment variables rustc recorded as build inputs.
        for line in lines {
            if let Some(dep) = line.strip_prefix("# env-dep:") {
                let (key, value) = dep.split_once('=').unwrap_or((dep, ""));
                // RUSTC_COLOR is controlled from the command line and
                // CARGO_MAKEFLAGS changes on every invocation.
                if key == "RUSTC_COLOR" || key == "CARGO_MAKEFLAGS" {
                    continue;
                }
                env_vars.insert(key.to_string(), value.to_string());
            }
        }

        // Everything cargo exports can steer the build.
        for (key, value) in env::vars() {
            if key.starts_with("CARGO_") && key != "CARGO_MAKEFLAGS" {
                env_vars.insert(key, value);
            }
        }

        // Cargo does not keep the source list sorted.
        implicit_inputs.sort();
        implicit_inputs.dedup();

        self.dep_state = Some(DepState {
            implicit_inputs,
            env_vars,
        });
        Ok(())
    }
}

/// The compiler's own dynamic libraries are part of its identity
fn compiler_shared_libraries(sysroot: &Path) -> Result<Vec<PathBuf>> {
    let (lib_dir, dll_ext) = if cfg!(windows) {
        (sysroot.join("bin"), "dll")
    } else {
        (sysroot.join("lib"), "so")
    };

    let entries = fs::read_dir(&lib_dir)
        .map_err(|e| Error::file_system(lib_dir.clone(), "list compiler libraries", e))?;

    let mut libraries = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| Error::file_system(lib_dir.clone(), "list compiler libraries", e))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == dll_ext) {
            libraries.push(path);
        }
    }
    libraries.sort();
    Ok(libraries)
}

impl ProgramWrapper for RustcWrapper {
    fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    fn invocation_mut(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn can_handle_command(&self) -> bool {
        let cmd = self
            .invocation
            .exe_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_ascii_lowercase());
        cmd.as_deref() == Some("rustc")
    }

    fn resolve_args(&mut self) -> Result<()> {
        self.parse_options()
    }

    fn get_capabilities(&self) -> Vec<String> {
        // Direct mode is required since rustc has no preprocessing step.
        // Hard links are fine: rustc never overwrites existing files.
        ["force_direct_mode", "hard_links"]
            .map(String::from)
            .to_vec()
    }

    fn get_build_files(&mut self) -> Result<ExpectedFiles> {
        // The library file names depend on platform naming conventions,
        // so ask rustc instead of guessing.
        let mut query = self.invocation.args.clone();
        query.push("--print");
        query.push("file-names");
        let result = run_rustc(&query)?;
        if !result.success() {
            return Err(self.bail(format!("failed to run {}", query.join(" "))));
        }

        let names: Vec<String> = String::from_utf8_lossy(&result.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(self.assemble_build_files(names))
    }

    fn get_program_id(&mut self) -> Result<String> {
        // Quite a lot of state identifies the compiler, so hash it here
        // and return the digest instead of a huge string.
        let mut hasher = Hasher::new();
        hasher.update(HASH_VERSION);

        let version = run_rustc(&self.rustc_cmd(&["-vV"]))?;
        if !version.success() {
            return Err(self.bail("unable to get the compiler version information string"));
        }
        hasher.update(&version.stdout);

        let sysroot = run_rustc(&self.rustc_cmd(&["--print=sysroot"]))?;
        if !sysroot.success() {
            return Err(self.bail("unable to get the compiler sysroot"));
        }
        let sysroot = String::from_utf8_lossy(&sysroot.stdout).trim().to_string();

        // The working directory ends up in path-dependent metadata.
        let cwd = env::current_dir()
            .map_err(|e| Error::file_system(PathBuf::from("."), "read working directory", e))?;
        hasher.update(cwd.to_string_lossy().as_bytes());

        for library in compiler_shared_libraries(Path::new(&sysroot))? {
            hasher.update_from_file(&library)?;
        }

        // Static libraries by name and contents.
        for library in &self.static_libraries {
            hasher.update(library.to_string_lossy().as_bytes());
            hasher.update_from_file(library)?;
        }

        Ok(hasher.finalize().as_str().to_string())
    }

    fn get_relevant_arguments(&mut self) -> Result<ArgList> {
        Ok(self.relevant_args.clone())
    }

    fn get_relevant_env_vars(&mut self) -> Result<BTreeMap<String, String>> {
        self.process_dep_info()?;
        Ok(self
            .dep_state
            .as_ref()
            .map(|state| state.env_vars.clone())
            .unwrap_or_default())
    }

    fn get_input_files(&mut self) -> Result<Vec<PathBuf>> {
        // The single source file plus every extern named on the command
        // line.
        let mut inputs = vec![self.input.clone()];
        inputs.extend(self.externs.iter().cloned());
        Ok(inputs)
    }

    fn get_implicit_input_files(&mut self) -> Result<Vec<PathBuf>> {
        self.process_dep_info()?;
        Ok(self
            .dep_state
            .as_ref()
            .map(|state| state.implicit_inputs.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn wrapper(tokens: &[&str]) -> RustcWrapper {
        let args: ArgList = tokens.iter().map(|t| t.to_string()).collect();
        RustcWrapper::new(Invocation::new(tokens[0], args))
    }

    fn base_args() -> Vec<String> {
        [
            "rustc",
            "--crate-name",
            "demo",
            "--edition=2021",
            "src/lib.rs",
            "--crate-type",
            "lib",
            "--emit=dep-info,link,metadata",
            "-C",
            "opt-level=3",
            "-C",
            "extra-filename=-1a2b3c",
            "--out-dir",
            "/build/deps",
            "-L",
            "dependency=/build/deps",
            "--cap-lints",
            "allow",
        ]
        .map(String::from)
        .to_vec()
    }

    fn resolved(tokens: Vec<String>) -> RustcWrapper {
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let mut w = wrapper(&refs);
        w.resolve_args().unwrap();
        w
    }

    #[test]
    fn test_can_handle_command() {
        assert!(wrapper(&["rustc", "src/lib.rs"]).can_handle_command());
        assert!(wrapper(&["/home/u/.cargo/bin/rustc", "src/lib.rs"]).can_handle_command());
        assert!(!wrapper(&["cargo", "build"]).can_handle_command());
        assert!(!wrapper(&["gcc", "-c", "a.c"]).can_handle_command());
    }

    #[test]
    fn test_parse_argument_forms() {
        let opt = parse_argument("--emit=link");
        assert_eq!(opt.class, OptionClass::Emit);
        assert_eq!(opt.option, "--emit");
        assert_eq!(opt.value, "link");

        let opt = parse_argument("-Copt-level=3");
        assert_eq!(opt.class, OptionClass::CodeGen);
        assert_eq!(opt.option, "-C");
        assert_eq!(opt.value, "opt-level=3");

        let opt = parse_argument("-lstatic=z");
        assert_eq!(opt.class, OptionClass::Library);
        assert_eq!(opt.value, "static=z");

        let opt = parse_argument("@args.rsp");
        assert_eq!(opt.class, OptionClass::ResponseFile);
        assert_eq!(opt.value, "args.rsp");

        let opt = parse_argument("src/lib.rs");
        assert_eq!(opt.class, OptionClass::Input);

        let opt = parse_argument("-");
        assert_eq!(opt.class, OptionClass::Unsupported);
    }

    #[test]
    fn test_resolve_collects_build_state() {
        let w = resolved(base_args());
        assert_eq!(w.crate_name, "demo");
        assert_eq!(w.emit, vec!["dep-info", "link", "metadata"]);
        assert_eq!(w.output_dir, PathBuf::from("/build/deps"));
        assert_eq!(w.input, PathBuf::from("src/lib.rs"));
        assert_eq!(w.dep_info_file.as_deref(), Some("demo-1a2b3c.d"));
    }

    #[test]
    fn test_relevant_arguments_filtering() {
        let mut w = resolved(base_args());
        let relevant = w.get_relevant_arguments().unwrap();
        assert_eq!(
            relevant.as_slice(),
            &[
                "--crate-name",
                "demo",
                "src/lib.rs",
                "--crate-type",
                "lib",
                "--emit",
                "dep-info,link,metadata",
                "-C",
                "opt-level=3",
                "-C",
                "extra-filename=-1a2b3c",
            ]
        );
    }

    #[test]
    fn test_externs_feed_input_files() {
        let mut args = base_args();
        args.extend(
            ["--extern", "zeta=libs/z.rlib", "--extern", "alpha=/abs/a.rlib"].map(String::from),
        );
        let mut w = resolved(args);

        assert_eq!(w.externs.len(), 2);
        assert!(w.externs.iter().all(|path| path.is_absolute()));
        assert!(w.externs.contains(&PathBuf::from("/abs/a.rlib")));
        let mut sorted = w.externs.clone();
        sorted.sort();
        assert_eq!(w.externs, sorted);

        let inputs = w.get_input_files().unwrap();
        assert_eq!(inputs[0], PathBuf::from("src/lib.rs"));
        assert_eq!(inputs.len(), 3);
    }

    #[test]
    fn test_static_libraries_are_resolved() {
        let temp_dir = TempDir::new().unwrap();
        let lib = temp_dir.path().join("libembedded.a");
        fs::write(&lib, "!<arch>\n").unwrap();

        let mut args = base_args();
        args.extend(
            [
                "-L",
                &format!("native={}", temp_dir.path().display()),
                "-l",
                "static=embedded",
            ]
            .map(String::from),
        );
        let w = resolved(args);
        assert_eq!(w.static_libraries, vec![lib]);
    }

    #[test]
    fn test_emit_requirements() {
        let without_emit: Vec<String> = base_args()
            .into_iter()
            .filter(|arg| !arg.starts_with("--emit"))
            .collect();
        let refs: Vec<&str> = without_emit.iter().map(String::as_str).collect();
        assert!(wrapper(&refs).resolve_args().is_err());

        let link_only: Vec<String> = base_args()
            .into_iter()
            .map(|arg| {
                if arg.starts_with("--emit") {
                    "--emit=link".to_string()
                } else {
                    arg
                }
            })
            .collect();
        let refs: Vec<&str> = link_only.iter().map(String::as_str).collect();
        assert!(wrapper(&refs).resolve_args().is_err());

        let with_asm: Vec<String> = base_args()
            .into_iter()
            .map(|arg| {
                if arg.starts_with("--emit") {
                    "--emit=asm,link,metadata".to_string()
                } else {
                    arg
                }
            })
            .collect();
        let refs: Vec<&str> = with_asm.iter().map(String::as_str).collect();
        assert!(wrapper(&refs).resolve_args().is_err());
    }

    #[test]
    fn test_uncacheable_arguments_are_rejected() {
        for extra in [
            vec!["-C", "incremental=/tmp/inc"],
            vec!["-o", "out.rlib"],
            vec!["@args.rsp"],
            vec!["src/other.rs"],
            vec!["--target", "custom.json"],
        ] {
            let mut args = base_args();
            args.extend(extra.iter().map(|arg| arg.to_string()));
            let refs: Vec<&str> = args.iter().map(String::as_str).collect();
            let err = wrapper(&refs).resolve_args().unwrap_err();
            assert!(matches!(err, Error::Unsupported { .. }));
        }
    }

    #[test]
    fn test_error_messages_carry_the_crate_name() {
        let mut args = base_args();
        args.extend(["-C", "incremental=/tmp/inc"].map(String::from));
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let err = wrapper(&refs).resolve_args().unwrap_err();
        assert!(err.to_string().contains("demo"));
    }

    #[test]
    fn test_assemble_build_files() {
        let w = resolved(base_args());
        let files = w.assemble_build_files(vec!["libdemo-1a2b3c.rlib".to_string()]);

        let rlib = files.get("libdemo-1a2b3c.rlib").unwrap();
        assert_eq!(rlib.path, PathBuf::from("/build/deps/libdemo-1a2b3c.rlib"));
        assert!(rlib.required);
        assert!(files.contains_key("libdemo-1a2b3c.rmeta"));
        assert!(files.contains_key("demo-1a2b3c.d"));
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_capabilities() {
        let w = wrapper(&["rustc", "src/lib.rs"]);
        let caps = w.get_capabilities();
        assert!(caps.contains(&"force_direct_mode".to_string()));
        assert!(caps.contains(&"hard_links".to_string()));
    }
}
