//! The cache lookup pipeline
//!
//! [`handle_command`] drives one wrapped invocation: resolve arguments,
//! build the cache keys, look up, and on a miss run the tool and install
//! a new entry. It returns `Some(exit_code)` when the invocation was
//! handled (served from cache, executed, or terminated on a miss) and
//! `None` when it was not, in which case the caller runs the command
//! directly without caching.

use crate::capabilities::Capabilities;
use crate::runtime::Runtime;
use crate::wrapper::ProgramWrapper;
use bcache_cache::{CacheEntry, CachedRun, CompressionMode, Digest, ExpectedFiles, Hasher};
use bcache_core::Result;
use bcache_utils::paths;
use bcache_utils::perf::PerfTimer;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROGRAM_ID_CACHE_TTL: Duration = Duration::from_secs(300);

/// Handle a wrapped command. Any error inside the pipeline is caught
/// here so that nothing escapes the wrapper framework; the command is
/// then reported as unhandled and the caller falls back to executing the
/// tool directly, which is degraded but correct.
pub fn handle_command(wrapper: &mut dyn ProgramWrapper, runtime: &Runtime) -> Option<i32> {
    match try_handle(wrapper, runtime) {
        Ok(exit_code) => Some(exit_code),
        Err(e) => {
            debug!("pipeline bailed out: {e}");
            None
        }
    }
}

fn try_handle(wrapper: &mut dyn ProgramWrapper, runtime: &Runtime) -> Result<i32> {
    let config = &runtime.config;

    // Begin by resolving any response files.
    {
        let _t = PerfTimer::start("RESOLVE_ARGS");
        wrapper.resolve_args()?;
    }

    let capabilities = {
        let _t = PerfTimer::start("GET_CAPABILITIES");
        Capabilities::from_strings(&wrapper.get_capabilities(), config)
    };

    let expected_files = {
        let _t = PerfTimer::start("GET_BUILD_FILES");
        wrapper.get_build_files()?
    };

    let mut hasher = Hasher::new();

    {
        let _t = PerfTimer::start("HASH_EXTRA_FILES");
        for extra_file in &config.hash_extra_files {
            hasher.update_from_file(extra_file)?;
        }
    }

    {
        let _t = PerfTimer::start("GET_PRG_ID");
        hasher.update(program_id_cached(wrapper, runtime)?);
    }

    {
        let _t = PerfTimer::start("FILTER_ARGS");
        hasher.update_seq(wrapper.get_relevant_arguments()?.iter());
        let env_vars = wrapper.get_relevant_env_vars()?;
        hasher.update_seq(env_vars.iter().map(|(key, value)| format!("{key}={value}")));
    }

    // Non-empty once direct-mode key material has been computed; used to
    // install a direct entry when the preprocessor digest becomes known.
    let mut direct_digest: Option<Digest> = None;

    if capabilities.direct_mode() {
        match direct_mode_lookup(wrapper, runtime, &hasher, &expected_files, capabilities) {
            Ok(DirectLookup::Hit(run)) => {
                debug!("direct mode cache hit");
                replay_streams(&run.stdout, &run.stderr);
                return Ok(run.exit_code);
            }
            Ok(DirectLookup::Miss(digest)) => direct_digest = digest,
            // This can happen if one of the input files is missing, for
            // instance. Fall through to preprocessor mode.
            Err(e) => debug!("direct mode lookup failed: {e}"),
        }
    }

    {
        let _t = PerfTimer::start("PREPROCESS");
        hasher.update(wrapper.preprocess_source()?);
    }
    let hash = hasher.finalize();

    if let Some(run) = runtime.cache.lookup(
        &hash,
        &expected_files,
        capabilities.hard_links(),
        capabilities.create_target_dirs(),
    ) {
        if let Some(direct) = &direct_digest {
            install_direct_entry(wrapper, runtime, direct, &hash);
        }
        info!("Cache hit ({hash})");
        replay_streams(&run.stdout, &run.stderr);
        return Ok(run.exit_code);
    }

    info!("Cache miss ({hash})");

    if config.terminate_on_miss {
        let files: Vec<String> = expected_files
            .values()
            .map(|f| f.path.display().to_string())
            .collect();
        info!("Terminating! Expected files: {}", files.join(", "));
        return Ok(1);
    }

    let result = {
        let _t = PerfTimer::start("RUN_FOR_MISS");
        wrapper.run_for_miss(config.prefix.as_deref())?
    };

    // Keep required files unconditionally and optional files that exist.
    let file_ids: Vec<String> = expected_files
        .iter()
        .filter(|(_, file)| file.required || file.path.exists())
        .map(|(id, _)| id.clone())
        .collect();

    // No entries for failed runs (that would risk caching intermittent
    // faults) and none in read-only mode.
    if result.success() && !config.read_only {
        let entry = CacheEntry {
            file_ids,
            compression: if config.compress {
                CompressionMode::All
            } else {
                CompressionMode::None
            },
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            exit_code: result.exit_code,
        };
        match runtime
            .cache
            .add(&hash, &entry, &expected_files, capabilities.hard_links())
        {
            Ok(()) => {
                if let Some(direct) = &direct_digest {
                    install_direct_entry(wrapper, runtime, direct, &hash);
                }
            }
            Err(e) => warn!("failed to add cache entry {hash}: {e}"),
        }
    }

    replay_streams(&result.stdout, &result.stderr);
    Ok(result.exit_code)
}

enum DirectLookup {
    Hit(CachedRun),
    Miss(Option<Digest>),
}

fn direct_mode_lookup(
    wrapper: &mut dyn ProgramWrapper,
    runtime: &Runtime,
    base_hasher: &Hasher,
    expected_files: &ExpectedFiles,
    capabilities: Capabilities,
) -> Result<DirectLookup> {
    let input_files = wrapper.get_input_files()?;
    if input_files.is_empty() {
        return Ok(DirectLookup::Miss(None));
    }

    // The hash so far is common to both key modes. Fork it and inject a
    // separator so direct and preprocessor mode digests cannot collide.
    let mut dm_hasher = base_hasher.clone();
    dm_hasher.inject_separator();

    // The complete command line: direct mode needs the macros and include
    // paths that get_relevant_arguments strips.
    dm_hasher.update_seq(wrapper.invocation().args.iter());

    {
        let _t = PerfTimer::start("HASH_INPUT_FILES");
        for file in &input_files {
            // The resolved source path keeps distinct working trees from
            // colliding in a shared cache.
            dm_hasher.update(paths::resolve_path(file).to_string_lossy().as_bytes());
            dm_hasher.inject_separator();
            dm_hasher.update_from_file(file)?;
        }
    }
    let direct_digest = dm_hasher.finalize();

    match runtime.cache.lookup_direct(
        &direct_digest,
        expected_files,
        capabilities.hard_links(),
        capabilities.create_target_dirs(),
    ) {
        Some(run) => Ok(DirectLookup::Hit(run)),
        None => Ok(DirectLookup::Miss(Some(direct_digest))),
    }
}

fn install_direct_entry(
    wrapper: &mut dyn ProgramWrapper,
    runtime: &Runtime,
    direct_digest: &Digest,
    preprocessor_digest: &Digest,
) {
    match wrapper.get_implicit_input_files() {
        Ok(implicit_inputs) => {
            if let Err(e) =
                runtime
                    .cache
                    .add_direct(direct_digest, preprocessor_digest, &implicit_inputs)
            {
                warn!("failed to add direct entry {direct_digest}: {e}");
            }
        }
        Err(e) => warn!("failed to collect implicit input files: {e}"),
    }
}

/// Query the program ID through the TTL cache, falling back to the
/// wrapper hook on any store problem.
fn program_id_cached(wrapper: &mut dyn ProgramWrapper, runtime: &Runtime) -> Result<String> {
    // Key the item by the executable's path, size and modification time.
    let key = match program_id_key(wrapper) {
        Ok(key) => key,
        Err(e) => {
            warn!("unable to key the program-ID cache: {e}");
            return wrapper.get_program_id();
        }
    };

    if let Some(program_id) = runtime.prgid.get_item(key.as_str()) {
        debug!(
            "found cached program ID for {}",
            wrapper.invocation().exe_path.display()
        );
        return Ok(program_id);
    }

    debug!(
        "program ID cache miss for {}",
        wrapper.invocation().exe_path.display()
    );
    let program_id = wrapper.get_program_id()?;
    if let Err(e) = runtime
        .prgid
        .store_item(key.as_str(), &program_id, PROGRAM_ID_CACHE_TTL)
    {
        warn!("failed to store program ID: {e}");
    }
    Ok(program_id)
}

fn program_id_key(wrapper: &dyn ProgramWrapper) -> Result<Digest> {
    let exe_path = &wrapper.invocation().exe_path;
    let stamp = paths::file_stamp(exe_path)?;
    let mut hasher = Hasher::new();
    hasher.update(format!(
        "{}:{}:{}",
        exe_path.display(),
        stamp.size,
        stamp.mtime_ms
    ));
    Ok(hasher.finalize())
}

fn replay_streams(stdout: &[u8], stderr: &[u8]) {
    let _ = std::io::stdout().write_all(stdout);
    let _ = std::io::stderr().write_all(stderr);
}
