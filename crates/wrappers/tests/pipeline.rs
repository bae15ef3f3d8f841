//! End-to-end tests for the lookup pipeline
//!
//! A scripted wrapper drives a small shell tool through the real
//! pipeline, cache store and program-ID cache, all rooted in a temp
//! directory.

use bcache_cache::{ExpectedFile, ExpectedFiles};
use bcache_config::Config;
use bcache_core::{ArgList, Error, Result};
use bcache_wrappers::{handle_command, Invocation, ProgramWrapper, Runtime};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct ScriptedWrapper {
    invocation: Invocation,
    capabilities: Vec<String>,
    build_files: ExpectedFiles,
    source: PathBuf,
    implicit_inputs: Vec<PathBuf>,
    direct_inputs: Vec<PathBuf>,
    fail_preprocess: bool,
    preprocess_calls: Arc<AtomicUsize>,
    program_id_calls: Arc<AtomicUsize>,
}

impl ProgramWrapper for ScriptedWrapper {
    fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    fn invocation_mut(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn can_handle_command(&self) -> bool {
        true
    }

    fn get_capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn get_build_files(&mut self) -> Result<ExpectedFiles> {
        Ok(self.build_files.clone())
    }

    fn get_program_id(&mut self) -> Result<String> {
        self.program_id_calls.fetch_add(1, Ordering::SeqCst);
        Ok("test-tool 1.0".to_string())
    }

    fn get_input_files(&mut self) -> Result<Vec<PathBuf>> {
        Ok(self.direct_inputs.clone())
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>> {
        self.preprocess_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_preprocess {
            return Err(Error::preprocess("scripted preprocessor failure"));
        }
        fs::read(&self.source).map_err(|e| Error::preprocess(e.to_string()))
    }

    fn get_implicit_input_files(&mut self) -> Result<Vec<PathBuf>> {
        Ok(self.implicit_inputs.clone())
    }
}

struct TestBench {
    _dir: TempDir,
    cache_dir: PathBuf,
    source: PathBuf,
    header: PathBuf,
    object: PathBuf,
    script: PathBuf,
    counter: PathBuf,
    preprocess_calls: Arc<AtomicUsize>,
    program_id_calls: Arc<AtomicUsize>,
}

impl TestBench {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let source = root.join("src.c");
        let header = root.join("src.h");
        let object = root.join("out.o");
        let script = root.join("tool.sh");
        let counter = root.join("counter");

        fs::write(&source, "int answer = 42;\n").unwrap();
        fs::write(&header, "#define VERSION 1\n").unwrap();
        // The fake compiler: bump the run counter, derive the object from
        // its inputs, report progress on stdout.
        fs::write(
            &script,
            format!(
                "#!/bin/sh\nprintf x >> '{}'\ncat '{}' '{}' > '{}'\nprintf compiling\n",
                counter.display(),
                source.display(),
                header.display(),
                object.display(),
            ),
        )
        .unwrap();

        Self {
            _dir: dir,
            cache_dir: root.join("cache"),
            source,
            header,
            object,
            script,
            counter,
            preprocess_calls: Arc::new(AtomicUsize::new(0)),
            program_id_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn config(&self) -> Config {
        Config {
            cache_dir: self.cache_dir.clone(),
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

    fn runtime(&self) -> Runtime {
        Runtime::new(self.config())
    }

    fn runtime_with(&self, tweak: impl FnOnce(&mut Config)) -> Runtime {
        let mut config = self.config();
        tweak(&mut config);
        Runtime::new(config)
    }

    fn wrapper(&self) -> ScriptedWrapper {
        let args: ArgList = vec!["sh".to_string(), self.script.display().to_string()].into();
        let mut build_files = ExpectedFiles::new();
        build_files.insert("object".to_string(), ExpectedFile::new(&self.object, true));

        ScriptedWrapper {
            invocation: Invocation::new(&self.script, args),
            capabilities: Vec::new(),
            build_files,
            source: self.source.clone(),
            implicit_inputs: vec![self.header.clone()],
            direct_inputs: Vec::new(),
            fail_preprocess: false,
            preprocess_calls: Arc::clone(&self.preprocess_calls),
            program_id_calls: Arc::clone(&self.program_id_calls),
        }
    }

    fn direct_wrapper(&self) -> ScriptedWrapper {
        let mut wrapper = self.wrapper();
        wrapper.capabilities = vec!["force_direct_mode".to_string()];
        wrapper.direct_inputs = vec![self.source.clone()];
        wrapper
    }

    fn tool_runs(&self) -> usize {
        fs::read(&self.counter).map(|bytes| bytes.len()).unwrap_or(0)
    }

    fn preprocess_count(&self) -> usize {
        self.preprocess_calls.load(Ordering::SeqCst)
    }

    fn expected_object(&self) -> Vec<u8> {
        let mut bytes = fs::read(&self.source).unwrap();
        bytes.extend(fs::read(&self.header).unwrap());
        bytes
    }
}

#[test]
fn test_miss_then_hit_idempotence() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    // First run: miss, the tool executes and the entry is installed
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    let first_object = fs::read(&bench.object).unwrap();
    assert_eq!(first_object, bench.expected_object());

    // Second run: hit, the tool does not execute, the object is restored
    fs::remove_file(&bench.object).unwrap();
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    assert_eq!(fs::read(&bench.object).unwrap(), first_object);
}

#[test]
fn test_changed_source_is_a_miss() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    fs::write(&bench.source, "int answer = 43;\n").unwrap();
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 2);
    assert_eq!(fs::read(&bench.object).unwrap(), bench.expected_object());
}

#[test]
fn test_program_id_queried_once_within_ttl() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.program_id_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_terminate_on_miss() {
    let bench = TestBench::new();
    let runtime = bench.runtime_with(|c| c.terminate_on_miss = true);

    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(1));
    // The tool never ran and nothing was inserted
    assert_eq!(bench.tool_runs(), 0);
    assert!(!bench.cache_dir.join("c").exists());
}

#[test]
fn test_read_only_suppresses_insertion() {
    let bench = TestBench::new();
    let runtime = bench.runtime_with(|c| c.read_only = true);

    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(fs::read(&bench.object).unwrap(), bench.expected_object());
    assert!(!bench.cache_dir.join("c").exists());

    // Still a miss the second time around
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 2);
}

#[test]
fn test_read_only_still_serves_hits() {
    let bench = TestBench::new();

    // Populate with a writable runtime, then switch to read-only
    assert_eq!(handle_command(&mut bench.wrapper(), &bench.runtime()), Some(0));

    let runtime = bench.runtime_with(|c| c.read_only = true);
    fs::remove_file(&bench.object).unwrap();
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    assert_eq!(fs::read(&bench.object).unwrap(), bench.expected_object());
}

#[test]
fn test_missing_required_file_prevents_insertion() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    let make_wrapper = || {
        let mut wrapper = bench.wrapper();
        wrapper.build_files.insert(
            "object".to_string(),
            ExpectedFile::new(bench.cache_dir.parent().unwrap().join("never.o"), true),
        );
        wrapper
    };

    // The tool exits 0 but the required file is absent: the exit code is
    // propagated and no entry is installed.
    assert_eq!(handle_command(&mut make_wrapper(), &runtime), Some(0));
    assert_eq!(handle_command(&mut make_wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 2);
}

#[test]
fn test_missing_optional_file_is_omitted() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    let make_wrapper = || {
        let mut wrapper = bench.wrapper();
        wrapper.build_files.insert(
            "listing".to_string(),
            ExpectedFile::new(bench.object.with_extension("lst"), false),
        );
        wrapper
    };

    assert_eq!(handle_command(&mut make_wrapper(), &runtime), Some(0));
    fs::remove_file(&bench.object).unwrap();
    assert_eq!(handle_command(&mut make_wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    assert_eq!(fs::read(&bench.object).unwrap(), bench.expected_object());
    assert!(!bench.object.with_extension("lst").exists());
}

#[test]
fn test_compressed_entries_round_trip() {
    let bench = TestBench::new();
    let runtime = bench.runtime_with(|c| c.compress = true);

    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    fs::remove_file(&bench.object).unwrap();
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    assert_eq!(fs::read(&bench.object).unwrap(), bench.expected_object());
}

#[test]
fn test_direct_mode_promotion() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    // First run: no direct entry yet, preprocessor-mode miss, tool runs,
    // both entries are installed.
    assert_eq!(handle_command(&mut bench.direct_wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    assert_eq!(bench.preprocess_count(), 1);

    // Second run: direct hit, preprocessing is skipped entirely.
    fs::remove_file(&bench.object).unwrap();
    assert_eq!(handle_command(&mut bench.direct_wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    assert_eq!(bench.preprocess_count(), 1);
    assert_eq!(fs::read(&bench.object).unwrap(), bench.expected_object());
}

#[test]
fn test_direct_entry_installed_on_preprocessor_hit() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    // Populate the preprocessor entry without direct mode.
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);

    // Direct lookup misses, preprocessor lookup hits, and the direct
    // entry is installed opportunistically.
    assert_eq!(handle_command(&mut bench.direct_wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    assert_eq!(bench.preprocess_count(), 2);

    // Third run hits directly, skipping preprocessing.
    assert_eq!(handle_command(&mut bench.direct_wrapper(), &runtime), Some(0));
    assert_eq!(bench.preprocess_count(), 2);
}

#[test]
fn test_stale_implicit_input_degrades_to_preprocessor_mode() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    assert_eq!(handle_command(&mut bench.direct_wrapper(), &runtime), Some(0));
    assert_eq!(handle_command(&mut bench.direct_wrapper(), &runtime), Some(0));
    assert_eq!(bench.preprocess_count(), 1);

    // Change the implicit input: the direct entry goes stale and is
    // invalidated, so the pipeline falls back to preprocessor mode
    // instead of serving a wrong direct hit.
    fs::write(&bench.header, "#define VERSION 2\n").unwrap();
    assert_eq!(handle_command(&mut bench.direct_wrapper(), &runtime), Some(0));
    assert_eq!(bench.preprocess_count(), 2);
}

#[test]
fn test_missing_direct_input_falls_back_to_preprocessor_mode() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    let make_wrapper = || {
        let mut wrapper = bench.direct_wrapper();
        wrapper
            .direct_inputs
            .push(bench.source.with_file_name("vanished.c"));
        wrapper
    };

    // Direct-mode hashing fails on the missing input; the pipeline
    // degrades to preprocessor mode and still caches.
    assert_eq!(handle_command(&mut make_wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);

    fs::remove_file(&bench.object).unwrap();
    assert_eq!(handle_command(&mut make_wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);
    assert_eq!(fs::read(&bench.object).unwrap(), bench.expected_object());
}

#[test]
fn test_preprocess_failure_is_unhandled() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    let mut wrapper = bench.wrapper();
    wrapper.fail_preprocess = true;
    assert_eq!(handle_command(&mut wrapper, &runtime), None);
    assert_eq!(bench.tool_runs(), 0);
}

#[test]
fn test_hash_extra_files_affect_the_key() {
    let bench = TestBench::new();
    let extra = bench.cache_dir.parent().unwrap().join("toolchain.spec");
    fs::write(&extra, "spec v1").unwrap();
    let runtime = bench.runtime_with(|c| c.hash_extra_files = vec![extra.clone()]);

    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 1);

    // Same command, changed extra file: different key, fresh miss
    fs::write(&extra, "spec v2").unwrap();
    assert_eq!(handle_command(&mut bench.wrapper(), &runtime), Some(0));
    assert_eq!(bench.tool_runs(), 2);
}

#[test]
fn test_nonzero_tool_exit_is_propagated_and_not_cached() {
    let bench = TestBench::new();
    let runtime = bench.runtime();

    fs::write(
        &bench.script,
        format!(
            "#!/bin/sh\nprintf x >> '{}'\nexit 4\n",
            bench.counter.display()
        ),
    )
    .unwrap();

    let make_wrapper = || {
        let mut wrapper = bench.wrapper();
        wrapper.build_files.clear();
        wrapper
    };

    assert_eq!(handle_command(&mut make_wrapper(), &runtime), Some(4));
    assert_eq!(handle_command(&mut make_wrapper(), &runtime), Some(4));
    assert_eq!(bench.tool_runs(), 2);
    assert!(!bench.cache_dir.join("c").exists());
}
