//! Subprocess execution with captured output
//!
//! The pipeline is strictly sequential, so commands run synchronously and
//! block until completion. Both standard streams are captured; callers
//! decide whether to replay them.

use bcache_core::{ArgList, Error, Result, RunResult};
use std::process::Command;

/// Run a command given as an argument list, capturing stdout and stderr.
///
/// A non-zero exit code is not an error; only failure to launch is.
pub fn run(args: &ArgList) -> Result<RunResult> {
    run_with_env_removed(args, &[])
}

/// Run a command with a set of environment variables removed from the
/// child's environment. Tools like rustc absorb build-breaking state
/// from variables such as LD_PRELOAD or SOURCE_DATE_EPOCH; wrappers pass
/// them here to keep runs reproducible.
pub fn run_with_env_removed(args: &ArgList, removed: &[&str]) -> Result<RunResult> {
    let program = args
        .first()
        .ok_or_else(|| Error::tool_exec("", "empty command line"))?;

    let mut command = Command::new(program);
    command.args(&args.as_slice()[1..]);
    for var in removed {
        command.env_remove(var);
    }

    let output = command
        .output()
        .map_err(|e| Error::tool_exec(program, e.to_string()))?;

    Ok(RunResult {
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Run a command, optionally prepending a prefix command (e.g. icecc)
pub fn run_with_prefix(args: &ArgList, prefix: Option<&str>) -> Result<RunResult> {
    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            let mut prefixed = ArgList::new();
            prefixed.push(prefix);
            prefixed.append(args);
            run(&prefixed)
        }
        _ => run(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> ArgList {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_run_captures_stdout() {
        let result = run(&args(&["sh", "-c", "printf hello"])).unwrap();
        assert_eq!(result.stdout, b"hello");
        assert_eq!(result.exit_code, 0);
        assert!(result.success());
    }

    #[test]
    fn test_run_captures_stderr_and_exit_code() {
        let result = run(&args(&["sh", "-c", "printf oops >&2; exit 3"])).unwrap();
        assert_eq!(result.stderr, b"oops");
        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
    }

    #[test]
    fn test_run_launch_failure() {
        let err = run(&args(&["/no/such/binary-xyz"])).unwrap_err();
        assert!(matches!(err, Error::ToolExec { .. }));
    }

    #[test]
    fn test_run_empty_command() {
        assert!(run(&ArgList::new()).is_err());
    }

    #[test]
    fn test_run_with_env_removed() {
        std::env::set_var("BCACHE_SYS_TEST_VAR", "leaky");
        let probe = args(&["sh", "-c", "printf \"%s\" \"$BCACHE_SYS_TEST_VAR\""]);

        let result = run(&probe).unwrap();
        assert_eq!(result.stdout, b"leaky");

        let result = run_with_env_removed(&probe, &["BCACHE_SYS_TEST_VAR"]).unwrap();
        assert_eq!(result.stdout, b"");

        std::env::remove_var("BCACHE_SYS_TEST_VAR");
    }

    #[test]
    fn test_run_with_prefix() {
        // `env` as prefix is a transparent launcher
        let result = run_with_prefix(&args(&["sh", "-c", "printf hi"]), Some("env")).unwrap();
        assert_eq!(result.stdout, b"hi");

        let result = run_with_prefix(&args(&["sh", "-c", "printf hi"]), None).unwrap();
        assert_eq!(result.stdout, b"hi");
    }
}
