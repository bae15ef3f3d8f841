//! bcache command-line entry point
//!
//! Invoked either as `bcache <tool> <args…>` or through a symlink whose
//! basename is the tool name, in which case the whole argv is the
//! wrapped command.

use bcache_config::Config;
use bcache_core::args::basename;
use bcache_core::ArgList;
use bcache_wrappers::{find_wrapper, handle_command, Runtime};
use clap::Parser;
use std::env;
use std::process::{Command, ExitCode};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bcache")]
#[command(about = "A transparent compiler output cache", long_about = None)]
#[command(version)]
struct Cli {
    /// Remove everything from the cache
    #[arg(short = 'C', long)]
    clear: bool,

    /// The tool invocation to cache
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    let argv: Vec<String> = env::args().collect();
    let invoked_as = argv.first().map(|arg0| basename(arg0)).unwrap_or_default();

    // Symlink mode: a symlink named after the tool wraps the whole argv.
    let (clear, command) = if invoked_as.starts_with("bcache") {
        let cli = Cli::parse();
        (cli.clear, cli.command)
    } else {
        (false, argv)
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bcache: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    let runtime = Runtime::new(config);

    if clear {
        return match runtime.cache.clear() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("bcache: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if command.is_empty() {
        eprintln!("bcache: no command given (try 'bcache --help')");
        return ExitCode::FAILURE;
    }

    let args = ArgList::from(command);

    if let Some(mut wrapper) = find_wrapper(&args) {
        if let Some(exit_code) = handle_command(wrapper.as_mut(), &runtime) {
            return to_exit_code(exit_code);
        }
        debug!("command not handled, falling back to direct execution");
    }

    run_uncached(&args)
}

/// Execute the command directly, inheriting the standard streams
fn run_uncached(args: &ArgList) -> ExitCode {
    let program = &args[0];
    match Command::new(program).args(&args.as_slice()[1..]).status() {
        Ok(status) => to_exit_code(status.code().unwrap_or(1)),
        Err(e) => {
            eprintln!("bcache: failed to execute '{program}': {e}");
            ExitCode::FAILURE
        }
    }
}

fn to_exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path);
            match file {
                Ok(file) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(std::sync::Arc::new(file))
                        .with_ansi(false)
                        .init();
                }
                Err(e) => {
                    eprintln!("bcache: cannot open log file '{}': {e}", path.display());
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(std::io::stderr)
                        .init();
                }
            }
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
