//! Shared utilities for bcache
//!
//! File system helpers, subprocess execution, response file expansion
//! and telemetry timing.

pub mod paths;
pub mod perf;
pub mod response_file;
pub mod sys;
pub mod xdg;
