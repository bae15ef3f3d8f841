//! Core types for bcache
//!
//! This crate holds the pieces every other bcache crate builds on: the
//! error type, the argument model and the captured result of a tool run.

pub mod args;
pub mod errors;
pub mod run;

pub use args::ArgList;
pub use errors::{Error, Result};
pub use run::RunResult;
