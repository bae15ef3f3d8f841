//! Tool wrappers and the cache lookup pipeline
//!
//! A [`ProgramWrapper`] teaches bcache how to cache one family of tools:
//! which arguments matter, which files are produced, how to preprocess
//! and how to identify the tool version. The [`pipeline`] drives the
//! hashing, lookup, execution and insertion steps; the [`dispatch`]
//! module selects the wrapper for a given command line.

pub mod capabilities;
pub mod cppcheck;
pub mod dispatch;
pub mod gcc;
pub mod pipeline;
pub mod runtime;
pub mod rustc;
pub mod wrapper;

pub use bcache_cache::{ExpectedFile, ExpectedFiles};
pub use capabilities::Capabilities;
pub use dispatch::find_wrapper;
pub use pipeline::handle_command;
pub use runtime::Runtime;
pub use wrapper::{Invocation, ProgramWrapper};
