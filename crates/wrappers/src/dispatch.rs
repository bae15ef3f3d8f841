//! Wrapper selection
//!
//! Wrappers are registered in a fixed order; the first one that claims a
//! command wins. When none does, the caller executes the command
//! directly without caching.

use crate::cppcheck::CppcheckWrapper;
use crate::gcc::GccWrapper;
use crate::rustc::RustcWrapper;
use crate::wrapper::{Invocation, ProgramWrapper};
use bcache_core::ArgList;
use bcache_utils::paths;

type WrapperCtor = fn(Invocation) -> Box<dyn ProgramWrapper>;

// Registration order is stable across builds.
const WRAPPERS: &[WrapperCtor] = &[
    GccWrapper::boxed,
    RustcWrapper::boxed,
    CppcheckWrapper::boxed,
];

/// Select a wrapper for the given argument vector
pub fn find_wrapper(args: &ArgList) -> Option<Box<dyn ProgramWrapper>> {
    let arg0 = args.first()?;
    let exe_path = paths::resolve_exe(arg0);

    for ctor in WRAPPERS {
        let wrapper = ctor(Invocation::new(exe_path.clone(), args.clone()));
        if wrapper.can_handle_command() {
            return Some(wrapper);
        }
    }
    None
}
