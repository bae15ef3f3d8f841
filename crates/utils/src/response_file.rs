//! Response file expansion
//!
//! Tokens of the form `@path` name a response file whose whitespace
//! separated contents replace the token in the argument list. Expansion
//! is recursive: a response file may itself contain `@path` tokens.

use bcache_core::{ArgList, Error, Result};
use std::fs;
use std::path::Path;

// Guards against response files that include themselves.
const MAX_EXPANSION_DEPTH: u32 = 16;

/// Expand all `@file` tokens in an argument list
pub fn expand_response_files(args: &ArgList) -> Result<ArgList> {
    expand_at_depth(args, 0)
}

fn expand_at_depth(args: &ArgList, depth: u32) -> Result<ArgList> {
    let mut expanded = ArgList::new();
    for arg in args {
        match arg.strip_prefix('@') {
            Some(path) if !path.is_empty() => {
                let tokens = read_response_file(Path::new(path), depth)?;
                expanded.append(&tokens);
            }
            _ => expanded.push(arg.clone()),
        }
    }
    Ok(expanded)
}

fn read_response_file(path: &Path, depth: u32) -> Result<ArgList> {
    if depth >= MAX_EXPANSION_DEPTH {
        return Err(Error::bad_response_file(
            path,
            "response file nesting too deep",
        ));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::bad_response_file(path, e.to_string()))?;

    let tokens: ArgList = content
        .split_whitespace()
        .map(|t| t.to_string())
        .collect();
    expand_at_depth(&tokens, depth + 1)
}
