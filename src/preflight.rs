use anyhow::{bail, Result};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// Verifies every required external tool is reachable via the provided
/// PATH before launch. A missing tool halts the run.
pub fn check(required: &[String], path_var: Option<&OsStr>) -> Result<()> {
    for tool in required {
        if find_tool(tool, path_var).is_none() {
            bail!(
                "Required tool '{tool}' was not found on PATH. Install it and \
                 make sure its directory is on PATH before launching."
            );
        }
    }
    Ok(())
}

pub fn find_tool(tool: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    for dir in std::env::split_paths(path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for name in tool_file_names(tool) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn tool_file_names(tool: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(tool).extension().is_none() {
        vec![format!("{tool}.exe"), tool.to_string()]
    } else {
        vec![tool.to_string()]
    }
}
