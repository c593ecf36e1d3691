use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::Path,
    time::{Duration, UNIX_EPOCH},
};

/// What the last successful install saw; used to skip redundant pip runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallState {
    pub manifest_mtime_unix: u64,
    #[serde(default)]
    pub launcher_version: String,
}

pub fn file_mtime_unix(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).with_context(|| format!("metadata {}", path.display()))?;
    let mtime = meta.modified().context("modified time")?;
    Ok(mtime
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs())
}

pub fn read_state(state_path: &Path) -> Result<Option<InstallState>> {
    if !state_path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(state_path)
        .with_context(|| format!("read {}", state_path.display()))?;
    let state = serde_json::from_str(&s)
        .with_context(|| format!("parse {}", state_path.display()))?;
    Ok(Some(state))
}

pub fn write_state(state_path: &Path, state: &InstallState) -> Result<()> {
    if let Some(parent) = state_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(state).context("serialize install state")?;
    crate::fs_ops::write_bytes_with_retry(state_path, contents.as_bytes(), 3)?;
    Ok(())
}

pub fn needs_install(state: Option<&InstallState>, manifest_mtime: u64, venv_created: bool) -> bool {
    if venv_created {
        return true;
    }
    match state {
        None => true,
        Some(st) => st.manifest_mtime_unix != manifest_mtime,
    }
}
