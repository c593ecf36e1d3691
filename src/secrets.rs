use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::SecretSource;

/// Resolves the configured secret for injection into the child environment
/// only. An already-set environment variable wins over the token file; a
/// value that resolves from neither is a terminal diagnostic. The value is
/// never logged or printed.
pub fn resolve(root: &Path, source: Option<&SecretSource>) -> Result<Vec<(String, String)>> {
    resolve_with(root, source, |name| std::env::var(name).ok())
}

pub fn resolve_with(
    root: &Path,
    source: Option<&SecretSource>,
    ambient: impl Fn(&str) -> Option<String>,
) -> Result<Vec<(String, String)>> {
    let Some(source) = source else {
        return Ok(Vec::new());
    };

    if let Some(value) = ambient(&source.env_var) {
        let value = value.trim().to_string();
        if !value.is_empty() {
            return Ok(vec![(source.env_var.clone(), value)]);
        }
    }

    let token_path = root.join(&source.token_file);
    if token_path.exists() {
        let contents = fs_read(&token_path)?;
        let value = contents.lines().next().unwrap_or("").trim();
        if !value.is_empty() {
            return Ok(vec![(source.env_var.clone(), value.to_string())]);
        }
    }

    bail!(
        "Secret {} is not set and {} does not contain a value. Set the \
         environment variable or put the token on the first line of that file.",
        source.env_var,
        token_path.display()
    )
}

fn fs_read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}
