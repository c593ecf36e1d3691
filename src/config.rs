use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

include!(concat!(env!("OUT_DIR"), "/venvlaunch_config.rs"));

pub const SETTINGS_FILE_NAME: &str = "launcher.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value")]
pub enum EntryPoint {
    #[serde(rename = "python_file")]
    PythonFile(String),
    #[serde(rename = "module")]
    Module(String),
    #[serde(rename = "command")]
    Command(String),
}

/// What to do when the dependency manifest is absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestPolicy {
    /// Abort before any install step.
    FailFast,
    /// Write a minimal one-line manifest, then proceed.
    GenerateDefault,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretSource {
    /// Environment variable the application expects (e.g. BOT_TOKEN).
    pub env_var: String,
    /// Non-versioned file next to the launcher holding the value.
    pub token_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub entry: EntryPoint,
    pub manifest: String,
    pub manifest_policy: ManifestPolicy,
    pub required_tools: Vec<String>,
    pub secret: Option<SecretSource>,
    pub venv_dir: String,
    pub pause_on_exit: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            entry: EntryPoint::PythonFile("bot.py".to_string()),
            manifest: "requirements.txt".to_string(),
            manifest_policy: ManifestPolicy::FailFast,
            required_tools: Vec::new(),
            secret: None,
            venv_dir: ".venv".to_string(),
            pause_on_exit: true,
        }
    }
}

/// Reads `launcher.json` next to the launcher; a missing file means defaults.
pub fn load_settings(root: &Path) -> Result<Settings> {
    let path = root.join(SETTINGS_FILE_NAME);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let s = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}
