use anyhow::{bail, Result};
use std::{
    path::Path,
    process::{Command, ExitStatus, Stdio},
};

use crate::config::ManifestPolicy;
use crate::fs_ops;

/// Written under the generate-default policy when no manifest exists.
pub const DEFAULT_MANIFEST: &str = "aiogram>=3.4,<4\n";

/// Returns whether a manifest was generated.
pub fn ensure_manifest(manifest_path: &Path, policy: ManifestPolicy) -> Result<bool> {
    if manifest_path.exists() {
        return Ok(false);
    }
    match policy {
        ManifestPolicy::FailFast => bail!(
            "Dependency manifest {} is missing. Create it next to the launcher, \
             or switch manifest_policy to generate-default.",
            manifest_path.display()
        ),
        ManifestPolicy::GenerateDefault => {
            fs_ops::write_bytes_with_retry(manifest_path, DEFAULT_MANIFEST.as_bytes(), 3)?;
            Ok(true)
        }
    }
}

/// Upgrades pip, then installs the manifest into the environment. Either
/// failure is terminal; nothing is rolled back.
pub fn install(
    venv_python: &Path,
    root: &Path,
    manifest_path: &Path,
    exec: &mut impl FnMut(&mut Command) -> Result<ExitStatus>,
) -> Result<()> {
    let mut upgrade = pip_cmd(venv_python, root);
    upgrade.args(["install", "--upgrade", "pip"]);
    let status = exec(&mut upgrade)?;
    if !status.success() {
        bail!("Upgrading pip failed (exit {:?}).", status.code());
    }

    let mut install = pip_cmd(venv_python, root);
    install.arg("install").arg("-r").arg(manifest_path);
    let status = exec(&mut install)?;
    if !status.success() {
        bail!(
            "Installing dependencies from {} failed (exit {:?}). \
             Fix the manifest or the network and run the launcher again.",
            manifest_path.display(),
            status.code()
        );
    }
    Ok(())
}

fn pip_cmd(venv_python: &Path, root: &Path) -> Command {
    let mut c = Command::new(venv_python);
    c.arg("-m").arg("pip").current_dir(root).stdin(Stdio::null());
    c
}
