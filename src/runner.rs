use anyhow::{bail, Context, Result};
use std::{
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Output},
};

use crate::config::{EntryPoint, Settings};
use crate::discovery::{self, DiscoveryConfig};
use crate::logging::{exec_logged, log_line};
use crate::state::{self, InstallState};
use crate::{deps, preflight, secrets, venv};

pub fn run(root: &Path, settings: &Settings, log_path: Option<&Path>) -> Result<ExitStatus> {
    let discovery_cfg = DiscoveryConfig::from_env();
    run_with_deps(
        root,
        settings,
        &discovery_cfg,
        |cmd| cmd.output().context("spawn probe"),
        |cmd| exec_logged(cmd, log_path),
        log_path,
    )
}

/// The whole bootstrap as one sequence with injected process spawns: each
/// step takes its inputs explicitly and every failure is terminal.
pub fn run_with_deps(
    root: &Path,
    settings: &Settings,
    discovery_cfg: &DiscoveryConfig,
    probe: impl FnMut(&mut Command) -> Result<Output>,
    mut exec: impl FnMut(&mut Command) -> Result<ExitStatus>,
    log_path: Option<&Path>,
) -> Result<ExitStatus> {
    log_line(log_path, "Discovering Python interpreter")?;
    let interpreter = discovery::discover(discovery_cfg, probe)?;
    log_line(
        log_path,
        &format!(
            "Using {} ({:?})",
            interpreter.path.display(),
            interpreter.provenance
        ),
    )?;

    log_line(log_path, "Provisioning virtual environment")?;
    let venv = venv::ensure(root, &settings.venv_dir, &interpreter.path, &mut exec)?;

    let manifest_path = root.join(&settings.manifest);
    if deps::ensure_manifest(&manifest_path, settings.manifest_policy)? {
        log_line(
            log_path,
            &format!("Generated default manifest at {}", manifest_path.display()),
        )?;
    }

    let manifest_mtime = state::file_mtime_unix(&manifest_path)?;
    let state_path = venv.state_path();
    let install_state = state::read_state(&state_path)?;
    if state::needs_install(install_state.as_ref(), manifest_mtime, venv.created) {
        log_line(log_path, "Installing dependencies")?;
        deps::install(&venv.python(), root, &manifest_path, &mut exec)?;
        state::write_state(
            &state_path,
            &InstallState {
                manifest_mtime_unix: manifest_mtime,
                launcher_version: crate::config::VERSION.to_string(),
            },
        )?;
    } else {
        log_line(log_path, "Dependencies are up to date, skipping install")?;
    }

    preflight::check(&settings.required_tools, discovery_cfg.path_var.as_deref())?;

    let secret_env = secrets::resolve(root, settings.secret.as_ref())?;

    let (program, args) = entry_command(root, &venv, &settings.entry)?;
    log_line(log_path, "Launching application")?;
    let mut launch = Command::new(&program);
    launch
        .args(&args)
        .current_dir(root)
        .envs(venv.env_pairs(discovery_cfg.path_var.as_deref()))
        .envs(secret_env);
    let status = exec(&mut launch)?;
    log_line(
        log_path,
        &format!("Application exited with status {:?}", status.code()),
    )?;
    Ok(status)
}

fn entry_command(
    root: &Path,
    venv: &venv::VirtualEnv,
    entry: &EntryPoint,
) -> Result<(PathBuf, Vec<String>)> {
    match entry {
        EntryPoint::PythonFile(file) => {
            let entry_path = root.join(file);
            if !entry_path.exists() {
                bail!(
                    "Entry point {} was not found next to the launcher.",
                    entry_path.display()
                );
            }
            Ok((venv.python(), vec![file.clone()]))
        }
        EntryPoint::Module(module) => Ok((venv.python(), vec!["-m".to_string(), module.clone()])),
        EntryPoint::Command(command) => {
            let name = if cfg!(windows) && Path::new(command).extension().is_none() {
                format!("{command}.exe")
            } else {
                command.clone()
            };
            Ok((venv.scripts_dir().join(name), Vec::new()))
        }
    }
}
