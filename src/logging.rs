use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

const LOG_FILE_NAME: &str = "launcher.log";

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}

pub fn init(root: &Path) -> Result<PathBuf> {
    let dir = logs_dir(root);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let log_path = dir.join(LOG_FILE_NAME);
    let _file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open {}", log_path.display()))?;
    Ok(log_path)
}

pub fn log_line(path: Option<&Path>, line: &str) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    use std::io::Write;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Runs a setup command with inherited stdio so the operator sees its
/// output live, and records the command line plus exit status in the log.
pub fn exec_logged(cmd: &mut Command, log_path: Option<&Path>) -> Result<ExitStatus> {
    if let Some(log_path) = log_path {
        let _ = log_line(Some(log_path), &format!("> {}", format_command(cmd)));
    }
    let status = cmd.status().context("spawn command")?;
    if let Some(log_path) = log_path {
        let _ = log_line(
            Some(log_path),
            &format!(
                "exit status: {}",
                status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ),
        );
    }
    Ok(status)
}

pub fn format_command(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy();
    let args = cmd
        .get_args()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {args}")
    }
}
