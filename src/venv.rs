use anyhow::{bail, Context, Result};
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};

#[derive(Debug, Clone)]
pub struct VirtualEnv {
    pub dir: PathBuf,
    /// Whether this run created the environment.
    pub created: bool,
}

impl VirtualEnv {
    pub fn scripts_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.dir.join("Scripts")
        } else {
            self.dir.join("bin")
        }
    }

    pub fn python(&self) -> PathBuf {
        let name = if cfg!(windows) { "python.exe" } else { "python" };
        self.scripts_dir().join(name)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    /// Activation as explicit configuration: the variables a child process
    /// needs so the environment's executables shadow the system interpreter.
    pub fn env_pairs(&self, base_path: Option<&OsStr>) -> Vec<(String, String)> {
        let mut dirs = vec![self.scripts_dir()];
        if let Some(base) = base_path {
            dirs.extend(std::env::split_paths(base));
        }
        let path = std::env::join_paths(dirs)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| self.scripts_dir().to_string_lossy().to_string());
        vec![
            (
                "VIRTUAL_ENV".to_string(),
                self.dir.to_string_lossy().to_string(),
            ),
            ("PATH".to_string(), path),
        ]
    }
}

/// Ensures the environment exists at `<root>/<dir_name>`, creating it with
/// the discovered interpreter only when absent. An existing directory is
/// reused as-is. A directory left behind by a failed creation is removed.
pub fn ensure(
    root: &Path,
    dir_name: &str,
    interpreter: &Path,
    exec: &mut impl FnMut(&mut Command) -> Result<ExitStatus>,
) -> Result<VirtualEnv> {
    let dir = root.join(dir_name);
    if dir.exists() {
        return Ok(VirtualEnv { dir, created: false });
    }

    let mut create = Command::new(interpreter);
    create
        .arg("-m")
        .arg("venv")
        .arg(&dir)
        .current_dir(root)
        .stdin(Stdio::null());

    let status = match exec(&mut create) {
        Ok(status) => status,
        Err(err) => {
            remove_fresh_dir(&dir);
            return Err(err.context("create virtual environment"));
        }
    };
    if !status.success() {
        remove_fresh_dir(&dir);
        bail!(
            "Creating the virtual environment at {} failed (exit {:?}).",
            dir.display(),
            status.code()
        );
    }

    let venv = VirtualEnv { dir, created: true };
    if !venv.python().is_file() {
        let missing = venv.python();
        remove_fresh_dir(&venv.dir);
        bail!(
            "Activation failed: {} is missing after environment creation.",
            missing.display()
        );
    }
    Ok(venv)
}

fn remove_fresh_dir(dir: &Path) {
    if dir.exists() {
        let _ = fs::remove_dir_all(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_status(code: i32) -> ExitStatus {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ExitStatus::from_raw(code << 8)
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::ExitStatusExt;
            ExitStatus::from_raw(code as u32)
        }
    }

    fn fake_interpreter(root: &Path) -> PathBuf {
        let path = root.join("python-stub");
        fs::write(&path, "stub").unwrap();
        path
    }

    fn populate_venv(dir: &Path) {
        let venv = VirtualEnv {
            dir: dir.to_path_buf(),
            created: true,
        };
        fs::create_dir_all(venv.scripts_dir()).unwrap();
        fs::write(venv.python(), "stub").unwrap();
    }

    #[test]
    fn existing_dir_is_reused_without_commands() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(".venv")).unwrap();
        let interpreter = fake_interpreter(tmp.path());

        let mut calls = 0;
        let venv = ensure(tmp.path(), ".venv", &interpreter, &mut |_cmd| {
            calls += 1;
            Ok(exit_status(0))
        })
        .unwrap();

        assert_eq!(calls, 0);
        assert!(!venv.created);
    }

    #[test]
    fn creates_missing_env_with_interpreter() {
        let tmp = tempfile::tempdir().unwrap();
        let interpreter = fake_interpreter(tmp.path());
        let dir = tmp.path().join(".venv");

        let mut seen = Vec::new();
        let venv = ensure(tmp.path(), ".venv", &interpreter, &mut |cmd| {
            seen.push((
                cmd.get_program().to_string_lossy().to_string(),
                cmd.get_args()
                    .map(|a| a.to_string_lossy().to_string())
                    .collect::<Vec<_>>(),
            ));
            populate_venv(&dir);
            Ok(exit_status(0))
        })
        .unwrap();

        assert!(venv.created);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, interpreter.to_string_lossy());
        assert_eq!(seen[0].1[..2], ["-m".to_string(), "venv".to_string()]);
    }

    #[test]
    fn failed_creation_removes_fresh_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let interpreter = fake_interpreter(tmp.path());
        let dir = tmp.path().join(".venv");

        let err = ensure(tmp.path(), ".venv", &interpreter, &mut |_cmd| {
            // simulate python dying after it made the directory
            fs::create_dir_all(&dir).unwrap();
            Ok(exit_status(1))
        })
        .unwrap_err();

        assert!(err.to_string().contains("virtual environment"));
        assert!(!dir.exists());
    }

    #[test]
    fn missing_python_after_creation_is_activation_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let interpreter = fake_interpreter(tmp.path());
        let dir = tmp.path().join(".venv");

        let err = ensure(tmp.path(), ".venv", &interpreter, &mut |_cmd| {
            fs::create_dir_all(&dir).unwrap();
            Ok(exit_status(0))
        })
        .unwrap_err();

        assert!(err.to_string().contains("Activation failed"));
        assert!(!dir.exists());
    }

    #[test]
    fn env_pairs_put_scripts_dir_first_on_path() {
        let tmp = tempfile::tempdir().unwrap();
        let venv = VirtualEnv {
            dir: tmp.path().join(".venv"),
            created: false,
        };
        let base = std::ffi::OsString::from("/usr/bin");

        let pairs = venv.env_pairs(Some(&base));
        let path = pairs
            .iter()
            .find(|(k, _)| k == "PATH")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(path.starts_with(&venv.scripts_dir().to_string_lossy().to_string()));
        assert!(pairs
            .iter()
            .any(|(k, v)| k == "VIRTUAL_ENV" && v == &venv.dir.to_string_lossy().to_string()));
    }
}
