use anyhow::{Context, Result};
use std::path::PathBuf;

/// Overrides exe-relative root resolution, for development runs.
pub const ROOT_ENV_VAR: &str = "VENVLAUNCH_ROOT";

pub fn self_path() -> Result<PathBuf> {
    Ok(std::env::current_exe().context("current_exe")?)
}

pub fn root_dir() -> Result<PathBuf> {
    if let Ok(dev_root) = std::env::var(ROOT_ENV_VAR) {
        return Ok(PathBuf::from(dev_root));
    }
    let exe = self_path()?;
    Ok(exe.parent().context("exe has no parent")?.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn root_dir_prefers_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let prior = std::env::var(ROOT_ENV_VAR).ok();

        std::env::set_var(ROOT_ENV_VAR, "/tmp/venvlaunch-root");
        let root = root_dir().unwrap();
        assert_eq!(root, PathBuf::from("/tmp/venvlaunch-root"));

        if let Some(v) = prior {
            std::env::set_var(ROOT_ENV_VAR, v);
        } else {
            std::env::remove_var(ROOT_ENV_VAR);
        }
    }

    #[test]
    fn root_dir_falls_back_to_exe_parent() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let prior = std::env::var(ROOT_ENV_VAR).ok();
        std::env::remove_var(ROOT_ENV_VAR);

        let root = root_dir().unwrap();
        assert_eq!(root, self_path().unwrap().parent().unwrap());

        if let Some(v) = prior {
            std::env::set_var(ROOT_ENV_VAR, v);
        }
    }
}
