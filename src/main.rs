mod config;
mod deps;
mod discovery;
mod fs_ops;
mod logging;
mod paths;
mod preflight;
mod runner;
mod secrets;
mod state;
mod venv;

use std::process::{ExitCode, ExitStatus};

use anyhow::Result;

fn main() -> ExitCode {
    let _single_instance = match acquire_single_instance() {
        Some(guard) => guard,
        None => {
            eprintln!("{} is already running.", display_name());
            return ExitCode::SUCCESS;
        }
    };

    let mut pause = config::Settings::default().pause_on_exit;
    let code = match bootstrap(&mut pause) {
        Ok(status) => {
            println!("{} finished (exit {:?}).", display_name(), status.code());
            exit_code_for(status)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    };

    if pause {
        wait_for_enter();
    }
    code
}

fn bootstrap(pause: &mut bool) -> Result<ExitStatus> {
    let root = paths::root_dir()?;
    let log_path = logging::init(&root)?;
    let settings = config::load_settings(&root)?;
    *pause = settings.pause_on_exit;
    logging::log_line(
        Some(&log_path),
        &format!(
            "{} {} starting in {}",
            config::NAME,
            config::VERSION,
            root.display()
        ),
    )?;
    runner::run(&root, &settings, Some(&log_path))
}

fn display_name() -> &'static str {
    if !config::PRODUCT_NAME.trim().is_empty() {
        config::PRODUCT_NAME
    } else {
        config::NAME
    }
}

fn exit_code_for(status: ExitStatus) -> ExitCode {
    if status.success() {
        return ExitCode::SUCCESS;
    }
    let code = status.code().and_then(|c| u8::try_from(c).ok()).unwrap_or(1);
    ExitCode::from(code)
}

fn wait_for_enter() {
    println!("Press Enter to close...");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}

#[cfg(windows)]
fn acquire_single_instance() -> Option<SingleInstanceGuard> {
    use std::ffi::OsStr;
    use std::iter::once;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS};
    use windows_sys::Win32::System::Threading::CreateMutexW;

    let name = mutex_name();
    let wide: Vec<u16> = OsStr::new(&name).encode_wide().chain(once(0)).collect();
    let handle = unsafe { CreateMutexW(std::ptr::null_mut(), 0, wide.as_ptr()) };
    if handle == 0 {
        return Some(SingleInstanceGuard { handle });
    }
    let last_error = unsafe { windows_sys::Win32::Foundation::GetLastError() };
    if last_error == ERROR_ALREADY_EXISTS {
        unsafe { CloseHandle(handle) };
        return None;
    }
    Some(SingleInstanceGuard { handle })
}

#[cfg(not(windows))]
fn acquire_single_instance() -> Option<SingleInstanceGuard> {
    Some(SingleInstanceGuard {})
}

#[cfg(windows)]
fn mutex_name() -> String {
    let id = config::APP_ID.trim();
    let base = if id.is_empty() { display_name() } else { id };
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("Local\\venvlaunch-{cleaned}")
}

#[cfg(windows)]
struct SingleInstanceGuard {
    handle: isize,
}

#[cfg(windows)]
impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        if self.handle != 0 {
            unsafe { windows_sys::Win32::Foundation::CloseHandle(self.handle) };
        }
    }
}

#[cfg(not(windows))]
struct SingleInstanceGuard {}
