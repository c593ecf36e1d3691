use anyhow::{bail, Result};
use std::{
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

/// Substrings that mark an interpreter as embedded/unsuitable. The match is
/// a case-insensitive substring test against the full resolved path, so an
/// unrelated directory that happens to contain one of these also rejects
/// the candidate.
pub const DEFAULT_DENYLIST: &[&str] = &["windowsapps"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Resolved by the version-select launcher (`py`).
    Launcher,
    /// Found on PATH.
    PathScan,
    /// Found under a well-known install directory.
    InstallDir,
}

#[derive(Debug, Clone)]
pub struct Interpreter {
    pub path: PathBuf,
    pub provenance: Provenance,
}

/// Explicit inputs for a discovery run. Built from the process environment
/// by `from_env`; tests supply their own.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub path_var: Option<OsString>,
    pub install_bases: Vec<PathBuf>,
    pub denylist: Vec<String>,
}

impl DiscoveryConfig {
    pub fn from_env() -> Self {
        Self {
            path_var: std::env::var_os("PATH"),
            install_bases: default_install_bases(),
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn default_install_bases() -> Vec<PathBuf> {
    let mut bases = Vec::new();
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        bases.push(PathBuf::from(local).join("Programs").join("Python"));
    }
    for var in ["ProgramFiles", "ProgramFiles(x86)"] {
        if let Some(dir) = std::env::var_os(var) {
            bases.push(PathBuf::from(dir));
        }
    }
    bases
}

pub fn is_denylisted(path: &Path, denylist: &[String]) -> bool {
    let haystack = path.to_string_lossy().to_lowercase();
    denylist
        .iter()
        .any(|needle| !needle.is_empty() && haystack.contains(&needle.to_lowercase()))
}

fn interpreter_file_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["python.exe"]
    } else {
        &["python3", "python"]
    }
}

/// Locates a usable interpreter: launcher query, then PATH scan, then the
/// well-known install directories, with one rescue scan after an embedded
/// candidate was seen. The unsuitability predicate defaults to the
/// configured denylist.
pub fn discover(
    cfg: &DiscoveryConfig,
    probe: impl FnMut(&mut Command) -> Result<Output>,
) -> Result<Interpreter> {
    discover_with(cfg, probe, |path| is_denylisted(path, &cfg.denylist))
}

pub fn discover_with(
    cfg: &DiscoveryConfig,
    mut probe: impl FnMut(&mut Command) -> Result<Output>,
    unsuitable: impl Fn(&Path) -> bool,
) -> Result<Interpreter> {
    let mut unsuitable_seen = false;

    if let Some(path) = query_py_launcher(&mut probe) {
        if unsuitable(&path) {
            unsuitable_seen = true;
        } else {
            return Ok(Interpreter {
                path,
                provenance: Provenance::Launcher,
            });
        }
    }

    let (found, path_had_unsuitable) = scan_path(cfg.path_var.as_deref(), &unsuitable);
    unsuitable_seen |= path_had_unsuitable;
    if let Some(path) = found {
        return Ok(Interpreter {
            path,
            provenance: Provenance::PathScan,
        });
    }

    if let Some(path) = scan_install_bases(&cfg.install_bases) {
        return Ok(Interpreter {
            path,
            provenance: Provenance::InstallDir,
        });
    }

    if unsuitable_seen {
        // one rescue pass over the install directories after an embedded hit
        if let Some(path) = scan_install_bases(&cfg.install_bases) {
            return Ok(Interpreter {
                path,
                provenance: Provenance::InstallDir,
            });
        }
        bail!(
            "Only an embedded Python distribution was found, which cannot install \
             the required packages. Install Python 3 from python.org and make sure \
             it is on PATH."
        );
    }

    bail!(
        "No Python interpreter was found. Install Python 3 from python.org and \
         make sure it is on PATH."
    )
}

fn query_py_launcher(probe: &mut impl FnMut(&mut Command) -> Result<Output>) -> Option<PathBuf> {
    let mut cmd = Command::new("py");
    cmd.args(["-3", "-c", "import sys; print(sys.executable)"]);
    let output = probe(&mut cmd).ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    let path = PathBuf::from(line);
    path.is_file().then_some(path)
}

fn scan_path(
    path_var: Option<&OsStr>,
    unsuitable: &impl Fn(&Path) -> bool,
) -> (Option<PathBuf>, bool) {
    let Some(path_var) = path_var else {
        return (None, false);
    };
    let mut unsuitable_seen = false;
    for dir in std::env::split_paths(path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for name in interpreter_file_names() {
            let candidate = dir.join(name);
            if !candidate.is_file() {
                continue;
            }
            if unsuitable(&candidate) {
                unsuitable_seen = true;
                continue;
            }
            return (Some(candidate), unsuitable_seen);
        }
    }
    (None, unsuitable_seen)
}

/// Picks the lexicographically-last `Python*` subdirectory of each base that
/// contains a valid executable; bases are tried in order.
fn scan_install_bases(bases: &[PathBuf]) -> Option<PathBuf> {
    for base in bases {
        let Ok(entries) = fs::read_dir(base) else {
            continue;
        };
        let mut versions: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_ascii_lowercase().starts_with("python"))
                    .unwrap_or(false)
            })
            .collect();
        versions.sort();
        for dir in versions.iter().rev() {
            for name in interpreter_file_names() {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exit_status(code: i32) -> std::process::ExitStatus {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            std::process::ExitStatus::from_raw(code << 8)
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::ExitStatusExt;
            std::process::ExitStatus::from_raw(code as u32)
        }
    }

    fn probe_unavailable(_cmd: &mut Command) -> Result<Output> {
        Err(anyhow::anyhow!("py launcher not installed"))
    }

    fn probe_resolving_to(path: &Path) -> impl FnMut(&mut Command) -> Result<Output> {
        let line = format!("{}\n", path.display());
        move |_cmd| {
            Ok(Output {
                status: exit_status(0),
                stdout: line.clone().into_bytes(),
                stderr: Vec::new(),
            })
        }
    }

    fn write_interpreter(dir: &Path) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(interpreter_file_names()[0]);
        fs::write(&path, "stub").unwrap();
        path
    }

    fn config(path_dirs: &[&Path], install_bases: &[&Path]) -> DiscoveryConfig {
        DiscoveryConfig {
            path_var: Some(std::env::join_paths(path_dirs.iter().map(|p| p.to_path_buf())).unwrap()),
            install_bases: install_bases.iter().map(|p| p.to_path_buf()).collect(),
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn launcher_result_wins_when_suitable() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = write_interpreter(&tmp.path().join("official"));

        let found = discover(&config(&[], &[]), probe_resolving_to(&exe)).unwrap();
        assert_eq!(found.path, exe);
        assert_eq!(found.provenance, Provenance::Launcher);
    }

    #[test]
    fn denylisted_launcher_result_falls_through_to_path() {
        let tmp = tempfile::tempdir().unwrap();
        let embedded = write_interpreter(&tmp.path().join("WindowsApps"));
        let path_dir = tmp.path().join("official");
        let on_path = write_interpreter(&path_dir);

        let found = discover(
            &config(&[&path_dir], &[]),
            probe_resolving_to(&embedded),
        )
        .unwrap();
        assert_eq!(found.path, on_path);
        assert_eq!(found.provenance, Provenance::PathScan);
    }

    #[test]
    fn denylisted_path_candidate_yields_install_dir_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let embedded_dir = tmp.path().join("WindowsApps");
        write_interpreter(&embedded_dir);
        let base = tmp.path().join("Programs").join("Python");
        write_interpreter(&base.join("Python312"));

        let found = discover(&config(&[&embedded_dir], &[&base]), probe_unavailable).unwrap();
        assert_eq!(found.provenance, Provenance::InstallDir);
        assert!(found.path.starts_with(base.join("Python312")));
    }

    #[test]
    fn install_base_picks_lexicographically_last_valid_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("Python");
        write_interpreter(&base.join("Python310"));
        write_interpreter(&base.join("Python312"));
        // highest-sorted dir without an executable is skipped
        fs::create_dir_all(base.join("Python313")).unwrap();

        let found = discover(&config(&[], &[&base]), probe_unavailable).unwrap();
        assert!(found.path.starts_with(base.join("Python312")));
    }

    #[test]
    fn no_interpreter_anywhere_reports_install_instructions() {
        let tmp = tempfile::tempdir().unwrap();
        let empty = tmp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();

        let err = discover(&config(&[&empty], &[]), probe_unavailable).unwrap_err();
        assert!(err.to_string().contains("No Python interpreter"));
    }

    #[test]
    fn only_embedded_candidates_report_embedded_diagnostic() {
        let tmp = tempfile::tempdir().unwrap();
        let embedded_dir = tmp.path().join("WindowsApps");
        write_interpreter(&embedded_dir);

        let err = discover(&config(&[&embedded_dir], &[]), probe_unavailable).unwrap_err();
        assert!(err.to_string().contains("embedded"));
    }

    #[test]
    fn denylist_match_is_case_insensitive() {
        let denylist = vec!["windowsapps".to_string()];
        assert!(is_denylisted(
            Path::new("C:/Users/x/AppData/Local/Microsoft/WINDOWSAPPS/python.exe"),
            &denylist
        ));
        assert!(!is_denylisted(Path::new("C:/Python312/python.exe"), &denylist));
    }

    // The substring heuristic also fires on unrelated directories that
    // merely contain the denylisted text; that behavior is intentional.
    #[test]
    fn denylist_rejects_unrelated_dir_containing_substring() {
        let tmp = tempfile::tempdir().unwrap();
        let odd_dir = tmp.path().join("my-windowsapps-notes");
        write_interpreter(&odd_dir);

        let err = discover(&config(&[&odd_dir], &[]), probe_unavailable).unwrap_err();
        assert!(err.to_string().contains("embedded"));
    }

    #[test]
    fn injected_predicate_overrides_denylist() {
        let tmp = tempfile::tempdir().unwrap();
        let odd_dir = tmp.path().join("my-windowsapps-notes");
        let exe = write_interpreter(&odd_dir);

        let found = discover_with(&config(&[&odd_dir], &[]), probe_unavailable, |_| false).unwrap();
        assert_eq!(found.path, exe);
    }

    #[test]
    fn launcher_output_pointing_at_missing_file_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let ghost = tmp.path().join("gone").join("python.exe");
        let path_dir = tmp.path().join("official");
        let on_path = write_interpreter(&path_dir);

        let found = discover(&config(&[&path_dir], &[]), probe_resolving_to(&ghost)).unwrap();
        assert_eq!(found.path, on_path);
    }
}
