use serde::Deserialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[derive(Debug, Deserialize)]
struct Config {
    app_id: String,
    name: String,
    product_name: String,
    company: String,
    description: String,
    version: String,
    #[serde(default)]
    icon: String,
}

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let manifest_dir = PathBuf::from(manifest_dir);
    let config = load_config(&manifest_dir).unwrap_or_else(|err| {
        panic!("failed to load config.toml: {err}");
    });

    if let Err(err) = embed_resources(&manifest_dir, &config) {
        panic!("failed to embed resources: {err}");
    }

    if let Err(err) = write_config_rs(&PathBuf::from(std::env::var("OUT_DIR").unwrap()), &config) {
        panic!("failed to write config: {err}");
    }
}

fn load_config(manifest_dir: &Path) -> io::Result<Config> {
    let config_path = manifest_dir.join("config.toml");
    println!("cargo:rerun-if-changed={}", config_path.display());
    let contents = fs::read_to_string(&config_path)?;
    let cfg: Config = toml::from_str(&contents)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(cfg)
}

#[cfg(windows)]
fn embed_resources(manifest_dir: &Path, config: &Config) -> io::Result<()> {
    let mut res = winres::WindowsResource::new();
    if !config.icon.is_empty() {
        let candidate = manifest_dir.join(&config.icon);
        if candidate.exists() {
            res.set_icon(candidate.to_string_lossy().as_ref());
        }
    }
    if !config.product_name.is_empty() {
        res.set("ProductName", &config.product_name);
    }
    if !config.description.is_empty() {
        res.set("FileDescription", &config.description);
    }
    if !config.company.is_empty() {
        res.set("CompanyName", &config.company);
    }
    if !config.version.is_empty() {
        res.set("FileVersion", &config.version);
        res.set("ProductVersion", &config.version);
    }
    if !config.app_id.is_empty() {
        res.set("InternalName", &config.app_id);
    }
    res.compile()?;
    Ok(())
}

#[cfg(not(windows))]
fn embed_resources(_manifest_dir: &Path, _config: &Config) -> io::Result<()> {
    Ok(())
}

fn write_config_rs(out_dir: &Path, config: &Config) -> io::Result<()> {
    use std::io::Write;
    let out_path = out_dir.join("venvlaunch_config.rs");
    let mut file = fs::File::create(&out_path)?;
    writeln!(file, "#[allow(dead_code)]")?;
    writeln!(file, "pub const APP_ID: &str = {:?};", config.app_id)?;
    writeln!(file, "pub const NAME: &str = {:?};", config.name)?;
    writeln!(file, "pub const PRODUCT_NAME: &str = {:?};", config.product_name)?;
    writeln!(file, "pub const VERSION: &str = {:?};", config.version)?;
    Ok(())
}
