use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};

fn home_dir() -> anyhow::Result<PathBuf> {
    // On Unix, HOME is standard. (Windows support can be expanded later.)
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

fn appgen_home() -> Option<PathBuf> {
    env::var_os("APPGEN_HOME").map(PathBuf::from)
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = appgen_home() {
        return ensure_dir(&base.join("config"));
    }

    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return ensure_dir(&xdg.join("appgen"));
    }

    ensure_dir(&home_dir()?.join(".config").join("appgen"))
}

pub fn state_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = appgen_home() {
        return ensure_dir(&base.join("state"));
    }

    if let Some(xdg) = env::var_os("XDG_STATE_HOME").map(PathBuf::from) {
        return ensure_dir(&xdg.join("appgen"));
    }

    ensure_dir(&home_dir()?.join(".local").join("state").join("appgen"))
}

pub fn preferences_path() -> anyhow::Result<PathBuf> {
    Ok(state_dir()?.join("preferences.json"))
}

pub fn shares_dir() -> anyhow::Result<PathBuf> {
    Ok(state_dir()?.join("shares"))
}

/// Write pretty JSON next to `path` and rename it into place.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;

    let tmp = {
        let mut p = path.to_path_buf();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "state.json".to_string());
        p.set_file_name(format!("{name}.tmp"));
        p
    };

    let bytes = serde_json::to_vec_pretty(value).context("failed to encode JSON")?;
    std::fs::write(&tmp, bytes).with_context(|| format!("failed to write: {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("failed to replace: {}", path.display()))?;
    Ok(())
}
