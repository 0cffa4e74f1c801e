//! Config file discovery and parsing.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env::substitute_env, schema::WellConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["welld.toml", "welld.yaml", "welld.yml", "welld.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<WellConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Find the first standard config file inside `dir`.
pub fn find_config_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./welld.{toml,yaml,yml,json}` (working directory)
/// 2. `~/.config/welld/welld.{toml,yaml,yml,json}` (user-global)
///
/// A missing file yields defaults; a malformed one logs a warning and also
/// yields defaults.
pub fn discover_and_load() -> WellConfig {
    let found = find_config_in(Path::new(".")).or_else(|| {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".config").join("welld"))
            .and_then(|dir| find_config_in(&dir))
    });

    let Some(path) = found else {
        debug!("no config file found, using defaults");
        return WellConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            WellConfig::default()
        },
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<WellConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
