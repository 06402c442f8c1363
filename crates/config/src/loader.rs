use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::FontbotConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "fontbot.toml",
    "fontbot.yaml",
    "fontbot.yml",
    "fontbot.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<FontbotConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./fontbot.{toml,yaml,yml,json}` (working directory)
/// 2. `fontbot.*` in `config_dir` when given, otherwise in the user config dir
///
/// Returns `FontbotConfig::default()` if no config file is found. Environment
/// overrides are not applied here; see [`apply_env_overrides`].
pub fn discover_and_load(config_dir: Option<&Path>) -> FontbotConfig {
    if let Some(path) = find_config_file(config_dir) {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    FontbotConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file(config_dir_override: Option<&Path>) -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir_override
        .map(Path::to_path_buf)
        .or_else(config_dir)?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// User config directory (`~/.config/fontbot/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// User data directory (`~/.local/share/fontbot/` on Linux). Holds the
/// store document unless `store.path` is set.
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().to_path_buf())
}

/// Resolve the store document path: `store.path`, then `db.json` in
/// `data_dir_override`, then in the user data dir, then `./db.json`.
pub fn store_path(config: &FontbotConfig, data_dir_override: Option<&Path>) -> PathBuf {
    if let Some(path) = &config.store.path {
        return path.clone();
    }
    data_dir_override
        .map(Path::to_path_buf)
        .or_else(data_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("db.json")
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "fontbot")
}

/// Apply `FONTBOT_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: FontbotConfig) -> FontbotConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: FontbotConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> FontbotConfig {
    if let Some(token) = lookup("FONTBOT_TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty()) {
        config.telegram.token = Some(Secret::new(token));
    }
    if let Some(raw) = lookup("FONTBOT_ADMIN_ID") {
        match raw.trim().parse::<i64>() {
            Ok(id) => config.telegram.admin_id = Some(id),
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid FONTBOT_ADMIN_ID"),
        }
    }
    if let Some(path) = lookup("FONTBOT_STORE_PATH").filter(|p| !p.trim().is_empty()) {
        config.store.path = Some(PathBuf::from(path));
    }
    config
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<FontbotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
