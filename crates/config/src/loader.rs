use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::WabridgeConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "wabridge.toml",
    "wabridge.yaml",
    "wabridge.yml",
    "wabridge.json",
];

static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Use `dir` instead of the user-global config directory.
pub fn set_config_dir(dir: PathBuf) {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.write() {
        *guard = Some(dir);
    }
}

/// Returns the user-global config directory (`~/.config/wabridge/`), or the
/// override installed with [`set_config_dir`].
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(guard) = CONFIG_DIR_OVERRIDE.read()
        && let Some(dir) = guard.as_ref()
    {
        return Some(dir.clone());
    }
    directories::ProjectDirs::from("", "", "wabridge").map(|d| d.config_dir().to_path_buf())
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<WabridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply
/// environment overrides.
///
/// Search order:
/// 1. `./wabridge.{toml,yaml,yml,json}`
/// 2. `<config_dir>/wabridge.{toml,yaml,yml,json}`
///
/// Falls back to `WabridgeConfig::default()` when nothing is found or the
/// file fails to parse.
pub fn discover_and_load() -> WabridgeConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                WabridgeConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            WabridgeConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = find_in_dir(Path::new(".")) {
        return Some(path);
    }
    config_dir().and_then(|dir| find_in_dir(&dir))
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Apply `PORT` and `DEBUG` from the process environment.
pub fn apply_env_overrides(config: &mut WabridgeConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

pub(crate) fn apply_env_overrides_with(
    config: &mut WabridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(port) = lookup("PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid PORT"),
        }
    }
    // Only a truthy DEBUG turns debug on; anything else leaves the file value.
    if let Some(flag) = lookup("DEBUG")
        && matches!(flag.trim(), "true" | "1")
    {
        config.logging.debug = true;
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<WabridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_applies() {
        let mut cfg = WabridgeConfig::default();
        apply_env_overrides_with(&mut cfg, |name| (name == "PORT").then(|| "8081".into()));
        assert_eq!(cfg.server.port, 8081);
        assert!(!cfg.logging.debug);
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut cfg = WabridgeConfig::default();
        apply_env_overrides_with(&mut cfg, |name| (name == "PORT").then(|| "http".into()));
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn debug_flag_only_accepts_true() {
        let mut cfg = WabridgeConfig::default();
        apply_env_overrides_with(&mut cfg, |name| (name == "DEBUG").then(|| "yes".into()));
        assert!(!cfg.logging.debug);

        apply_env_overrides_with(&mut cfg, |name| (name == "DEBUG").then(|| "true".into()));
        assert!(cfg.logging.debug);
    }

    #[test]
    fn falsy_debug_keeps_file_value() {
        let mut cfg = WabridgeConfig::default();
        cfg.logging.debug = true;
        for value in ["", "false", "0"] {
            apply_env_overrides_with(&mut cfg, |name| (name == "DEBUG").then(|| value.into()));
            assert!(cfg.logging.debug, "DEBUG={value:?} cleared the flag");
        }
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("wabridge.yaml");
        std::fs::write(&yaml, "server:\n  port: 9000\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().server.port, 9000);

        let json = dir.path().join("wabridge.json");
        std::fs::write(&json, r#"{"whatsapp": {"ready_timeout_ms": 5}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().whatsapp.ready_timeout_ms, 5);
    }

    #[test]
    fn unsupported_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.ini");
        std::fs::write(&path, "port=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn find_in_dir_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wabridge.json"), "{}").unwrap();
        std::fs::write(dir.path().join("wabridge.toml"), "").unwrap();
        let found = find_in_dir(dir.path()).unwrap();
        assert!(found.ends_with("wabridge.toml"));
    }
}
