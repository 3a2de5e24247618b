//! Configuration loading, validation and environment overrides.
//!
//! Config files: `wabridge.toml`, `wabridge.yaml`, `wabridge.yml` or
//! `wabridge.json`, searched in `./` then `~/.config/wabridge/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config,
        set_config_dir,
    },
    schema::{
        DEFAULT_BROWSER_ARGS, LoggingConfig, ServerConfig, SidecarConfig, WabridgeConfig,
        WhatsAppConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
