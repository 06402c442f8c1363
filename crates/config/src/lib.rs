//! Configuration loading and validation.
//!
//! Config files: `fontbot.toml`, `fontbot.yaml` or `fontbot.json`, searched
//! in `./` then the user config dir (`~/.config/fontbot/` on Linux).
//!
//! String values support `${ENV_VAR}` substitution, and `FONTBOT_*`
//! variables override individual settings.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, find_config_file,
        load_config, store_path,
    },
    schema::{
        BroadcastConfig, FontbotConfig, FontsConfig, MetricsConfig, QueueConfig, StoreConfig,
        TelegramConfig, ThrottleConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config, validate_str},
};
