//! Configuration for the warden SOC portal client.
//!
//! TOML-based, layered: user config, then project-local `warden.toml`, then
//! `WARDEN_*` environment variables, then command-line flags. Fields are all
//! optional; accessors on [`WardenConfig`] apply defaults and report which
//! field is missing when a command needs it.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    load_files, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
