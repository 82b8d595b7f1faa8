/// `load_config` module: loads the optional YAML settings file, injects the
/// admin password from the environment, and applies command line overrides.
///
/// This is the only place where user-supplied YAML is parsed into the
/// strongly-typed [`SyncConfig`] that the core consumes.
///
/// # Responsibilities
/// - Parse the YAML settings file into [`CliConfig`] (core settings plus the
///   CLI-only `toolchain` and `http_timeout_secs` keys)
/// - Fill `admin_password` from `AGS_SYNC_ADMIN_PASSWORD` when the file has none
/// - Layer command line flags on top (see [`ConfigOverrides`])
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use ags_sync_core::config::SyncConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use crate::toolchain::ToolchainConfig;

/// Environment variable holding the admin password.
pub const ADMIN_PASSWORD_ENV: &str = "AGS_SYNC_ADMIN_PASSWORD";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            sync: SyncConfig::default(),
            toolchain: ToolchainConfig::default(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl CliConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Values given on the command line. Set fields win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_directory: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub service_list: Option<PathBuf>,
    pub server: Option<String>,
    pub server_url: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub dry_run: bool,
    pub force: bool,
    pub toolchain: Option<String>,
}

/// Loads a YAML settings file (no secrets required) and injects the admin
/// password from the environment if the file does not carry one.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid "all defaults" config.
    let mut config: CliConfig = if config_content.trim().is_empty() {
        CliConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    inject_env_secrets(&mut config.sync);
    Ok(config)
}

/// Start from the file if given, otherwise from defaults plus environment.
pub fn load_or_default(path: Option<&Path>) -> Result<CliConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = CliConfig::default();
            inject_env_secrets(&mut config.sync);
            Ok(config)
        }
    }
}

fn inject_env_secrets(config: &mut SyncConfig) {
    if config.admin_password.is_some() {
        return;
    }
    if let Ok(password) = env::var(ADMIN_PASSWORD_ENV) {
        if !password.is_empty() {
            info!(env = ADMIN_PASSWORD_ENV, "Admin password taken from environment");
            config.admin_password = Some(password);
        }
    }
}

/// Layer command line values over the loaded settings.
pub fn apply_overrides(config: &mut CliConfig, overrides: ConfigOverrides) {
    let sync = &mut config.sync;
    if overrides.root_directory.is_some() {
        sync.root_directory = overrides.root_directory;
    }
    if overrides.history_file.is_some() {
        sync.history_file = overrides.history_file;
    }
    if overrides.service_list.is_some() {
        sync.service_list = overrides.service_list;
    }
    if overrides.server.is_some() {
        sync.server = overrides.server;
    }
    if overrides.server_url.is_some() {
        sync.server_url = overrides.server_url;
    }
    if overrides.admin_username.is_some() {
        sync.admin_username = overrides.admin_username;
    }
    if overrides.admin_password.is_some() {
        sync.admin_password = overrides.admin_password;
    }
    sync.dry_run |= overrides.dry_run;
    sync.force |= overrides.force;
    if let Some(command) = overrides.toolchain {
        config.toolchain = ToolchainConfig {
            command,
            args: Vec::new(),
        };
    }
}
