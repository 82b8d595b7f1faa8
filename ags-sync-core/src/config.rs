use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Settings for one synchronisation run.
///
/// Built once at the CLI boundary (YAML file, environment, command line) and
/// passed by reference into the finder and every document. Every field has a
/// default, so a partial settings file is always valid.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory holding the source documents (one folder level deep).
    pub root_directory: Option<PathBuf>,
    /// CSV of previously published services. When unset the server is asked
    /// for its current services instead.
    pub history_file: Option<PathBuf>,
    /// CSV of extra sources and per-source folder/name overrides.
    pub service_list: Option<PathBuf>,
    /// `MY_HOSTED_SERVICES` or a path to an `*.ags` connection file.
    pub server: Option<String>,
    /// Base URL of the server (`https://host/arcgis`). Extracted from the
    /// connection file when unset.
    pub server_url: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    /// Report intended changes without touching the server.
    pub dry_run: bool,
    /// Rebuild artifacts and upload even when they look current.
    pub force: bool,
    pub copy_data_to_server: bool,
    pub summary: Option<String>,
    /// Comma separated tags for new services.
    pub tags: Option<String>,
}

/// Admin credentials for the server's REST admin API.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"XX_redacted_XX")
            .finish()
    }
}

impl SyncConfig {
    /// Both admin fields, or nothing.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.admin_username, &self.admin_password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            root_directory = ?self.root_directory,
            history_file = ?self.history_file,
            server = ?self.server,
            server_url = ?self.server_url,
            dry_run = self.dry_run,
            force = self.force,
            "Loaded SyncConfig"
        );
        debug!(config = ?self, "SyncConfig loaded (full debug)");
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("root_directory", &self.root_directory)
            .field("history_file", &self.history_file)
            .field("service_list", &self.service_list)
            .field("server", &self.server)
            .field("server_url", &self.server_url)
            .field("admin_username", &self.admin_username)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "XX_redacted_XX"),
            )
            .field("dry_run", &self.dry_run)
            .field("force", &self.force)
            .field("copy_data_to_server", &self.copy_data_to_server)
            .field("summary", &self.summary)
            .field("tags", &self.tags)
            .finish()
    }
}
