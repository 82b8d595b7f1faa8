//! # Toolchain binding: drive the GIS toolchain through a helper program
//!
//! The draft/analyze/stage/upload steps are only available inside the
//! vendor's desktop environment, so [`CommandToolchain`] runs an external
//! helper (by default `ags-toolchain`) once per step:
//!
//! ```text
//! ags-toolchain create-draft --source S --draft D --name N [--folder F]
//!     --kind map|image --server-type T [--connection C] [--copy-data]
//!     [--summary ..] [--tags ..]
//! ags-toolchain analyze --draft D
//! ags-toolchain stage --draft D --staged S
//! ags-toolchain upload --staged S --server C
//! ```
//!
//! `create-draft` and `analyze` print the raw analysis JSON on stdout. A
//! non-zero exit status is a failure; its stderr becomes the error message.

use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use ags_sync_core::contract::{CollaboratorError, DraftRequest, RawAnalysis, Toolchain};

pub const DEFAULT_TOOLCHAIN_PROGRAM: &str = "ags-toolchain";

/// `toolchain` section of the YAML settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolchainConfig {
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments placed before the subcommand, e.g. a script path when
    /// `command` is an interpreter.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_command() -> String {
    DEFAULT_TOOLCHAIN_PROGRAM.to_string()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        ToolchainConfig {
            command: default_command(),
            args: Vec::new(),
        }
    }
}

pub struct CommandToolchain {
    config: ToolchainConfig,
}

impl CommandToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        info!(command = %config.command, args = ?config.args, "Using toolchain helper");
        CommandToolchain { config }
    }

    /// Full argument list for `create-draft`.
    pub fn create_draft_args(request: &DraftRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "create-draft".into(),
            "--source".into(),
            request.source.clone().into_os_string(),
            "--draft".into(),
            request.draft.clone().into_os_string(),
            "--name".into(),
            request.service_name.clone().into(),
        ];
        if let Some(folder) = &request.service_folder {
            args.extend([OsString::from("--folder"), OsString::from(folder)]);
        }
        args.extend([
            OsString::from("--kind"),
            OsString::from(request.kind.as_str()),
            OsString::from("--server-type"),
            OsString::from(request.server.server_type()),
        ]);
        if let Some(connection) = request.server.connection_file() {
            args.extend([OsString::from("--connection"), connection.as_os_str().to_os_string()]);
        }
        if request.copy_data_to_server {
            args.push("--copy-data".into());
        }
        if let Some(summary) = &request.summary {
            args.extend([OsString::from("--summary"), OsString::from(summary)]);
        }
        if let Some(tags) = &request.tags {
            args.extend([OsString::from("--tags"), OsString::from(tags)]);
        }
        args
    }

    async fn run(&self, operation: &str, args: Vec<OsString>) -> Result<Vec<u8>, CollaboratorError> {
        debug!(operation, command = %self.config.command, ?args, "Running toolchain helper");
        let output = Command::new(&self.config.command)
            .args(&self.config.args)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                error!(error = %e, command = %self.config.command, "Failed to start toolchain helper");
                format!("failed to start {}: {e}", self.config.command)
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(operation, status = %output.status, stderr = %stderr, "Toolchain helper failed");
            return Err(format!("{operation} exited with {}: {stderr}", output.status).into());
        }
        Ok(output.stdout)
    }

    async fn run_analysis(&self, operation: &str, args: Vec<OsString>) -> Result<RawAnalysis, CollaboratorError> {
        let stdout = self.run(operation, args).await?;
        let analysis: RawAnalysis = serde_json::from_slice(&stdout).map_err(|e| {
            format!("{operation} printed invalid analysis JSON: {e}")
        })?;
        Ok(analysis)
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    async fn create_draft(&self, request: &DraftRequest) -> Result<RawAnalysis, CollaboratorError> {
        self.run_analysis("create-draft", Self::create_draft_args(request))
            .await
    }

    async fn analyze_draft(&self, draft: &Path) -> Result<RawAnalysis, CollaboratorError> {
        self.run_analysis(
            "analyze",
            vec!["analyze".into(), "--draft".into(), draft.as_os_str().to_os_string()],
        )
        .await
    }

    async fn stage_service(&self, draft: &Path, staged: &Path) -> Result<(), CollaboratorError> {
        self.run(
            "stage",
            vec![
                "stage".into(),
                "--draft".into(),
                draft.as_os_str().to_os_string(),
                "--staged".into(),
                staged.as_os_str().to_os_string(),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn upload_service(&self, staged: &Path, connection: &str) -> Result<(), CollaboratorError> {
        self.run(
            "upload",
            vec![
                "upload".into(),
                "--staged".into(),
                staged.as_os_str().to_os_string(),
                "--server".into(),
                connection.into(),
            ],
        )
        .await
        .map(|_| ())
    }
}
