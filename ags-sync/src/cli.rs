///
/// This module implements the CLI interface for ags-sync: command parsing,
/// mapping flags onto settings, and the async entrypoint.
///
/// All reconciliation and publishing logic lives in the [`ags-sync-core`]
/// crate. This module only wires settings, the REST client and the toolchain
/// helper together and prints the per-document results.
///
/// ## How To Use
/// - For command-line users: use the installed `ags-sync` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`ags-sync-core`]: ../../ags-sync-core/
use crate::load_config::{apply_overrides, load_or_default, ConfigOverrides};
use crate::rest::RestServiceDirectory;
use crate::toolchain::CommandToolchain;
use ags_sync_core::synchronise::{synchronise, Action, DocumentReport, Outcome, SynchroniseReport};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

/// CLI for ags-sync: keep published services in line with a directory of
/// source documents.
#[derive(Parser)]
#[clap(
    name = "ags-sync",
    version,
    about = "Publish new and changed map documents and unpublish services whose source is gone"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize the services on a server with the documents under ROOT
    Sync(SyncArgs),
}

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Directory holding the source documents
    pub root: Option<PathBuf>,

    /// Path to a YAML settings file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// CSV of previously published services. Without it the server is asked
    #[clap(long)]
    pub history_file: Option<PathBuf>,

    /// CSV of extra sources and service name overrides
    #[clap(long)]
    pub service_list: Option<PathBuf>,

    /// MY_HOSTED_SERVICES or path to a connection file
    #[clap(short = 's', long)]
    pub server: Option<String>,

    /// Base URL of the server, e.g. https://host/arcgis
    #[clap(long)]
    pub server_url: Option<String>,

    #[clap(short = 'u', long)]
    pub admin_username: Option<String>,

    #[clap(short = 'p', long)]
    pub admin_password: Option<String>,

    /// Report what would change without publishing or deleting anything
    #[clap(short = 'n', long)]
    pub dry_run: bool,

    /// Rebuild artifacts and upload even when they are current
    #[clap(short = 'f', long)]
    pub force: bool,

    /// Log progress
    #[clap(short = 'v', long)]
    pub verbose: bool,

    /// Log everything
    #[clap(long)]
    pub debug: bool,

    /// Toolchain helper program
    #[clap(long)]
    pub toolchain: Option<String>,
}

impl SyncArgs {
    pub fn log_level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else if self.verbose {
            Level::INFO
        } else {
            Level::WARN
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root_directory: self.root.clone(),
            history_file: self.history_file.clone(),
            service_list: self.service_list.clone(),
            server: self.server.clone(),
            server_url: self.server_url.clone(),
            admin_username: self.admin_username.clone(),
            admin_password: self.admin_password.clone(),
            dry_run: self.dry_run,
            force: self.force,
            toolchain: self.toolchain.clone(),
        }
    }
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match &self.command {
            Commands::Sync(args) => args.log_level(),
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sync(args) => {
            let mut config = load_or_default(args.config.as_deref())?;
            apply_overrides(&mut config, args.overrides());
            if config.sync.root_directory.is_none() {
                anyhow::bail!("No root directory given. Pass ROOT or set root_directory in the config file");
            }
            tracing::info!(command = "sync", "Starting synchronisation process");

            let directory = RestServiceDirectory::new(config.http_timeout())
                .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;
            let toolchain = CommandToolchain::new(config.toolchain.clone());

            let report = synchronise(&config.sync, &toolchain, &directory).await?;
            print_report(&report, config.sync.dry_run);
            tracing::info!(command = "sync", failures = report.failures(), "Synchronisation complete");
            Ok(())
        }
    }
}

fn print_report(report: &SynchroniseReport, dry_run: bool) {
    if report.documents.is_empty() {
        println!("Nothing to publish or unpublish.");
        return;
    }
    for document in &report.documents {
        println!("{}", describe(document));
    }
    let failures = report.failures();
    if failures > 0 {
        println!("{failures} document(s) could not be processed.");
    }
    if dry_run {
        println!("Dry run: no changes were made.");
    }
}

/// One summary line (plus any analyzer text) for a document.
pub fn describe(document: &DocumentReport) -> String {
    let target = document
        .service_path()
        .unwrap_or_else(|| document.name.clone());
    let verb = match document.action {
        Action::Publish => "publish",
        Action::Unpublish => "unpublish",
    };
    match &document.outcome {
        Outcome::Published => format!("published {target}"),
        Outcome::AlreadyCurrent => format!("up to date {target}"),
        Outcome::WouldPublish { issues } if issues.is_empty() => {
            format!("would publish {target}")
        }
        Outcome::WouldPublish { issues } => format!("would publish {target}\n{issues}"),
        Outcome::NotPublishable { errors } => {
            format!("not publishable {} ({target})\n{errors}", document.name)
        }
        Outcome::Unpublished => format!("unpublished {target}"),
        Outcome::WouldUnpublish { server_url } => {
            format!("would delete {target} from {server_url}")
        }
        Outcome::Skipped { reason } => format!("skipped {verb} {target}: {reason}"),
        Outcome::Failed { error } => format!("failed to {verb} {target}: {error}"),
    }
}
