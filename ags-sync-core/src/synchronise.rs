//! High-level run: reconcile, publish, unpublish, record history.
//!
//! [`synchronise`] is the single entrypoint used by the CLI and the
//! integration tests. It:
//!   - builds a [`DocumentFinder`] for the configured root, history and
//!     service list
//!   - publishes every document to publish (or, in a dry run, reports
//!     whether it is publishable and what the analyzer found)
//!   - unpublishes every service no longer backed by a source (or reports the
//!     intended delete)
//!   - rewrites the history file after a real run
//!
//! # Error Handling
//! Only a missing root directory setting fails the run. Everything that goes
//! wrong for a single document is logged, recorded in its
//! [`DocumentReport`], and the batch moves on to the next document.
//!
//! Documents are processed one at a time; each is finished before the next
//! starts.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::contract::{ServiceDirectory, Toolchain};
use crate::document::{PublishOutcome, PublishableDocument, UnpublishOutcome};
use crate::error::{PublishError, Result};
use crate::finder::DocumentFinder;
use crate::history::{self, HistoryRecord};
use crate::sanitize::ServiceIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Publish,
    Unpublish,
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published,
    AlreadyCurrent,
    /// Dry run: the document is ready; `issues` is the analyzer report.
    WouldPublish { issues: String },
    NotPublishable { errors: String },
    Unpublished,
    /// Dry run: the service would be deleted from `server_url`.
    WouldUnpublish { server_url: String },
    Skipped { reason: String },
    Failed { error: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. } | Outcome::NotPublishable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub name: String,
    pub source: Option<PathBuf>,
    pub identity: Option<ServiceIdentity>,
    pub action: Action,
    pub outcome: Outcome,
}

impl DocumentReport {
    fn new(document: &PublishableDocument, action: Action, outcome: Outcome) -> Self {
        DocumentReport {
            name: document.name(),
            source: document.source().map(PathBuf::from),
            identity: document.identity().cloned(),
            action,
            outcome,
        }
    }

    pub fn service_path(&self) -> Option<String> {
        self.identity.as_ref().map(ServiceIdentity::service_path)
    }
}

#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub documents: Vec<DocumentReport>,
    /// Path of the rewritten history file, if it was written.
    pub history_written: Option<PathBuf>,
}

impl SynchroniseReport {
    pub fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.documents
            .iter()
            .filter(|d| predicate(&d.outcome))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.count(Outcome::is_failure)
    }
}

/// Run one synchronisation of `config.root_directory` against the server.
pub async fn synchronise<T, D>(
    config: &SyncConfig,
    toolchain: &T,
    directory: &D,
) -> Result<SynchroniseReport>
where
    T: Toolchain + ?Sized,
    D: ServiceDirectory + ?Sized,
{
    if config.root_directory.is_none() {
        return Err(PublishError::Configuration {
            message: "no root directory configured".to_string(),
        });
    }
    info!(dry_run = config.dry_run, force = config.force, "[SYNC] Starting synchronisation");
    config.trace_loaded();

    let finder = DocumentFinder::new(config, directory).await;
    let mut report = SynchroniseReport::default();

    for mut document in finder.items_to_publish() {
        let outcome = publish_one(&mut document, config, toolchain, directory).await;
        report
            .documents
            .push(DocumentReport::new(&document, Action::Publish, outcome));
    }

    let credentials = config.credentials();
    for document in finder.items_to_unpublish() {
        info!(document = %document.name(), "[SYNC] Unpublishing service");
        let outcome = match document
            .unpublish(credentials.as_ref(), config.dry_run, directory)
            .await
        {
            Ok(UnpublishOutcome::Deleted { .. }) => Outcome::Unpublished,
            Ok(UnpublishOutcome::DryRun { server_url, .. }) => Outcome::WouldUnpublish { server_url },
            Ok(UnpublishOutcome::Skipped { reason }) => Outcome::Skipped { reason },
            Err(e) => {
                error!(document = %document.name(), error = %e, "[SYNC] Unable to unpublish");
                Outcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        report
            .documents
            .push(DocumentReport::new(&document, Action::Unpublish, outcome));
    }

    if !config.dry_run {
        if let Some(path) = &config.history_file {
            match finder.history() {
                Some(prior) => {
                    let records = updated_history(prior, &report.documents);
                    match history::write_table(path, &records) {
                        Ok(()) => report.history_written = Some(path.clone()),
                        Err(e) => warn!(error = %e, "[SYNC] Unable to write history file"),
                    }
                }
                None => warn!(
                    path = %path.display(),
                    "[SYNC] History file was unreadable, leaving it untouched"
                ),
            }
        }
    }

    info!(
        documents = report.documents.len(),
        failures = report.failures(),
        "[SYNC] Synchronisation finished"
    );
    Ok(report)
}

async fn publish_one<T, D>(
    document: &mut PublishableDocument,
    config: &SyncConfig,
    toolchain: &T,
    directory: &D,
) -> Outcome
where
    T: Toolchain + ?Sized,
    D: ServiceDirectory + ?Sized,
{
    info!(document = %document.name(), "[SYNC] Publishing document");
    if config.dry_run {
        return if document.is_publishable(toolchain, directory).await {
            Outcome::WouldPublish {
                issues: document.issues(toolchain, directory).await,
            }
        } else {
            Outcome::NotPublishable {
                errors: document.errors(toolchain, directory).await,
            }
        };
    }
    match document.publish(config.force, toolchain, directory).await {
        Ok(PublishOutcome::Uploaded) => {
            info!(document = %document.name(), "[SYNC] Published");
            Outcome::Published
        }
        Ok(PublishOutcome::AlreadyCurrent) => Outcome::AlreadyCurrent,
        Err(PublishError::NotPublishable { errors }) => {
            warn!(document = %document.name(), "[SYNC] Document is not publishable");
            Outcome::NotPublishable { errors }
        }
        Err(e) => {
            error!(document = %document.name(), error = %e, "[SYNC] Unable to publish");
            Outcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Prior records, minus deleted services and records superseded by this
/// run's publications, plus one record per published document.
pub fn updated_history(prior: &[HistoryRecord], reports: &[DocumentReport]) -> Vec<HistoryRecord> {
    let deleted: Vec<String> = reports
        .iter()
        .filter(|r| r.outcome == Outcome::Unpublished)
        .filter_map(DocumentReport::service_path)
        .collect();
    let published: Vec<&DocumentReport> = reports
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Published | Outcome::AlreadyCurrent))
        .collect();

    let mut records: Vec<HistoryRecord> = prior
        .iter()
        .filter(|record| {
            let identity = ServiceIdentity::new(record.service_folder.as_deref(), &record.service_name);
            let gone = deleted.iter().any(|p| identity.matches_path(p));
            let replaced = published.iter().any(|r| {
                r.service_path().is_some_and(|p| identity.matches_path(&p))
                    || (record.source_path.is_some() && record.source_path == r.source)
            });
            !gone && !replaced
        })
        .cloned()
        .collect();

    for report in published {
        let Some(identity) = &report.identity else {
            continue;
        };
        records.push(HistoryRecord {
            source_path: report.source.clone(),
            service_folder: identity.folder.clone(),
            service_name: identity.name.clone(),
        });
    }
    debug!(records = records.len(), "[SYNC] Updated history");
    records
}
