//! # finder: reconcile local documents, history and the server
//!
//! The finder enumerates source documents under the root directory (and one
//! level of subfolders), loads the publishing history, merges the optional
//! service list, and turns all of that into two ordered work lists:
//! documents to publish and services to unpublish.
//!
//! History comes from the configured history file, or, when none is
//! configured, from the services currently on the server (records without a
//! source path). An empty scan never produces deletions: an unmounted drive
//! or a mistyped root would otherwise unpublish everything.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::contract::{DocumentKind, ServiceDirectory};
use crate::directory;
use crate::document::{document_kind, PublishOptions, PublishableDocument};
use crate::history::{self, HistoryRecord};
use crate::sanitize::ServiceIdentity;
use crate::server::ServerReference;

/// Source extensions picked up by the directory scan.
const SOURCE_EXTENSIONS: [&str; 2] = ["mxd", "lyr"];

/// A local file to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// Parent directory name when nested one level under the root.
    pub folder: Option<String>,
    pub base_name: String,
    pub kind: DocumentKind,
    /// Service name override from the service list.
    pub service_name: Option<String>,
}

impl SourceDocument {
    pub fn new(path: PathBuf, folder: Option<String>) -> Self {
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = document_kind(&path);
        SourceDocument {
            path,
            folder,
            base_name,
            kind,
            service_name: None,
        }
    }

    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity::new(
            self.folder.as_deref(),
            self.service_name.as_deref().unwrap_or(&self.base_name),
        )
    }
}

fn is_source_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e.as_str()))
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => {
            let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
            paths.sort();
            paths
        }
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "[FINDER] Unable to read directory");
            Vec::new()
        }
    }
}

/// Recognized source files directly in `root` or in an immediate
/// subdirectory, in path order. A missing root yields nothing.
pub fn scan_root(root: &Path) -> Vec<SourceDocument> {
    if !root.is_dir() {
        warn!(root = %root.display(), "[FINDER] Root directory does not exist or is not a directory");
        return Vec::new();
    }
    let mut documents = Vec::new();
    for entry in sorted_entries(root) {
        if entry.is_dir() {
            let folder = entry
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            documents.extend(
                sorted_entries(&entry)
                    .into_iter()
                    .filter(|p| is_source_file(p))
                    .map(|p| SourceDocument::new(p, folder.clone())),
            );
        } else if is_source_file(&entry) {
            documents.push(SourceDocument::new(entry, None));
        }
    }
    documents.sort_by(|a, b| a.path.cmp(&b.path));
    info!(root = %root.display(), count = documents.len(), "[FINDER] Scanned root directory");
    documents
}

/// History from the configured file, or seeded from the server when no file
/// is configured. `None` means no usable history.
pub async fn load_history<D>(
    config: &SyncConfig,
    server: &ServerReference,
    directory: &D,
) -> Option<Vec<HistoryRecord>>
where
    D: ServiceDirectory + ?Sized,
{
    match &config.history_file {
        Some(path) if path.exists() => history::read_table(path),
        Some(path) => {
            info!(path = %path.display(), "[FINDER] History file does not exist yet, starting with empty history");
            Some(Vec::new())
        }
        None => {
            let Some(base_url) = server.url.as_deref() else {
                warn!("[FINDER] No history file and no server URL. History is unavailable");
                return None;
            };
            let services = directory::services_on_server(directory, base_url).await?;
            Some(
                services
                    .into_iter()
                    .map(|(folder, name)| HistoryRecord::from_server(folder, name))
                    .collect(),
            )
        }
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Apply service list rows to the scanned documents: rows for a scanned
/// source override its folder and name, rows for other existing sources add
/// a document.
pub fn merge_service_list(documents: &mut Vec<SourceDocument>, rows: Vec<HistoryRecord>) {
    for row in rows {
        let Some(source) = row.source_path else {
            warn!(service = %row.service_name, "[FINDER] Service list row has no source path, skipping");
            continue;
        };
        if let Some(existing) = documents.iter_mut().find(|d| same_path(&d.path, &source)) {
            debug!(source = %source.display(), "[FINDER] Service list overrides service name");
            existing.folder = row.service_folder;
            existing.service_name = Some(row.service_name);
            continue;
        }
        if !source.is_file() {
            warn!(source = %source.display(), "[FINDER] Service list source does not exist, skipping");
            continue;
        }
        debug!(source = %source.display(), "[FINDER] Service list adds document");
        let mut document = SourceDocument::new(source, row.service_folder);
        document.service_name = Some(row.service_name);
        documents.push(document);
    }
}

/// The reconciled view of one run.
#[derive(Debug)]
pub struct DocumentFinder {
    root: PathBuf,
    documents: Vec<SourceDocument>,
    /// Count from the filesystem scan alone, before service list additions.
    scanned: usize,
    history: Option<Vec<HistoryRecord>>,
    server: ServerReference,
    options: PublishOptions,
}

impl DocumentFinder {
    /// Scan, load history and merge the service list for `config`.
    pub async fn new<D>(config: &SyncConfig, directory: &D) -> Self
    where
        D: ServiceDirectory + ?Sized,
    {
        let server = ServerReference::resolve(config.server.as_deref(), config.server_url.as_deref());
        let root = config.root_directory.clone().unwrap_or_default();
        let mut documents = scan_root(&root);
        let scanned = documents.len();

        if let Some(list) = &config.service_list {
            match history::read_table(list) {
                Some(rows) => merge_service_list(&mut documents, rows),
                None => warn!(path = %list.display(), "[FINDER] Ignoring unreadable service list"),
            }
        }

        let history = load_history(config, &server, directory).await;
        info!(
            documents = documents.len(),
            history = history.as_ref().map(Vec::len),
            "[FINDER] Reconciliation inputs ready"
        );

        DocumentFinder {
            root,
            documents,
            scanned,
            history,
            server,
            options: PublishOptions::from_config(config),
        }
    }

    /// Assemble a finder from parts already loaded.
    pub fn from_parts(
        root: PathBuf,
        documents: Vec<SourceDocument>,
        history: Option<Vec<HistoryRecord>>,
        server: ServerReference,
        options: PublishOptions,
    ) -> Self {
        let scanned = documents.len();
        DocumentFinder {
            root,
            documents,
            scanned,
            history,
            server,
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    pub fn history(&self) -> Option<&[HistoryRecord]> {
        self.history.as_deref()
    }

    pub fn server(&self) -> &ServerReference {
        &self.server
    }

    /// One document per source, in scan order.
    pub fn items_to_publish(&self) -> Vec<PublishableDocument> {
        self.documents
            .iter()
            .map(|source| {
                let doc = PublishableDocument::from_source(
                    &source.path,
                    source.folder.as_deref(),
                    self.server.clone(),
                    self.options.clone(),
                );
                match &source.service_name {
                    Some(name) => doc.with_service_name(source.folder.as_deref(), name),
                    None => doc,
                }
            })
            .collect()
    }

    /// History records no longer backed by a source, as deletion candidates.
    pub fn items_to_unpublish(&self) -> Vec<PublishableDocument> {
        let Some(history) = &self.history else {
            debug!("[FINDER] No history, nothing to unpublish");
            return Vec::new();
        };
        if self.scanned == 0 {
            warn!(root = %self.root.display(), "[FINDER] No documents found, refusing to unpublish anything");
            return Vec::new();
        }

        let published: Vec<String> = self
            .documents
            .iter()
            .map(|d| d.identity().service_path())
            .collect();

        history
            .iter()
            .filter(|record| match &record.source_path {
                Some(path) => !self.documents.iter().any(|d| same_path(&d.path, path)),
                None => {
                    let identity =
                        ServiceIdentity::new(record.service_folder.as_deref(), &record.service_name);
                    !published.iter().any(|p| identity.matches_path(p))
                }
            })
            .map(|record| {
                debug!(service = %record.service_name, folder = ?record.service_folder, "[FINDER] Service is no longer backed by a source");
                PublishableDocument::from_history(record, self.server.clone(), self.options.clone())
            })
            .collect()
    }
}
