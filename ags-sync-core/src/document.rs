//! # document: one publishable source and its artifact state machine
//!
//! A [`PublishableDocument`] wraps a single source (map document, layer file
//! or raster) and tracks how far its derived artifacts have progressed:
//!
//! ```text
//! NoDraft -> Draft -> AnalyzedDraft -> ServiceDefinition -> Published
//! ```
//!
//! States only move forward within a run; `force` rebuilds regardless.
//! Every step that may call the toolchain or the server takes those
//! collaborators as arguments, so nothing happens behind a plain accessor.
//!
//! Staleness is decided from modification times: an artifact strictly newer
//! than the source is reused and the toolchain is not called for it.
//!
//! Documents built from history records (services whose source is gone)
//! have no source path. They can be unpublished but not published.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::analysis::AnalysisReport;
use crate::artifacts::{self, ArtifactPaths};
use crate::config::{Credentials, SyncConfig};
use crate::contract::{DocumentKind, DraftRequest, ServiceDirectory, Toolchain};
use crate::directory;
use crate::error::{PublishError, Result};
use crate::history::HistoryRecord;
use crate::sanitize::ServiceIdentity;
use crate::server::ServerReference;

/// Progress of a document's derived artifacts, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactState {
    NoDraft,
    Draft,
    AnalyzedDraft,
    ServiceDefinition,
    Published,
}

/// What `publish` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Uploaded,
    /// Live, and the staged definition is the one already uploaded.
    AlreadyCurrent,
}

/// What `unpublish` did. Skips are not errors: they leave the server
/// untouched and say why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpublishOutcome {
    Deleted { service_path: String },
    DryRun { service_path: String, server_url: String },
    Skipped { reason: String },
}

/// Options passed through to draft creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub copy_data_to_server: bool,
    pub summary: Option<String>,
    pub tags: Option<String>,
}

impl PublishOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        PublishOptions {
            copy_data_to_server: config.copy_data_to_server,
            summary: config.summary.clone(),
            tags: config.tags.clone(),
        }
    }
}

#[derive(Debug)]
pub struct PublishableDocument {
    source: Option<PathBuf>,
    folder: Option<String>,
    base_name: Option<String>,
    identity: Option<ServiceIdentity>,
    kind: DocumentKind,
    artifacts: Option<ArtifactPaths>,
    server: ServerReference,
    options: PublishOptions,
    state: ArtifactState,
    analysis: Option<AnalysisReport>,
    new_service_definition: bool,
    live: Option<bool>,
}

/// Extensions published as image services.
const RASTER_EXTENSIONS: [&str; 9] = ["tif", "tiff", "img", "jp2", "sid", "ecw", "dem", "mrf", "crf"];

/// Map/image split by file extension.
pub fn document_kind(path: &Path) -> DocumentKind {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if RASTER_EXTENSIONS.contains(&ext.as_str()) {
        DocumentKind::Image
    } else {
        DocumentKind::Map
    }
}

impl PublishableDocument {
    /// A document for an existing source file. A missing source yields a
    /// document without source or identity, which can do nothing.
    pub fn from_source(
        path: &Path,
        folder: Option<&str>,
        server: ServerReference,
        options: PublishOptions,
    ) -> Self {
        let mut doc = PublishableDocument {
            source: None,
            folder: folder.map(str::to_string),
            base_name: None,
            identity: None,
            kind: document_kind(path),
            artifacts: None,
            server,
            options,
            state: ArtifactState::NoDraft,
            analysis: None,
            new_service_definition: false,
            live: None,
        };
        if path.exists() {
            doc.source = Some(path.to_path_buf());
            doc.base_name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            doc.identity = ServiceIdentity::for_source(path, folder);
            doc.artifacts = Some(ArtifactPaths::for_source(path));
        } else {
            warn!(path = %path.display(), "Path not found. This is an invalid document.");
        }
        doc
    }

    /// A deletion candidate for a service recorded in history. The service
    /// name comes from the record, not from a file.
    pub fn from_history(
        record: &HistoryRecord,
        server: ServerReference,
        options: PublishOptions,
    ) -> Self {
        PublishableDocument {
            source: None,
            folder: record.service_folder.clone(),
            base_name: None,
            identity: Some(ServiceIdentity::new(
                record.service_folder.as_deref(),
                &record.service_name,
            )),
            kind: DocumentKind::Map,
            artifacts: None,
            server,
            options,
            state: ArtifactState::NoDraft,
            analysis: None,
            new_service_definition: false,
            live: None,
        }
    }

    /// Override the service name, e.g. from a service list entry.
    pub fn with_service_name(mut self, folder: Option<&str>, name: &str) -> Self {
        self.folder = folder.map(str::to_string);
        self.identity = Some(ServiceIdentity::new(folder, name));
        self
    }

    /// Local name: `folder/base_name`, or the service path when there is no
    /// source.
    pub fn name(&self) -> String {
        match (&self.folder, &self.base_name) {
            (Some(folder), Some(base)) => format!("{folder}/{base}"),
            (None, Some(base)) => base.clone(),
            _ => self
                .service_path()
                .unwrap_or_else(|| "<unknown document>".to_string()),
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn identity(&self) -> Option<&ServiceIdentity> {
        self.identity.as_ref()
    }

    pub fn service_path(&self) -> Option<String> {
        self.identity.as_ref().map(ServiceIdentity::service_path)
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn server(&self) -> &ServerReference {
        &self.server
    }

    pub fn state(&self) -> ArtifactState {
        self.state
    }

    pub fn analysis(&self) -> Option<&AnalysisReport> {
        self.analysis.as_ref()
    }

    pub fn is_new_service_definition(&self) -> bool {
        self.new_service_definition
    }

    fn reach(&mut self, state: ArtifactState) {
        if state > self.state {
            debug!(document = %self.name(), from = ?self.state, to = ?state, "[DOC] State advanced");
            self.state = state;
        }
    }

    fn require_source(&self) -> Result<(&Path, &ArtifactPaths, &ServiceIdentity)> {
        match (&self.source, &self.artifacts, &self.identity) {
            (Some(source), Some(artifacts), Some(identity)) if source.exists() => {
                Ok((source, artifacts, identity))
            }
            (Some(_), _, _) => Err(PublishError::Configuration {
                message: "This document cannot be published. The source file is missing."
                    .to_string(),
            }),
            _ => Err(PublishError::Configuration {
                message: "This document cannot be published. There is no path to the source."
                    .to_string(),
            }),
        }
    }

    /// Perform exactly the steps missing to reach `target` and return the
    /// state reached. With `force`, the steps run even if artifacts look
    /// current.
    pub async fn advance_to<T, D>(
        &mut self,
        target: ArtifactState,
        force: bool,
        toolchain: &T,
        directory: &D,
    ) -> Result<ArtifactState>
    where
        T: Toolchain + ?Sized,
        D: ServiceDirectory + ?Sized,
    {
        if self.state >= target && !force {
            return Ok(self.state);
        }
        match target {
            ArtifactState::NoDraft => {}
            ArtifactState::Draft => self.create_draft(force, toolchain, directory).await?,
            ArtifactState::AnalyzedDraft => {
                if force {
                    self.analysis = None;
                    self.create_draft(true, toolchain, directory).await?;
                }
                self.analyze_draft(toolchain, directory).await?;
            }
            ArtifactState::ServiceDefinition => {
                self.create_service_definition(force, toolchain, directory)
                    .await?
            }
            ArtifactState::Published => {
                self.publish(force, toolchain, directory).await?;
            }
        }
        Ok(self.state)
    }

    /// Create the draft service definition from the source.
    ///
    /// A draft newer than the source is reused unless `force` is set. A new
    /// draft comes with an analysis, which is cached in memory and in the
    /// issues side file. If the service is already live the draft is marked
    /// as a replacement so staging overwrites it.
    pub async fn create_draft<T, D>(&mut self, force: bool, toolchain: &T, directory: &D) -> Result<()>
    where
        T: Toolchain + ?Sized,
        D: ServiceDirectory + ?Sized,
    {
        let (source, artifacts, identity) = self.require_source()?;
        debug!(source = %source.display(), "[DOC] Creating draft service definition");

        if !force && artifacts::is_newer(&artifacts.draft, Some(source)) {
            info!(draft = %artifacts.draft.display(), "Draft is newer than source document, skipping create");
            self.reach(ArtifactState::Draft);
            return Ok(());
        }

        let request = DraftRequest {
            source: source.to_path_buf(),
            draft: artifacts.draft.clone(),
            kind: self.kind,
            service_name: identity.name.clone(),
            service_folder: identity.folder.clone(),
            server: self.server.target.clone(),
            copy_data_to_server: self.options.copy_data_to_server,
            summary: self.options.summary.clone(),
            tags: self.options.tags.clone(),
        };
        let issues_path = artifacts.issues.clone();
        let draft_path = artifacts.draft.clone();

        artifacts::remove_artifact(&draft_path)?;

        info!(source = %request.source.display(), kind = request.kind.as_str(), "Begin create draft");
        let raw = toolchain
            .create_draft(&request)
            .await
            .map_err(|e| PublishError::toolchain("create draft", e))?;
        info!("Done create draft");

        if self.is_live(directory).await {
            if let Err(e) = artifacts::mark_draft_as_replacement(&draft_path) {
                // an unpatched draft would be reused as a new service next run
                if let Err(remove) = artifacts::remove_artifact(&draft_path) {
                    warn!(error = %remove, draft = %draft_path.display(), "Unable to remove unpatched draft");
                }
                return Err(e);
            }
        }

        let report = AnalysisReport::from_raw(raw);
        report.store(&issues_path);
        self.analysis = Some(report);
        self.reach(ArtifactState::AnalyzedDraft);
        Ok(())
    }

    /// Analyze the draft, reusing any analysis already in memory or a cached
    /// side file newer than the source.
    pub async fn analyze_draft<T, D>(&mut self, toolchain: &T, directory: &D) -> Result<&AnalysisReport>
    where
        T: Toolchain + ?Sized,
        D: ServiceDirectory + ?Sized,
    {
        if self.analysis.is_none() {
            self.load_cached_analysis();
        }
        if self.analysis.is_none() {
            let draft_is_current = {
                let (source, artifacts, _) = self.require_source()?;
                artifacts::is_newer(&artifacts.draft, Some(source))
            };
            // staging may have consumed the draft; a freshly created one comes with its analysis
            if !draft_is_current {
                self.create_draft(false, toolchain, directory).await?;
            }
            if self.analysis.is_none() {
                let (_, artifacts, _) = self.require_source()?;
                let draft = artifacts.draft.clone();
                let issues_path = artifacts.issues.clone();
                info!(draft = %draft.display(), "Begin analyze draft");
                let raw = toolchain
                    .analyze_draft(&draft)
                    .await
                    .map_err(|e| PublishError::toolchain("analyze draft", e))?;
                info!("Done analyze draft");
                let report = AnalysisReport::from_raw(raw);
                report.store(&issues_path);
                self.analysis = Some(report);
            }
        }
        if self.state == ArtifactState::Draft {
            self.reach(ArtifactState::AnalyzedDraft);
        }
        self.analysis.as_ref().ok_or_else(|| PublishError::NotFound {
            message: "no analysis results for the draft".to_string(),
        })
    }

    fn load_cached_analysis(&mut self) {
        let Some(artifacts) = &self.artifacts else {
            return;
        };
        if artifacts::is_newer(&artifacts.issues, self.source.as_deref()) {
            self.analysis = AnalysisReport::load(&artifacts.issues);
        }
    }

    /// Is the source ready to publish?
    ///
    /// A staged definition newer than the source is enough on its own.
    /// Otherwise this makes sure an analyzed draft exists (calling the
    /// toolchain if needed) and checks it for errors. Failures are logged and
    /// answer `false`.
    pub async fn is_publishable<T, D>(&mut self, toolchain: &T, directory: &D) -> bool
    where
        T: Toolchain + ?Sized,
        D: ServiceDirectory + ?Sized,
    {
        let Ok((source, artifacts, _)) = self.require_source() else {
            warn!(document = %self.name(), "No source to publish");
            return false;
        };
        if artifacts::is_newer(&artifacts.staged, Some(source)) {
            debug!("Service definition is newer than source, ready to publish.");
            self.reach(ArtifactState::ServiceDefinition);
            return true;
        }

        if !artifacts::is_newer(&artifacts.draft, Some(source)) {
            if let Err(e) = self.create_draft(false, toolchain, directory).await {
                warn!(error = %e, "Unable to create draft service definition");
                return false;
            }
        } else {
            self.reach(ArtifactState::Draft);
        }

        match self.analyze_draft(toolchain, directory).await {
            Ok(report) if report.has_errors() => {
                debug!("Service definition draft has errors, NOT ready to publish.");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Unable to analyze the service");
                false
            }
        }
    }

    /// Stage the draft into a service definition.
    pub async fn create_service_definition<T, D>(
        &mut self,
        force: bool,
        toolchain: &T,
        directory: &D,
    ) -> Result<()>
    where
        T: Toolchain + ?Sized,
        D: ServiceDirectory + ?Sized,
    {
        if force {
            let (_, artifacts, _) = self.require_source()?;
            artifacts::remove_artifact(&artifacts.staged.clone())?;
            if self.state >= ArtifactState::ServiceDefinition {
                self.state = ArtifactState::AnalyzedDraft;
            }
        }

        if !self.is_publishable(toolchain, directory).await {
            return Err(PublishError::NotPublishable {
                errors: self.errors(toolchain, directory).await,
            });
        }

        if self.state < ArtifactState::ServiceDefinition {
            let (_, artifacts, _) = self.require_source()?;
            let draft = artifacts.draft.clone();
            let staged = artifacts.staged.clone();
            // staging fails if the destination exists
            artifacts::remove_artifact(&staged)?;
            info!(draft = %draft.display(), staged = %staged.display(), "Begin stage service");
            toolchain
                .stage_service(&draft, &staged)
                .await
                .map_err(|e| PublishError::toolchain("stage service", e))?;
            info!("Done stage service");
            self.new_service_definition = true;
            self.reach(ArtifactState::ServiceDefinition);
        }
        Ok(())
    }

    /// Upload the staged definition, staging it first if necessary.
    ///
    /// The upload is skipped only when it is not forced, the service is live,
    /// and the definition was not rebuilt in this run.
    pub async fn publish<T, D>(&mut self, force: bool, toolchain: &T, directory: &D) -> Result<PublishOutcome>
    where
        T: Toolchain + ?Sized,
        D: ServiceDirectory + ?Sized,
    {
        if self.state < ArtifactState::ServiceDefinition || force {
            self.create_service_definition(force, toolchain, directory)
                .await?;
        }
        if self.state < ArtifactState::ServiceDefinition {
            return Err(PublishError::NotFound {
                message: "Service definition file is not ready to publish".to_string(),
            });
        }
        let (_, artifacts, _) = self.require_source()?;
        let staged = artifacts.staged.clone();
        let connection = self.server.target.connection();

        if !force && !self.new_service_definition && self.is_live(directory).await {
            info!(document = %self.name(), "Service is live and current, skipping upload");
            self.reach(ArtifactState::Published);
            return Ok(PublishOutcome::AlreadyCurrent);
        }

        info!(staged = %staged.display(), connection = %connection, "Begin upload service");
        toolchain
            .upload_service(&staged, &connection)
            .await
            .map_err(|e| PublishError::toolchain("upload service", e))?;
        info!("Done upload service");
        self.live = Some(true);
        self.reach(ArtifactState::Published);
        Ok(PublishOutcome::Uploaded)
    }

    /// Is this service on the server? Asked at most once per document;
    /// unknown server or identity counts as live.
    pub async fn is_live<D>(&mut self, directory: &D) -> bool
    where
        D: ServiceDirectory + ?Sized,
    {
        if let Some(live) = self.live {
            return live;
        }
        let live = match &self.identity {
            Some(identity) => {
                directory::service_exists_at(directory, self.server.url.as_deref(), identity).await
            }
            None => {
                debug!("Service path is unknown. Assume service exists");
                true
            }
        };
        self.live = Some(live);
        live
    }

    /// All analysis findings as text, loading the cache or analyzing if
    /// needed.
    pub async fn issues<T, D>(&mut self, toolchain: &T, directory: &D) -> String
    where
        T: Toolchain + ?Sized,
        D: ServiceDirectory + ?Sized,
    {
        if self.analysis.is_none() {
            self.load_cached_analysis();
        }
        if self.analysis.is_none() && self.source.is_some() {
            if let Err(e) = self.analyze_draft(toolchain, directory).await {
                warn!(error = %e, "Unable to analyze the service");
            }
        }
        match &self.analysis {
            Some(report) => report.describe(),
            None if self.source.is_none() => {
                "ERRORS:\n  Path to service source is not valid\n".to_string()
            }
            None => "ERRORS:\n  Unable to get issues\n".to_string(),
        }
    }

    /// Only the error findings, as text. Empty when there are none.
    pub async fn errors<T, D>(&mut self, toolchain: &T, directory: &D) -> String
    where
        T: Toolchain + ?Sized,
        D: ServiceDirectory + ?Sized,
    {
        let issues = self.issues(toolchain, directory).await;
        match &self.analysis {
            Some(report) => report.describe_errors(),
            None => issues.trim_start_matches("ERRORS:\n").to_string(),
        }
    }

    /// Stop and delete the published service through the admin API.
    ///
    /// Needs a server URL, a service path and admin credentials; without any
    /// of them, or when the service or a token cannot be found, the call is
    /// skipped with a warning. `dry_run` stops short of the delete request.
    pub async fn unpublish<D>(
        &self,
        credentials: Option<&Credentials>,
        dry_run: bool,
        directory: &D,
    ) -> Result<UnpublishOutcome>
    where
        D: ServiceDirectory + ?Sized,
    {
        let skip = |reason: &str| -> Result<UnpublishOutcome> {
            warn!(document = %self.name(), "{reason}");
            Ok(UnpublishOutcome::Skipped {
                reason: reason.to_string(),
            })
        };
        debug!(service = ?self.service_path(), server_url = ?self.server.url, "Called unpublish");

        let (Some(server_url), Some(identity)) = (self.server.url.as_deref(), &self.identity) else {
            return skip("URL to server, or path to service is unknown. Can't unpublish.");
        };
        let Some(credentials) = credentials else {
            return skip("No credentials provided. Can't unpublish.");
        };
        let Some(service_type) =
            directory::service_type_on_server(directory, server_url, identity).await
        else {
            return skip("Unable to find service on server. Can't unpublish.");
        };
        let token = match directory.generate_token(server_url, credentials).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, server_url, "Login to server failed");
                return skip("Unable to login to server. Can't unpublish.");
            }
        };

        let service_path = identity.service_path();
        if dry_run {
            info!(service = %service_path, server_url, "[DOC] Dry run, prepared to delete service");
            return Ok(UnpublishOutcome::DryRun {
                service_path,
                server_url: server_url.to_string(),
            });
        }

        info!(service = %service_path, service_type = %service_type, "Attempting to delete service from the server");
        directory
            .delete_service(server_url, &service_path, &service_type, &token)
            .await
            .map_err(|e| PublishError::Network {
                url: format!("{server_url}/admin/services/{service_path}.{service_type}/delete"),
                message: e.to_string(),
            })?;
        info!(service = %service_path, "Deleted service");
        Ok(UnpublishOutcome::Deleted { service_path })
    }
}
