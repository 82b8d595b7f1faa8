//! # contract: seams to the two external collaborators
//!
//! This module defines the traits through which the core talks to the
//! outside world, plus the plain data types that cross those seams:
//!
//! - [`Toolchain`]: the desktop GIS toolchain that turns a map document into
//!   a draft, analyzes it, stages a service definition and uploads it. It is
//!   proprietary and host-controlled; the core only knows its inputs,
//!   outputs and that any step may fail.
//! - [`ServiceDirectory`]: the ArcGIS Server REST API (service listings,
//!   admin tokens, deletes).
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`, so tests get `MockToolchain` and
//! `MockServiceDirectory` with call counting for free. The mocks are exported
//! behind the default `test-export-mocks` feature so integration tests in
//! `tests/` can use them.
//!
//! ## Implementations
//! The CLI crate provides the concrete bindings: a REST client over
//! `reqwest` and a toolchain that shells out to a helper program.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::config::Credentials;
use crate::server::ServerTarget;

/// Error type for collaborator calls (simple boxed error, as the transport
/// details differ per implementation).
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Which draft-creation variant applies to a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Map document or layer file, published as a map service.
    #[default]
    Map,
    /// Raster dataset, published as an image service.
    Image,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Map => "map",
            DocumentKind::Image => "image",
        }
    }
}

/// Everything the toolchain needs to create a draft service definition.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftRequest {
    pub source: PathBuf,
    pub draft: PathBuf,
    pub kind: DocumentKind,
    pub service_name: String,
    pub service_folder: Option<String>,
    pub server: ServerTarget,
    pub copy_data_to_server: bool,
    pub summary: Option<String>,
    pub tags: Option<String>,
}

/// A layer an analysis issue applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLayer {
    pub name: String,
    #[serde(rename = "longName", default)]
    pub long_name: Option<String>,
}

/// One raw analyzer entry: the `(text, code)` key and the affected layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIssue {
    pub key: (String, i64),
    #[serde(default)]
    pub layers: Vec<RawLayer>,
}

/// Analyzer output as the toolchain reports it, grouped by severity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAnalysis {
    pub messages: Vec<RawIssue>,
    pub warnings: Vec<RawIssue>,
    pub errors: Vec<RawIssue>,
}

/// The GIS toolchain that builds and uploads service definitions.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Create a draft service definition at `request.draft` and return the
    /// analysis produced while creating it.
    async fn create_draft(&self, request: &DraftRequest) -> Result<RawAnalysis, CollaboratorError>;

    /// Analyze an existing draft for readiness to publish.
    async fn analyze_draft(&self, draft: &Path) -> Result<RawAnalysis, CollaboratorError>;

    /// Convert a draft into a staged service definition. Fails if `staged`
    /// already exists.
    async fn stage_service(&self, draft: &Path, staged: &Path) -> Result<(), CollaboratorError>;

    /// Upload and publish a staged definition to `connection`.
    async fn upload_service(&self, staged: &Path, connection: &str) -> Result<(), CollaboratorError>;
}

/// A service as listed by `/rest/services`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// `name` in the root folder, `folder/name` inside a folder.
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
}

/// Response of `/rest/services[/{folder}]?f=json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceListing {
    #[serde(default)]
    pub folders: Option<Vec<String>>,
    pub services: Vec<ServiceEntry>,
}

/// Read and admin access to a server's REST API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// List services at the root of the server, or in `folder`.
    async fn list_services(
        &self,
        base_url: &str,
        folder: Option<String>,
    ) -> Result<ServiceListing, CollaboratorError>;

    /// Log in to the admin API and return a short-lived token.
    async fn generate_token(
        &self,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<String, CollaboratorError>;

    /// Delete `service_path` of `service_type` using an admin token.
    async fn delete_service(
        &self,
        base_url: &str,
        service_path: &str,
        service_type: &str,
        token: &str,
    ) -> Result<(), CollaboratorError>;
}
