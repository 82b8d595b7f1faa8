//! Server-legal service names.
//!
//! A service name may only contain alphanumeric characters and underscores
//! and may be at most 120 characters long. Folder names follow the same rule.

use std::fmt;
use std::path::Path;

/// Longest service or folder name the server accepts.
pub const MAX_SERVICE_NAME_CHARS: usize = 120;

/// Replace every non-alphanumeric character with `_` and truncate to
/// [`MAX_SERVICE_NAME_CHARS`] characters. `None` stays `None`.
pub fn sanitize(name: Option<&str>) -> Option<String> {
    name.map(sanitize_service_name)
}

pub fn sanitize_service_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(MAX_SERVICE_NAME_CHARS)
        .collect()
}

/// The sanitized `(folder, name)` pair that identifies a service on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    pub folder: Option<String>,
    pub name: String,
}

impl ServiceIdentity {
    /// Sanitizes both parts.
    pub fn new(folder: Option<&str>, name: &str) -> Self {
        ServiceIdentity {
            folder: sanitize(folder),
            name: sanitize_service_name(name),
        }
    }

    /// Identity of a source document: its file stem, in its folder.
    pub fn for_source(path: &Path, folder: Option<&str>) -> Option<Self> {
        let stem = path.file_stem()?.to_string_lossy();
        Some(ServiceIdentity::new(folder, &stem))
    }

    /// `folder/name`, or just `name` for services in the root folder.
    pub fn service_path(&self) -> String {
        match &self.folder {
            Some(folder) => format!("{folder}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Case-insensitive comparison against a service path reported by the
    /// server or computed from another identity.
    pub fn matches_path(&self, service_path: &str) -> bool {
        self.service_path().to_lowercase() == service_path.to_lowercase()
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_path())
    }
}
