//! Derived artifacts that live next to each source document.
//!
//! `survey.mxd` produces `survey.sddraft` (draft), `survey.sd` (staged
//! service definition) and `survey.issues.json` (cached analysis). An
//! artifact is current only when its modification time is strictly later
//! than the source's.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use crate::error::{PublishError, Result};

/// Manifest type that makes staging overwrite an existing service.
pub const REPLACEMENT_SERVICE_TYPE: &str = "esriServiceDefinitionType_Replacement";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub draft: PathBuf,
    pub staged: PathBuf,
    pub issues: PathBuf,
}

impl ArtifactPaths {
    pub fn for_source(source: &Path) -> Self {
        ArtifactPaths {
            draft: source.with_extension("sddraft"),
            staged: source.with_extension("sd"),
            issues: source.with_extension("issues.json"),
        }
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Does `artifact` exist and postdate `source`?
///
/// A missing artifact is never newer; a missing source makes any existing
/// artifact newer. Equal timestamps count as stale.
pub fn is_newer(artifact: &Path, source: Option<&Path>) -> bool {
    if !artifact.exists() {
        return false;
    }
    let Some(source) = source.filter(|s| s.exists()) else {
        return true;
    };
    match (modified(artifact), modified(source)) {
        (Ok(artifact_time), Ok(source_time)) => artifact_time > source_time,
        (Err(e), _) | (_, Err(e)) => {
            warn!(
                error = %e,
                artifact = %artifact.display(),
                source = %source.display(),
                "Unable to compare modification times"
            );
            false
        }
    }
}

/// Remove an artifact if it is there.
pub fn remove_artifact(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    debug!(path = %path.display(), "Deleting artifact");
    fs::remove_file(path).map_err(|e| PublishError::io(path, e))
}

/// Rewrite the draft so that staging replaces an existing service instead of
/// creating a new one: the text of every `Type` element directly inside
/// `SVCManifest` becomes [`REPLACEMENT_SERVICE_TYPE`]. Returns how many
/// elements changed.
pub fn mark_draft_as_replacement(draft: &Path) -> Result<usize> {
    let content = fs::read_to_string(draft).map_err(|e| PublishError::io(draft, e))?;
    let mut reader = Reader::from_str(&content);
    let mut writer = Writer::new(Vec::with_capacity(content.len()));
    let mut open_elements: Vec<Vec<u8>> = Vec::new();
    let mut replaced = 0;

    let invalid = |e: &dyn std::fmt::Display| {
        PublishError::toolchain(
            "mark draft as replacement",
            format!("{}: {e}", draft.display()),
        )
    };

    loop {
        let event = reader.read_event().map_err(|e| invalid(&e))?;
        let event = match event {
            Event::Eof => break,
            Event::Start(start) => {
                open_elements.push(start.local_name().as_ref().to_vec());
                Event::Start(start)
            }
            Event::End(end) => {
                open_elements.pop();
                Event::End(end)
            }
            Event::Text(text) if is_manifest_type(&open_elements) => {
                debug!(
                    from = %String::from_utf8_lossy(&text),
                    to = REPLACEMENT_SERVICE_TYPE,
                    "Updating SVCManifest/Type"
                );
                replaced += 1;
                Event::Text(BytesText::new(REPLACEMENT_SERVICE_TYPE))
            }
            other => other,
        };
        writer.write_event(event).map_err(|e| invalid(&e))?;
    }

    fs::write(draft, writer.into_inner()).map_err(|e| PublishError::io(draft, e))?;
    debug!(path = %draft.display(), replaced, "Draft file fixed");
    Ok(replaced)
}

fn is_manifest_type(open_elements: &[Vec<u8>]) -> bool {
    matches!(
        open_elements,
        [.., parent, element] if parent.as_slice() == b"SVCManifest" && element.as_slice() == b"Type"
    )
}
