//! Read-only questions asked of a server's service directory.
//!
//! Every failure here is inconclusive rather than an error. Callers pick the
//! conservative answer: an unknown liveness means "assume the service
//! exists", so nothing gets republished or deleted blindly.

use tracing::{debug, info, warn};

use crate::contract::{ServiceDirectory, ServiceEntry, ServiceListing};
use crate::sanitize::ServiceIdentity;

/// List services at the root or in `folder`; `None` when the server could not
/// be asked or answered nonsense.
pub async fn list_services<D>(
    directory: &D,
    base_url: &str,
    folder: Option<&str>,
) -> Option<ServiceListing>
where
    D: ServiceDirectory + ?Sized,
{
    match directory
        .list_services(base_url, folder.map(str::to_string))
        .await
    {
        Ok(listing) => {
            debug!(
                base_url,
                folder,
                services = listing.services.len(),
                "[DIRECTORY] Listed services"
            );
            Some(listing)
        }
        Err(e) => {
            warn!(error = %e, base_url, folder, "[DIRECTORY] Failed to list services");
            None
        }
    }
}

/// Outcome of looking for a folder in the root listing.
enum FolderLookup {
    Present,
    Absent,
    Unknown,
}

async fn find_folder<D>(directory: &D, base_url: &str, folder: &str) -> FolderLookup
where
    D: ServiceDirectory + ?Sized,
{
    let Some(root) = list_services(directory, base_url, None).await else {
        return FolderLookup::Unknown;
    };
    let Some(folders) = root.folders else {
        warn!(base_url, "[DIRECTORY] Root listing has no folder list");
        return FolderLookup::Unknown;
    };
    let wanted = folder.to_lowercase();
    if folders.iter().any(|f| f.to_lowercase() == wanted) {
        FolderLookup::Present
    } else {
        FolderLookup::Absent
    }
}

/// Look up the listing entry for `identity`: `Ok(Some(_))` found,
/// `Ok(None)` definitely absent, `Err(())` inconclusive.
async fn find_service<D>(
    directory: &D,
    base_url: &str,
    identity: &ServiceIdentity,
) -> Result<Option<ServiceEntry>, ()>
where
    D: ServiceDirectory + ?Sized,
{
    if let Some(folder) = identity.folder.as_deref() {
        match find_folder(directory, base_url, folder).await {
            FolderLookup::Present => {}
            FolderLookup::Absent => {
                debug!(folder, "[DIRECTORY] Folder not on server, so the service does not exist yet");
                return Ok(None);
            }
            FolderLookup::Unknown => return Err(()),
        }
    }
    let listing = list_services(directory, base_url, identity.folder.as_deref())
        .await
        .ok_or(())?;
    Ok(listing
        .services
        .into_iter()
        .find(|entry| identity.matches_path(&entry.name)))
}

/// Is `identity` published on the server at `base_url`?
///
/// Unknown base URL or an inconclusive answer reports `true`.
pub async fn service_exists_at<D>(
    directory: &D,
    base_url: Option<&str>,
    identity: &ServiceIdentity,
) -> bool
where
    D: ServiceDirectory + ?Sized,
{
    let Some(base_url) = base_url else {
        debug!(service = %identity, "[DIRECTORY] Server URL is undefined. Assume service exists");
        return true;
    };
    match find_service(directory, base_url, identity).await {
        Ok(found) => {
            debug!(service = %identity, exists = found.is_some(), "[DIRECTORY] Checked for service");
            found.is_some()
        }
        Err(()) => {
            warn!(service = %identity, "[DIRECTORY] Failed to check for service. Assume service exists");
            true
        }
    }
}

/// The server's type for `identity` (`MapServer`, `ImageServer`, …), or
/// `None` when it cannot be found.
pub async fn service_type_on_server<D>(
    directory: &D,
    base_url: &str,
    identity: &ServiceIdentity,
) -> Option<String>
where
    D: ServiceDirectory + ?Sized,
{
    match find_service(directory, base_url, identity).await {
        Ok(Some(entry)) => {
            debug!(service = %identity, service_type = %entry.service_type, "[DIRECTORY] Found service type");
            Some(entry.service_type)
        }
        Ok(None) => {
            info!(service = %identity, "[DIRECTORY] Service not found on server");
            None
        }
        Err(()) => None,
    }
}

/// Every service on the server as `(folder, name)` pairs. `None` if any
/// listing fails, since a partial list would look like deleted services.
pub async fn services_on_server<D>(
    directory: &D,
    base_url: &str,
) -> Option<Vec<(Option<String>, String)>>
where
    D: ServiceDirectory + ?Sized,
{
    let root = list_services(directory, base_url, None).await?;
    let mut services: Vec<(Option<String>, String)> = root
        .services
        .into_iter()
        .map(|entry| (None, entry.name))
        .collect();
    for folder in root.folders.unwrap_or_default() {
        let listing = list_services(directory, base_url, Some(&folder)).await?;
        services.extend(listing.services.into_iter().map(|entry| {
            // folder listings report `folder/name`
            let name = entry
                .name
                .rsplit('/')
                .next()
                .unwrap_or(entry.name.as_str())
                .to_string();
            (Some(folder.clone()), name)
        }));
    }
    info!(base_url, count = services.len(), "[DIRECTORY] Found services on server");
    Some(services)
}
