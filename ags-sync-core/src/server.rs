//! # server: where services are published and where the REST API lives
//!
//! A run targets either the portal configured in the desktop toolchain
//! ("My Hosted Services") or an ArcGIS Server described by an `*.ags`
//! connection file. The REST base URL used for liveness checks and deletes is
//! either given explicitly or scraped out of that connection file.
//!
//! The connection file is a binary blob. The only thing read from it is the
//! embedded server URL, found by decoding the bytes as UTF-16 and looking for
//! `http…/arcgis`. More than one distinct URL in the file is treated as
//! ambiguous and yields no URL at all.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Symbolic server specifier for the portal's hosted services.
pub const HOSTED_SERVICES: &str = "MY_HOSTED_SERVICES";

/// Connection name the upload tool expects for hosted services.
pub const HOSTED_SERVICES_CONNECTION: &str = "My Hosted Services";

const URL_START: &str = "http";
const URL_END: &str = "/arcgis";

/// Publishing target for the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServerTarget {
    #[default]
    HostedServices,
    ConnectionFile(PathBuf),
}

impl ServerTarget {
    /// `None` and the hosted marker mean hosted services; an existing path
    /// is a connection file; anything else falls back to hosted services
    /// with a warning.
    pub fn resolve(specifier: Option<&str>) -> Self {
        let Some(spec) = specifier else {
            return ServerTarget::HostedServices;
        };
        if spec == HOSTED_SERVICES {
            return ServerTarget::HostedServices;
        }
        let path = Path::new(spec);
        if path.exists() {
            debug!(connection_file = %path.display(), "Using server connection file");
            ServerTarget::ConnectionFile(path.to_path_buf())
        } else {
            warn!(
                server = spec,
                "Connection file not found. Using {HOSTED_SERVICES}."
            );
            ServerTarget::HostedServices
        }
    }

    /// The `server_type` argument for draft creation.
    pub fn server_type(&self) -> &'static str {
        match self {
            ServerTarget::HostedServices => HOSTED_SERVICES,
            ServerTarget::ConnectionFile(_) => "FROM_CONNECTION_FILE",
        }
    }

    pub fn connection_file(&self) -> Option<&Path> {
        match self {
            ServerTarget::HostedServices => None,
            ServerTarget::ConnectionFile(path) => Some(path),
        }
    }

    /// The server argument for the upload tool.
    pub fn connection(&self) -> String {
        match self {
            ServerTarget::HostedServices => HOSTED_SERVICES_CONNECTION.to_string(),
            ServerTarget::ConnectionFile(path) => path.display().to_string(),
        }
    }
}

/// Publishing target plus the REST base URL, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerReference {
    pub target: ServerTarget,
    pub url: Option<String>,
}

impl ServerReference {
    pub fn resolve(server: Option<&str>, server_url: Option<&str>) -> Self {
        let target = ServerTarget::resolve(server);
        let url = match server_url {
            Some(url) => Some(url.trim_end_matches('/').to_string()),
            None => match target.connection_file() {
                Some(path) => {
                    debug!("Server URL is undefined. Trying to get it from the connection file");
                    service_url_from_connection_file(path)
                }
                None => None,
            },
        };
        if url.is_none() {
            debug!("No server URL; liveness checks will assume services exist");
        }
        ServerReference { target, url }
    }
}

/// Read the connection file and extract its server URL.
pub fn service_url_from_connection_file(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => service_url_from_utf16(&bytes),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Unable to read connection file");
            None
        }
    }
}

/// Decode `bytes` as UTF-16 and return the single distinct `http…/arcgis`
/// URL embedded in it.
///
/// A byte order mark selects the endianness; without one the text is read
/// as little-endian. Unpaired surrogates decode to U+FFFD and a trailing odd
/// byte is ignored.
pub fn service_url_from_utf16(bytes: &[u8]) -> Option<String> {
    let text = decode_utf16(bytes);
    let mut found = BTreeSet::new();
    let mut start = 0;
    while let Some(offset) = text[start..].find(URL_START) {
        let url_start = start + offset;
        let Some(end_offset) = text[url_start..].find(URL_END) else {
            break;
        };
        let url_end = url_start + end_offset;
        found.insert(format!("{}{}", &text[url_start..url_end], URL_END));
        start = url_end;
    }
    if found.len() == 1 {
        found.into_iter().next()
    } else {
        if found.len() > 1 {
            warn!(urls = ?found, "Connection file holds more than one server URL");
        }
        None
    }
}

fn decode_utf16(bytes: &[u8]) -> String {
    let (body, big_endian) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        _ => (bytes, false),
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}
