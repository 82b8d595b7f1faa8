//! Publishing history and service list tables.
//!
//! Both are CSV files with a header row and at least three text columns:
//! `source_path, service_folder, service_name`. Empty cells are read as
//! absent. A file that does not fit this shape is rejected as a whole.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{PublishError, Result};

const HEADER: [&str; 3] = ["source_path", "service_folder", "service_name"];

/// A previously published service, optionally with the source it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryRecord {
    /// `None` when the record was seeded from the server.
    pub source_path: Option<PathBuf>,
    pub service_folder: Option<String>,
    pub service_name: String,
}

impl HistoryRecord {
    pub fn from_server(folder: Option<String>, name: String) -> Self {
        HistoryRecord {
            source_path: None,
            service_folder: folder,
            service_name: name,
        }
    }
}

fn cell(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_table(path: &Path) -> std::result::Result<Vec<HistoryRecord>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| e.to_string())?;
    let header_len = reader.headers().map_err(|e| e.to_string())?.len();
    if header_len < 3 {
        return Err(format!("header has {header_len} columns, expected at least 3"));
    }
    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| e.to_string())?;
        let line = index + 2;
        if row.len() < 3 {
            return Err(format!("row {line} has {} columns, expected at least 3", row.len()));
        }
        let service_name =
            cell(row.get(2)).ok_or_else(|| format!("row {line} has no service name"))?;
        records.push(HistoryRecord {
            source_path: cell(row.get(0)).map(PathBuf::from),
            service_folder: cell(row.get(1)),
            service_name,
        });
    }
    Ok(records)
}

/// Read a history or service list table. `None` (with a warning) when the
/// file cannot be read or is malformed.
pub fn read_table(path: &Path) -> Option<Vec<HistoryRecord>> {
    match parse_table(path) {
        Ok(records) => {
            debug!(path = %path.display(), records = records.len(), "[HISTORY] Read table");
            Some(records)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unable to parse the file");
            None
        }
    }
}

/// Write `records` as a history table, replacing the file.
pub fn write_table(path: &Path, records: &[HistoryRecord]) -> Result<()> {
    let to_io = |e: csv::Error| {
        PublishError::io(path, std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    };
    let mut writer = csv::Writer::from_path(path).map_err(to_io)?;
    writer.write_record(HEADER).map_err(to_io)?;
    for record in records {
        let source = record
            .source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        writer
            .write_record([
                source.as_str(),
                record.service_folder.as_deref().unwrap_or(""),
                record.service_name.as_str(),
            ])
            .map_err(to_io)?;
    }
    writer.flush().map_err(|e| PublishError::io(path, e))?;
    info!(path = %path.display(), records = records.len(), "[HISTORY] Wrote history file");
    Ok(())
}
