use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One monitored log file, identified by the name segment embedded in the
/// `eqlog_<id>_<server>.txt` naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub file_name: String,
    pub path: PathBuf,
}

fn log_name_re() -> Regex {
    Regex::new(r"(?i)^eqlog_(?P<id>.+?)_.*\.txt$").unwrap()
}

/// Extracts the source identifier from a log file name, or `None` when the
/// name does not follow the convention.
pub fn source_id_from_file_name(file_name: &str) -> Option<String> {
    log_name_re()
        .captures(file_name)
        .map(|caps| caps["id"].to_string())
}

/// Returns true when the path names a file following the log convention.
pub fn is_log_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| log_name_re().is_match(n))
        .unwrap_or(false)
}

/// Enumerates monitored files in a directory. Files not matching the naming
/// convention are ignored; the result is sorted by file name so processing
/// order is stable across runs. A failed listing yields an empty catalog.
pub fn list_sources(dir: &Path) -> Vec<Source> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "log directory listing failed");
            return Vec::new();
        }
    };

    let mut sources: Vec<Source> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let id = source_id_from_file_name(&file_name)?;
            Some(Source {
                id,
                file_name,
                path: entry.path(),
            })
        })
        .collect();

    sources.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    sources
}
