use crate::delivery::payload::InventoryMeta;
use crate::source::timestamp::UTC_STAMP_FORMAT;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// One exportable `<Character>-Inventory.txt` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryFile {
    pub character: String,
    pub file_name: String,
    pub path: PathBuf,
}

fn inventory_name_re() -> Regex {
    Regex::new(r"(?i)^(?P<char>.+)-Inventory\.txt$").unwrap()
}

/// Enumerates inventory files under the base directory, sorted by character.
/// An unset or unreadable directory yields an empty list.
pub fn list_inventory_files(base_dir: Option<&Path>) -> Vec<InventoryFile> {
    let Some(dir) = base_dir else {
        return Vec::new();
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "inventory directory listing failed");
            return Vec::new();
        }
    };

    let re = inventory_name_re();
    let mut files: Vec<InventoryFile> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let character = re.captures(&file_name)?["char"].to_string();
            Some(InventoryFile {
                character,
                file_name,
                path: entry.path(),
            })
        })
        .collect();

    files.sort_by(|a, b| a.character.cmp(&b.character));
    files
}

/// Reads a tab-separated inventory file into rows, blank lines dropped.
pub fn read_inventory_tsv(path: &Path) -> std::io::Result<Vec<Vec<String>>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| line.split('\t').map(|cell| cell.to_string()).collect())
        .collect())
}

/// File creation/modification times as canonical UTC stamps; empty when the
/// filesystem cannot provide them.
pub fn file_meta(file: &InventoryFile) -> InventoryMeta {
    let (created, modified) = match std::fs::metadata(&file.path) {
        Ok(meta) => (
            meta.created().ok().map(stamp_from_system_time),
            meta.modified().ok().map(stamp_from_system_time),
        ),
        Err(_) => (None, None),
    };

    InventoryMeta {
        file_name: file.file_name.clone(),
        created_iso: created.unwrap_or_default(),
        modified_iso: modified.unwrap_or_default(),
    }
}

fn stamp_from_system_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format(UTC_STAMP_FORMAT)
        .to_string()
}
