use crate::source::timestamp::normalize_to_utc;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Trailing byte range read for fast extraction.
pub const TAIL_WINDOW_BYTES: u64 = 1_000_000;

/// The most recent zone transition found in a log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEvent {
    pub label: String,
    /// Canonical UTC stamp, or empty when the matched line carried none.
    pub timestamp: String,
}

/// Extracts the last "You have entered <zone>" event from append-only logs.
///
/// Reads the tail window and scans backward; falls back to a full forward
/// streaming scan when the window yields nothing (the window may have landed
/// mid-record, or the file may have no qualifying event near its end). Both
/// paths share the same compiled patterns so they always agree.
pub struct TailExtractor {
    entered: Regex,
    plain: Regex,
    window_bytes: u64,
}

impl Default for TailExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TailExtractor {
    pub fn new() -> Self {
        Self::with_window(TAIL_WINDOW_BYTES)
    }

    pub fn with_window(window_bytes: u64) -> Self {
        // Patterns are fixed; compilation cannot fail.
        let entered =
            Regex::new(r"(?i)^\[(?P<ts>.+?)\]\s+You have entered\s+(?P<zone>.+?)\.?\s*$").unwrap();
        let plain = Regex::new(r"(?i)You have entered\s+(?P<zone>.+?)\.?\s*$").unwrap();

        Self {
            entered,
            plain,
            window_bytes,
        }
    }

    /// Returns the most recent matching event, or `None` when the file has no
    /// qualifying event or cannot be read. I/O failures are treated as
    /// "no event this cycle" and never propagate.
    pub fn extract_last(&self, path: &Path) -> Option<ZoneEvent> {
        match self.tail_lines(path) {
            Ok(lines) => {
                for line in lines.iter().rev() {
                    if let Some(event) = self.match_line(line) {
                        return Some(event);
                    }
                }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "tail read failed");
                return None;
            }
        }

        // Nothing near the tail; stream the whole file forward and keep the
        // last match seen.
        match self.full_scan_last(path) {
            Ok(event) => event,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "full scan failed");
                None
            }
        }
    }

    fn match_line(&self, line: &str) -> Option<ZoneEvent> {
        let line = line.trim();
        if let Some(caps) = self.entered.captures(line) {
            return Some(ZoneEvent {
                label: caps["zone"].trim().to_string(),
                timestamp: normalize_to_utc(caps["ts"].trim()),
            });
        }
        if let Some(caps) = self.plain.captures(line) {
            return Some(ZoneEvent {
                label: caps["zone"].trim().to_string(),
                timestamp: String::new(),
            });
        }
        None
    }

    fn tail_lines(&self, path: &Path) -> std::io::Result<Vec<String>> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let start = len.saturating_sub(self.window_bytes);
        file.seek(SeekFrom::Start(start))?;

        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf)?;

        let text = String::from_utf8_lossy(&buf);
        Ok(text.lines().map(|l| l.to_string()).collect())
    }

    fn full_scan_last(&self, path: &Path) -> std::io::Result<Option<ZoneEvent>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut last = None;
        for line in reader.lines() {
            // A line that fails to decode is skipped, not fatal.
            let Ok(line) = line else { continue };
            if let Some(event) = self.match_line(&line) {
                last = Some(event);
            }
        }
        Ok(last)
    }
}
