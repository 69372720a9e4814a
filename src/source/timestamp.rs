use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Canonical wire format for all timestamps.
pub const UTC_STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Formats seen in the wild, tried in order. EQ log lines use the
// ctime-style "Wed Jan 01 10:00:00 2024" form.
const NAIVE_FORMATS: &[&str] = &[
    "%a %b %d %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Normalize arbitrary timestamp text into a canonical `YYYY-MM-DD HH:MM:SS`
/// UTC string. A single pair of surrounding brackets is stripped before
/// parsing. Unparsable input yields an empty string, never an error:
/// downstream treats empty as "timestamp unknown".
///
/// Naive (zone-less) inputs are taken as UTC.
pub fn normalize_to_utc(input: &str) -> String {
    let trimmed = strip_brackets(input.trim());
    if trimmed.is_empty() {
        return String::new();
    }

    parse_any(trimmed)
        .map(|dt| dt.format(UTC_STAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// Current wall-clock time in the canonical format.
pub fn now_utc_stamp() -> String {
    Utc::now().format(UTC_STAMP_FORMAT).to_string()
}

fn strip_brackets(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('[') && s.ends_with(']') {
        s[1..s.len() - 1].trim()
    } else {
        s
    }
}

fn parse_any(value: &str) -> Option<DateTime<Utc>> {
    // Zone-aware forms first so offsets are honored.
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    None
}
