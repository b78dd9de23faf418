use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use url::Url;

use crate::domain::CandidateUrl;

/// Container extensions accepted as playable video without probing.
pub const VIDEO_EXTENSIONS: [&str; 8] = [
    ".mp4", ".webm", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".m4v",
];

/// Fallback separators tried when the whole-text scan finds nothing usable.
const SEPARATORS: [char; 9] = [' ', '\n', '\t', ',', ';', '，', '。', '！', '？'];

const URL_PATTERN: &str = r"(?i)https?://(?:[a-z0-9$-_@.&+!*(),]|%[0-9a-f]{2})+";

/// Get current Unix timestamp in seconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// First URL in `text` that parses with a host and is not truncated.
fn scan_for_url(text: &str) -> Option<CandidateUrl> {
    let re = Regex::new(URL_PATTERN).ok()?;
    let found = re.find_iter(text).find_map(|m| {
        let candidate = m.as_str();
        // `…` never matches the URL charset, so check what follows the match too.
        let truncated = candidate.ends_with("...")
            || candidate.ends_with('…')
            || text[m.end()..].starts_with('…');
        if truncated {
            return None;
        }
        CandidateUrl::parse(candidate)
    });
    found
}

/// Locate the first usable link in free-form text such as a share message.
pub fn extract_url(text: &str) -> Option<CandidateUrl> {
    if text.is_empty() {
        return None;
    }

    if let Some(url) = scan_for_url(text) {
        return Some(url);
    }

    SEPARATORS.iter().find_map(|sep| {
        text.split(*sep)
            .find_map(|part| scan_for_url(part.trim()))
    })
}

/// True when the URL path ends in a known video container extension.
pub fn has_video_extension(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// True when a `Content-Type` value names video or one of the container tokens.
pub fn is_video_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_lowercase();
    content_type.contains("video")
        || VIDEO_EXTENSIONS
            .iter()
            .any(|ext| content_type.contains(ext.trim_start_matches('.')))
}

/// File name for a download: the last path segment, or `video_<ts>.mp4`
/// when the path has no usable name with an extension.
pub fn file_name_from_url(url: &str) -> String {
    let name = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments()?.last().map(str::to_string))
        .map(|segment| sanitize_filename(&segment))
        .unwrap_or_default();

    if name.is_empty() || !name.contains('.') {
        format!("video_{}.mp4", get_timestamp())
    } else {
        name
    }
}

/// Format a byte count using 1024 scaling and two decimals.
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, UNITS[unit])
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1024.0 * 1024.0 {
        format!("{:.1} MB/s", bytes_per_sec / (1024.0 * 1024.0))
    } else if bytes_per_sec >= 1024.0 {
        format!("{:.1} KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.1} B/s", bytes_per_sec)
    }
}

/// Remaining time as `m:ss`, or `h:mm:ss` past the hour. Rounds up so the
/// last second still reads `0:01`.
pub fn format_eta(remaining: Duration) -> String {
    let total = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
