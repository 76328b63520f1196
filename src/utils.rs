pub const INTERNAL_URL_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "chrome-search://",
    "edge://",
    "extension://",
    "about:",
    "moz-extension://",
    "view-source:",
    "devtools://",
    "brave://",
    "opera://",
    "vivaldi://",
];

/// Checks whether a tab address is something worth turning into a QR code:
/// non-empty and not one of the browser's own pages.
pub fn is_usable_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    !INTERNAL_URL_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Case-insensitive substring match.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
