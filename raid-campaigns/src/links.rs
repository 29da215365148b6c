use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref STATUS_LINK: Regex = Regex::new(
        r"^(?i:(?:https?://)?(?:www\.|mobile\.)?(?:twitter|x)\.com)/([A-Za-z0-9_]{1,15})/(?i:status(?:es)?)/([0-9]+)(?:[/?#]\S*)?$"
    )
    .expect("Invalid status link regex");
    static ref HANDLE: Regex = Regex::new(r"^@?([A-Za-z0-9_]{1,15})$").expect("Invalid handle regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLink {
    pub username: String,
    pub status_id: String,
}

pub fn parse_status_link(link: &str) -> Option<StatusLink> {
    let captures = STATUS_LINK.captures(link.trim())?;
    Some(StatusLink {
        username: captures[1].to_string(),
        status_id: captures[2].to_string(),
    })
}

pub fn extract_status_id(link: &str) -> Option<String> {
    parse_status_link(link).map(|link| link.status_id)
}

pub fn extract_username(link: &str) -> Option<String> {
    parse_status_link(link).map(|link| link.username)
}

/// Validates an X handle and returns it without the `@`.
pub fn parse_handle(handle: &str) -> Option<String> {
    HANDLE
        .captures(handle.trim())
        .map(|captures| captures[1].to_string())
}

/// Handles are case-insensitive and may be written with or without `@`.
pub fn normalize_handle(handle: &str) -> String {
    let handle = handle.trim();
    handle
        .strip_prefix('@')
        .unwrap_or(handle)
        .to_lowercase()
}

/// Splits a comma-separated list, dropping empty entries.
pub fn collect_words(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_string())
        .collect()
}
