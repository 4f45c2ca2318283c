//! Repository name helpers.
//!
//! Repository names are case-preserving but compared and keyed
//! case-insensitively. These helpers centralize that normalization.

use regex::RegexBuilder;
use std::cmp::Ordering;

/// Suffix carried by bare repository names.
pub const DOT_GIT: &str = ".git";

/// Prefix marking a personal namespace (`~alice/repo.git`).
pub const PERSONAL_PREFIX: char = '~';

/// Decodes a percent-escaped tilde (`%7E` / `%7e`) in a repository name.
///
/// Some clients escape the personal-namespace marker when building URLs.
pub fn decode_tilde(name: &str) -> String {
    name.replace("%7E", "~").replace("%7e", "~")
}

/// Returns the cache key for a repository name.
pub fn cache_key(name: &str) -> String {
    name.to_lowercase()
}

/// Returns the first path segment of a name, or `""` for root-level names.
pub fn first_path_element(name: &str) -> &str {
    match name.find('/') {
        Some(idx) => &name[..idx],
        None => "",
    }
}

/// Returns the last path segment of a name.
pub fn last_path_element(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Strips a trailing `.git` suffix, if present.
pub fn strip_dot_git(name: &str) -> &str {
    if name.to_lowercase().ends_with(DOT_GIT) {
        &name[..name.len() - DOT_GIT.len()]
    } else {
        name
    }
}

/// Returns the personal namespace path for a user (`~alice`).
pub fn personal_path(username: &str) -> String {
    format!("{}{}", PERSONAL_PREFIX, username.to_lowercase())
}

/// Extracts the username from a personal repository path.
///
/// Returns `None` when the path is not in a personal namespace.
pub fn username_from_personal_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(PERSONAL_PREFIX)?;
    let user = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    if user.is_empty() {
        None
    } else {
        Some(user)
    }
}

/// Compares two repository names case-insensitively, ignoring `.git`.
pub fn compare_repository_names(a: &str, b: &str) -> Ordering {
    let a = strip_dot_git(a).to_lowercase();
    let b = strip_dot_git(b).to_lowercase();
    a.cmp(&b)
}

/// Sorts repository names in place using [`compare_repository_names`].
pub fn sort_repository_names(names: &mut [String]) {
    names.sort_by(|a, b| compare_repository_names(a, b));
}

/// Tests whether `text` fully matches `pattern`, ignoring case.
///
/// Patterns are regular expressions anchored at both ends. A pattern that
/// does not compile falls back to a case-insensitive equality check.
pub fn matches_ignore_case(text: &str, pattern: &str) -> bool {
    match RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(text),
        Err(_) => text.eq_ignore_ascii_case(pattern),
    }
}

/// Parses a human size such as `500KB`, `1 MB` or `2g` into bytes.
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim().to_lowercase();
    let split = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.trim().parse().ok()?;
    let multiplier = match unit.trim() {
        "" | "b" => 1u64,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        _ => return None,
    };
    Some((number * multiplier as f64) as u64)
}

/// Formats a byte count for display (`1.5 MB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["b", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
