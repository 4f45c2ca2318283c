//! Per-repository grant maps shared by users and teams.

use cairn_types::{cache_key, matches_ignore_case, AccessPermission};
use std::collections::BTreeMap;

/// Characters that may appear in a plain repository name.
fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '~' | ' ')
}

/// Whether a grant key is a name pattern rather than a repository name.
///
/// A pattern carries at least one character a repository name cannot.
pub fn is_name_pattern(key: &str) -> bool {
    key.chars().any(|c| !is_name_char(c))
}

/// Normalizes a grant key. Plain names are lowercased; patterns are kept
/// verbatim since case changes their meaning.
pub(crate) fn grant_key(name: &str) -> String {
    if is_name_pattern(name) {
        name.to_string()
    } else {
        cache_key(name)
    }
}

/// Grant recorded for exactly `repository`.
pub(crate) fn explicit_grant(
    grants: &BTreeMap<String, AccessPermission>,
    repository: &str,
) -> Option<AccessPermission> {
    grants.get(&cache_key(repository)).copied()
}

/// Pattern grants matching `repository`, with their pattern.
pub(crate) fn pattern_grants<'a>(
    grants: &'a BTreeMap<String, AccessPermission>,
    repository: &'a str,
) -> impl Iterator<Item = (&'a str, AccessPermission)> + 'a {
    grants
        .iter()
        .filter(|(key, _)| is_name_pattern(key))
        .filter(move |(key, _)| matches_ignore_case(repository, key))
        .map(|(key, permission)| (key.as_str(), *permission))
}

/// Sets or clears a grant. Granting `None` removes it.
pub(crate) fn set_grant(
    grants: &mut BTreeMap<String, AccessPermission>,
    name: &str,
    permission: AccessPermission,
) {
    let key = grant_key(name);
    if permission == AccessPermission::None {
        grants.remove(&key);
    } else {
        grants.insert(key, permission);
    }
}

/// Moves a plain-name grant from `old` to `new`. Returns true if one moved.
pub(crate) fn rename_grant(
    grants: &mut BTreeMap<String, AccessPermission>,
    old: &str,
    new: &str,
) -> bool {
    match grants.remove(&cache_key(old)) {
        Some(permission) => {
            grants.insert(cache_key(new), permission);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_detection() {
        assert!(!is_name_pattern("proj/a.git"));
        assert!(!is_name_pattern("~alice/my repo.git"));
        assert!(is_name_pattern("proj/.*"));
        assert!(is_name_pattern("[a-z]+\\.git"));
    }

    #[test]
    fn test_grant_keys() {
        let mut grants = BTreeMap::new();
        set_grant(&mut grants, "Proj/A.git", AccessPermission::Push);
        set_grant(&mut grants, "Proj/.*", AccessPermission::Clone);

        assert_eq!(explicit_grant(&grants, "proj/a.GIT"), Some(AccessPermission::Push));
        let matched: Vec<_> = pattern_grants(&grants, "proj/b.git").collect();
        assert_eq!(matched, vec![("Proj/.*", AccessPermission::Clone)]);

        assert!(rename_grant(&mut grants, "PROJ/a.git", "proj/b.git"));
        assert_eq!(explicit_grant(&grants, "proj/b.git"), Some(AccessPermission::Push));
        assert!(explicit_grant(&grants, "proj/a.git").is_none());

        set_grant(&mut grants, "proj/b.git", AccessPermission::None);
        assert!(explicit_grant(&grants, "proj/b.git").is_none());
    }
}
