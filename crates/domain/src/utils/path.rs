//! Destination path derivation
//!
//! Mirrored data lands in the destination object store under a prefix
//! derived deterministically from the owning organization, provider, and
//! user. Item names are sanitized before being appended so provider-side
//! names can never escape the prefix.

use crate::types::connection::Provider;

/// Normalize a path fragment: strip leading/trailing separators and
/// collapse empty segments. Empty or missing input normalizes to `None`.
#[must_use]
pub fn normalize_prefix(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    let cleaned: Vec<&str> =
        raw.split('/').map(str::trim).filter(|segment| !segment.is_empty()).collect();
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.join("/"))
}

/// Destination key prefix for one connection.
///
/// Identical `{org_id, provider, user_id}` always yields the identical
/// prefix; the optional override is normalized and prepended.
#[must_use]
pub fn destination_prefix(
    org_id: &str,
    provider: Provider,
    user_id: &str,
    override_prefix: Option<&str>,
) -> String {
    let base = format!("{org_id}/{}/{user_id}", provider.as_str());
    match normalize_prefix(override_prefix) {
        Some(prefix) => format!("{prefix}/{base}"),
        None => base,
    }
}

/// Sanitize a provider-supplied item name into a single path segment.
///
/// Separators and control characters are replaced so the name cannot
/// traverse outside the connection's prefix. Empty names fall back to a
/// placeholder.
#[must_use]
pub fn sanitize_item_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim_matches('.').trim();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_separators() {
        assert_eq!(normalize_prefix(Some("/a/b/")), Some("a/b".to_string()));
        assert_eq!(normalize_prefix(Some("a/b")), Some("a/b".to_string()));
        assert_eq!(normalize_prefix(Some("//a//b//")), Some("a/b".to_string()));
    }

    #[test]
    fn normalize_empty_inputs() {
        assert_eq!(normalize_prefix(Some("")), None);
        assert_eq!(normalize_prefix(Some("   ")), None);
        assert_eq!(normalize_prefix(Some("///")), None);
        assert_eq!(normalize_prefix(None), None);
    }

    #[test]
    fn prefix_is_deterministic() {
        let a = destination_prefix("org-1", Provider::GoogleDrive, "user-1", None);
        let b = destination_prefix("org-1", Provider::GoogleDrive, "user-1", None);
        assert_eq!(a, b);
        assert_eq!(a, "org-1/google_drive/user-1");
    }

    #[test]
    fn override_prefix_is_normalized_and_prepended() {
        let key = destination_prefix("org-1", Provider::Dropbox, "u", Some("/mirror/"));
        assert_eq!(key, "mirror/org-1/dropbox/u");
    }

    #[test]
    fn item_names_cannot_traverse() {
        assert_eq!(sanitize_item_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_item_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_item_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_item_name("  "), "unnamed");
        assert_eq!(sanitize_item_name(""), "unnamed");
    }
}
