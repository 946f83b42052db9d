//! Filesystem-safe names derived from connection names.

use regex::Regex;

/// Longest slug we let into a file name, in bytes. Most filesystems cap
/// components at 255 and the timestamp and extension still need room.
const MAX_SLUG_LEN: usize = 200;

/// Turns a free-form connection name into a slug usable in paths.
///
/// Lowercases the name, collapses every run of characters outside `[a-z0-9]`
/// into a single `_`, trims `_` from both ends and caps the result at
/// [`MAX_SLUG_LEN`] bytes. Names with nothing usable in them become `backup`.
pub fn sanitize_connection_name(name: &str) -> String {
    let re = Regex::new(r"[^a-z0-9]+").unwrap();
    let lowered = name.to_lowercase();
    let slug = re.replace_all(&lowered, "_");
    let mut slug = slug.trim_matches('_').to_string();

    if slug.len() > MAX_SLUG_LEN {
        // The alphabet is ASCII by construction, so byte truncation is safe.
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('_').to_string();
    }

    if slug.is_empty() {
        return "backup".to_string();
    }
    slug
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_joins_words() {
        assert_eq!(sanitize_connection_name("Orders DB"), "orders_db");
    }

    #[test]
    fn test_collapses_symbol_runs_into_one_separator() {
        assert_eq!(
            sanitize_connection_name("prod / eu-west (replica #2)"),
            "prod_eu_west_replica_2"
        );
    }

    #[test]
    fn test_trims_separators_from_both_ends() {
        assert_eq!(sanitize_connection_name("  staging!  "), "staging");
    }

    #[test]
    fn test_unusable_name_falls_back() {
        assert_eq!(sanitize_connection_name("???"), "backup");
        assert_eq!(sanitize_connection_name(""), "backup");
    }

    #[test]
    fn test_caps_length_at_limit() {
        let long = "a".repeat(400);
        let slug = sanitize_connection_name(&long);
        assert_eq!(slug.len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_non_ascii_names_become_separators() {
        assert_eq!(sanitize_connection_name("café du commerce"), "caf_du_commerce");
    }
}
