//! Address extraction
//!
//! Addresses are matched permissively (`local@domain.tld`) anywhere in a
//! header value and lower-cased. Display names, comments and anything that
//! does not look like an address are dropped.

use once_cell::sync::Lazy;
use regex::Regex;

static ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.+-]+@[\w.-]+\.\w+").expect("address regex"));

/// Every address found in `text`, lower-cased, in order of appearance.
pub fn extract_addresses(text: &str) -> Vec<String> {
    ADDRESS
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Key used to deduplicate senders: the first address in `raw`, or the
/// trimmed, lower-cased input when nothing matches.
pub fn normalize_address(raw: &str) -> String {
    ADDRESS
        .find(raw)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| raw.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_display_names() {
        assert_eq!(
            extract_addresses("\"Lee, Ann\" <Ann.Lee@Example.COM>, bob+news@mail.x.org"),
            vec!["ann.lee@example.com", "bob+news@mail.x.org"]
        );
    }

    #[test]
    fn test_non_addresses_dropped() {
        assert!(extract_addresses("undisclosed-recipients:;").is_empty());
        assert!(extract_addresses("someone@localhost").is_empty());
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("Alice <A@X.com>"), "a@x.com");
        assert_eq!(normalize_address("  Mailer Daemon "), "mailer daemon");
    }
}
