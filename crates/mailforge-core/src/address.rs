//! Best-effort email address extraction from header values.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

#[allow(clippy::expect_used, reason = "the pattern is a constant")]
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\b[a-z0-9._%+-]+@(?:(?:[a-z0-9-]+\.)+(?:xn--)?[a-z]{2,63}|localhost)\b")
        .case_insensitive(true)
        .build()
        .expect("address pattern is valid")
});

/// Extracts every address found in `value`, in order of appearance.
///
/// Display names, angle brackets and separators are ignored, so
/// `"Joe <joe@example.com>, ann@example.org"` yields both addresses.
#[must_use]
pub fn extract(value: &str) -> Vec<String> {
    EMAIL
        .find_iter(value)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extracts the addresses from several header values, dropping
/// case-insensitive duplicates and keeping the first occurrence.
#[must_use]
pub fn extract_unique<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for value in values {
        for address in extract(value) {
            if !found.iter().any(|f| f.eq_ignore_ascii_case(&address)) {
                found.push(address);
            }
        }
    }
    found
}

/// Returns everything after the first `@` of an address, or `localhost`
/// when there is nothing.
#[must_use]
pub fn domain_of(address: &str) -> &str {
    address
        .split_once('@')
        .map(|(_, domain)| domain.trim_end_matches('>').trim())
        .filter(|domain| !domain.is_empty())
        .unwrap_or("localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract() {
        assert_eq!(
            extract("Joe Schmoe <joe@example.com>, \"Ann\" <Ann.Lee+tag@mail.example.org>"),
            vec!["joe@example.com", "Ann.Lee+tag@mail.example.org"]
        );
        assert_eq!(extract("root@localhost"), vec!["root@localhost"]);
        assert!(extract("nobody").is_empty());
    }

    #[test]
    fn test_extract_unique() {
        let found = extract_unique(["a@x.com, b@x.com", "A@X.com", "c@x.com"]);
        assert_eq!(found, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("noreply@example.com"), "example.com");
        assert_eq!(domain_of("noreply"), "localhost");
        assert_eq!(domain_of("weird@"), "localhost");
        assert_eq!(domain_of("odd@relay@example.com"), "relay@example.com");
        assert_eq!(domain_of("Joe <joe@example.com>"), "example.com");
    }
}
