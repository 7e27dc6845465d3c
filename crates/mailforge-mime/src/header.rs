//! Ordered, case-insensitive header maps.

use crate::encoding::{decode_rfc2047, encode_rfc2047};
use std::borrow::Cow;
use std::fmt;

/// Line length past which header values are folded.
const FOLD_WIDTH: usize = 78;

/// Header name segments written fully upper-case on the wire.
const ACRONYMS: [&str; 4] = ["cc", "id", "spf", "mime"];

/// Formats a header name for output.
///
/// Each `-`-separated segment is title-cased, except for well-known
/// acronyms which are upper-cased (`message-id` becomes `Message-ID`).
#[must_use]
pub fn format_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let lower = segment.to_ascii_lowercase();
            if ACRONYMS.contains(&lower.as_str()) {
                return lower.to_ascii_uppercase();
            }
            let mut chars = lower.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Collection of email headers.
///
/// Lookups ignore case; names keep the casing they were inserted with and
/// entries keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a header, keeping any existing values with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets a header value.
    ///
    /// The first existing entry with the same name is replaced in place and
    /// any further duplicates are dropped; otherwise the header is appended.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => {
                self.entries[index] = (name.clone(), value);
                let mut seen = 0usize;
                self.entries.retain(|(n, _)| {
                    if n.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Inserts a header at the front unless one with that name exists.
    pub fn set_default_first(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.insert(0, (name, value.into()));
        }
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns true if a header with this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Overlays `other` on top of `self`: every header named in `other`
    /// replaces the values held here.
    pub fn merge(&mut self, other: &Self) {
        for (name, value) in &other.entries {
            self.set(name.clone(), value.clone());
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over all headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Parses a header block.
    ///
    /// Folded continuation lines are joined with a single space and
    /// RFC 2047 encoded-words are decoded. Parsing stops at the first empty
    /// line; lines without a colon are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, decode_rfc2047(value.trim()));
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, decode_rfc2047(value.trim()));
        }

        headers
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    /// Writes the headers in wire form with formatted names and non-ASCII
    /// words as encoded-words. Line breaks inside a value become spaces and
    /// long values are folded at spaces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            let name = format_name(name);
            let value = encode_rfc2047(&single_line(value));
            write!(f, "{name}:")?;
            let mut width = name.len() + 1;
            for word in value.split(' ') {
                if width > name.len() + 1 && !word.is_empty() && width + 1 + word.len() > FOLD_WIDTH {
                    f.write_str("\n")?;
                    width = 0;
                }
                write!(f, " {word}")?;
                width += 1 + word.len();
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// Joins the lines of `value` with single spaces.
fn single_line(value: &str) -> Cow<'_, str> {
    if !value.contains(['\r', '\n']) {
        return Cow::Borrowed(value);
    }
    let lines: Vec<&str> = value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    Cow::Owned(lines.join(" "))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_format_name() {
        assert_eq!(format_name("message-id"), "Message-ID");
        assert_eq!(format_name("MIME-VERSION"), "MIME-Version");
        assert_eq!(format_name("cc"), "CC");
        assert_eq!(format_name("received-spf"), "Received-SPF");
        assert_eq!(format_name("x-custom-header"), "X-Custom-Header");
        assert_eq!(format_name("content-transfer-encoding"), "Content-Transfer-Encoding");
    }

    #[test]
    fn test_case_insensitive_lookup_keeps_casing() {
        let mut headers = Headers::new();
        headers.set("X-Thing", "one");
        assert_eq!(headers.get("x-thing"), Some("one"));
        headers.set("x-THING", "two");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.iter().next(), Some(("x-THING", "two")));
    }

    #[test]
    fn test_set_keeps_position() {
        let mut headers: Headers = [("To", "a@x"), ("Subject", "hi"), ("Date", "now")]
            .into_iter()
            .collect();
        headers.add("subject", "again");
        headers.set("SUBJECT", "final");
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["To", "SUBJECT", "Date"]);
    }

    #[test]
    fn test_merge_overrides() {
        let mut template: Headers = [("To", "t@x"), ("Cc", "c@x")].into_iter().collect();
        let caller: Headers = [("to", "caller@x")].into_iter().collect();
        template.merge(&caller);
        assert_eq!(template.get("TO"), Some("caller@x"));
        assert_eq!(template.get("cc"), Some("c@x"));
    }

    #[test]
    fn test_parse_folded() {
        let headers = Headers::parse("Subject: a\n  folded\nTo: b@x\n\nbody: no\n");
        assert_eq!(headers.get("subject"), Some("a folded"));
        assert_eq!(headers.get("to"), Some("b@x"));
        assert!(!headers.contains("body"));
    }

    #[test]
    fn test_display_wire_form() {
        let headers: Headers = [("message-id", "<1@x>"), ("subject", "Grüße")]
            .into_iter()
            .collect();
        let text = headers.to_string();
        assert!(text.starts_with("Message-ID: <1@x>\n"));
        assert!(text.contains("Subject: =?utf-8?B?"));
        assert_eq!(Headers::parse(&text).get("subject"), Some("Grüße"));
    }

    #[test]
    fn test_display_keeps_mailbox_address() {
        let headers: Headers = [("from", "Jörg Müller <jorg@example.com>")].into_iter().collect();
        let text = headers.to_string();
        assert!(text.starts_with("From: =?utf-8?B?"));
        assert!(text.ends_with("?= <jorg@example.com>\n"));
        assert_eq!(Headers::parse(&text).get("from"), Some("Jörg Müller <jorg@example.com>"));
    }

    #[test]
    fn test_display_folds_long_values() {
        let subject = "é".repeat(600);
        let topic = ["word"; 40].join(" ");
        let headers: Headers = [("subject", subject.as_str()), ("x-topic", topic.as_str())]
            .into_iter()
            .collect();
        let text = headers.to_string();
        assert!(text.lines().count() > 2);
        for line in text.lines() {
            assert!(line.len() <= FOLD_WIDTH, "line too long: {line}");
        }
        let parsed = Headers::parse(&text);
        assert_eq!(parsed.get("subject"), Some(subject.as_str()));
        assert_eq!(parsed.get("x-topic"), Some(topic.as_str()));
    }

    #[test]
    fn test_display_joins_value_lines() {
        let headers: Headers = [("subject", "Hello\nWorld\n"), ("x-note", "a\r\n\r\n  b")]
            .into_iter()
            .collect();
        let text = headers.to_string();
        assert_eq!(text, "Subject: Hello World\nX-Note: a b\n");
        for line in text.lines() {
            assert!(line.contains(':') || line.starts_with(' '));
        }
    }

    proptest! {
        #[test]
        fn lookup_ignores_case(name in "[A-Za-z][A-Za-z-]{0,20}", value in "[ -~]{0,40}") {
            let mut headers = Headers::new();
            headers.set(name.clone(), value.clone());
            prop_assert_eq!(headers.get(&name.to_uppercase()), Some(value.as_str()));
            prop_assert_eq!(headers.get(&name.to_lowercase()), Some(value.as_str()));
        }
    }
}
