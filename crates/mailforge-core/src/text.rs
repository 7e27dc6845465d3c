//! Plain-text helpers: HTML conversion, ASCII reduction, subject cleanup.

use std::sync::LazyLock;

use regex::Regex;

/// Marker for characters with no ASCII rendering.
const UNKNOWN: &str = "?";

#[allow(clippy::expect_used, reason = "the pattern is a constant")]
static CID_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(cid:[^)]*\)").expect("image pattern is valid"));

#[allow(clippy::expect_used, reason = "the pattern is a constant")]
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Returns the closest ASCII rendering of a non-ASCII character.
fn transliterate(c: char) -> Option<&'static str> {
    let ascii = match c {
        '\u{a0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' => " ",
        '\u{a9}' => "(C)",
        '\u{ae}' => "(R)",
        '\u{2122}' => "<TM>",
        '\u{ab}' => "<<",
        '\u{bb}' => ">>",
        '\u{b7}' | '\u{2022}' => "*",
        '\u{d7}' => "x",
        '\u{f7}' => "/",
        '\u{b1}' => "+/-",
        '\u{bc}' => "1/4",
        '\u{bd}' => "1/2",
        '\u{be}' => "3/4",
        '\u{c0}'..='\u{c5}' => "A",
        '\u{c6}' => "AE",
        '\u{c7}' => "C",
        '\u{c8}'..='\u{cb}' => "E",
        '\u{cc}'..='\u{cf}' => "I",
        '\u{d1}' => "N",
        '\u{d2}'..='\u{d6}' | '\u{d8}' => "O",
        '\u{d9}'..='\u{dc}' => "U",
        '\u{dd}' | '\u{178}' => "Y",
        '\u{df}' => "ss",
        '\u{e0}'..='\u{e5}' => "a",
        '\u{e6}' => "ae",
        '\u{e7}' => "c",
        '\u{e8}'..='\u{eb}' => "e",
        '\u{ec}'..='\u{ef}' => "i",
        '\u{f1}' => "n",
        '\u{f2}'..='\u{f6}' | '\u{f8}' => "o",
        '\u{f9}'..='\u{fc}' => "u",
        '\u{fd}' | '\u{ff}' => "y",
        '\u{152}' => "OE",
        '\u{153}' => "oe",
        '\u{160}' => "S",
        '\u{161}' => "s",
        '\u{2c6}' => "^",
        '\u{2dc}' => "~",
        '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}' | '\u{203e}' | '\u{2212}' => "-",
        '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => "'",
        '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{2033}' => "\"",
        '\u{2026}' => "...",
        '\u{2030}' => "0/00",
        '\u{2039}' => "<",
        '\u{203a}' => ">",
        '\u{20ac}' => "<euro>",
        '\u{2190}' => "<-",
        '\u{2192}' | '\u{21ac}' | '\u{21e2}' | '\u{21aa}' | '\u{21fe}' => "->",
        '\u{2194}' => "<->",
        '\u{21d0}' | '\u{21e6}' => "<=",
        '\u{21d2}' | '\u{21c9}' | '\u{21e8}' | '\u{21f6}' => "=>",
        '\u{21d4}' => "<=>",
        '\u{21e5}' => "->|",
        '\u{21a6}' => "|->",
        '\u{21a0}' => "->>",
        '\u{219d}' => "~>",
        '\u{2248}' => "~=",
        '\u{2260}' => "!=",
        '\u{2264}' => "<=",
        '\u{2265}' => ">=",
        '\u{221e}' => "<infinity>",
        _ => return None,
    };
    Some(ascii)
}

/// Replaces every non-ASCII character with its closest ASCII rendering, or
/// `?` when there is none.
#[must_use]
pub fn reduce_to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(transliterate(c).unwrap_or(UNKNOWN));
        }
    }
    out
}

/// Rewrites Markdown image references to `cid:` targets as `[label]`.
#[must_use]
pub fn strip_cid_images(text: &str) -> String {
    CID_IMAGE.replace_all(text, "[$1]").into_owned()
}

/// Converts HTML to readable plain text.
///
/// The result is Markdown-flavoured, with embedded images reduced to
/// `[label]`, reduced to ASCII, trimmed, and newline-terminated.
///
/// # Errors
///
/// Returns an error if the converter fails to read the markup.
pub fn html_to_text(html: &str) -> std::io::Result<String> {
    let markdown = htmd::convert(html)?;
    let text = reduce_to_ascii(&strip_cid_images(&markdown));
    Ok(format!("{}\n", text.trim()))
}

/// Maps subject annotation text to ASCII: non-breaking spaces become
/// spaces, em-dashes become `--`, anything else non-ASCII becomes `?`.
#[must_use]
pub fn subject_to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            c if c.is_ascii() => out.push(c),
            '\u{a0}' => out.push(' '),
            '\u{2014}' => out.push_str("--"),
            _ => out.push_str(UNKNOWN),
        }
    }
    out
}

/// Normalizes a subject line.
///
/// Whitespace runs collapse to one space, characters outside printable
/// ASCII are dropped, and the result is trimmed. When both `max_length` and
/// `snip` are set and the subject is longer than `max_length`, it is cut so
/// that the cut text plus `snip` is exactly `max_length` characters long.
#[must_use]
pub fn clean_subject(subject: &str, max_length: Option<usize>, snip: Option<&str>) -> String {
    let collapsed = WHITESPACE.replace_all(subject, " ");
    let printable: String = collapsed.chars().filter(|c| matches!(c, ' '..='~')).collect();
    let cleaned = reduce_to_ascii(printable.trim());

    match (max_length, snip) {
        (Some(max), Some(snip)) if cleaned.len() > max => {
            let keep = max.saturating_sub(snip.len());
            format!("{}{snip}", &cleaned[..keep])
        }
        _ => cleaned,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reduce_to_ascii() {
        assert_eq!(reduce_to_ascii("Caf\u{e9} \u{21d2} \u{2603}"), "Cafe => ?");
        assert_eq!(reduce_to_ascii("\u{a9} 2024 \u{2014} \u{201c}q\u{201d}"), "(C) 2024 - \"q\"");
    }

    #[test]
    fn test_strip_cid_images() {
        assert_eq!(
            strip_cid_images("Hi ![smiley](cid:smiley.png) and ![](cid:x)"),
            "Hi [smiley] and []"
        );
        assert_eq!(strip_cid_images("![logo](http://x/logo.png)"), "![logo](http://x/logo.png)");
    }

    #[test]
    fn test_html_to_text() {
        let text = html_to_text("<html><body><p>Hello <b>there</b>.</p></body></html>").unwrap();
        assert!(text.contains("Hello"));
        assert!(text.contains("there"));
        assert!(text.ends_with('\n'));
        assert!(!text.starts_with(char::is_whitespace));
    }

    #[test]
    fn test_subject_to_ascii() {
        assert_eq!(subject_to_ascii("This\u{a0}& That \u{2014} More \u{2603}"), "This & That -- More ?");
    }

    #[test]
    fn test_clean_subject_truncates_with_snip() {
        let raw = "This is a test of capping the subject length";
        assert_eq!(clean_subject(raw, Some(20), Some("[...]")), "This is a test [...]");
        assert_eq!(clean_subject(raw, Some(10), Some("[...]")), "This [...]");
        assert_eq!(
            clean_subject(raw, Some(20), Some("[...snip...]")),
            "This is [...snip...]"
        );
    }

    #[test]
    fn test_clean_subject_without_limits() {
        let raw = "  multi\n   line\tsubject  ";
        assert_eq!(clean_subject(raw, None, Some("[...]")), "multi line subject");
        assert_eq!(clean_subject(raw, Some(5), None), "multi line subject");
    }

    #[test]
    fn test_clean_subject_drops_non_ascii() {
        assert_eq!(clean_subject("Caf\u{e9}\u{1f600}!", Some(512), Some("[...]")), "Caf!");
    }

    proptest! {
        #[test]
        fn subject_fits_length(subject in "\\PC{0,120}", max in 5usize..80) {
            let cleaned = clean_subject(&subject, Some(max), Some("[...]"));
            prop_assert!(cleaned.len() <= max);
            prop_assert!(cleaned.chars().all(|c| matches!(c, ' '..='~')));
        }
    }
}
