//! Canonical forms of MIME trees for semantic comparison.
//!
//! Boundaries, transfer encodings and header order are incidental to the
//! meaning of a message; these helpers strip them so two trees can be
//! compared by headers, shape, and decoded content separately.

use std::collections::BTreeMap;
use std::fmt;

use crate::header::format_name;
use crate::part::Part;

/// Headers ignored by [`canonical_headers`] unless the caller says otherwise.
pub const DEFAULT_IGNORED_HEADERS: [&str; 1] = ["content-transfer-encoding"];

/// Renders the headers of `part` in a canonical, sorted form.
///
/// Names are compared case-insensitively, repeated headers are joined with
/// `"; "` after sorting, and the `boundary` parameter is dropped from the
/// content type. Headers listed in `ignore` are omitted.
#[must_use]
pub fn canonical_headers(part: &Part, ignore: &[&str]) -> String {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in part.headers.iter() {
        let key = name.to_ascii_lowercase();
        if ignore.iter().any(|i| i.eq_ignore_ascii_case(&key)) {
            continue;
        }
        let value = if key == "content-type" {
            let mut content_type = part.content_type();
            content_type.remove_parameter("boundary");
            content_type.to_string()
        } else {
            value.to_string()
        };
        grouped.entry(key).or_default().push(value);
    }

    let mut out = String::new();
    for (key, mut values) in grouped {
        values.sort();
        out.push_str(&format_name(&key));
        out.push_str(": ");
        out.push_str(&values.join("; "));
        out.push('\n');
    }
    out
}

/// Renders the content-type tree of `part`.
///
/// ```text
/// multipart/alternative
/// |-- text/plain
/// `-- multipart/related
///     |-- text/html
///     `-- image/png
/// ```
#[must_use]
pub fn canonical_structure(part: &Part) -> String {
    let mut out = part.content_type().mime_type();
    out.push('\n');
    let children = part.parts();
    for (index, child) in children.iter().enumerate() {
        let last = index + 1 == children.len();
        let (first, rest) = if last { ("`-- ", "    ") } else { ("|-- ", "|   ") };
        for (line_no, line) in canonical_structure(child).lines().enumerate() {
            out.push_str(if line_no == 0 { first } else { rest });
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Decides whether two decoded payloads of the same content type match.
pub type Comparator = Box<dyn Fn(&[u8], &[u8]) -> Result<(), String> + Send + Sync>;

/// Where two trees first differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Index path from the root to the differing part.
    pub path: Vec<usize>,
    /// What differs.
    pub reason: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.path.iter().map(ToString::to_string).collect();
        write!(f, "part [{}]: {}", path.join("."), self.reason)
    }
}

impl std::error::Error for Mismatch {}

/// Registry of payload comparators keyed by MIME type pattern.
///
/// Lookup tries the exact `main/sub`, then `main/*`, then `*/*`.
pub struct ContentComparators {
    comparators: BTreeMap<String, Comparator>,
}

impl fmt::Debug for ContentComparators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentComparators")
            .field("patterns", &self.comparators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ContentComparators {
    fn default() -> Self {
        let mut registry = Self {
            comparators: BTreeMap::new(),
        };
        registry.register("*/*", |a, b| {
            if a == b {
                Ok(())
            } else {
                Err(format!("{} bytes differ from {} bytes", a.len(), b.len()))
            }
        });
        registry.register("text/*", |a, b| {
            let (a, b) = (String::from_utf8_lossy(a), String::from_utf8_lossy(b));
            if a == b {
                Ok(())
            } else {
                Err(format!("text differs:\n--- expected\n{b}\n--- actual\n{a}"))
            }
        });
        for markup in ["text/html", "text/xml"] {
            registry.register(markup, compare_ignoring_whitespace);
        }
        registry
    }
}

impl ContentComparators {
    /// Registers (or replaces) the comparator for a pattern.
    pub fn register<F>(&mut self, pattern: &str, comparator: F)
    where
        F: Fn(&[u8], &[u8]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.comparators
            .insert(pattern.to_ascii_lowercase(), Box::new(comparator));
    }

    fn lookup(&self, main: &str, sub: &str) -> Option<&Comparator> {
        self.comparators
            .get(&format!("{main}/{sub}"))
            .or_else(|| self.comparators.get(&format!("{main}/*")))
            .or_else(|| self.comparators.get("*/*"))
    }

    /// Compares two trees part by part.
    ///
    /// # Errors
    ///
    /// Returns the first [`Mismatch`] in document order.
    pub fn compare(&self, actual: &Part, expected: &Part) -> Result<(), Mismatch> {
        self.compare_at(actual, expected, &mut Vec::new())
    }

    fn compare_at(&self, actual: &Part, expected: &Part, path: &mut Vec<usize>) -> Result<(), Mismatch> {
        let fail = |path: &[usize], reason: String| Mismatch {
            path: path.to_vec(),
            reason,
        };
        let (a_type, e_type) = (actual.content_type(), expected.content_type());
        if a_type.mime_type() != e_type.mime_type() {
            return Err(fail(
                path,
                format!("content type {} != {}", a_type.mime_type(), e_type.mime_type()),
            ));
        }
        if actual.is_multipart() != expected.is_multipart() {
            return Err(fail(path, "multipart shape differs".to_string()));
        }

        if actual.is_multipart() {
            let (a_parts, e_parts) = (actual.parts(), expected.parts());
            if a_parts.len() != e_parts.len() {
                return Err(fail(
                    path,
                    format!("{} child parts != {}", a_parts.len(), e_parts.len()),
                ));
            }
            for (index, (a, e)) in a_parts.iter().zip(e_parts).enumerate() {
                path.push(index);
                self.compare_at(a, e, path)?;
                path.pop();
            }
            return Ok(());
        }

        let decode = |part: &Part| part.decoded_body().map_err(|e| fail(path, e.to_string()));
        let (a_body, e_body) = (decode(actual)?, decode(expected)?);
        match self.lookup(&a_type.main_type, &a_type.sub_type) {
            Some(comparator) => comparator(&a_body, &e_body).map_err(|reason| fail(path, reason)),
            None => Ok(()),
        }
    }
}

/// Compares markup text, accepting differences in whitespace only.
///
/// # Errors
///
/// Returns a description when the texts differ beyond whitespace.
pub fn compare_ignoring_whitespace(actual: &[u8], expected: &[u8]) -> Result<(), String> {
    let squash = |data: &[u8]| -> String {
        String::from_utf8_lossy(data)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    };
    if actual == expected || squash(actual) == squash(expected) {
        Ok(())
    } else {
        Err(format!(
            "markup differs:\n--- expected\n{}\n--- actual\n{}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(actual)
        ))
    }
}
