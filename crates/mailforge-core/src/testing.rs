//! Assertions for comparing composed messages in tests.
//!
//! Two messages are equivalent when every part has the same canonical
//! headers, the trees have the same shape, and every leaf's decoded payload
//! matches under the registered comparators. Boundaries, transfer encodings
//! and header order never matter.

use mailforge_mime::Part;
use mailforge_mime::canonical::{
    ContentComparators, DEFAULT_IGNORED_HEADERS, canonical_headers, canonical_structure,
};

/// Semantic comparison of MIME messages.
#[derive(Debug)]
pub struct EmailAssertions {
    ignored: Vec<String>,
    comparators: ContentComparators,
}

impl Default for EmailAssertions {
    fn default() -> Self {
        Self {
            ignored: DEFAULT_IGNORED_HEADERS.iter().map(ToString::to_string).collect(),
            comparators: ContentComparators::default(),
        }
    }
}

impl EmailAssertions {
    /// Creates assertions with the default ignored headers and comparators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also ignores `name` when comparing headers.
    #[must_use]
    pub fn ignore_header(mut self, name: &str) -> Self {
        self.ignored.push(name.to_ascii_lowercase());
        self
    }

    /// Payload comparators, for registering custom ones.
    pub fn comparators_mut(&mut self) -> &mut ContentComparators {
        &mut self.comparators
    }

    /// Describes the first difference between two trees, if any.
    ///
    /// # Errors
    ///
    /// Returns a readable description of the mismatch.
    pub fn check(&self, actual: &Part, expected: &Part) -> Result<(), String> {
        let (a_shape, e_shape) = (canonical_structure(actual), canonical_structure(expected));
        if a_shape != e_shape {
            return Err(format!(
                "structure differs:\n--- expected\n{e_shape}--- actual\n{a_shape}"
            ));
        }

        let ignored: Vec<&str> = self.ignored.iter().map(String::as_str).collect();
        for (index, (a, e)) in actual.walk().into_iter().zip(expected.walk()).enumerate() {
            let (a_headers, e_headers) = (canonical_headers(a, &ignored), canonical_headers(e, &ignored));
            if a_headers != e_headers {
                return Err(format!(
                    "headers of part #{index} differ:\n--- expected\n{e_headers}--- actual\n{a_headers}"
                ));
            }
        }

        self.comparators
            .compare(actual, expected)
            .map_err(|mismatch| format!("content differs at {mismatch}"))
    }

    /// Panics unless the two trees are equivalent.
    ///
    /// # Panics
    ///
    /// On the first difference, with a description of it.
    #[track_caller]
    pub fn assert_equivalent(&self, actual: &Part, expected: &Part) {
        if let Err(message) = self.check(actual, expected) {
            panic!("messages are not equivalent: {message}");
        }
    }

    /// Parses two serialized messages and panics unless they are equivalent.
    ///
    /// # Panics
    ///
    /// If either input does not parse, or on the first difference.
    #[track_caller]
    pub fn assert_equivalent_bytes(&self, actual: &[u8], expected: &[u8]) {
        let parse = |label: &str, raw: &[u8]| match Part::parse(raw) {
            Ok(part) => part,
            Err(e) => panic!("{label} message does not parse: {e}"),
        };
        self.assert_equivalent(&parse("actual", actual), &parse("expected", expected));
    }
}
