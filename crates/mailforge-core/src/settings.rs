//! Composition settings shared by a manager and copied into each message.

use std::collections::BTreeSet;

use mailforge_mime::{Charset, Headers, TransferEncoding};

use crate::attachment::Attachment;
use crate::params::Params;
use crate::structure::{Component, Structure};

/// Which body components may produce parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Components {
    /// Every component.
    #[default]
    All,
    /// Only the named components (`text`, `html`, `attachments`).
    Only(BTreeSet<String>),
}

impl Components {
    /// Restricts output to the given component names.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    /// Returns true if `component` may produce parts.
    ///
    /// An empty `Only` set includes everything.
    #[must_use]
    pub fn includes(&self, component: Component) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.is_empty() || names.contains(component.name()),
        }
    }
}

/// Everything that shapes how a message is composed.
///
/// Cloning is a full structural copy; mutating a clone never affects the
/// original.
#[derive(Debug, Clone)]
pub struct Settings {
    /// MIME structure tree.
    pub structure: Structure,
    /// Template variables.
    pub params: Params,
    /// Attachments added to every message.
    pub attachments: Vec<Attachment>,
    /// Headers added to every message.
    pub headers: Headers,
    /// Component filter.
    pub include_components: Components,
    /// Subject length limit, applied together with `snip_indicator`.
    pub max_subject_length: Option<usize>,
    /// Appended to truncated subjects.
    pub snip_indicator: Option<String>,
    /// Charset of the text part; falls back to `encoding`.
    pub text_encoding: Option<Charset>,
    /// Charset of the HTML part; falls back to `encoding`.
    pub html_encoding: Option<Charset>,
    /// Charset of all text parts.
    pub encoding: Option<Charset>,
    /// Forces the transfer encoding of the text and HTML parts.
    pub transfer_encoding: Option<TransferEncoding>,
    /// Seed for deterministic multipart boundaries.
    pub boundary: Option<String>,
    /// Collapse containers left with a single child.
    pub minimal_mime: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            structure: Structure::default(),
            params: Params::new(),
            attachments: Vec::new(),
            headers: Headers::new(),
            include_components: Components::All,
            max_subject_length: Some(512),
            snip_indicator: Some("[...]".to_string()),
            text_encoding: None,
            html_encoding: None,
            encoding: None,
            transfer_encoding: None,
            boundary: None,
            minimal_mime: true,
        }
    }
}

impl Settings {
    /// Charset configured for the text part.
    #[must_use]
    pub fn text_charset(&self) -> Option<Charset> {
        self.text_encoding.or(self.encoding)
    }

    /// Charset configured for the HTML part.
    #[must_use]
    pub fn html_charset(&self) -> Option<Charset> {
        self.html_encoding.or(self.encoding)
    }
}
