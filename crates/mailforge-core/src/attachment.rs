//! Attachments and their content types.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Content type used when none is given and the name gives no hint.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A file carried by a message.
///
/// Embedded attachments are addressed from HTML as `cid:<name>` and end up
/// in the `related` container; the others are offered for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name, also the content id of embedded attachments.
    pub name: String,
    /// Raw bytes.
    pub content: Vec<u8>,
    /// Explicit content type.
    pub content_type: Option<String>,
    /// Whether the attachment is referenced inline by `cid:`.
    pub embedded: bool,
}

impl Attachment {
    /// Creates a downloadable attachment with a guessed content type.
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            content_type: None,
            embedded: false,
        }
    }

    /// Sets an explicit content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Marks the attachment as embedded.
    #[must_use]
    pub const fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    /// Returns the explicit content type, or one guessed from the name.
    #[must_use]
    pub fn resolved_content_type(&self) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(&self.name))
    }

    /// Returns the content as a `data:` URI.
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.resolved_content_type(),
            mailforge_mime::encoding::encode_base64(&self.content)
        )
    }
}

/// Guesses a content type from a file name.
#[must_use]
pub fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// How an attachment is declared in template metadata or markup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AttachmentSpec {
    /// File name.
    pub name: String,
    /// Explicit content type.
    pub content_type: Option<String>,
    /// Embedded (`cid`) flag.
    pub cid: bool,
    /// Inline value.
    pub value: Option<String>,
    /// `base64` when `value` is base64 encoded.
    pub encoding: Option<String>,
    /// File path, relative to the template source.
    pub path: Option<String>,
}

impl AttachmentSpec {
    /// Decodes the inline value into an attachment.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown encodings or malformed base64.
    pub fn decode_inline(&self) -> Result<Attachment> {
        let value = self.value.as_deref().unwrap_or_default();
        let content = match self.encoding.as_deref() {
            None | Some("") => value.as_bytes().to_vec(),
            Some(enc) if enc.eq_ignore_ascii_case("base64") => {
                let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                mailforge_mime::encoding::decode_base64(&compact)?
            }
            Some(other) => {
                return Err(Error::Config(format!(
                    "Unsupported attachment encoding for {}: {other}",
                    self.name
                )));
            }
        };
        Ok(Attachment {
            name: self.name.clone(),
            content,
            content_type: self.content_type.clone(),
            embedded: self.cid,
        })
    }
}

/// Merges attachment lists by name; later lists win, first position is kept.
#[must_use]
pub fn merge(layers: &[&[Attachment]]) -> Vec<Attachment> {
    let mut merged: Vec<Attachment> = Vec::new();
    for layer in layers {
        for attachment in *layer {
            match merged.iter_mut().find(|a| a.name == attachment.name) {
                Some(existing) => *existing = attachment.clone(),
                None => merged.push(attachment.clone()),
            }
        }
    }
    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("smiley.png"), "image/png");
        assert_eq!(guess_content_type("notes.txt"), "text/plain");
        assert_eq!(guess_content_type("blob"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_explicit_type_wins() {
        let att = Attachment::new("data.bin", b"x".to_vec()).with_content_type("text/csv");
        assert_eq!(att.resolved_content_type(), "text/csv");
    }

    #[test]
    fn test_data_uri() {
        let att = Attachment::new("a.png", b"hi".to_vec());
        assert_eq!(att.data_uri(), "data:image/png;base64,aGk=");
    }

    #[test]
    fn test_decode_inline_base64() {
        let spec = AttachmentSpec {
            name: "x.txt".into(),
            value: Some("aGVs\nbG8=".into()),
            encoding: Some("base64".into()),
            cid: true,
            ..AttachmentSpec::default()
        };
        let att = spec.decode_inline().unwrap();
        assert_eq!(att.content, b"hello");
        assert!(att.embedded);
    }

    #[test]
    fn test_decode_inline_unknown_encoding() {
        let spec = AttachmentSpec {
            name: "x".into(),
            encoding: Some("uuencode".into()),
            ..AttachmentSpec::default()
        };
        assert!(matches!(spec.decode_inline(), Err(Error::Config(_))));
    }

    #[test]
    fn test_merge_later_wins() {
        let template = [Attachment::new("a", b"1".to_vec()), Attachment::new("b", b"2".to_vec())];
        let caller = [Attachment::new("b", b"3".to_vec()), Attachment::new("c", b"4".to_vec())];
        let merged = merge(&[&template, &caller]);
        let names: Vec<_> = merged.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(merged[1].content, b"3");
    }
}
