//! MIME part trees.

use crate::content_type::ContentType;
use crate::encoding::TransferEncoding;
use crate::error::{Error, Result};
use crate::header::Headers;

/// Body of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// A leaf payload, already transfer-encoded.
    Single(Vec<u8>),
    /// Child parts of a multipart container. The boundary lives in the
    /// `Content-Type` header.
    Multipart(Vec<Part>),
}

/// A MIME entity: headers plus either a payload or child parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body.
    pub body: Body,
}

impl Part {
    /// Creates a leaf part, encoding `content` with `encoding`.
    #[must_use]
    pub fn leaf(content_type: &ContentType, encoding: TransferEncoding, content: &[u8]) -> Self {
        let mut headers = Headers::new();
        headers.set("Content-Type", content_type.to_string());
        headers.set("Content-Transfer-Encoding", encoding.to_string());
        Self {
            headers,
            body: Body::Single(encoding.encode(content)),
        }
    }

    /// Creates a multipart container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBoundary`] if the content type has no
    /// boundary parameter.
    pub fn multipart(content_type: &ContentType, parts: Vec<Self>) -> Result<Self> {
        if content_type.boundary().is_none() {
            return Err(Error::MissingBoundary);
        }
        let mut headers = Headers::new();
        headers.set("Content-Type", content_type.to_string());
        Ok(Self {
            headers,
            body: Body::Multipart(parts),
        })
    }

    /// Returns the parsed content type, defaulting to `text/plain`.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_else(|| ContentType::text("plain", "us-ascii"))
    }

    /// Returns the transfer encoding, defaulting to 7bit.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .and_then(|value| TransferEncoding::parse(value).ok())
            .unwrap_or(TransferEncoding::SevenBit)
    }

    /// Returns true if this part holds child parts.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart(_))
    }

    /// Returns the child parts (empty for leaves).
    #[must_use]
    pub fn parts(&self) -> &[Self] {
        match &self.body {
            Body::Multipart(parts) => parts,
            Body::Single(_) => &[],
        }
    }

    /// Returns all parts in document order, starting with `self`.
    #[must_use]
    pub fn walk(&self) -> Vec<&Self> {
        let mut out = vec![self];
        for child in self.parts() {
            out.extend(child.walk());
        }
        out
    }

    /// Returns the decoded payload of a leaf part.
    ///
    /// # Errors
    ///
    /// Returns an error for multipart parts or malformed encodings.
    pub fn decoded_body(&self) -> Result<Vec<u8>> {
        match &self.body {
            Body::Single(raw) => self.transfer_encoding().decode(raw),
            Body::Multipart(_) => Err(Error::InvalidMultipart(
                "multipart parts have no payload".to_string(),
            )),
        }
    }

    /// Serializes the part with `\n` line endings.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.headers.to_string().as_bytes());
        out.push(b'\n');
        match &self.body {
            Body::Single(payload) => out.extend_from_slice(payload),
            Body::Multipart(parts) => {
                let boundary = self.content_type().boundary().unwrap_or_default().to_string();
                for part in parts {
                    out.extend_from_slice(format!("--{boundary}\n").as_bytes());
                    part.write_to(out);
                    out.push(b'\n');
                }
                out.extend_from_slice(format!("--{boundary}--\n").as_bytes());
            }
        }
    }

    /// Parses a serialized message or part.
    ///
    /// Accepts `\n` or `\r\n` line endings. Multipart bodies are split on
    /// their boundary; preamble and epilogue are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart body lacks its boundary delimiters.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let normalized = normalize_newlines(raw);
        parse_normalized(&normalized)
    }
}

fn normalize_newlines(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().peekable();
    while let Some(&byte) = iter.next() {
        if byte == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(byte);
    }
    out
}

fn parse_normalized(raw: &[u8]) -> Result<Part> {
    let (head, body) = if raw.first() == Some(&b'\n') {
        (&raw[..0], &raw[1..])
    } else {
        raw.windows(2)
            .position(|w| w == b"\n\n")
            .map_or((raw, &raw[raw.len()..]), |i| (&raw[..=i], &raw[i + 2..]))
    };

    let headers = Headers::parse(&String::from_utf8_lossy(head));
    let mut part = Part {
        headers,
        body: Body::Single(body.to_vec()),
    };

    let content_type = part.content_type();
    if content_type.is_multipart() {
        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
        part.body = Body::Multipart(split_multipart(body, boundary)?);
    }
    Ok(part)
}

fn split_multipart(body: &[u8], boundary: &str) -> Result<Vec<Part>> {
    let open = format!("--{boundary}");
    let close = format!("--{boundary}--");
    let mut parts = Vec::new();
    let mut current: Option<Vec<&[u8]>> = None;
    let mut closed = false;

    for line in body.split(|&b| b == b'\n') {
        let trimmed = line.trim_ascii_end();
        if trimmed == close.as_bytes() {
            if let Some(lines) = current.take() {
                parts.push(parse_normalized(&lines.join(&b'\n'))?);
            }
            closed = true;
            break;
        }
        if trimmed == open.as_bytes() {
            if let Some(lines) = current.take() {
                parts.push(parse_normalized(&lines.join(&b'\n'))?);
            }
            current = Some(Vec::new());
            continue;
        }
        if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }

    if !closed {
        return Err(Error::InvalidMultipart(format!(
            "missing closing delimiter for boundary {boundary:?}"
        )));
    }
    Ok(parts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Part {
        let text = Part::leaf(
            &ContentType::text("plain", "us-ascii"),
            TransferEncoding::SevenBit,
            b"Hello\n",
        );
        let html = Part::leaf(
            &ContentType::text("html", "utf-8"),
            TransferEncoding::Base64,
            "<p>caf\u{e9}</p>".as_bytes(),
        );
        Part::multipart(&ContentType::multipart("alternative", "b-alt-1"), vec![text, html]).unwrap()
    }

    #[test]
    fn test_serialize_layout() {
        let text = String::from_utf8(sample().to_bytes()).unwrap();
        assert!(text.starts_with("Content-Type: multipart/alternative; boundary=b-alt-1\n\n--b-alt-1\n"));
        assert!(text.contains("Content-Transfer-Encoding: 7bit\n\nHello\n\n--b-alt-1\n"));
        assert!(text.ends_with("--b-alt-1--\n"));
    }

    #[test]
    fn test_parse_serialized_tree() {
        let original = sample();
        let parsed = Part::parse(&original.to_bytes()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.parts()[0].decoded_body().unwrap(), b"Hello\n");
        assert_eq!(
            String::from_utf8(parsed.parts()[1].decoded_body().unwrap()).unwrap(),
            "<p>caf\u{e9}</p>"
        );
    }

    #[test]
    fn test_parse_crlf() {
        let raw = b"Content-Type: multipart/mixed; boundary=\"x\"\r\n\r\npreamble\r\n--x\r\nContent-Type: text/plain\r\n\r\nbody\r\n--x--\r\nepilogue";
        let part = Part::parse(raw).unwrap();
        assert_eq!(part.parts().len(), 1);
        assert_eq!(part.parts()[0].decoded_body().unwrap(), b"body");
    }

    #[test]
    fn test_parse_unterminated_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=x\n\n--x\n\nbody\n";
        assert!(Part::parse(raw).is_err());
    }

    #[test]
    fn test_walk_is_preorder() {
        let types: Vec<String> = sample()
            .walk()
            .iter()
            .map(|p| p.content_type().mime_type())
            .collect();
        assert_eq!(types, vec!["multipart/alternative", "text/plain", "text/html"]);
    }

    #[test]
    fn test_multipart_requires_boundary() {
        assert!(Part::multipart(&ContentType::new("multipart", "mixed"), vec![]).is_err());
    }
}
