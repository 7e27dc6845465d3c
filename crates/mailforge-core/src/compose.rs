//! The structure compiler: turns a [`Structure`] into a MIME [`Part`] tree.

use mailforge_mime::{Charset, ContentType, Part, TransferEncoding};
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::structure::{Component, ContainerKind, Structure};

/// Supplies the content of leaf parts.
pub trait PartSource {
    /// The plain-text body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be produced.
    fn text(&self) -> Result<String>;

    /// The HTML body, or `None` when the message has no HTML source.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be produced.
    fn html(&self) -> Result<Option<String>>;

    /// All attachments, embedded and not.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachments cannot be collected.
    fn attachments(&self) -> Result<Vec<Attachment>>;
}

/// Compiles one message. Not reusable: boundary numbering and the
/// attachment list are per compilation.
pub struct Compiler<'a> {
    settings: &'a Settings,
    source: &'a dyn PartSource,
    sequence: usize,
    attachments: Option<Vec<Attachment>>,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler for `settings` pulling content from `source`.
    #[must_use]
    pub fn new(settings: &'a Settings, source: &'a dyn PartSource) -> Self {
        Self {
            settings,
            source,
            sequence: 0,
            attachments: None,
        }
    }

    /// Builds the part tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyMessage`] if nothing survives filtering,
    /// [`Error::Encoding`] if a body cannot be encoded, and any error of
    /// the part source.
    pub fn compile(mut self) -> Result<Part> {
        let settings = self.settings;
        let mut parts = self.resolve(&settings.structure)?;
        tracing::debug!(parts = parts.len(), containers = self.sequence, "compiled structure");
        match parts.len() {
            0 => Err(Error::EmptyMessage),
            1 => Ok(parts.remove(0)),
            _ => {
                let boundary = self.next_boundary(ContainerKind::Mixed);
                Ok(Part::multipart(&ContentType::multipart("mixed", boundary), parts)?)
            }
        }
    }

    fn resolve(&mut self, node: &Structure) -> Result<Vec<Part>> {
        match node {
            Structure::Leaf(component) => self.resolve_leaf(*component),
            Structure::Container {
                kind,
                optimize,
                root_type,
                children,
            } => {
                let boundary = self.next_boundary(*kind);
                let mut parts = Vec::new();
                for child in children {
                    parts.extend(self.resolve(child)?);
                }
                if parts.is_empty() {
                    return Ok(parts);
                }
                let collapse = *optimize == Some(true)
                    || (self.settings.minimal_mime && *optimize != Some(false));
                if parts.len() == 1 && collapse {
                    return Ok(parts);
                }
                let mut content_type = ContentType::multipart(kind.subtype(), boundary);
                if let (ContainerKind::Related, Some(root_type)) = (kind, root_type) {
                    content_type.set_parameter("type", root_type.clone());
                }
                Ok(vec![Part::multipart(&content_type, parts)?])
            }
        }
    }

    fn resolve_leaf(&mut self, component: Component) -> Result<Vec<Part>> {
        if component == Component::Subject || !self.settings.include_components.includes(component) {
            return Ok(Vec::new());
        }
        match component {
            Component::Text => {
                let text = self.source.text()?;
                Ok(vec![self.text_part("plain", &text, self.settings.text_charset())?])
            }
            Component::Html => match self.source.html()? {
                Some(html) => Ok(vec![self.text_part("html", &html, self.settings.html_charset())?]),
                None => Ok(Vec::new()),
            },
            Component::Attachments { embedded } => {
                if self.attachments.is_none() {
                    self.attachments = Some(self.source.attachments()?);
                }
                Ok(self
                    .attachments
                    .iter()
                    .flatten()
                    .filter(|a| a.embedded == embedded)
                    .map(attachment_part)
                    .collect())
            }
            Component::Subject => Ok(Vec::new()),
        }
    }

    fn text_part(&self, subtype: &str, content: &str, charset: Option<Charset>) -> Result<Part> {
        let (charset, bytes) = match charset {
            Some(charset) => {
                let bytes = charset.encode_exact(content).ok_or_else(|| {
                    Error::Encoding(format!("text/{subtype} body is not representable in {charset}"))
                })?;
                (charset, bytes)
            }
            None => Charset::negotiate(content).ok_or_else(|| {
                Error::Encoding(format!("no charset represents the text/{subtype} body"))
            })?,
        };
        let encoding = self
            .settings
            .transfer_encoding
            .unwrap_or_else(|| charset.transfer_encoding());
        tracing::debug!(subtype, charset = %charset, encoding = %encoding, "encoded body");
        Ok(Part::leaf(&ContentType::text(subtype, charset.name()), encoding, &bytes))
    }

    fn next_boundary(&mut self, kind: ContainerKind) -> String {
        self.sequence += 1;
        match &self.settings.boundary {
            Some(seed) => format!("{seed}-{}-{}", kind.abbrev(), self.sequence),
            None => format!("=_{}", Uuid::new_v4().simple()),
        }
    }
}

/// Builds the part for one attachment.
fn attachment_part(attachment: &Attachment) -> Part {
    let mut content_type = ContentType::parse(&attachment.resolved_content_type())
        .unwrap_or_else(|_| ContentType::new("application", "octet-stream"));

    let mut part = match content_type.main_type.as_str() {
        "text" => match std::str::from_utf8(&attachment.content)
            .ok()
            .and_then(Charset::negotiate)
        {
            Some((charset, bytes)) => {
                content_type.set_parameter("charset", charset.name());
                Part::leaf(&content_type, charset.transfer_encoding(), &bytes)
            }
            None => Part::leaf(&content_type, TransferEncoding::Base64, &attachment.content),
        },
        "image" => {
            content_type.set_parameter("name", attachment.name.clone());
            Part::leaf(&content_type, TransferEncoding::Base64, &attachment.content)
        }
        _ => Part::leaf(&content_type, TransferEncoding::Base64, &attachment.content),
    };

    if attachment.embedded {
        part.headers.set("Content-Disposition", "attachment");
        part.headers.set("Content-ID", format!("<{}>", attachment.name));
    } else {
        part.headers.set(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", attachment.name),
        );
    }
    part
}
