//! Settings files.
//!
//! A YAML document whose keys override fields of [`Settings`]:
//!
//! ```yaml
//! boundary: test
//! minimal_mime: true
//! encoding: utf-8
//! include_components: [text, html]
//! headers:
//!   From: noreply@example.com
//! params:
//!   product: Widget
//! structure:
//!   alternative: [text, html]
//! attachments:
//!   - { name: terms.txt, path: terms.txt }
//! smtp:
//!   host: mail.example.com
//!   port: 587
//!   security: starttls
//! ```
//!
//! Attachment paths are relative to the file's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mailforge_mime::{Charset, TransferEncoding};
use mailforge_smtp::SmtpOptions;
use serde::Deserialize;

use crate::attachment::{Attachment, AttachmentSpec};
use crate::error::{Error, Result};
use crate::settings::{Components, Settings};
use crate::structure::Structure;

/// Contents of a settings file. Absent keys leave settings unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    /// MIME structure.
    pub structure: Option<serde_yaml::Value>,
    /// Template variables, added to existing ones.
    pub params: BTreeMap<String, serde_json::Value>,
    /// Headers, added to existing ones.
    pub headers: BTreeMap<String, String>,
    /// Attachments, appended.
    pub attachments: Vec<AttachmentSpec>,
    /// Components to produce.
    pub include_components: Option<Vec<String>>,
    /// Maximum subject length.
    pub max_subject_length: Option<usize>,
    /// Marker appended to cut subjects.
    pub snip_indicator: Option<String>,
    /// Charset of the text body.
    pub text_encoding: Option<String>,
    /// Charset of the HTML body.
    pub html_encoding: Option<String>,
    /// Charset of both bodies.
    pub encoding: Option<String>,
    /// Transfer encoding of both bodies.
    pub transfer_encoding: Option<String>,
    /// Boundary seed.
    pub boundary: Option<String>,
    /// Whether single-child containers collapse.
    pub minimal_mime: Option<bool>,
    /// SMTP connection.
    pub smtp: Option<SmtpOptions>,
    #[serde(skip)]
    base: Option<PathBuf>,
}

impl SettingsFile {
    /// Parses YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed YAML or unknown keys.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads and parses a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Config`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut file = Self::from_yaml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        file.base = path.parent().map(Path::to_path_buf);
        tracing::debug!(path = %path.display(), "loaded settings file");
        Ok(file)
    }

    /// Applies the file onto `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedStructure`] for a bad structure,
    /// [`Error::Config`] for unknown charset or encoding names, and
    /// [`Error::Io`] for unreadable attachments.
    pub fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(structure) = &self.structure {
            settings.structure = Structure::from_yaml(structure.clone())?;
        }
        for (name, value) in &self.params {
            settings.params.set(name.clone(), value.clone());
        }
        for (name, value) in &self.headers {
            settings.headers.set(name.clone(), value.clone());
        }
        for spec in &self.attachments {
            let attachment = match &spec.path {
                Some(path) => {
                    let full = self
                        .base
                        .as_deref()
                        .map_or_else(|| PathBuf::from(path), |base| base.join(path));
                    Attachment {
                        name: spec.name.clone(),
                        content: std::fs::read(&full)?,
                        content_type: spec.content_type.clone(),
                        embedded: spec.cid,
                    }
                }
                None => spec.decode_inline()?,
            };
            settings.attachments.push(attachment);
        }
        if let Some(names) = &self.include_components {
            settings.include_components = Components::only(names.iter().cloned());
        }
        if let Some(max) = self.max_subject_length {
            settings.max_subject_length = Some(max);
        }
        if let Some(snip) = &self.snip_indicator {
            settings.snip_indicator = Some(snip.clone());
        }
        if let Some(name) = &self.text_encoding {
            settings.text_encoding = Some(charset(name)?);
        }
        if let Some(name) = &self.html_encoding {
            settings.html_encoding = Some(charset(name)?);
        }
        if let Some(name) = &self.encoding {
            settings.encoding = Some(charset(name)?);
        }
        if let Some(name) = &self.transfer_encoding {
            settings.transfer_encoding = Some(
                TransferEncoding::parse(name).map_err(|e| Error::Config(e.to_string()))?,
            );
        }
        if let Some(boundary) = &self.boundary {
            settings.boundary = Some(boundary.clone());
        }
        if let Some(minimal) = self.minimal_mime {
            settings.minimal_mime = minimal;
        }
        Ok(())
    }
}

fn charset(name: &str) -> Result<Charset> {
    name.parse().map_err(|e: mailforge_mime::Error| Error::Config(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::structure::{Component, ContainerKind};
    use mailforge_smtp::Security;

    #[test]
    fn test_apply() {
        let file = SettingsFile::from_yaml_str(
            "boundary: test\n\
             minimal_mime: false\n\
             encoding: latin-1\n\
             transfer_encoding: 8bit\n\
             include_components: [text]\n\
             max_subject_length: 40\n\
             headers: { From: noreply@example.com }\n\
             params: { count: 3, tags: [a, b] }\n\
             structure: { alternative: [text, html] }\n\
             attachments: [{ name: a.txt, value: hi }]\n",
        )
        .unwrap();
        let mut settings = Settings::default();
        file.apply(&mut settings).unwrap();

        assert_eq!(settings.boundary.as_deref(), Some("test"));
        assert!(!settings.minimal_mime);
        assert_eq!(settings.text_charset(), Some(Charset::Latin1));
        assert_eq!(settings.transfer_encoding, Some(TransferEncoding::EightBit));
        assert!(!settings.include_components.includes(Component::Html));
        assert_eq!(settings.max_subject_length, Some(40));
        assert_eq!(settings.snip_indicator.as_deref(), Some("[...]"));
        assert_eq!(settings.headers.get("from"), Some("noreply@example.com"));
        assert_eq!(settings.params.get("count").unwrap().resolve(), serde_json::json!(3));
        assert!(matches!(
            settings.structure,
            Structure::Container { kind: ContainerKind::Alternative, .. }
        ));
        assert_eq!(settings.attachments[0].content, b"hi");
        assert!(file.smtp.is_none());
    }

    #[test]
    fn test_smtp_section() {
        let file = SettingsFile::from_yaml_str(
            "smtp: { host: mail.example.com, port: 587, security: starttls, username: joe }\n",
        )
        .unwrap();
        let smtp = file.smtp.unwrap();
        assert_eq!(smtp.host, "mail.example.com");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.security, Security::StartTls);
        assert_eq!(smtp.username.as_deref(), Some("joe"));
        assert_eq!(smtp.hello, "localhost");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(SettingsFile::from_yaml_str("bogus: 1"), Err(Error::Config(_))));
        let file = SettingsFile::from_yaml_str("encoding: ebcdic").unwrap();
        assert!(matches!(file.apply(&mut Settings::default()), Err(Error::Config(_))));
        let file = SettingsFile::from_yaml_str("structure: { mixed: [body] }").unwrap();
        assert!(matches!(
            file.apply(&mut Settings::default()),
            Err(Error::UnsupportedStructure(_))
        ));
    }

    #[test]
    fn test_load_resolves_attachment_paths() {
        let dir = std::env::temp_dir().join(format!("mailforge-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("terms.txt"), "terms").unwrap();
        std::fs::write(
            dir.join("mail.yaml"),
            "attachments: [{ name: terms.txt, path: terms.txt }]\n",
        )
        .unwrap();

        let file = SettingsFile::load(dir.join("mail.yaml")).unwrap();
        let mut settings = Settings::default();
        file.apply(&mut settings).unwrap();
        assert_eq!(settings.attachments[0].content, b"terms");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
