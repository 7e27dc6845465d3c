//! The per-message facade.
//!
//! A [`Message`] binds one template to a private copy of the settings. It
//! renders the template on demand for every piece of output it is asked
//! for: headers, subject, text, HTML, attachments. Nothing is memoized
//! across those calls, so a template variable backed by a function runs
//! once per render unless the template routes it through the render cache.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use mailforge_mime::{Headers, Part};

use crate::address::{domain_of, extract, extract_unique};
use crate::attachment::{self, Attachment};
use crate::clock::{Clock, SystemClock, format_date};
use crate::compose::{Compiler, PartSource};
use crate::css::Stylesheet;
use crate::delivery::{DeliveryAgent, RecordingAgent};
use crate::error::{Error, Result};
use crate::manager::HeaderHook;
use crate::markup::Document;
use crate::modifier::{Envelope, Modifier, Payload};
use crate::params::{Params, RenderCache};
use crate::settings::Settings;
use crate::template::{MARKUP_FORMATS, RenderContext, RenderError, TemplateAdapter};
use crate::text::{clean_subject, html_to_text, subject_to_ascii};

/// Purpose passed to renders of the structured markup.
const MARKUP_PURPOSE: &str = "xml";

/// One email being prepared.
pub struct Message {
    name: String,
    template: Arc<dyn TemplateAdapter>,
    settings: Settings,
    cache: RenderCache,
    clock: Arc<dyn Clock>,
    hook: Option<Arc<dyn HeaderHook>>,
    modifier: Option<Arc<dyn Modifier>>,
    agent: Arc<dyn DeliveryAgent>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("name", &self.name)
            .field("template", &self.template)
            .field("settings", &self.settings)
            .field("modifier", &self.modifier)
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

impl Message {
    /// Creates a message for `template`, delivering to a [`RecordingAgent`]
    /// until another agent is set.
    pub fn new(name: impl Into<String>, template: Arc<dyn TemplateAdapter>, settings: Settings) -> Self {
        Self {
            name: name.into(),
            template,
            settings,
            cache: RenderCache::new(),
            clock: Arc::new(SystemClock),
            hook: None,
            modifier: None,
            agent: Arc::new(RecordingAgent::new()),
        }
    }

    /// Sets the delivery agent.
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn DeliveryAgent>) -> Self {
        self.agent = agent;
        self
    }

    /// Sets the modifier run before delivery.
    #[must_use]
    pub fn with_modifier(mut self, modifier: Option<Arc<dyn Modifier>>) -> Self {
        self.modifier = modifier;
        self
    }

    /// Sets the hook that gets the last word on output headers.
    #[must_use]
    pub fn with_hook(mut self, hook: Option<Arc<dyn HeaderHook>>) -> Self {
        self.hook = hook;
        self
    }

    /// Sets the clock used for `Date` and `Message-ID`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Template name this message was created from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The template.
    #[must_use]
    pub fn template(&self) -> &Arc<dyn TemplateAdapter> {
        &self.template
    }

    /// This message's settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable access to this message's settings.
    pub const fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// The render cache shared by every render of this message.
    #[must_use]
    pub const fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Template variables.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.settings.params
    }

    /// Sets a template variable.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.settings.params.set(name, value);
    }

    /// Sets a template variable computed by `func` each time it is read.
    pub fn set_param_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn() -> serde_json::Value + Send + Sync + 'static,
    {
        self.settings.params.set_lazy(name, func);
    }

    /// Removes a template variable.
    pub fn remove_param(&mut self, name: &str) {
        self.settings.params.remove(name);
    }

    /// Sets a header, overriding any template-declared value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.settings.headers.set(name, value);
    }

    /// Returns a header set on this message. Template-declared headers are
    /// not consulted.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.settings.headers.get(name)
    }

    /// Removes a header set on this message.
    pub fn remove_header(&mut self, name: &str) {
        self.settings.headers.remove(name);
    }

    /// Registers an attachment. It replaces any template attachment with
    /// the same name.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.settings.attachments.push(attachment);
    }

    fn render(&self, format: Option<&str>, purpose: &str) -> std::result::Result<String, RenderError> {
        let context = RenderContext {
            params: &self.settings.params,
            cache: &self.cache,
            purpose,
        };
        self.template.render(format, &context)
    }

    /// Renders and parses the structured markup.
    ///
    /// The first declared format among `xml`, `xhtml` and `html` is used.
    /// Without one, the default source is tried, and `None` is returned if
    /// there is none or it is not well-formed.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or a declared markup format does
    /// not parse.
    pub fn template_markup(&self) -> Result<Option<Document>> {
        if let Some(format) = MARKUP_FORMATS.iter().find(|f| self.template.has_format(f)) {
            let source = self.render(Some(format), MARKUP_PURPOSE)?;
            return Ok(Some(Document::parse(&source)?));
        }
        let source = match self.render(None, MARKUP_PURPOSE) {
            Ok(source) => source,
            Err(RenderError::NoDefaultSource) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match Document::parse(&source) {
            Ok(document) => Ok(Some(document)),
            Err(err) => {
                tracing::debug!(error = %err, "default source is not structured markup");
                Ok(None)
            }
        }
    }

    /// Headers declared by annotations in the structured markup.
    ///
    /// # Errors
    ///
    /// Returns an error if the markup cannot be rendered.
    pub fn template_headers(&self) -> Result<Headers> {
        let mut headers = Headers::new();
        if let Some(document) = self.template_markup()? {
            for (name, value) in document.headers() {
                headers.set(name, value);
            }
        }
        Ok(headers)
    }

    /// Settings the template passes back to the application: metadata
    /// settings, overridden by `env` annotations.
    ///
    /// # Errors
    ///
    /// Returns an error if the markup cannot be rendered.
    pub fn template_settings(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        let mut settings = self.template.settings();
        if let Some(document) = self.template_markup()? {
            for (name, value) in document.env() {
                settings.insert(name, serde_json::Value::String(value));
            }
        }
        Ok(settings)
    }

    /// Attachments declared in metadata and in markup annotations; the
    /// markup wins on name collisions.
    ///
    /// # Errors
    ///
    /// Returns an error if the markup cannot be rendered or an annotation
    /// cannot be decoded.
    pub fn template_attachments(&self) -> Result<Vec<Attachment>> {
        let declared = self.template.attachments();
        let annotated = match self.template_markup()? {
            Some(document) => document
                .attachments()
                .iter()
                .map(attachment::AttachmentSpec::decode_inline)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(attachment::merge(&[&declared, &annotated]))
    }

    /// The stylesheet to inline: the `css` format followed by the
    /// `<style type="text/css">` blocks of the markup head.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn template_style(&self) -> Result<String> {
        let mut blocks = Vec::new();
        if self.template.has_format("css") {
            blocks.push(self.render(Some("css"), "css")?);
        }
        if let Some(mut document) = self.template_markup()? {
            blocks.extend(document.take_head_styles());
        }
        Ok(blocks.join(" "))
    }

    /// Renders the HTML for `purpose`, strips annotations and head styles,
    /// and inlines [`Self::template_style`].
    fn html_document(&self, purpose: &str) -> Result<Document> {
        let source = if self.template.has_format("html") {
            self.render(Some("html"), purpose)?
        } else {
            self.render(None, purpose)?
        };
        let mut document = Document::parse(&source)?;
        document.strip_annotations();
        document.take_head_styles();

        let style = self.template_style()?;
        let style = style.trim();
        if !style.is_empty() {
            Stylesheet::parse(style).inline(&mut document);
        }
        Ok(document)
    }

    /// The HTML body.
    ///
    /// With `standalone`, `cid:` references to embedded attachments are
    /// replaced by `data:` URIs so the result renders on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the HTML is not well-formed.
    pub fn html(&self, standalone: bool) -> Result<String> {
        let mut html = self.html_document("html")?.to_string();
        if standalone {
            for attachment in self.attachments()?.iter().filter(|a| a.embedded) {
                html = html.replace(&format!("cid:{}", attachment.name), &attachment.data_uri());
            }
        }
        Ok(html)
    }

    /// The plain-text body.
    ///
    /// A declared `text` format is used as-is. Otherwise the HTML is
    /// converted to text; if that fails, the default source is rendered
    /// instead.
    ///
    /// # Errors
    ///
    /// Returns an error if no text can be rendered.
    pub fn text(&self) -> Result<String> {
        if self.template.has_format("text") {
            return Ok(self.render(Some("text"), "text")?);
        }
        let html = match self.html_document("text") {
            Ok(mut document) => {
                document.remove_head();
                document.to_string()
            }
            Err(err) => {
                tracing::debug!(error = %err, "no HTML for text body, using default source");
                return Ok(self.render(None, "text")?);
            }
        };
        Ok(html_to_text(&html)?)
    }

    /// The subject.
    ///
    /// In order of preference: the `Subject` header set on the message, the
    /// template's `subject` format, the subject annotations of the markup,
    /// and the start of the text body. The last two are cleaned and cut to
    /// the configured length.
    ///
    /// # Errors
    ///
    /// Returns an error if a render fails.
    pub fn subject(&self) -> Result<String> {
        if let Some(subject) = self.settings.headers.get("subject") {
            return Ok(subject.to_string());
        }
        if self.template.has_format("subject") {
            let subject = self.render(Some("subject"), "subject")?;
            return Ok(subject.split_whitespace().collect::<Vec<_>>().join(" "));
        }
        let max_length = self.settings.max_subject_length;
        let snip = self.settings.snip_indicator.as_deref();
        if let Some(annotated) = self.template_markup()?.and_then(|d| d.subject()) {
            let subject = clean_subject(&subject_to_ascii(&annotated), max_length, snip);
            if !subject.is_empty() {
                return Ok(subject);
            }
        }
        Ok(clean_subject(&self.text()?, max_length, snip))
    }

    /// The `Message-ID`: the header set on the message, or a new id in the
    /// domain of `mail_from`.
    #[must_use]
    pub fn message_id(&self, mail_from: &str) -> String {
        match self.settings.headers.get("message-id") {
            Some(id) => id.to_string(),
            None => format!("<{}@{}>", self.clock.uuid(), domain_of(mail_from)),
        }
    }

    /// Template attachments followed by the ones registered on the message,
    /// which win on name collisions. Content types are filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if the template attachments cannot be collected.
    pub fn attachments(&self) -> Result<Vec<Attachment>> {
        let template = self.template_attachments()?;
        let mut merged = attachment::merge(&[&template, &self.settings.attachments]);
        for attachment in &mut merged {
            if attachment.content_type.is_none() {
                attachment.content_type = Some(attachment.resolved_content_type());
            }
        }
        Ok(merged)
    }

    /// Headers of the outgoing message: template headers overridden by the
    /// message's own, then `Subject` and `Date` when missing, then the
    /// manager hook.
    ///
    /// # Errors
    ///
    /// Returns an error if the markup or the subject cannot be rendered.
    pub fn output_headers(&self) -> Result<Headers> {
        let mut headers = self.template_headers()?;
        headers.merge(&self.settings.headers);
        if !headers.contains("subject") {
            headers.set("Subject", self.subject()?);
        }
        if !headers.contains("date") {
            headers.set("Date", format_date(self.clock.now()));
        }
        if let Some(hook) = &self.hook {
            hook.update_headers(self, &mut headers);
        }
        Ok(headers)
    }

    /// Compiles the part tree and applies `headers` to its root. `Bcc` is
    /// never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure cannot be compiled.
    pub fn compose(&self, headers: &Headers) -> Result<Part> {
        let mut part = Compiler::new(&self.settings, self).compile()?;
        for (name, value) in headers.iter() {
            if !name.eq_ignore_ascii_case("bcc") {
                part.headers.set(name, value);
            }
        }
        part.headers.set_default_first("MIME-Version", "1.0");
        Ok(part)
    }

    /// The message as it would be handed to the SMTP `DATA` command,
    /// without `Message-ID` unless one was set.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be composed.
    pub fn smtp_data(&self) -> Result<String> {
        let part = self.compose(&self.output_headers()?)?;
        Ok(String::from_utf8_lossy(&part.to_bytes()).into_owned())
    }

    /// Composes and delivers the message.
    ///
    /// The envelope sender defaults to the `From` address and the
    /// recipients to every address in `To`, `Cc` and `Bcc`. Headers are not
    /// changed to match explicit envelope values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHeader`] if no sender or no recipient can be
    /// found, and any composition, modifier or delivery error.
    pub fn send(&self, mail_from: Option<&str>, recipients: Option<&[String]>) -> Result<()> {
        let mut headers = self.output_headers()?;

        let mail_from = match mail_from {
            Some(from) => from.to_string(),
            None => headers
                .get("from")
                .and_then(|from| extract(from).into_iter().next())
                .ok_or_else(|| Error::MissingHeader("email source (\"From\") not specified".to_string()))?,
        };
        let recipients = match recipients {
            Some(recipients) => recipients.to_vec(),
            None => {
                let found = extract_unique(
                    ["to", "cc", "bcc"]
                        .iter()
                        .flat_map(|name| headers.get_all(name)),
                );
                if found.is_empty() {
                    return Err(Error::MissingHeader(
                        "email destination (\"To\") not specified".to_string(),
                    ));
                }
                found
            }
        };
        if !headers.contains("message-id") {
            headers.set("Message-ID", self.message_id(&mail_from));
        }

        let mut envelope = Envelope::new(mail_from, recipients, Payload::Mime(self.compose(&headers)?));
        if let Some(modifier) = &self.modifier {
            envelope = modifier.modify(envelope)?;
        }
        let Envelope {
            mail_from,
            recipients,
            payload,
        } = envelope;
        let mut data = payload.into_bytes();
        if !data.ends_with(b"\n") {
            data.push(b'\n');
        }
        tracing::debug!(template = %self.name, from = %mail_from, recipients = recipients.len(), "sending message");
        self.agent.send(&mail_from, &recipients, &data)?;
        Ok(())
    }
}

impl PartSource for Message {
    fn text(&self) -> Result<String> {
        Self::text(self)
    }

    fn html(&self) -> Result<Option<String>> {
        if !self.template.has_format("html") && !self.template.has_default_source() {
            tracing::debug!(template = %self.name, "no html source, skipping html part");
            return Ok(None);
        }
        Self::html(self, false).map(Some)
    }

    fn attachments(&self) -> Result<Vec<Attachment>> {
        Self::attachments(self)
    }
}
