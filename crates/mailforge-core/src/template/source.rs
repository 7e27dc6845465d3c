//! Templates held as in-memory sources.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use minijinja::value::{Object, from_args};
use minijinja::{AutoEscape, Environment, ErrorKind, State, Value};
use serde::Deserialize;

use super::{CACHE_VARIABLE, FORMAT_VARIABLE, RenderContext, RenderError, TemplateAdapter};
use crate::attachment::{Attachment, AttachmentSpec};
use crate::params::{Param, RenderCache};

/// How sources are turned into text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Renderer {
    /// Jinja syntax rendered by minijinja.
    #[default]
    Jinja,
    /// Sources are used as-is.
    Verbatim,
}

impl std::str::FromStr for Renderer {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jinja" | "minijinja" => Ok(Self::Jinja),
            "verbatim" | "raw" => Ok(Self::Verbatim),
            other => Err(RenderError::Template(format!("unknown renderer: {other}"))),
        }
    }
}

/// Metadata accompanying template sources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplateMeta {
    /// Free-form settings for the calling application.
    pub settings: BTreeMap<String, serde_json::Value>,
    /// Declared attachments.
    pub attachments: Vec<AttachmentSpec>,
}

/// A template made of one source per format plus an optional default
/// source used when no format is requested.
#[derive(Debug, Clone, Default)]
pub struct SourceTemplate {
    renderer: Renderer,
    sources: BTreeMap<String, String>,
    default_source: Option<(String, String)>,
    settings: BTreeMap<String, serde_json::Value>,
    attachments: Vec<Attachment>,
}

impl SourceTemplate {
    /// Creates an empty Jinja template.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a template declaring only `html`.
    #[must_use]
    pub fn html(source: impl Into<String>) -> Self {
        Self::new().with_format("html", source)
    }

    /// Sets the renderer.
    #[must_use]
    pub const fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Declares a format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(format.into(), source.into());
        self
    }

    /// Sets the source used when no format is requested. `name` picks the
    /// escaping mode by extension, as in `welcome.html`.
    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.default_source = Some((name.into(), source.into()));
        self
    }

    /// Adds a metadata setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Adds a declared attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Applies metadata, resolving attachment paths with `load`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if an attachment cannot be decoded
    /// or loaded.
    pub fn with_meta(
        mut self,
        meta: TemplateMeta,
        load: impl Fn(&str) -> std::io::Result<Vec<u8>>,
    ) -> Result<Self, RenderError> {
        self.settings.extend(meta.settings);
        for spec in meta.attachments {
            let attachment = match &spec.path {
                Some(path) => Attachment {
                    name: spec.name.clone(),
                    content: load(path).map_err(|e| {
                        RenderError::Template(format!("attachment {}: {e}", spec.name))
                    })?,
                    content_type: spec.content_type.clone(),
                    embedded: spec.cid,
                },
                None => spec
                    .decode_inline()
                    .map_err(|e| RenderError::Template(e.to_string()))?,
            };
            self.attachments.push(attachment);
        }
        Ok(self)
    }

    fn render_source(&self, name: &str, source: &str, context: &RenderContext<'_>) -> Result<String, RenderError> {
        match self.renderer {
            Renderer::Verbatim => Ok(source.to_string()),
            Renderer::Jinja => {
                let mut env = Environment::new();
                env.set_auto_escape_callback(escape_for);
                env.add_template(name, source)
                    .map_err(|e| RenderError::Engine(format!("{e:#}")))?;
                let template = env
                    .get_template(name)
                    .map_err(|e| RenderError::Engine(format!("{e:#}")))?;
                template
                    .render(jinja_context(context))
                    .map_err(|e| RenderError::Engine(format!("{e:#}")))
            }
        }
    }
}

impl TemplateAdapter for SourceTemplate {
    fn formats(&self) -> BTreeSet<String> {
        self.sources.keys().cloned().collect()
    }

    fn render(&self, format: Option<&str>, context: &RenderContext<'_>) -> Result<String, RenderError> {
        tracing::debug!(format = ?format, purpose = context.purpose, "rendering template");
        match format {
            Some(format) => {
                let source = self
                    .sources
                    .get(format)
                    .ok_or_else(|| RenderError::UndeclaredFormat(format.to_string()))?;
                self.render_source(&format!("mail.{format}"), source, context)
            }
            None => {
                let (name, source) = self
                    .default_source
                    .as_ref()
                    .ok_or(RenderError::NoDefaultSource)?;
                self.render_source(name, source, context)
            }
        }
    }

    fn settings(&self) -> BTreeMap<String, serde_json::Value> {
        self.settings.clone()
    }

    fn attachments(&self) -> Vec<Attachment> {
        self.attachments.clone()
    }

    fn has_default_source(&self) -> bool {
        self.default_source.is_some()
    }
}

fn escape_for(name: &str) -> AutoEscape {
    let extension = name.rsplit('.').next().unwrap_or_default();
    match extension {
        "html" | "htm" | "xhtml" | "xml" => AutoEscape::Html,
        _ => AutoEscape::None,
    }
}

/// Exposes the render cache to templates as `cache.get(key, callable)`.
#[derive(Debug)]
struct CacheObject {
    cache: RenderCache,
}

impl Object for CacheObject {
    fn call_method(
        self: &Arc<Self>,
        state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, minijinja::Error> {
        if method != "get" {
            return Err(minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("cache has no method {method}"),
            ));
        }
        let (key, thunk): (String, Value) = from_args(args)?;
        let value = self.cache.get_or_try_insert_with(&key, || {
            let computed = thunk.call(state, &[])?;
            serde_json::to_value(&computed)
                .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()))
        })?;
        Ok(Value::from_serialize(&value))
    }
}

fn jinja_context(context: &RenderContext<'_>) -> Value {
    let mut values: BTreeMap<String, Value> = context
        .params
        .iter()
        .map(|(name, param)| {
            let value = match param {
                Param::Value(value) => Value::from_serialize(value),
                Param::Lazy(func) => {
                    let func = Arc::clone(func);
                    Value::from_function(move || Value::from_serialize(func()))
                }
            };
            (name.to_string(), value)
        })
        .collect();
    values.insert(
        CACHE_VARIABLE.to_string(),
        Value::from_object(CacheObject {
            cache: context.cache.clone(),
        }),
    );
    values.insert(FORMAT_VARIABLE.to_string(), Value::from(context.purpose));
    Value::from_object(values)
}
