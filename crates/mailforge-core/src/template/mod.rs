//! Template adapters and providers.
//!
//! A [`TemplateAdapter`] turns a named format (`text`, `html`, `xml`,
//! `css`, `subject`, ...) plus the message's variables into text. It also
//! exposes settings and attachments declared in its metadata. Providers
//! resolve adapters by template name.

mod directory;
mod source;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::attachment::Attachment;
use crate::params::{Params, RenderCache};

pub use directory::DirectoryProvider;
pub use source::{Renderer, SourceTemplate};

/// Formats that carry structured markup, in lookup priority order.
pub const MARKUP_FORMATS: [&str; 3] = ["xml", "xhtml", "html"];

/// Name of the variable holding the purpose of the current render.
pub const FORMAT_VARIABLE: &str = "mail_format";

/// Name of the variable holding the render cache.
pub const CACHE_VARIABLE: &str = "cache";

/// Errors raised by template adapters and providers.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The requested format is not declared by the template.
    #[error("Template does not declare format {0:?}")]
    UndeclaredFormat(String),

    /// A render without a format was requested but there is no default source.
    #[error("Template has no default source")]
    NoDefaultSource,

    /// No template with that name exists.
    #[error("Template not found: {0}")]
    NotFound(String),

    /// The rendering engine failed.
    #[error("Rendering failed: {0}")]
    Engine(String),

    /// Template sources or metadata could not be loaded.
    #[error("Invalid template: {0}")]
    Template(String),
}

/// What a template sees while rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Message variables.
    pub params: &'a Params,
    /// The message's render cache.
    pub cache: &'a RenderCache,
    /// Why the render happens (`html`, `text`, `xml`, `css`, `subject`).
    pub purpose: &'a str,
}

/// Renders one template in several formats.
pub trait TemplateAdapter: Send + Sync + fmt::Debug {
    /// Formats this template declares.
    fn formats(&self) -> BTreeSet<String>;

    /// Renders `format`, or the default source when `format` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UndeclaredFormat`] for unknown formats and
    /// [`RenderError::Engine`] when rendering fails.
    fn render(&self, format: Option<&str>, context: &RenderContext<'_>) -> Result<String, RenderError>;

    /// Settings declared in the template metadata.
    fn settings(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }

    /// Attachments declared in the template metadata.
    fn attachments(&self) -> Vec<Attachment> {
        Vec::new()
    }

    /// Returns true if `format` is declared.
    fn has_format(&self, format: &str) -> bool {
        self.formats().contains(format)
    }

    /// Returns true if rendering with no format can succeed.
    fn has_default_source(&self) -> bool {
        true
    }
}

/// Resolves templates by name.
pub trait TemplateProvider: Send + Sync + fmt::Debug {
    /// Returns the template called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotFound`] if there is no such template, or
    /// [`RenderError::Template`] if it cannot be loaded.
    fn template(&self, name: &str) -> Result<Arc<dyn TemplateAdapter>, RenderError>;
}

/// A provider that hands out the same template for every name.
#[derive(Debug, Clone)]
pub struct SingleProvider {
    template: Arc<dyn TemplateAdapter>,
}

impl SingleProvider {
    /// Wraps one template.
    pub fn new(template: impl TemplateAdapter + 'static) -> Self {
        Self {
            template: Arc::new(template),
        }
    }
}

impl TemplateProvider for SingleProvider {
    fn template(&self, _name: &str) -> Result<Arc<dyn TemplateAdapter>, RenderError> {
        Ok(Arc::clone(&self.template))
    }
}
