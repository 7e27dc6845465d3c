//! Templates stored as files in a directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::source::{Renderer, SourceTemplate, TemplateMeta};
use super::{RenderError, TemplateAdapter, TemplateProvider};

/// Extensions holding template metadata rather than a format.
const META_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Loads `<name>.<format>` files from a directory, plus optional metadata
/// from `<name>.yaml`.
///
/// Attachment paths in the metadata are relative to the directory.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
    renderer: Renderer,
}

impl DirectoryProvider {
    /// Creates a provider reading from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            renderer: Renderer::default(),
        }
    }

    /// Sets the renderer used for every template.
    #[must_use]
    pub const fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Returns the directory templates are read from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads a template without caching.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NotFound`] if no file belongs to `name`, and
    /// [`RenderError::Template`] for unreadable files or bad metadata.
    pub fn load(&self, name: &str) -> Result<SourceTemplate, RenderError> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| RenderError::Template(format!("{}: {e}", self.root.display())))?;

        let mut template = SourceTemplate::new().with_renderer(self.renderer);
        let mut meta: Option<TemplateMeta> = None;
        let mut found = false;

        for entry in entries {
            let path = entry
                .map_err(|e| RenderError::Template(e.to_string()))?
                .path();
            let (Some(stem), Some(extension)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            if stem != name || !path.is_file() {
                continue;
            }
            found = true;
            let content = read(&path)?;
            if META_EXTENSIONS.contains(&extension) {
                meta = Some(
                    serde_yaml::from_str(&content)
                        .map_err(|e| RenderError::Template(format!("{}: {e}", path.display())))?,
                );
            } else {
                tracing::debug!(template = name, format = extension, "loaded template source");
                template = template.with_format(extension, content);
            }
        }

        if !found {
            return Err(RenderError::NotFound(name.to_string()));
        }
        match meta {
            Some(meta) => template.with_meta(meta, |path| std::fs::read(self.root.join(path))),
            None => Ok(template),
        }
    }
}

impl TemplateProvider for DirectoryProvider {
    fn template(&self, name: &str) -> Result<Arc<dyn TemplateAdapter>, RenderError> {
        Ok(Arc::new(self.load(name)?))
    }
}

fn read(path: &Path) -> Result<String, RenderError> {
    std::fs::read_to_string(path)
        .map_err(|e| RenderError::Template(format!("{}: {e}", path.display())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::{Params, RenderCache};
    use crate::template::RenderContext;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mailforge-{tag}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_directory_template() {
        let dir = temp_dir("dir");
        std::fs::write(dir.join("welcome.html"), "<p>Hi {{ name }}</p>").unwrap();
        std::fs::write(dir.join("welcome.text"), "Hi {{ name }}").unwrap();
        std::fs::write(dir.join("welcome.yaml"), "settings: { tag: w }\nattachments:\n  - { name: logo.png, path: logo.png, cid: true }\n").unwrap();
        std::fs::write(dir.join("logo.png"), b"PNG").unwrap();
        std::fs::write(dir.join("other.html"), "nope").unwrap();

        let provider = DirectoryProvider::new(&dir);
        let template = provider.template("welcome").unwrap();
        let formats: Vec<_> = template.formats().into_iter().collect();
        assert_eq!(formats, ["html", "text"]);

        let mut params = Params::new();
        params.set("name", "Ann");
        let cache = RenderCache::new();
        let context = RenderContext { params: &params, cache: &cache, purpose: "text" };
        assert_eq!(template.render(Some("text"), &context).unwrap(), "Hi Ann");
        assert_eq!(template.attachments()[0].content, b"PNG");
        assert_eq!(template.settings()["tag"], serde_json::json!("w"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_template() {
        let dir = temp_dir("missing");
        let provider = DirectoryProvider::new(&dir);
        assert!(matches!(provider.template("nothing"), Err(RenderError::NotFound(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
