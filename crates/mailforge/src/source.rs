//! Resolving the template source and YAML parameters given on the command line.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use mailforge_core::{DirectoryProvider, Renderer, SingleProvider, SourceTemplate, TemplateProvider};

/// Argument meaning standard input.
pub const STDIN: &str = "-";

/// Builds the template provider for `source` and picks the template name.
///
/// A file becomes a single-format template named after its stem, with the
/// format taken from its extension. A directory needs an explicit `name`.
/// Standard input is read as HTML.
pub fn provider(
    source: &str,
    name: Option<&str>,
    renderer: Renderer,
) -> Result<(Arc<dyn TemplateProvider>, String)> {
    if source == STDIN {
        let text = read_stdin()?;
        let template = SourceTemplate::html(text).with_renderer(renderer);
        let name = name.unwrap_or("stdin").to_string();
        return Ok((Arc::new(SingleProvider::new(template)), name));
    }

    let path = Path::new(source);
    if path.is_dir() {
        let Some(name) = name else {
            bail!("--name is required when the source is a directory");
        };
        let provider = DirectoryProvider::new(path).with_renderer(renderer);
        tracing::debug!(root = %path.display(), template = name, "using template directory");
        return Ok((Arc::new(provider), name.to_string()));
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))?;
    let format = format_of(path);
    let template = SourceTemplate::new()
        .with_format(format, text)
        .with_renderer(renderer);
    let name = match name {
        Some(name) => name.to_string(),
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("template")
            .to_string(),
    };
    tracing::debug!(path = %path.display(), format, "using template file");
    Ok((Arc::new(SingleProvider::new(template)), name))
}

/// Reads template parameters from a YAML mapping given as a file path,
/// `-` for standard input, or the YAML text itself.
pub fn yaml_params(arg: &str) -> Result<Vec<(String, serde_json::Value)>> {
    let text = if arg == STDIN {
        read_stdin()?
    } else if Path::new(arg).is_file() {
        std::fs::read_to_string(arg).with_context(|| format!("failed to read {arg}"))?
    } else {
        arg.to_string()
    };

    let mapping: serde_yaml::Mapping =
        serde_yaml::from_str(&text).context("parameters must be a YAML mapping")?;
    mapping
        .into_iter()
        .map(|(key, value)| {
            let key = key
                .as_str()
                .ok_or_else(|| anyhow!("parameter names must be strings"))?
                .to_string();
            let value = serde_json::to_value(value)
                .with_context(|| format!("parameter `{key}` cannot be used in a template"))?;
            Ok((key, value))
        })
        .collect()
}

fn format_of(path: &Path) -> &str {
    match path.extension().and_then(|e| e.to_str()) {
        None | Some("htm" | "html" | "xhtml") => "html",
        Some("txt") => "text",
        Some(other) => other,
    }
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("failed to read standard input")?;
    Ok(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_of() {
        assert_eq!(format_of(Path::new("a/welcome.html")), "html");
        assert_eq!(format_of(Path::new("welcome.txt")), "text");
        assert_eq!(format_of(Path::new("welcome.subject")), "subject");
        assert_eq!(format_of(Path::new("welcome")), "html");
    }

    #[test]
    fn test_inline_yaml_params() {
        let params = yaml_params("{ name: Joe, count: 3, tags: [a, b] }").unwrap();
        assert_eq!(
            params,
            [
                ("name".to_string(), json!("Joe")),
                ("count".to_string(), json!(3)),
                ("tags".to_string(), json!(["a", "b"])),
            ]
        );
        assert!(yaml_params("[1, 2]").is_err());
    }

    #[test]
    fn test_file_and_directory_sources() {
        let dir = std::env::temp_dir().join(format!("mailforge-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("welcome.txt");
        std::fs::write(&file, "Hi {{ name }}").unwrap();

        let (single, name) = provider(file.to_str().unwrap(), None, Renderer::Jinja).unwrap();
        assert_eq!(name, "welcome");
        assert!(single.template("welcome").is_ok());

        let dir_source = dir.to_str().unwrap();
        assert!(provider(dir_source, None, Renderer::Jinja).is_err());
        let (_, name) = provider(dir_source, Some("welcome"), Renderer::Jinja).unwrap();
        assert_eq!(name, "welcome");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
