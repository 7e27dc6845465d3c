//! A small markup tree for rendered HTML and XML templates.
//!
//! Parsing is forgiving where HTML templates usually are: void elements such
//! as `<br>` need no closing tag, and end tags close every element opened
//! after their match. Elements and attributes in the [`ANNOTATION_NS`]
//! namespace carry composition data (headers, subject, attachments,
//! settings) and are stripped before the HTML is sent.

use std::borrow::Cow;
use std::fmt::{self, Write as _};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use crate::attachment::AttachmentSpec;

/// Namespace of composition annotations.
pub const ANNOTATION_NS: &str = "urn:mailforge:email";

/// HTML elements that never have content.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Errors raised while parsing markup.
#[derive(Debug, Error)]
pub enum MarkupError {
    /// The underlying XML reader failed.
    #[error("XML error: {0}")]
    Xml(String),

    /// An entity or character reference could not be resolved.
    #[error("Unresolved entity: {0}")]
    Entity(String),

    /// The document has no root element.
    #[error("Document has no root element")]
    NoRoot,

    /// Content appears outside the root element.
    #[error("Content outside the root element")]
    TrailingContent,
}

type Result<T> = std::result::Result<T, MarkupError>;

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name as written.
    pub name: String,
    /// Namespace URI of a prefixed attribute.
    pub namespace: Option<String>,
    /// Name without prefix.
    pub local: String,
    /// Unescaped value.
    pub value: String,
}

/// An element with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written.
    pub name: String,
    /// Namespace URI.
    pub namespace: Option<String>,
    /// Name without prefix.
    pub local: String,
    /// Attributes in source order, including namespace declarations.
    pub attributes: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<Node>,
}

/// A node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element.
    Element(Element),
    /// Unescaped character data.
    Text(String),
    /// A comment, kept verbatim.
    Comment(String),
}

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Content of the `<!DOCTYPE ...>` declaration.
    pub doctype: Option<String>,
    /// The root element.
    pub root: Element,
}

impl Element {
    /// Returns an attribute value by qualified name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Returns an attribute value by namespace and local name.
    #[must_use]
    pub fn attr_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Sets or replaces an unprefixed attribute.
    pub fn set_attr(&mut self, name: &str, value: String) {
        match self.attributes.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                namespace: None,
                local: name.to_string(),
                value,
            }),
        }
    }

    /// Returns true if this element is in `namespace` with local name `local`.
    #[must_use]
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local == local
    }

    /// Returns true if this is an HTML element named `local`, in the XHTML
    /// namespace or none.
    #[must_use]
    pub fn is_html(&self, local: &str) -> bool {
        self.local.eq_ignore_ascii_case(local)
            && self
                .namespace
                .as_deref()
                .is_none_or(|ns| ns == "http://www.w3.org/1999/xhtml")
    }

    /// Iterates over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Returns this element and all descendant elements in document order.
    #[must_use]
    pub fn descendants(&self) -> Vec<&Self> {
        let mut out = vec![self];
        for child in self.elements() {
            out.extend(child.descendants());
        }
        out
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => element.collect_text(out),
                Node::Comment(_) => {}
            }
        }
    }

    /// Removes, at every depth, the child elements matching `remove`.
    pub fn remove_elements(&mut self, remove: &mut impl FnMut(&Self) -> bool) {
        self.children.retain(|node| match node {
            Node::Element(element) => !remove(element),
            _ => true,
        });
        for node in &mut self.children {
            if let Node::Element(element) = node {
                element.remove_elements(remove);
            }
        }
    }

    /// Calls `visit` on this element and every descendant element.
    pub fn visit_mut(&mut self, visit: &mut impl FnMut(&mut Self)) {
        visit(self);
        for node in &mut self.children {
            if let Node::Element(element) = node {
                element.visit_mut(visit);
            }
        }
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", attr.name, escape(&attr.value, true));
        }
        if self.children.is_empty() && is_void(&self.local) {
            out.push_str(" />");
            return;
        }
        out.push('>');
        let raw_text = self.is_html("style") || self.is_html("script");
        for node in &self.children {
            match node {
                Node::Element(element) => element.write(out),
                Node::Text(text) if raw_text => out.push_str(text),
                Node::Text(text) => out.push_str(&escape(text, false)),
                Node::Comment(comment) => {
                    let _ = write!(out, "<!--{comment}-->");
                }
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

impl Document {
    /// Parses markup text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed markup, unknown entities, a missing
    /// root element, or content outside the root.
    pub fn parse(source: &str) -> Result<Self> {
        Parser::default().run(source)
    }

    /// Header annotations in document order.
    ///
    /// `<m:header name="X" value="v"/>` and `<m:header name="X">v</m:header>`
    /// declare headers directly; `m:header="X"` on any element uses that
    /// element's text as the value.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for element in self.root.descendants() {
            if element.is(ANNOTATION_NS, "header") {
                if let Some(name) = element.attr("name") {
                    let value = element
                        .attr("value")
                        .map_or_else(|| element.text(), str::to_string);
                    out.push((name.to_string(), value.trim().to_string()));
                }
            } else if let Some(name) = element.attr_ns(ANNOTATION_NS, "header") {
                out.push((name.to_string(), element.text().trim().to_string()));
            }
        }
        out
    }

    /// Text of all subject annotations joined by a space, if any.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        let parts: Vec<String> = self
            .root
            .descendants()
            .into_iter()
            .filter(|e| {
                e.is(ANNOTATION_NS, "subject")
                    || e.attr_ns(ANNOTATION_NS, "subject") == Some("content")
            })
            .map(Element::text)
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    /// Attachment annotations.
    #[must_use]
    pub fn attachments(&self) -> Vec<AttachmentSpec> {
        self.root
            .descendants()
            .into_iter()
            .filter(|e| e.is(ANNOTATION_NS, "attachment"))
            .filter_map(|e| {
                let name = e.attr("name")?;
                Some(AttachmentSpec {
                    name: name.to_string(),
                    content_type: e.attr("content-type").map(str::to_string),
                    cid: e.attr("cid").is_some_and(|v| v.eq_ignore_ascii_case("true")),
                    value: Some(e.attr("value").map_or_else(|| e.text(), str::to_string)),
                    encoding: e.attr("encoding").map(str::to_string),
                    path: None,
                })
            })
            .collect()
    }

    /// Settings declared with `<m:env name="...">value</m:env>`.
    #[must_use]
    pub fn env(&self) -> Vec<(String, String)> {
        self.root
            .descendants()
            .into_iter()
            .filter(|e| e.is(ANNOTATION_NS, "env"))
            .filter_map(|e| Some((e.attr("name")?.to_string(), e.text().trim().to_string())))
            .collect()
    }

    /// Removes annotation elements, annotation attributes, and declarations
    /// of the annotation namespace.
    pub fn strip_annotations(&mut self) {
        self.root
            .remove_elements(&mut |e| e.namespace.as_deref() == Some(ANNOTATION_NS));
        self.root.visit_mut(&mut |e| {
            e.attributes.retain(|a| {
                let declares = (a.name == "xmlns" || a.name.starts_with("xmlns:"))
                    && a.value == ANNOTATION_NS;
                !declares && a.namespace.as_deref() != Some(ANNOTATION_NS)
            });
        });
    }

    /// Removes `<style type="text/css">` blocks from `<head>`, returning
    /// their contents.
    pub fn take_head_styles(&mut self) -> Vec<String> {
        let mut styles = Vec::new();
        self.root.visit_mut(&mut |element| {
            if !element.is_html("head") {
                return;
            }
            element.children.retain(|node| match node {
                Node::Element(e)
                    if e.is_html("style")
                        && e.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("text/css")) =>
                {
                    styles.push(e.text());
                    false
                }
                _ => true,
            });
        });
        styles
    }

    /// Removes every `<head>` element.
    pub fn remove_head(&mut self) {
        self.root.remove_elements(&mut |e| e.is_html("head"));
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(doctype) = &self.doctype {
            writeln!(f, "<!DOCTYPE {doctype}>")?;
        }
        let mut out = String::new();
        self.root.write(&mut out);
        f.write_str(&out)
    }
}

fn is_void(local: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(local))
}

/// Escapes markup text; non-ASCII becomes numeric character references.
fn escape(text: &str, attribute: bool) -> Cow<'_, str> {
    let needs = |c: char| matches!(c, '&' | '<' | '>') || (attribute && c == '"') || !c.is_ascii();
    if !text.chars().any(needs) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c if !c.is_ascii() => {
                let _ = write!(out, "&#{};", u32::from(c));
            }
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    let value = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "bull" => "\u{2022}",
        "middot" => "\u{b7}",
        "times" => "\u{d7}",
        "euro" => "\u{20ac}",
        _ => return None,
    };
    Some(value)
}

fn unescape(raw: &str) -> Result<String> {
    quick_xml::escape::unescape_with(raw, resolve_entity)
        .map(Cow::into_owned)
        .map_err(|e| MarkupError::Entity(e.to_string()))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| MarkupError::Xml(e.to_string()))
}

/// Namespace bindings declared by one open element; `""` is the default
/// namespace.
type Scope = Vec<(String, String)>;

#[derive(Default)]
struct Parser {
    open: Vec<(Element, Scope)>,
    root: Option<Element>,
    doctype: Option<String>,
}

impl Parser {
    fn run(mut self, source: &str) -> Result<Document> {
        let mut reader = Reader::from_str(source);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            match reader
                .read_event()
                .map_err(|e| MarkupError::Xml(e.to_string()))?
            {
                Event::Start(start) => {
                    let (element, scope) = self.open_element(&start)?;
                    if is_void(&element.local) {
                        self.attach(element)?;
                    } else {
                        self.open.push((element, scope));
                    }
                }
                Event::Empty(start) => {
                    let (element, _) = self.open_element(&start)?;
                    self.attach(element)?;
                }
                Event::End(end) => {
                    let name = utf8(end.name().as_ref())?.to_string();
                    self.close(&name)?;
                }
                Event::Text(text) => {
                    let raw = text.into_inner();
                    let text = unescape(utf8(&raw)?)?;
                    self.push_text(text)?;
                }
                Event::CData(data) => {
                    let raw = data.into_inner();
                    self.push_text(utf8(&raw)?.to_string())?;
                }
                Event::Comment(comment) => {
                    let raw = comment.into_inner();
                    if let Some((parent, _)) = self.open.last_mut() {
                        parent.children.push(Node::Comment(utf8(&raw)?.to_string()));
                    }
                }
                Event::DocType(doctype) => {
                    let raw = doctype.into_inner();
                    self.doctype = Some(utf8(&raw)?.trim().to_string());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        while let Some((element, _)) = self.open.pop() {
            self.attach(element)?;
        }
        let root = self.root.ok_or(MarkupError::NoRoot)?;
        Ok(Document {
            doctype: self.doctype,
            root,
        })
    }

    fn lookup(&self, own: &Scope, prefix: &str) -> Option<String> {
        own.iter()
            .chain(self.open.iter().rev().flat_map(|(_, scope)| scope.iter()))
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
            .filter(|uri| !uri.is_empty())
    }

    fn open_element(&self, start: &BytesStart<'_>) -> Result<(Element, Scope)> {
        let name = utf8(start.name().as_ref())?.to_string();
        let mut raw_attrs = Vec::new();
        for attr in start.html_attributes() {
            let attr = attr.map_err(|e| MarkupError::Xml(e.to_string()))?;
            let key = utf8(attr.key.as_ref())?.to_string();
            let value = unescape(utf8(&attr.value)?)?;
            raw_attrs.push((key, value));
        }

        let scope: Scope = raw_attrs
            .iter()
            .filter_map(|(key, value)| {
                if key == "xmlns" {
                    Some((String::new(), value.clone()))
                } else {
                    key.strip_prefix("xmlns:")
                        .map(|prefix| (prefix.to_string(), value.clone()))
                }
            })
            .collect();

        let (prefix, local) = split_name(&name);
        let namespace = self.lookup(&scope, prefix.unwrap_or(""));

        let attributes = raw_attrs
            .into_iter()
            .map(|(key, value)| {
                let (prefix, local) = split_name(&key);
                let namespace = prefix
                    .filter(|p| *p != "xmlns")
                    .and_then(|p| self.lookup(&scope, p));
                Attribute {
                    local: local.to_string(),
                    name: key,
                    namespace,
                    value,
                }
            })
            .collect();

        Ok((
            Element {
                local: local.to_string(),
                name,
                namespace,
                attributes,
                children: Vec::new(),
            },
            scope,
        ))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        let Some(position) = self.open.iter().rposition(|(e, _)| e.name == name) else {
            return Ok(());
        };
        while self.open.len() > position {
            if let Some((element, _)) = self.open.pop() {
                self.attach(element)?;
            }
        }
        Ok(())
    }

    fn attach(&mut self, element: Element) -> Result<()> {
        if let Some((parent, _)) = self.open.last_mut() {
            parent.children.push(Node::Element(element));
            Ok(())
        } else if self.root.is_none() {
            self.root = Some(element);
            Ok(())
        } else {
            Err(MarkupError::TrailingContent)
        }
    }

    fn push_text(&mut self, text: String) -> Result<()> {
        if let Some((parent, _)) = self.open.last_mut() {
            parent.children.push(Node::Text(text));
            Ok(())
        } else if text.trim().is_empty() {
            Ok(())
        } else {
            Err(MarkupError::TrailingContent)
        }
    }
}

fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ANNOTATED: &str = r#"<html xmlns:m="urn:mailforge:email">
  <head>
    <title m:subject="content">Hello &amp; welcome</title>
    <m:header name="X-Campaign" value="spring"/>
    <style type="text/css">p { color: red; }</style>
  </head>
  <body>
    <p>Dear <span m:header="X-Recipient">Joe</span>,<br>thanks.</p>
    <m:subject>again</m:subject>
    <m:attachment name="note.txt" content-type="text/plain">hi</m:attachment>
    <m:attachment name="dot.png" cid="true" encoding="base64">aGk=</m:attachment>
    <m:env name="max_subject_length">40</m:env>
  </body>
</html>"#;

    #[test]
    fn test_parse_and_extract() {
        let doc = Document::parse(ANNOTATED).unwrap();
        assert_eq!(
            doc.headers(),
            vec![
                ("X-Campaign".to_string(), "spring".to_string()),
                ("X-Recipient".to_string(), "Joe".to_string()),
            ]
        );
        assert_eq!(doc.subject().as_deref(), Some("Hello & welcome again"));
        let attachments = doc.attachments();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].value.as_deref(), Some("hi"));
        assert!(attachments[1].cid);
        assert_eq!(attachments[1].encoding.as_deref(), Some("base64"));
        assert_eq!(doc.env(), vec![("max_subject_length".to_string(), "40".to_string())]);
    }

    #[test]
    fn test_strip_annotations() {
        let mut doc = Document::parse(ANNOTATED).unwrap();
        let styles = doc.take_head_styles();
        doc.strip_annotations();
        assert_eq!(styles, vec!["p { color: red; }".to_string()]);
        let html = doc.to_string();
        assert!(!html.contains("m:"));
        assert!(!html.contains("urn:mailforge"));
        assert!(!html.contains("<style"));
        assert!(html.contains("<span>Joe</span>"));
        assert!(html.contains("<br />thanks."));
        assert!(html.contains("Hello &amp; welcome"));
    }

    #[test]
    fn test_serialize_escapes_non_ascii() {
        let doc = Document::parse("<p title=\"a&quot;b\">caf\u{e9} &nbsp;</p>").unwrap();
        assert_eq!(doc.to_string(), "<p title=\"a&quot;b\">caf&#233; &#160;</p>");
    }

    #[test]
    fn test_doctype_and_void_elements() {
        let doc = Document::parse("<!DOCTYPE html>\n<html><body><img src=\"a.png\"><hr/></body></html>").unwrap();
        assert_eq!(doc.doctype.as_deref(), Some("html"));
        assert_eq!(
            doc.to_string(),
            "<!DOCTYPE html>\n<html><body><img src=\"a.png\" /><hr /></body></html>"
        );
    }

    #[test]
    fn test_unclosed_elements_are_closed_by_parent() {
        let doc = Document::parse("<ul><li>one<li>two</ul>").unwrap();
        assert_eq!(doc.to_string(), "<ul><li>one<li>two</li></li></ul>");
    }

    #[test]
    fn test_default_namespace() {
        let doc = Document::parse(r#"<html xmlns="http://www.w3.org/1999/xhtml"><head/></html>"#).unwrap();
        assert!(doc.root.is_html("html"));
        assert_eq!(doc.root.namespace.as_deref(), Some("http://www.w3.org/1999/xhtml"));
    }

    #[test]
    fn test_rejects_non_markup() {
        assert!(matches!(Document::parse("just text"), Err(MarkupError::TrailingContent)));
        assert!(matches!(Document::parse("   "), Err(MarkupError::NoRoot)));
        assert!(matches!(Document::parse("<a/><b/>"), Err(MarkupError::TrailingContent)));
    }

    #[test]
    fn test_remove_head() {
        let mut doc = Document::parse("<html><head><title>x</title></head><body>y</body></html>").unwrap();
        doc.remove_head();
        assert_eq!(doc.to_string(), "<html><body>y</body></html>");
    }
}
