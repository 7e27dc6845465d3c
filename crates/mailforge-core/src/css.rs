//! Stylesheet inlining.
//!
//! Mail clients ignore most `<style>` blocks, so rules are copied into each
//! matching element's `style` attribute. The supported selector subset is
//! type, universal, class, id and attribute selectors combined with
//! descendant and child combinators. Selectors using anything else
//! (pseudo-classes, sibling combinators) are skipped, as are @-rules.
//!
//! Cascade: `!important` first, then specificity, then source order. A
//! pre-existing `style` attribute beats every stylesheet rule.

use crate::markup::{Document, Element, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector {
    parts: Vec<Compound>,
    /// `combinators[i]` joins `parts[i]` and `parts[i + 1]`.
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    property: String,
    value: String,
    important: bool,
}

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    specificity: (u32, u32, u32),
    order: usize,
    declarations: Vec<Declaration>,
}

/// The parts of an element selectors look at.
#[derive(Debug, Clone)]
struct ElementInfo {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
}

impl ElementInfo {
    fn of(element: &Element) -> Self {
        Self {
            tag: element.local.to_ascii_lowercase(),
            id: element.attr("id").map(str::to_string),
            classes: element
                .attr("class")
                .map(|c| c.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            attrs: element
                .attributes
                .iter()
                .map(|a| (a.name.to_ascii_lowercase(), a.value.clone()))
                .collect(),
        }
    }
}

/// Parsed style rules.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    /// Parses CSS text, skipping what the inliner does not support.
    #[must_use]
    pub fn parse(css: &str) -> Self {
        let css = strip_comments(css);
        let mut rules = Vec::new();
        let mut rest = css.as_str();

        while let Some(open) = rest.find('{') {
            let prelude = rest[..open].trim();
            let after = &rest[open + 1..];
            if prelude.starts_with('@') {
                rest = skip_block(after);
                continue;
            }
            let Some(close) = after.find('}') else {
                break;
            };
            let declarations = parse_declarations(&after[..close]);
            rest = &after[close + 1..];
            for text in prelude.split(',') {
                if let Some(selector) = parse_selector(text) {
                    rules.push(Rule {
                        specificity: selector.specificity(),
                        selector,
                        order: rules.len(),
                        declarations: declarations.clone(),
                    });
                }
            }
        }
        tracing::debug!(rules = rules.len(), "parsed stylesheet");
        Self { rules }
    }

    /// Returns true if there are no usable rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Writes the computed declarations of every element below `<html>`
    /// (excluding `<head>`) into its `style` attribute.
    pub fn inline(&self, document: &mut Document) {
        if self.rules.is_empty() {
            return;
        }
        let mut ancestors = Vec::new();
        self.apply(&mut document.root, &mut ancestors);
    }

    fn apply(&self, element: &mut Element, ancestors: &mut Vec<ElementInfo>) {
        if element.is_html("head") {
            return;
        }
        let info = ElementInfo::of(element);
        if let Some(style) = self.computed_style(&info, ancestors, element.attr("style")) {
            element.set_attr("style", style);
        }
        ancestors.push(info);
        for node in &mut element.children {
            if let Node::Element(child) = node {
                self.apply(child, ancestors);
            }
        }
        ancestors.pop();
    }

    fn computed_style(
        &self,
        info: &ElementInfo,
        ancestors: &[ElementInfo],
        inline: Option<&str>,
    ) -> Option<String> {
        let mut matched: Vec<(bool, (u32, u32, u32), usize, &Declaration)> = self
            .rules
            .iter()
            .filter(|rule| rule.selector.matches(info, ancestors))
            .flat_map(|rule| {
                rule.declarations
                    .iter()
                    .map(move |d| (d.important, rule.specificity, rule.order, d))
            })
            .collect();
        if matched.is_empty() {
            return None;
        }
        matched.sort_by_key(|(important, specificity, order, _)| (*important, *specificity, *order));

        let mut properties: Vec<(String, String)> = Vec::new();
        let mut set = |property: &str, value: &str| {
            match properties.iter_mut().find(|(p, _)| p == property) {
                Some(existing) => existing.1 = value.to_string(),
                None => properties.push((property.to_string(), value.to_string())),
            }
        };
        for (_, _, _, declaration) in matched {
            set(&declaration.property, &declaration.value);
        }
        for declaration in parse_declarations(inline.unwrap_or_default()) {
            set(&declaration.property, &declaration.value);
        }

        Some(
            properties
                .iter()
                .map(|(p, v)| format!("{p}: {v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl Selector {
    fn specificity(&self) -> (u32, u32, u32) {
        let count = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
        self.parts.iter().fold((0, 0, 0), |(a, b, c), part| {
            (
                a + u32::from(part.id.is_some()),
                b + count(part.classes.len() + part.attrs.len()),
                c + u32::from(part.tag.is_some()),
            )
        })
    }

    fn matches(&self, element: &ElementInfo, ancestors: &[ElementInfo]) -> bool {
        match self.parts.last() {
            Some(last) if last.matches(element) => self.matches_left(self.parts.len() - 1, ancestors),
            _ => false,
        }
    }

    /// Checks `parts[..index]` against the ancestors of an element matched
    /// by `parts[index]`.
    fn matches_left(&self, index: usize, ancestors: &[ElementInfo]) -> bool {
        if index == 0 {
            return true;
        }
        let target = &self.parts[index - 1];
        match self.combinators[index - 1] {
            Combinator::Child => ancestors.split_last().is_some_and(|(parent, rest)| {
                target.matches(parent) && self.matches_left(index - 1, rest)
            }),
            Combinator::Descendant => (0..ancestors.len()).rev().any(|k| {
                target.matches(&ancestors[k]) && self.matches_left(index - 1, &ancestors[..k])
            }),
        }
    }
}

impl Compound {
    fn matches(&self, element: &ElementInfo) -> bool {
        self.tag.as_ref().is_none_or(|tag| *tag == element.tag)
            && self.id.as_ref().is_none_or(|id| element.id.as_ref() == Some(id))
            && self.classes.iter().all(|c| element.classes.contains(c))
            && self.attrs.iter().all(|(name, expected)| {
                element.attrs.iter().any(|(n, v)| {
                    n == name && expected.as_ref().is_none_or(|e| e == v)
                })
            })
    }

    fn parse(text: &str) -> Option<Self> {
        if text.contains([':', '+', '~']) {
            return None;
        }
        let mut compound = Self::default();
        let ident_len = |s: &str| {
            s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
                .unwrap_or(s.len())
        };

        let mut rest = text;
        if let Some(after) = rest.strip_prefix('*') {
            rest = after;
        } else {
            let len = ident_len(rest);
            if len > 0 {
                compound.tag = Some(rest[..len].to_ascii_lowercase());
                rest = &rest[len..];
            }
        }

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let len = ident_len(after);
                if len == 0 {
                    return None;
                }
                compound.classes.push(after[..len].to_string());
                rest = &after[len..];
            } else if let Some(after) = rest.strip_prefix('#') {
                let len = ident_len(after);
                if len == 0 {
                    return None;
                }
                compound.id = Some(after[..len].to_string());
                rest = &after[len..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']')?;
                let inner = &after[..close];
                let attr = match inner.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_ascii_lowercase(),
                        Some(value.trim().trim_matches(['"', '\'']).to_string()),
                    ),
                    None => (inner.trim().to_ascii_lowercase(), None),
                };
                compound.attrs.push(attr);
                rest = &after[close + 1..];
            } else {
                return None;
            }
        }
        Some(compound)
    }
}

fn parse_selector(text: &str) -> Option<Selector> {
    let spaced = text.replace('>', " > ");
    let mut parts = Vec::new();
    let mut combinators = Vec::new();
    let mut pending = Combinator::Descendant;

    for token in spaced.split_whitespace() {
        if token == ">" {
            if parts.is_empty() {
                return None;
            }
            pending = Combinator::Child;
            continue;
        }
        if !parts.is_empty() {
            combinators.push(pending);
        }
        parts.push(Compound::parse(token)?);
        pending = Combinator::Descendant;
    }
    if parts.is_empty() || combinators.len() + 1 != parts.len() {
        return None;
    }
    Some(Selector { parts, combinators })
}

fn parse_declarations(body: &str) -> Vec<Declaration> {
    body.split(';')
        .filter_map(|item| {
            let (property, value) = item.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let mut value = value.trim();
            let mut important = false;
            if let Some(bang) = value.rfind('!') {
                if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
                    important = true;
                    value = value[..bang].trim_end();
                }
            }
            (!property.is_empty() && !value.is_empty()).then(|| Declaration {
                property,
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Skips to just past the `}` closing a block whose `{` was consumed.
fn skip_block(text: &str) -> &str {
    let mut depth = 1usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &text[i + 1..];
                }
            }
            _ => {}
        }
    }
    ""
}
