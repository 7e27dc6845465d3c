//! The declarative MIME structure of a message.
//!
//! A [`Structure`] is a closed tree: containers are `mixed`, `alternative`
//! or `related`, leaves name a message component. It is written in YAML as
//! nested single-key maps:
//!
//! ```yaml
//! mixed:
//!   - alternative:
//!       - text
//!       - related:
//!           type: text/html
//!           children: [html, { attachments: { cid: true } }]
//!   - attachments: { cid: false }
//! ```
//!
//! A container's value is either its child list or a map with `children`,
//! `optimize` and (for `related`) `type`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Multipart container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// `multipart/mixed`
    Mixed,
    /// `multipart/alternative`
    Alternative,
    /// `multipart/related`
    Related,
}

impl ContainerKind {
    /// Returns the multipart subtype.
    #[must_use]
    pub const fn subtype(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Alternative => "alternative",
            Self::Related => "related",
        }
    }

    /// Short name used in generated boundaries.
    #[must_use]
    pub const fn abbrev(self) -> &'static str {
        match self {
            Self::Mixed => "mix",
            Self::Alternative => "alt",
            Self::Related => "rel",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "mixed" => Some(Self::Mixed),
            "alternative" => Some(Self::Alternative),
            "related" => Some(Self::Related),
            _ => None,
        }
    }
}

/// Message components a leaf can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// The plain-text body.
    Text,
    /// The HTML body.
    Html,
    /// The subject. Never produces a body part.
    Subject,
    /// Attachments with the given embedding flag.
    Attachments {
        /// Select embedded (`cid`) attachments instead of downloadable ones.
        embedded: bool,
    },
}

impl Component {
    /// Name matched against the component filter.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::Subject => "subject",
            Self::Attachments { .. } => "attachments",
        }
    }
}

/// A node of the structure tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Structure {
    /// A multipart container.
    Container {
        /// Multipart subtype.
        kind: ContainerKind,
        /// Per-node override of minimal-MIME collapsing.
        optimize: Option<bool>,
        /// `type` parameter of a related container.
        root_type: Option<String>,
        /// Child nodes in output order.
        children: Vec<Structure>,
    },
    /// A component reference.
    Leaf(Component),
}

impl Structure {
    /// Creates a container with default options.
    #[must_use]
    pub const fn container(kind: ContainerKind, children: Vec<Self>) -> Self {
        Self::Container {
            kind,
            optimize: None,
            root_type: None,
            children,
        }
    }

    /// Reads a structure from a YAML value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedStructure`] for unknown kinds or
    /// malformed nodes.
    pub fn from_yaml(value: serde_yaml::Value) -> Result<Self> {
        let raw: RawNode = serde_yaml::from_value(value)
            .map_err(|e| Error::UnsupportedStructure(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Reads a structure from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedStructure`] for unknown kinds or
    /// malformed nodes.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| Error::UnsupportedStructure(e.to_string()))?;
        Self::from_yaml(value)
    }

    /// Returns true if any leaf refers to `component`.
    #[must_use]
    pub fn contains(&self, component: Component) -> bool {
        match self {
            Self::Leaf(c) => *c == component,
            Self::Container { children, .. } => children.iter().any(|c| c.contains(component)),
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, prefix: &str, last: bool, root: bool) -> fmt::Result {
        let (connector, indent) = match (root, last) {
            (true, _) => ("", ""),
            (false, true) => ("`-- ", "    "),
            (false, false) => ("|-- ", "|   "),
        };
        match self {
            Self::Leaf(Component::Attachments { embedded }) => {
                writeln!(f, "{prefix}{connector}attachments(cid={embedded})")
            }
            Self::Leaf(component) => writeln!(f, "{prefix}{connector}{}", component.name()),
            Self::Container {
                kind,
                root_type,
                children,
                ..
            } => {
                match root_type {
                    Some(t) => writeln!(f, "{prefix}{connector}{} (type={t})", kind.subtype())?,
                    None => writeln!(f, "{prefix}{connector}{}", kind.subtype())?,
                }
                let child_prefix = format!("{prefix}{indent}");
                for (i, child) in children.iter().enumerate() {
                    child.write_tree(f, &child_prefix, i + 1 == children.len(), false)?;
                }
                Ok(())
            }
        }
    }
}

impl Default for Structure {
    /// `mixed[alternative[text, related[html, cid attachments]], attachments]`
    fn default() -> Self {
        Self::container(
            ContainerKind::Mixed,
            vec![
                Self::container(
                    ContainerKind::Alternative,
                    vec![
                        Self::Leaf(Component::Text),
                        Self::Container {
                            kind: ContainerKind::Related,
                            optimize: None,
                            root_type: Some("text/html".to_string()),
                            children: vec![
                                Self::Leaf(Component::Html),
                                Self::Leaf(Component::Attachments { embedded: true }),
                            ],
                        },
                    ],
                ),
                Self::Leaf(Component::Attachments { embedded: false }),
            ],
        )
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, "", true, true)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Name(String),
    Tagged(BTreeMap<String, RawBody>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBody {
    Children(Vec<RawNode>),
    Options(RawOptions),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawOptions {
    optimize: Option<bool>,
    #[serde(rename = "type")]
    root_type: Option<String>,
    cid: Option<bool>,
    children: Vec<RawNode>,
}

fn leaf_named(name: &str, cid: Option<bool>) -> Option<Component> {
    match name {
        "text" => Some(Component::Text),
        "html" => Some(Component::Html),
        "subject" => Some(Component::Subject),
        "attachments" => Some(Component::Attachments {
            embedded: cid.unwrap_or(false),
        }),
        _ => None,
    }
}

impl TryFrom<RawNode> for Structure {
    type Error = Error;

    fn try_from(raw: RawNode) -> Result<Self> {
        match raw {
            RawNode::Name(name) => leaf_named(&name, None)
                .map(Self::Leaf)
                .ok_or_else(|| Error::UnsupportedStructure(format!("unknown component: {name}"))),
            RawNode::Tagged(map) => {
                let mut entries = map.into_iter();
                let (Some((name, body)), None) = (entries.next(), entries.next()) else {
                    return Err(Error::UnsupportedStructure(
                        "a structure node must have exactly one kind".to_string(),
                    ));
                };
                let options = match body {
                    RawBody::Children(children) => RawOptions {
                        children,
                        ..RawOptions::default()
                    },
                    RawBody::Options(options) => options,
                };
                if let Some(kind) = ContainerKind::from_name(&name) {
                    let children = options
                        .children
                        .into_iter()
                        .map(Self::try_from)
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Self::Container {
                        kind,
                        optimize: options.optimize,
                        root_type: options.root_type,
                        children,
                    });
                }
                match leaf_named(&name, options.cid) {
                    Some(component) if options.children.is_empty() => Ok(Self::Leaf(component)),
                    Some(_) => Err(Error::UnsupportedStructure(format!(
                        "component {name} cannot have children"
                    ))),
                    None => Err(Error::UnsupportedStructure(format!(
                        "unknown structure kind: {name}"
                    ))),
                }
            }
        }
    }
}
