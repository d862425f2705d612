use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{DenyReason, DocumentError, Verb};

/// One node of a permission document.
///
/// Internal nodes map scope segments (`all`, `id`, or a sub-resource name
/// such as `task`) to child nodes. Leaves map verbs to flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionNode {
    Object(BTreeMap<String, PermissionNode>),
    Leaf(BTreeMap<Verb, bool>),
}

/// Validated per-membership permission tree.
///
/// Documents are checked once, when they are read from storage or accepted
/// from a client, so [`PermissionDocument::check`] never sees a malformed
/// shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct PermissionDocument {
    root: BTreeMap<String, PermissionNode>,
}

impl PermissionDocument {
    pub fn from_root(root: BTreeMap<String, PermissionNode>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &BTreeMap<String, PermissionNode> {
        &self.root
    }

    /// Walk `key` segment by segment and require `verb` to be granted on the
    /// leaf it ends at.
    pub fn check(&self, key: &str, verb: Verb) -> Result<(), DenyReason> {
        let mut scope = &self.root;
        let mut node: Option<&PermissionNode> = None;
        for segment in key.split('.') {
            if let Some(current) = node {
                match current {
                    PermissionNode::Object(children) => scope = children,
                    PermissionNode::Leaf(_) => {
                        return Err(DenyReason::MalformedPath {
                            segment: segment.to_string(),
                        });
                    }
                }
            }
            node = Some(scope.get(segment).ok_or_else(|| DenyReason::MalformedPath {
                segment: segment.to_string(),
            })?);
        }

        match node {
            Some(PermissionNode::Leaf(flags)) if flags.get(&verb).copied().unwrap_or(false) => Ok(()),
            Some(PermissionNode::Leaf(_)) => Err(DenyReason::VerbNotGranted { verb }),
            _ => Err(DenyReason::MalformedPath {
                segment: verb.as_str().to_string(),
            }),
        }
    }

    pub fn allows(&self, key: &str, verb: Verb) -> bool {
        self.check(key, verb).is_ok()
    }

    /// Default document for a regular project member: read everything,
    /// create and edit tasks, no member or project administration.
    pub fn member_template() -> Self {
        Self::from_root(BTreeMap::from([(
            "project".to_string(),
            object([
                ("id", leaf(&[(Verb::Get, true), (Verb::Put, false), (Verb::Delete, false)])),
                (
                    "member",
                    object([
                        ("all", leaf(&[(Verb::Get, true), (Verb::Post, false)])),
                        (
                            "id",
                            leaf(&[(Verb::Get, true), (Verb::Put, false), (Verb::Delete, false)]),
                        ),
                    ]),
                ),
                (
                    "task",
                    object([
                        ("all", leaf(&[(Verb::Get, true), (Verb::Post, true)])),
                        (
                            "id",
                            leaf(&[(Verb::Get, true), (Verb::Put, true), (Verb::Delete, false)]),
                        ),
                    ]),
                ),
            ]),
        )]))
    }

    /// Read-only document.
    pub fn viewer_template() -> Self {
        let read = || leaf(&[(Verb::Get, true)]);
        Self::from_root(BTreeMap::from([(
            "project".to_string(),
            object([
                ("id", read()),
                ("member", object([("all", read()), ("id", read())])),
                ("task", object([("all", read()), ("id", read())])),
            ]),
        )]))
    }
}

fn leaf(flags: &[(Verb, bool)]) -> PermissionNode {
    PermissionNode::Leaf(flags.iter().copied().collect())
}

fn object<const N: usize>(children: [(&str, PermissionNode); N]) -> PermissionNode {
    PermissionNode::Object(
        children
            .into_iter()
            .map(|(segment, node)| (segment.to_string(), node))
            .collect(),
    )
}

impl TryFrom<Value> for PermissionDocument {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(DocumentError::NotAnObject {
                path: "<root>".to_string(),
            });
        };
        match parse_node(map, "")? {
            PermissionNode::Object(root) => Ok(Self { root }),
            PermissionNode::Leaf(_) => Err(DocumentError::LeafAtRoot),
        }
    }
}

fn parse_node(map: Map<String, Value>, path: &str) -> Result<PermissionNode, DocumentError> {
    let verb_keys = map
        .keys()
        .filter(|key| key.parse::<Verb>().is_ok())
        .count();

    if verb_keys == 0 {
        let mut children = BTreeMap::new();
        for (segment, value) in map {
            let child_path = join(path, &segment);
            let Value::Object(child) = value else {
                return Err(DocumentError::NotAnObject { path: child_path });
            };
            children.insert(segment, parse_node(child, &child_path)?);
        }
        return Ok(PermissionNode::Object(children));
    }

    if verb_keys < map.len() {
        return Err(DocumentError::MixedNode {
            path: path.to_string(),
        });
    }

    let mut flags = BTreeMap::new();
    for (name, value) in map {
        let Value::Bool(flag) = value else {
            return Err(DocumentError::NotABoolean {
                path: join(path, &name),
            });
        };
        // Every key was counted as a verb above.
        if let Ok(verb) = name.parse::<Verb>() {
            flags.insert(verb, flag);
        }
    }
    Ok(PermissionNode::Leaf(flags))
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

impl From<PermissionDocument> for Value {
    fn from(document: PermissionDocument) -> Self {
        Value::Object(render(document.root))
    }
}

fn render(children: BTreeMap<String, PermissionNode>) -> Map<String, Value> {
    children
        .into_iter()
        .map(|(segment, node)| {
            let value = match node {
                PermissionNode::Object(nested) => Value::Object(render(nested)),
                PermissionNode::Leaf(flags) => Value::Object(
                    flags
                        .into_iter()
                        .map(|(verb, flag)| (verb.as_str().to_string(), Value::Bool(flag)))
                        .collect(),
                ),
            };
            (segment, value)
        })
        .collect()
}
