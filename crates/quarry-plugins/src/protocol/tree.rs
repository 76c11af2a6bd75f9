//! Connection tree returned by `connection-tree`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// An executable action attached to a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeAction {
    /// Machine name, such as `select` or `drop-table`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Label shown to the user.
    #[serde(default)]
    pub title: String,
    /// Query run through `exec` when the action is triggered.
    #[serde(default)]
    pub query: String,
}

/// One node of a connection tree.
///
/// The node type is read from `nodeType`, then `type`, then `node_type`;
/// plugins that send several spellings get the first one present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireNode")]
pub struct ConnectionTreeNode {
    /// Identifier, unique among siblings.
    pub key: String,
    /// Label shown to the user.
    #[serde(default)]
    pub label: String,
    /// Plugin-defined node type, such as `database` or `table`.
    #[serde(default)]
    pub node_type: String,
    /// Child nodes in display order.
    #[serde(default)]
    pub children: Vec<ConnectionTreeNode>,
    /// Actions available on this node.
    #[serde(default)]
    pub actions: Vec<TreeAction>,
}

#[derive(Deserialize)]
struct WireNode {
    key: String,
    #[serde(default)]
    label: String,
    #[serde(default, rename = "nodeType")]
    camel_type: Option<String>,
    #[serde(default, rename = "type")]
    bare_type: Option<String>,
    #[serde(default, rename = "node_type")]
    snake_type: Option<String>,
    #[serde(default)]
    children: Vec<ConnectionTreeNode>,
    #[serde(default)]
    actions: Vec<TreeAction>,
}

impl From<WireNode> for ConnectionTreeNode {
    fn from(wire: WireNode) -> Self {
        let node_type = wire
            .camel_type
            .or(wire.bare_type)
            .or(wire.snake_type)
            .unwrap_or_default();
        Self {
            key: wire.key,
            label: wire.label,
            node_type,
            children: wire.children,
            actions: wire.actions,
        }
    }
}

/// Rooted forest of [`ConnectionTreeNode`]s.
///
/// Ownership makes cycles unrepresentable. Sibling keys are made unique by
/// [`ConnectionTree::dedup_siblings`]; equal keys at different levels are
/// left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTree {
    #[serde(default)]
    nodes: Vec<ConnectionTreeNode>,
}

impl ConnectionTree {
    /// Creates a tree from its top-level nodes.
    #[must_use]
    pub const fn new(nodes: Vec<ConnectionTreeNode>) -> Self {
        Self { nodes }
    }

    /// Returns the top-level nodes.
    #[must_use]
    pub fn nodes(&self) -> &[ConnectionTreeNode] {
        &self.nodes
    }

    /// Returns `true` when the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drops later siblings whose key repeats an earlier sibling's key, at
    /// every level. Returns the keys that were dropped.
    pub fn dedup_siblings(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        dedup_level(&mut self.nodes, &mut dropped);
        dropped
    }
}

fn dedup_level(nodes: &mut Vec<ConnectionTreeNode>, dropped: &mut Vec<String>) {
    let mut seen = HashSet::new();
    nodes.retain(|node| {
        let fresh = seen.insert(node.key.clone());
        if !fresh {
            dropped.push(node.key.clone());
        }
        fresh
    });
    for node in nodes {
        dedup_level(&mut node.children, dropped);
    }
}
