//! Per-state key map tries.
//!
//! Each state owns a prefix tree over key symbols. Nodes are stored in an
//! arena vector and referenced by index, so a `Context` can hold its current
//! position as a plain id while the definition is shared behind an `Arc`.

use ahash::AHashMap;

use crate::{
    expressions::ActionList,
    keysym::{KeySym, SymbolTable},
};

/// Index of a node inside its [`KeyTrie`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// The root node of every trie.
    pub const ROOT: Self = Self(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of a key map trie.
///
/// `submaps == None` marks a terminal node. Intermediate nodes created while
/// inserting a longer sequence carry neither action list.
#[derive(Debug, Clone, Default)]
pub struct MapNode {
    submaps: Option<AHashMap<KeySym, NodeId>>,
    map_actions: Option<ActionList>,
    branch_actions: Option<ActionList>,
}

impl MapNode {
    /// Actions fired on entering this node.
    #[must_use]
    pub fn map_actions(&self) -> Option<&ActionList> {
        self.map_actions.as_ref()
    }

    /// Actions fired on leaving this node, either because it is terminal or
    /// because the next key mismatched below it.
    #[must_use]
    pub fn branch_actions(&self) -> Option<&ActionList> {
        self.branch_actions.as_ref()
    }

    /// Returns `true` if this node has no continuations.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.submaps.as_ref().is_none_or(|submaps| submaps.is_empty())
    }
}

/// A prefix tree over key symbols with arena-allocated nodes.
#[derive(Debug, Clone)]
pub struct KeyTrie {
    nodes: Vec<MapNode>,
}

impl KeyTrie {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![MapNode::default()],
        }
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &MapNode {
        &self.nodes[id.index()]
    }

    /// Follows `key` from `from`, trying the key itself and then its
    /// `key-alias`.
    #[must_use]
    pub fn lookup(&self, from: NodeId, key: KeySym, syms: &SymbolTable) -> Option<NodeId> {
        let submaps = self.nodes[from.index()].submaps.as_ref()?;
        if let Some(&next) = submaps.get(&key) {
            return Some(next);
        }
        syms.alias(key).and_then(|alias| submaps.get(&alias)).copied()
    }

    /// Walks `keys` from the root, creating nodes as needed, and returns the
    /// final node's id.
    pub fn insert_seq(&mut self, keys: &[KeySym]) -> NodeId {
        let mut at = NodeId::ROOT;
        for &key in keys {
            let existing = self.nodes[at.index()]
                .submaps
                .get_or_insert_with(AHashMap::new)
                .get(&key)
                .copied();
            at = match existing {
                Some(next) => next,
                None => {
                    let next = NodeId(u32::try_from(self.nodes.len()).expect("trie overflow"));
                    self.nodes.push(MapNode::default());
                    self.nodes[at.index()]
                        .submaps
                        .as_mut()
                        .expect("submaps just created")
                        .insert(key, next);
                    next
                }
            };
        }
        at
    }

    /// Sets the node's map-actions unless some are already present
    /// (first-defined wins).
    pub fn set_map_actions(&mut self, id: NodeId, actions: ActionList) {
        let node = &mut self.nodes[id.index()];
        if node.map_actions.is_none() {
            node.map_actions = Some(actions);
        }
    }

    /// Sets the node's branch-actions unless some are already present.
    pub fn set_branch_actions(&mut self, id: NodeId, actions: ActionList) {
        let node = &mut self.nodes[id.index()];
        if node.branch_actions.is_none() {
            node.branch_actions = Some(actions);
        }
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

impl Default for KeyTrie {
    fn default() -> Self {
        Self::new()
    }
}
