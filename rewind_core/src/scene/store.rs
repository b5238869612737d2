// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory struct-of-arrays [`NodeMap`] with dirty tracking.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use crate::id::NodeId;

use super::dirty;
use super::map::NodeMap;
use super::modifier::Modifier;
use super::node::{NodeProperties, SceneNode, SurfaceInfo};

const INVALID: u32 = u32::MAX;

/// Changes accumulated since the last [`SceneStore::take_changes`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneChanges {
    /// Nodes created.
    pub added: Vec<NodeId>,
    /// Nodes removed.
    pub removed: Vec<NodeId>,
    /// Nodes whose properties changed, including descendants of changed
    /// nodes.
    pub properties: Vec<NodeId>,
    /// Nodes whose modifiers changed or that were flagged for redraw.
    pub content: Vec<NodeId>,
    /// Whether any link was added or removed.
    pub topology_changed: bool,
}

impl SceneChanges {
    /// Returns whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.properties.is_empty()
            && self.content.is_empty()
            && !self.topology_changed
    }
}

/// Struct-of-arrays storage for scene nodes.
///
/// Nodes are addressed by [`NodeId`]; an index maps each identifier to a slot
/// in parallel arrays. Removed nodes free their slot for reuse.
#[derive(Debug)]
pub struct SceneStore {
    // -- Lookup --
    index: BTreeMap<NodeId, u32>,

    // -- Topology --
    parent: Vec<u32>,
    first_child: Vec<u32>,
    next_sibling: Vec<u32>,
    prev_sibling: Vec<u32>,

    // -- Node state --
    nodes: Vec<Option<SceneNode>>,

    // -- Allocation --
    free_list: Vec<u32>,

    // -- Dirty tracking --
    dirty: DirtyTracker<u32>,
    topology_dirty: bool,

    // -- Lifecycle tracking --
    pending_added: Vec<NodeId>,
    pending_removed: Vec<NodeId>,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: BTreeMap::new(),
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            nodes: Vec::new(),
            free_list: Vec::new(),
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            topology_dirty: false,
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
        }
    }

    /// Drains every dirty channel and lifecycle list.
    pub fn take_changes(&mut self) -> SceneChanges {
        let properties: Vec<u32> = self
            .dirty
            .drain(dirty::PROPERTIES)
            .affected()
            .deterministic()
            .run()
            .collect();
        let content: Vec<u32> = self
            .dirty
            .drain(dirty::CONTENT)
            .deterministic()
            .run()
            .collect();
        let _: Vec<u32> = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .collect();

        SceneChanges {
            added: core::mem::take(&mut self.pending_added),
            removed: core::mem::take(&mut self.pending_removed),
            properties: self.ids_of(&properties),
            content: self.ids_of(&content),
            topology_changed: core::mem::replace(&mut self.topology_dirty, false),
        }
    }

    /// Returns the node's depth below its root (roots are depth 0).
    #[must_use]
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        let mut idx = self.slot(id)?;
        let mut depth = 0;
        while self.parent[idx as usize] != INVALID {
            idx = self.parent[idx as usize];
            depth += 1;
        }
        Some(depth)
    }

    fn ids_of(&self, slots: &[u32]) -> Vec<NodeId> {
        slots
            .iter()
            .filter_map(|&idx| self.nodes.get(idx as usize)?.as_ref().map(|n| n.id))
            .collect()
    }

    fn slot(&self, id: NodeId) -> Option<u32> {
        self.index.get(&id).copied()
    }

    fn node_at_mut(&mut self, id: NodeId) -> Option<(u32, &mut SceneNode)> {
        let idx = self.slot(id)?;
        let node = self.nodes[idx as usize].as_mut()?;
        Some((idx, node))
    }

    fn id_at(&self, idx: u32) -> NodeId {
        self.nodes[idx as usize]
            .as_ref()
            .map(|n| n.id)
            .unwrap_or_default()
    }

    fn is_ancestor(&self, ancestor: u32, mut idx: u32) -> bool {
        while idx != INVALID {
            if idx == ancestor {
                return true;
            }
            idx = self.parent[idx as usize];
        }
        false
    }

    fn unlink_from_parent(&mut self, c: u32) {
        let p = self.parent[c as usize];
        let prev = self.prev_sibling[c as usize];
        let next = self.next_sibling[c as usize];
        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }
        self.parent[c as usize] = INVALID;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        self.dirty.remove_dependency(c, p, dirty::PROPERTIES);
        self.dirty.mark_with(c, dirty::PROPERTIES, &EagerPolicy);
        self.dirty.mark(p, dirty::TOPOLOGY);
        self.topology_dirty = true;
    }

    fn link_last(&mut self, p: u32, c: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            // Walk to last child.
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }

        // Child depends on parent for inherited properties.
        let _ = self.dirty.add_dependency(c, p, dirty::PROPERTIES);
        self.dirty.mark_with(c, dirty::PROPERTIES, &EagerPolicy);
        self.dirty.mark(p, dirty::TOPOLOGY);
        self.topology_dirty = true;
    }
}

impl NodeMap for SceneStore {
    fn create(&mut self, node: SceneNode) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        let id = node.id;
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot.
            self.parent[idx as usize] = INVALID;
            self.first_child[idx as usize] = INVALID;
            self.next_sibling[idx as usize] = INVALID;
            self.prev_sibling[idx as usize] = INVALID;
            self.nodes[idx as usize] = Some(node);
            idx
        } else {
            let idx = u32::try_from(self.nodes.len()).unwrap_or(INVALID);
            if idx == INVALID {
                return false;
            }
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.nodes.push(Some(node));
            idx
        };
        self.index.insert(id, idx);
        self.pending_added.push(id);
        self.dirty.mark(idx, dirty::TOPOLOGY);
        self.topology_dirty = true;
        true
    }

    fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    fn node(&self, id: NodeId) -> Option<&SceneNode> {
        let idx = self.slot(id)?;
        self.nodes[idx as usize].as_ref()
    }

    fn remove(&mut self, id: NodeId) -> Option<SceneNode> {
        let idx = self.slot(id)?;

        if self.parent[idx as usize] != INVALID {
            self.unlink_from_parent(idx);
        }
        // Orphan children.
        while self.first_child[idx as usize] != INVALID {
            let c = self.first_child[idx as usize];
            self.unlink_from_parent(c);
        }

        self.dirty.remove_key(idx);
        self.index.remove(&id);
        self.free_list.push(idx);
        self.pending_removed.push(id);
        self.topology_dirty = true;
        self.nodes[idx as usize].take()
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let (Some(p), Some(c)) = (self.slot(parent), self.slot(child)) else {
            return false;
        };
        if self.is_ancestor(c, p) {
            return false;
        }
        if self.parent[c as usize] != INVALID {
            self.unlink_from_parent(c);
        }
        self.link_last(p, c);
        true
    }

    fn remove_from_parent(&mut self, child: NodeId) -> bool {
        match self.slot(child) {
            Some(c) if self.parent[c as usize] != INVALID => {
                self.unlink_from_parent(c);
                true
            }
            _ => false,
        }
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.slot(id)?;
        let p = self.parent[idx as usize];
        (p != INVALID).then(|| self.id_at(p))
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(idx) = self.slot(id) else {
            return out;
        };
        let mut c = self.first_child[idx as usize];
        while c != INVALID {
            out.push(self.id_at(c));
            c = self.next_sibling[c as usize];
        }
        out
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.index.keys().copied().collect()
    }

    fn set_properties(&mut self, id: NodeId, props: NodeProperties) -> bool {
        let Some((idx, node)) = self.node_at_mut(id) else {
            return false;
        };
        node.props = props;
        self.dirty.mark_with(idx, dirty::PROPERTIES, &EagerPolicy);
        true
    }

    fn set_surface(&mut self, id: NodeId, info: SurfaceInfo) -> bool {
        let Some((idx, node)) = self.node_at_mut(id) else {
            return false;
        };
        node.surface = Some(info);
        self.dirty.mark(idx, dirty::CONTENT);
        true
    }

    fn push_modifier(&mut self, id: NodeId, modifier: Modifier) -> bool {
        let Some((idx, node)) = self.node_at_mut(id) else {
            return false;
        };
        node.modifiers.push(modifier);
        self.dirty.mark(idx, dirty::CONTENT);
        true
    }

    fn clear_modifiers(&mut self, id: NodeId) -> bool {
        let Some((idx, node)) = self.node_at_mut(id) else {
            return false;
        };
        node.modifiers.clear();
        node.draw_groups.clear();
        self.dirty.mark(idx, dirty::CONTENT);
        true
    }

    fn mark_dirty(&mut self, id: NodeId) {
        if let Some(idx) = self.slot(id) {
            self.dirty.mark(idx, dirty::CONTENT);
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
