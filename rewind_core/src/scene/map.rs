// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The live node map the engine applies commands to.

use alloc::vec::Vec;

use crate::id::{NodeId, ProcessId};

use super::modifier::Modifier;
use super::node::{NodeProperties, SceneNode, SurfaceInfo};

/// Identifier-addressed access to the compositor's live scene graph.
///
/// The compositor's node runtime implements this for real; [`SceneStore`]
/// implements it in memory. Mutating methods return `false` when a
/// referenced node does not exist, leaving the map unchanged.
///
/// [`SceneStore`]: super::SceneStore
pub trait NodeMap {
    /// Inserts a node. Returns `false` if the identifier is already taken.
    fn create(&mut self, node: SceneNode) -> bool;

    /// Returns whether a node with this identifier exists.
    fn contains(&self, id: NodeId) -> bool;

    /// Returns a node by identifier.
    fn node(&self, id: NodeId) -> Option<&SceneNode>;

    /// Removes a node, detaching it from its parent and orphaning its
    /// children.
    fn remove(&mut self, id: NodeId) -> Option<SceneNode>;

    /// Appends `child` to `parent`'s children, detaching it from any previous
    /// parent. Refuses self-links and links that would form a cycle.
    fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool;

    /// Detaches `child` from its parent. Returns `false` if it had none.
    fn remove_from_parent(&mut self, child: NodeId) -> bool;

    /// Returns a node's parent.
    fn parent(&self, id: NodeId) -> Option<NodeId>;

    /// Returns a node's children in order.
    fn children(&self, id: NodeId) -> Vec<NodeId>;

    /// Returns every node identifier in a stable order.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Replaces a node's scalar properties.
    fn set_properties(&mut self, id: NodeId, props: NodeProperties) -> bool;

    /// Replaces a node's surface fields.
    fn set_surface(&mut self, id: NodeId, info: SurfaceInfo) -> bool;

    /// Appends a property modifier.
    fn push_modifier(&mut self, id: NodeId, modifier: Modifier) -> bool;

    /// Drops every modifier and draw group.
    fn clear_modifiers(&mut self, id: NodeId) -> bool;

    /// Flags a node's content for redraw.
    fn mark_dirty(&mut self, id: NodeId);

    /// Returns the nodes without a parent, in [`node_ids`](Self::node_ids)
    /// order.
    fn roots(&self) -> Vec<NodeId> {
        self.node_ids()
            .into_iter()
            .filter(|id| self.parent(*id).is_none())
            .collect()
    }

    /// Returns the number of nodes.
    fn len(&self) -> usize {
        self.node_ids().len()
    }

    /// Returns whether the map is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every node for which `remove` returns `true`.
    ///
    /// Returns how many nodes were removed.
    fn remove_where(&mut self, remove: &mut dyn FnMut(NodeId) -> bool) -> usize {
        let doomed: Vec<NodeId> = self.node_ids().into_iter().filter(|id| remove(*id)).collect();
        doomed.into_iter().filter(|id| self.remove(*id).is_some()).count()
    }

    /// Removes every replayed node.
    fn filter_patched(&mut self) -> usize {
        self.remove_where(&mut |id| id.is_patched())
    }

    /// Removes every node owned by `pid`.
    fn remove_nodes_of(&mut self, pid: ProcessId) -> usize {
        self.remove_where(&mut |id| id.pid() == pid)
    }
}
