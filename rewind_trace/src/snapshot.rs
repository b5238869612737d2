// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Whole-scene snapshots.
//!
//! A snapshot is one record holding every node of a [`NodeMap`] followed by
//! the parent/child edges, so a replay can start from a populated scene
//! rather than from an empty one.
//!
//! ## Layout
//!
//! ```text
//! u32 node_count
//! node_count × {
//!     u8   kind
//!     u64  id
//!     bool texture_export
//!     bool has_surface, [SurfaceInfo]
//!     NodeProperties            (node-group byte from V2)
//!     u64  instance_root
//!     u64  first_level
//!     u32  modifier_count, modifier_count × bytes
//!     u32  group_count, group_count × { u32 count, count × bytes }
//! }
//! u32 root_count
//! root_count × tree
//!
//! tree = u64 id, u32 child_count, child_count × { u64 child_id, tree }
//! ```
//!
//! Modifier blocks are length-prefixed so a decoder that cannot reconstruct
//! one still knows where the next begins. Modifier assets live in the
//! [`PayloadCache`], not inline.
//!
//! Decoding creates nodes as soon as their record is complete and never rolls
//! back: a failure halfway leaves the nodes decoded so far in the map.

use rewind_core::codec::{ByteReader, ByteWriter, DecodeError};
use rewind_core::id::NodeId;
use rewind_core::payload::PayloadCache;
use rewind_core::scene::{
    BuiltinModifiers, MAX_MODIFIER_LEN, Modifier, ModifierSystem, ModifierType, NodeKind, NodeMap,
    NodeProperties, SceneNode, SurfaceInfo, decode_modifier, encode_modifier,
};
use tracing::{debug, warn};

use crate::version;

/// Most nodes a snapshot may claim.
pub const MAX_SNAPSHOT_NODES: usize = 1 << 24;

/// Deepest tree a snapshot may describe.
pub const MAX_TREE_DEPTH: usize = 1024;

const MAX_MODIFIERS_PER_NODE: usize = 1 << 16;

/// Why a snapshot could not be fully decoded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// The bytes are corrupted or truncated.
    #[error("snapshot is damaged: {reason}")]
    Damaged {
        /// What was wrong.
        reason: String,
    },
    /// The bytes are well-formed but describe state this build cannot
    /// reconstruct.
    #[error("{what}")]
    FormatChanged {
        /// Which element, e.g. `modifier format changed [Alpha, size=3]`.
        what: String,
    },
    /// A modifier refers to an asset the payload cache does not hold.
    #[error("asset {key:#x} is missing from the payload cache")]
    MissingAsset {
        /// Payload key.
        key: u64,
    },
}

impl From<DecodeError> for SnapshotError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::MissingPayload { key } => Self::MissingAsset { key },
            other => Self::Damaged {
                reason: other.to_string(),
            },
        }
    }
}

/// What a decode did to the map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Nodes inserted.
    pub nodes_created: usize,
    /// Nodes whose identifier already existed and were left alone.
    pub nodes_skipped: usize,
    /// Edges linked.
    pub edges_linked: usize,
    /// Edges not linked, as `(parent, child)` patched identifiers.
    pub rejected_edges: Vec<(NodeId, NodeId)>,
}

// ---------------------------------------------------------------------------
// Kind dispatch
// ---------------------------------------------------------------------------

type Constructor = fn(NodeId) -> SceneNode;

fn base_node(id: NodeId) -> SceneNode {
    SceneNode::new(id, NodeKind::Base)
}

fn display_node(id: NodeId) -> SceneNode {
    SceneNode::new(id, NodeKind::Display)
}

fn surface_node(id: NodeId) -> SceneNode {
    SceneNode {
        surface: Some(SurfaceInfo::default()),
        ..SceneNode::new(id, NodeKind::Surface)
    }
}

fn proxy_node(id: NodeId) -> SceneNode {
    SceneNode::new(id, NodeKind::Proxy)
}

fn canvas_node(id: NodeId) -> SceneNode {
    SceneNode::new(id, NodeKind::Canvas)
}

fn effect_node(id: NodeId) -> SceneNode {
    SceneNode::new(id, NodeKind::Effect)
}

fn root_node(id: NodeId) -> SceneNode {
    SceneNode::new(id, NodeKind::Root)
}

fn canvas_drawing_node(id: NodeId) -> SceneNode {
    SceneNode::new(id, NodeKind::CanvasDrawing)
}

const CONSTRUCTORS: [(NodeKind, Constructor); 8] = [
    (NodeKind::Base, base_node),
    (NodeKind::Display, display_node),
    (NodeKind::Surface, surface_node),
    (NodeKind::Proxy, proxy_node),
    (NodeKind::Canvas, canvas_node),
    (NodeKind::Effect, effect_node),
    (NodeKind::Root, root_node),
    (NodeKind::CanvasDrawing, canvas_drawing_node),
];

fn construct(code: u8, id: NodeId) -> SceneNode {
    match CONSTRUCTORS.iter().find(|(kind, _)| kind.code() == code) {
        Some((_, make)) => make(id),
        None => {
            warn!(code, ?id, "unknown node kind in snapshot, using a root node");
            root_node(id)
        }
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Serializes every node and edge of `map`.
///
/// Modifier assets are put into `cache`, which must travel with the
/// snapshot for it to decode.
#[must_use]
pub fn encode<M: NodeMap + ?Sized>(map: &M, cache: &mut PayloadCache, version: u32) -> Vec<u8> {
    let with_group = version::has_node_group(version);
    let ids = map.node_ids();
    let mut w = ByteWriter::new();

    w.write_len(ids.len());
    for id in &ids {
        let Some(node) = map.node(*id) else {
            continue;
        };
        encode_node(node, &mut w, cache, with_group);
    }

    let roots = map.roots();
    w.write_len(roots.len());
    for root in roots {
        encode_tree(map, root, &mut w);
    }

    debug!(nodes = ids.len(), len = w.len(), "scene snapshot encoded");
    w.into_bytes()
}

fn encode_node(node: &SceneNode, w: &mut ByteWriter, cache: &mut PayloadCache, with_group: bool) {
    w.write_u8(node.kind.code());
    w.write_u64(node.id.get());
    w.write_bool(node.texture_export);
    match &node.surface {
        Some(info) => {
            w.write_bool(true);
            info.encode(w);
        }
        None => w.write_bool(false),
    }
    node.props.encode(w, with_group);
    w.write_u64(node.instance_root.get());
    w.write_u64(node.first_level.get());

    encode_modifiers(&node.modifiers, w, cache);
    w.write_len(node.draw_groups.len());
    for group in &node.draw_groups {
        encode_modifiers(group, w, cache);
    }
}

fn encode_modifiers(modifiers: &[Modifier], w: &mut ByteWriter, cache: &mut PayloadCache) {
    w.write_len(modifiers.len());
    for m in modifiers {
        let mut block = ByteWriter::new();
        encode_modifier(m, &mut block, cache);
        w.write_bytes(block.as_bytes());
    }
}

fn encode_tree<M: NodeMap + ?Sized>(map: &M, id: NodeId, w: &mut ByteWriter) {
    let children = map.children(id);
    w.write_u64(id.get());
    w.write_len(children.len());
    for child in children {
        w.write_u64(child.get());
        encode_tree(map, child, w);
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Rebuilds a snapshot into `map` with every identifier patched, accepting
/// the built-in modifier formats.
pub fn decode<M: NodeMap + ?Sized>(
    bytes: &[u8],
    map: &mut M,
    cache: &PayloadCache,
    version: u32,
) -> Result<SnapshotReport, SnapshotError> {
    decode_with(bytes, map, cache, version, &BuiltinModifiers)
}

/// Rebuilds a snapshot into `map`, asking `modifiers` which recorded
/// modifier formats the running build understands.
///
/// Nodes whose identifier already exists are skipped. Edges naming a node
/// that does not exist are reported, not linked.
pub fn decode_with<M: NodeMap + ?Sized>(
    bytes: &[u8],
    map: &mut M,
    cache: &PayloadCache,
    version: u32,
    modifiers: &dyn ModifierSystem,
) -> Result<SnapshotReport, SnapshotError> {
    let with_group = version::has_node_group(version);
    let mut r = ByteReader::new(bytes);
    let mut report = SnapshotReport::default();

    let count = r.read_len(MAX_SNAPSHOT_NODES, "snapshot node count")?;
    for _ in 0..count {
        let (node, failure) = decode_node(&mut r, cache, with_group, modifiers)?;
        let id = node.id;
        if map.create(node) {
            map.mark_dirty(id);
            report.nodes_created += 1;
        } else {
            debug!(?id, "snapshot node already present, skipped");
            report.nodes_skipped += 1;
        }
        if let Some(err) = failure {
            return Err(err);
        }
    }

    let roots = r.read_len(MAX_SNAPSHOT_NODES, "snapshot root count")?;
    for _ in 0..roots {
        let root = NodeId(r.read_u64()?).patched();
        decode_tree(&mut r, map, root, 0, &mut report)?;
    }

    debug!(
        created = report.nodes_created,
        skipped = report.nodes_skipped,
        edges = report.edges_linked,
        rejected = report.rejected_edges.len(),
        "scene snapshot decoded"
    );
    Ok(report)
}

/// Reads one node. A modifier that fails to decode still yields the node,
/// holding the modifiers read before it, alongside the error.
fn decode_node(
    r: &mut ByteReader<'_>,
    cache: &PayloadCache,
    with_group: bool,
    system: &dyn ModifierSystem,
) -> Result<(SceneNode, Option<SnapshotError>), SnapshotError> {
    let code = r.read_u8()?;
    let id = NodeId(r.read_u64()?).patched();
    let mut node = construct(code, id);
    node.texture_export = r.read_bool()?;
    if r.read_bool()? {
        node.surface = Some(SurfaceInfo::decode(r)?);
    }
    node.props = NodeProperties::decode(r, with_group)?;
    node.instance_root = patch_nonzero(NodeId(r.read_u64()?));
    node.first_level = patch_nonzero(NodeId(r.read_u64()?));

    let failure = decode_node_modifiers(r, cache, system, &mut node).err();
    Ok((node, failure))
}

fn decode_node_modifiers(
    r: &mut ByteReader<'_>,
    cache: &PayloadCache,
    system: &dyn ModifierSystem,
    node: &mut SceneNode,
) -> Result<(), SnapshotError> {
    decode_modifiers(r, cache, system, "modifier", &mut node.modifiers)?;
    let groups = r.read_len(MAX_MODIFIERS_PER_NODE, "draw group count")?;
    node.draw_groups = Vec::with_capacity(groups.min(r.remaining() / 4));
    for _ in 0..groups {
        let mut group = Vec::new();
        let result = decode_modifiers(r, cache, system, "draw modifier", &mut group);
        node.draw_groups.push(group);
        result?;
    }
    Ok(())
}

fn patch_nonzero(id: NodeId) -> NodeId {
    if id.get() == 0 { id } else { id.patched() }
}

fn decode_modifiers(
    r: &mut ByteReader<'_>,
    cache: &PayloadCache,
    system: &dyn ModifierSystem,
    label: &str,
    out: &mut Vec<Modifier>,
) -> Result<(), SnapshotError> {
    let count = r.read_len(MAX_MODIFIERS_PER_NODE, "modifier count")?;
    out.reserve(count.min(r.remaining() / 4));
    for _ in 0..count {
        let block = r.read_bytes(MAX_MODIFIER_LEN, "modifier block")?;
        let changed = || {
            let ty = block
                .get(..2)
                .map_or("Unknown", |b| ModifierType(u16::from_le_bytes([b[0], b[1]])).name());
            SnapshotError::FormatChanged {
                what: format!("{label} format changed [{ty}, size={}]", block.len()),
            }
        };
        let m = match decode_modifier(&mut ByteReader::new(block), cache) {
            Ok(m) => m,
            Err(DecodeError::MissingPayload { key }) => {
                return Err(SnapshotError::MissingAsset { key });
            }
            Err(_) => return Err(changed()),
        };
        if !system.supports(m.ty, m.version) {
            return Err(changed());
        }
        out.push(m);
    }
    Ok(())
}

fn decode_tree<M: NodeMap + ?Sized>(
    r: &mut ByteReader<'_>,
    map: &mut M,
    expected: NodeId,
    depth: usize,
    report: &mut SnapshotReport,
) -> Result<(), SnapshotError> {
    if depth > MAX_TREE_DEPTH {
        return Err(SnapshotError::Damaged {
            reason: format!("tree deeper than {MAX_TREE_DEPTH}"),
        });
    }
    let id = NodeId(r.read_u64()?).patched();
    if id != expected {
        return Err(SnapshotError::Damaged {
            reason: format!("tree entry {id:?} does not match its edge {expected:?}"),
        });
    }
    let children = r.read_len(MAX_SNAPSHOT_NODES, "child count")?;
    for _ in 0..children {
        let child = NodeId(r.read_u64()?).patched();
        if map.contains(id) && map.contains(child) && map.add_child(id, child) {
            report.edges_linked += 1;
        } else {
            warn!(parent = ?id, ?child, "snapshot edge rejected");
            report.rejected_edges.push((id, child));
        }
        decode_tree(r, map, child, depth + 1, report)?;
    }
    Ok(())
}
