// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable scene dumps for offline inspection.

use rewind_core::id::NodeId;
use rewind_core::payload::PayloadCache;
use rewind_core::scene::{NodeMap, SceneNode, SceneStore};
use serde_json::{Map, Value, json};

use crate::snapshot::{self, SnapshotError};

/// Returns every parentless node of `map` as a nested JSON tree.
///
/// With `clear_mock_flag`, replayed identifiers are printed as the ids the
/// recording process used.
#[must_use]
pub fn dump_scene<M: NodeMap + ?Sized>(map: &M, clear_mock_flag: bool) -> Value {
    let roots: Vec<Value> = map
        .roots()
        .into_iter()
        .map(|root| dump_node(map, root, clear_mock_flag))
        .collect();
    json!({
        "node_count": map.len(),
        "roots": roots,
    })
}

/// Decodes a snapshot into a scratch scene and dumps it.
pub fn dump_snapshot(
    bytes: &[u8],
    cache: &PayloadCache,
    version: u32,
    clear_mock_flag: bool,
) -> Result<Value, SnapshotError> {
    let mut store = SceneStore::new();
    snapshot::decode(bytes, &mut store, cache, version)?;
    Ok(dump_scene(&store, clear_mock_flag))
}

fn dump_node<M: NodeMap + ?Sized>(map: &M, id: NodeId, clear: bool) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), json!(display_id(id, clear).get()));
    if let Some(node) = map.node(id) {
        describe(node, clear, &mut out);
    }
    let children: Vec<Value> = map
        .children(id)
        .into_iter()
        .map(|child| dump_node(map, child, clear))
        .collect();
    if !children.is_empty() {
        out.insert("children".into(), Value::Array(children));
    }
    Value::Object(out)
}

fn describe(node: &SceneNode, clear: bool, out: &mut Map<String, Value>) {
    out.insert("kind".into(), json!(node.kind.name()));
    out.insert("pid".into(), json!(display_id(node.id, clear).pid().0));
    let props = &node.props;
    out.insert(
        "props".into(),
        json!({
            "alpha": props.alpha,
            "visible": props.visible,
            "on_tree": props.on_tree,
            "priority": props.priority,
            "position_z": props.position_z,
            "transform": props.transform.as_coeffs(),
        }),
    );
    if let Some(surface) = &node.surface {
        out.insert(
            "surface".into(),
            json!({ "name": surface.name, "bundle": surface.bundle }),
        );
    }
    if node.texture_export {
        out.insert("texture_export".into(), Value::Bool(true));
    }
    let modifiers: Vec<Value> = node
        .modifiers
        .iter()
        .chain(node.draw_groups.iter().flatten())
        .map(|m| {
            json!({
                "type": m.ty.name(),
                "version": m.version,
                "size": m.data.len(),
                "asset": m.asset.as_ref().map(|a| a.key),
            })
        })
        .collect();
    if !modifiers.is_empty() {
        out.insert("modifiers".into(), Value::Array(modifiers));
    }
}

fn display_id(id: NodeId, clear: bool) -> NodeId {
    if clear { id.unpatched() } else { id }
}
