// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene-graph data model that captured and replayed commands act on.
//!
//! The compositor's real node runtime lives outside this crate. What the
//! capture/replay engine needs from it is captured by the [`NodeMap`] trait:
//! create, look up and remove nodes by identifier, link parents and children,
//! and mutate a node's properties and modifiers. [`SceneStore`] is an
//! in-memory implementation with struct-of-arrays topology and multi-channel
//! dirty tracking, used by tests, the demo, and offline replay.

pub mod dirty;
mod map;
mod modifier;
mod node;
mod store;

pub use map::NodeMap;
pub use modifier::{
    Asset, BuiltinModifiers, MAX_MODIFIER_LEN, Modifier, ModifierSystem, ModifierType,
    decode_modifier, encode_modifier,
};
pub use node::{MAX_SURFACE_NAME_LEN, NodeKind, NodeProperties, SceneNode, SurfaceInfo};
pub use store::{SceneChanges, SceneStore};
