// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node kinds, scalar properties, and the node record.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Affine;

use crate::codec::{ByteReader, ByteWriter, DecodeError};
use crate::id::NodeId;

use super::modifier::Modifier;

/// Longest surface name or bundle name accepted on decode.
pub const MAX_SURFACE_NAME_LEN: usize = 4096;

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// What a node is in the compositor's scene graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    /// Plain grouping node.
    Base,
    /// One physical or virtual display.
    Display,
    /// A client window surface.
    Surface,
    /// Mirrors another node's content.
    Proxy,
    /// Draws recorded commands.
    Canvas,
    /// Applies a post-process effect to its subtree.
    Effect,
    /// The top of a client's tree.
    Root,
    /// Canvas whose commands are replayed lazily.
    CanvasDrawing,
}

impl NodeKind {
    /// Every kind, in code order.
    pub const ALL: [Self; 8] = [
        Self::Base,
        Self::Display,
        Self::Surface,
        Self::Proxy,
        Self::Canvas,
        Self::Effect,
        Self::Root,
        Self::CanvasDrawing,
    ];

    /// Returns the stable wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Base => 0,
            Self::Display => 1,
            Self::Surface => 2,
            Self::Proxy => 3,
            Self::Canvas => 4,
            Self::Effect => 5,
            Self::Root => 6,
            Self::CanvasDrawing => 7,
        }
    }

    /// Looks up a kind by wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Base,
            1 => Self::Display,
            2 => Self::Surface,
            3 => Self::Proxy,
            4 => Self::Canvas,
            5 => Self::Effect,
            6 => Self::Root,
            7 => Self::CanvasDrawing,
            _ => return None,
        })
    }

    /// Returns the kind's display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Base => "Base",
            Self::Display => "Display",
            Self::Surface => "Surface",
            Self::Proxy => "Proxy",
            Self::Canvas => "Canvas",
            Self::Effect => "Effect",
            Self::Root => "Root",
            Self::CanvasDrawing => "CanvasDrawing",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Scalar per-node properties carried in snapshots and property commands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeProperties {
    /// Z position used for sibling ordering.
    pub position_z: f32,
    /// Z pivot for 3D rotation.
    pub pivot_z: f32,
    /// Scheduling priority.
    pub priority: u32,
    /// Whether the node is attached to a visible tree.
    pub on_tree: bool,
    /// Render-group hint.
    pub node_group: u8,
    /// Local alpha.
    pub alpha: f32,
    /// Whether the node draws at all.
    pub visible: bool,
    /// Local 2D transform.
    pub transform: Affine,
}

impl Default for NodeProperties {
    fn default() -> Self {
        Self {
            position_z: 0.0,
            pivot_z: 0.0,
            priority: 0,
            on_tree: false,
            node_group: 0,
            alpha: 1.0,
            visible: true,
            transform: Affine::IDENTITY,
        }
    }
}

impl NodeProperties {
    /// Appends the properties to `w`.
    ///
    /// `with_group` controls the node-group byte, which older traces lack.
    pub fn encode(&self, w: &mut ByteWriter, with_group: bool) {
        w.write_f32(self.position_z);
        w.write_f32(self.pivot_z);
        w.write_u32(self.priority);
        w.write_bool(self.on_tree);
        if with_group {
            w.write_u8(self.node_group);
        }
        w.write_f32(self.alpha);
        w.write_bool(self.visible);
        for c in self.transform.as_coeffs() {
            w.write_f64(c);
        }
    }

    /// Reads properties written by [`encode`](Self::encode).
    pub fn decode(r: &mut ByteReader<'_>, with_group: bool) -> Result<Self, DecodeError> {
        let position_z = r.read_f32()?;
        let pivot_z = r.read_f32()?;
        let priority = r.read_u32()?;
        let on_tree = r.read_bool()?;
        let node_group = if with_group { r.read_u8()? } else { 0 };
        let alpha = r.read_f32()?;
        let visible = r.read_bool()?;
        let mut coeffs = [0.0; 6];
        for c in &mut coeffs {
            *c = r.read_f64()?;
        }
        Ok(Self {
            position_z,
            pivot_z,
            priority,
            on_tree,
            node_group,
            alpha,
            visible,
            transform: Affine::new(coeffs),
        })
    }
}

/// Fields that only surface nodes carry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Window name.
    pub name: String,
    /// Owning application bundle.
    pub bundle: String,
    /// Surface type code (app window, leash, self-drawing, ...).
    pub surface_type: u8,
    /// Background alpha, 0-255.
    pub background_alpha: u8,
    /// Global alpha, 0-255.
    pub global_alpha: u8,
}

impl SurfaceInfo {
    /// Appends the surface fields to `w`.
    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_str(&self.name);
        w.write_str(&self.bundle);
        w.write_u8(self.surface_type);
        w.write_u8(self.background_alpha);
        w.write_u8(self.global_alpha);
    }

    /// Reads surface fields written by [`encode`](Self::encode).
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: r.read_string(MAX_SURFACE_NAME_LEN, "surface name")?,
            bundle: r.read_string(MAX_SURFACE_NAME_LEN, "bundle name")?,
            surface_type: r.read_u8()?,
            background_alpha: r.read_u8()?,
            global_alpha: r.read_u8()?,
        })
    }
}

// ---------------------------------------------------------------------------
// SceneNode
// ---------------------------------------------------------------------------

/// One node's full state, excluding its tree links.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    /// Identifier.
    pub id: NodeId,
    /// Kind.
    pub kind: NodeKind,
    /// Whether the node's texture is exported to another process.
    pub texture_export: bool,
    /// Surface-only fields.
    pub surface: Option<SurfaceInfo>,
    /// Scalar properties.
    pub props: NodeProperties,
    /// Root of the UI instance the node belongs to.
    pub instance_root: NodeId,
    /// First-level ancestor under the instance root.
    pub first_level: NodeId,
    /// Property modifiers in application order.
    pub modifiers: Vec<Modifier>,
    /// Draw-command modifiers, grouped by draw slot.
    pub draw_groups: Vec<Vec<Modifier>>,
}

impl SceneNode {
    /// Creates a node with default properties and no modifiers.
    #[must_use]
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            texture_export: false,
            surface: None,
            props: NodeProperties::default(),
            instance_root: NodeId::default(),
            first_level: NodeId::default(),
            modifiers: Vec::new(),
            draw_groups: Vec::new(),
        }
    }

    /// Returns the number of modifiers including draw-command groups.
    #[must_use]
    pub fn modifier_count(&self) -> usize {
        self.modifiers.len() + self.draw_groups.iter().map(Vec::len).sum::<usize>()
    }
}
