// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene mutation commands and their wire form.
//!
//! A [`Packet`] is one transaction sent by a client process: a transaction
//! timestamp plus an ordered list of [`Command`]s. Capture writes packets
//! into the command track; replay decodes them, rewrites their identifiers
//! and timestamp, and applies them to a [`NodeMap`].
//!
//! Every command has a numeric type code, `type | subtype << 16`, used by the
//! diagnostics histogram.

use alloc::vec::Vec;

use crate::codec::{ByteReader, ByteWriter, DecodeError};
use crate::id::{NodeId, ProcessId};
use crate::payload::PayloadCache;
use crate::scene::{
    Modifier, NodeKind, NodeMap, NodeProperties, SceneNode, SurfaceInfo, decode_modifier,
    encode_modifier,
};
use crate::time::HostTime;

/// Most commands a single decoded packet may claim.
pub const MAX_PACKET_COMMANDS: usize = 1 << 20;

// ---------------------------------------------------------------------------
// Type codes
// ---------------------------------------------------------------------------

const TYPE_NODE: u16 = 0;
const TYPE_TREE: u16 = 1;
const TYPE_PROPERTY: u16 = 2;
const TYPE_MODIFIER: u16 = 3;
const TYPE_ANIMATION: u16 = 4;

const SUB_CREATE: u16 = 0;
const SUB_DESTROY: u16 = 1;
const SUB_ADD_CHILD: u16 = 0;
const SUB_REMOVE_FROM_PARENT: u16 = 1;
const SUB_SET_PROPERTIES: u16 = 0;
const SUB_SET_SURFACE: u16 = 1;
const SUB_ADD_MODIFIER: u16 = 0;
const SUB_CLEAR_MODIFIERS: u16 = 1;
const SUB_START_ANIMATION: u16 = 0;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One scene-graph mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Create a node.
    CreateNode {
        /// New node.
        id: NodeId,
        /// Its kind.
        kind: NodeKind,
    },
    /// Destroy a node.
    DestroyNode {
        /// Node to destroy.
        id: NodeId,
    },
    /// Append `child` under `parent`.
    AddChild {
        /// New parent.
        parent: NodeId,
        /// Node being linked.
        child: NodeId,
    },
    /// Detach a node from its parent.
    RemoveFromParent {
        /// Node being detached.
        child: NodeId,
    },
    /// Replace a node's scalar properties.
    SetProperties {
        /// Target node.
        id: NodeId,
        /// New properties.
        props: NodeProperties,
    },
    /// Replace a node's surface fields.
    SetSurface {
        /// Target node.
        id: NodeId,
        /// New surface fields.
        info: SurfaceInfo,
    },
    /// Append a modifier.
    AddModifier {
        /// Target node.
        id: NodeId,
        /// Modifier to append.
        modifier: Modifier,
    },
    /// Drop all modifiers.
    ClearModifiers {
        /// Target node.
        id: NodeId,
    },
    /// Start a property animation on a node.
    StartAnimation {
        /// Animated node.
        id: NodeId,
        /// Animation identifier, unique per node.
        animation: u64,
        /// Start time on the producer's clock.
        start: HostTime,
    },
}

/// Why a command could not be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// A referenced node does not exist (yet).
    #[error("node {0:?} does not exist")]
    MissingNode(NodeId),
    /// The node to create already exists.
    #[error("node {0:?} already exists")]
    AlreadyExists(NodeId),
    /// The map refused the link.
    #[error("link {parent:?} -> {child:?} refused")]
    LinkRefused {
        /// Parent side.
        parent: NodeId,
        /// Child side.
        child: NodeId,
    },
}

impl Command {
    const fn type_pair(&self) -> (u16, u16) {
        match self {
            Self::CreateNode { .. } => (TYPE_NODE, SUB_CREATE),
            Self::DestroyNode { .. } => (TYPE_NODE, SUB_DESTROY),
            Self::AddChild { .. } => (TYPE_TREE, SUB_ADD_CHILD),
            Self::RemoveFromParent { .. } => (TYPE_TREE, SUB_REMOVE_FROM_PARENT),
            Self::SetProperties { .. } => (TYPE_PROPERTY, SUB_SET_PROPERTIES),
            Self::SetSurface { .. } => (TYPE_PROPERTY, SUB_SET_SURFACE),
            Self::AddModifier { .. } => (TYPE_MODIFIER, SUB_ADD_MODIFIER),
            Self::ClearModifiers { .. } => (TYPE_MODIFIER, SUB_CLEAR_MODIFIERS),
            Self::StartAnimation { .. } => (TYPE_ANIMATION, SUB_START_ANIMATION),
        }
    }

    /// Returns the diagnostic type code, `type | subtype << 16`.
    #[must_use]
    pub const fn type_code(&self) -> u32 {
        let (ty, sub) = self.type_pair();
        ty as u32 | (sub as u32) << 16
    }

    /// Returns the node the command primarily acts on.
    #[must_use]
    pub const fn target(&self) -> NodeId {
        match self {
            Self::CreateNode { id, .. }
            | Self::DestroyNode { id }
            | Self::SetProperties { id, .. }
            | Self::SetSurface { id, .. }
            | Self::AddModifier { id, .. }
            | Self::ClearModifiers { id }
            | Self::StartAnimation { id, .. } => *id,
            Self::AddChild { child, .. } | Self::RemoveFromParent { child } => *child,
        }
    }

    /// Rewrites every embedded node identifier through `f`.
    pub fn patch_ids(&mut self, f: impl Fn(NodeId) -> NodeId) {
        match self {
            Self::AddChild { parent, child } => {
                *parent = f(*parent);
                *child = f(*child);
            }
            Self::CreateNode { id, .. }
            | Self::DestroyNode { id }
            | Self::SetProperties { id, .. }
            | Self::SetSurface { id, .. }
            | Self::AddModifier { id, .. }
            | Self::ClearModifiers { id }
            | Self::StartAnimation { id, .. } => *id = f(*id),
            Self::RemoveFromParent { child } => *child = f(*child),
        }
    }

    /// Applies the command to `map`.
    pub fn apply<M: NodeMap + ?Sized>(&self, map: &mut M) -> Result<(), ApplyError> {
        let require = |map: &M, id: NodeId| {
            if map.contains(id) {
                Ok(())
            } else {
                Err(ApplyError::MissingNode(id))
            }
        };
        match self {
            Self::CreateNode { id, kind } => {
                if !map.create(SceneNode::new(*id, *kind)) {
                    return Err(ApplyError::AlreadyExists(*id));
                }
            }
            Self::DestroyNode { id } => {
                map.remove(*id).ok_or(ApplyError::MissingNode(*id))?;
            }
            Self::AddChild { parent, child } => {
                require(map, *parent)?;
                require(map, *child)?;
                if !map.add_child(*parent, *child) {
                    return Err(ApplyError::LinkRefused {
                        parent: *parent,
                        child: *child,
                    });
                }
            }
            Self::RemoveFromParent { child } => {
                require(map, *child)?;
                map.remove_from_parent(*child);
            }
            Self::SetProperties { id, props } => {
                require(map, *id)?;
                map.set_properties(*id, *props);
            }
            Self::SetSurface { id, info } => {
                require(map, *id)?;
                map.set_surface(*id, info.clone());
            }
            Self::AddModifier { id, modifier } => {
                require(map, *id)?;
                map.push_modifier(*id, modifier.clone());
            }
            Self::ClearModifiers { id } => {
                require(map, *id)?;
                map.clear_modifiers(*id);
            }
            Self::StartAnimation { id, .. } => require(map, *id)?,
        }
        Ok(())
    }

    /// Appends the command to `w`, moving modifier assets into `cache`.
    pub fn encode(&self, w: &mut ByteWriter, cache: &mut PayloadCache) {
        let (ty, sub) = self.type_pair();
        w.write_u16(ty);
        w.write_u16(sub);
        match self {
            Self::CreateNode { id, kind } => {
                w.write_u64(id.0);
                w.write_u8(kind.code());
            }
            Self::DestroyNode { id } | Self::ClearModifiers { id } => w.write_u64(id.0),
            Self::AddChild { parent, child } => {
                w.write_u64(parent.0);
                w.write_u64(child.0);
            }
            Self::RemoveFromParent { child } => w.write_u64(child.0),
            Self::SetProperties { id, props } => {
                w.write_u64(id.0);
                props.encode(w, true);
            }
            Self::SetSurface { id, info } => {
                w.write_u64(id.0);
                info.encode(w);
            }
            Self::AddModifier { id, modifier } => {
                w.write_u64(id.0);
                encode_modifier(modifier, w, cache);
            }
            Self::StartAnimation {
                id,
                animation,
                start,
            } => {
                w.write_u64(id.0);
                w.write_u64(*animation);
                w.write_u64(start.0);
            }
        }
    }

    /// Reads one command written by [`encode`](Self::encode).
    pub fn decode(r: &mut ByteReader<'_>, cache: &PayloadCache) -> Result<Self, DecodeError> {
        let ty = r.read_u16()?;
        let sub = r.read_u16()?;
        let id = NodeId(r.read_u64()?);
        Ok(match (ty, sub) {
            (TYPE_NODE, SUB_CREATE) => {
                let code = r.read_u8()?;
                let kind = NodeKind::from_code(code).ok_or(DecodeError::InvalidTag {
                    what: "node kind",
                    value: u32::from(code),
                })?;
                Self::CreateNode { id, kind }
            }
            (TYPE_NODE, SUB_DESTROY) => Self::DestroyNode { id },
            (TYPE_TREE, SUB_ADD_CHILD) => Self::AddChild {
                parent: id,
                child: NodeId(r.read_u64()?),
            },
            (TYPE_TREE, SUB_REMOVE_FROM_PARENT) => Self::RemoveFromParent { child: id },
            (TYPE_PROPERTY, SUB_SET_PROPERTIES) => Self::SetProperties {
                id,
                props: NodeProperties::decode(r, true)?,
            },
            (TYPE_PROPERTY, SUB_SET_SURFACE) => Self::SetSurface {
                id,
                info: SurfaceInfo::decode(r)?,
            },
            (TYPE_MODIFIER, SUB_ADD_MODIFIER) => Self::AddModifier {
                id,
                modifier: decode_modifier(r, cache)?,
            },
            (TYPE_MODIFIER, SUB_CLEAR_MODIFIERS) => Self::ClearModifiers { id },
            (TYPE_ANIMATION, SUB_START_ANIMATION) => Self::StartAnimation {
                id,
                animation: r.read_u64()?,
                start: HostTime(r.read_u64()?),
            },
            _ => {
                return Err(DecodeError::InvalidTag {
                    what: "command type",
                    value: u32::from(ty) | u32::from(sub) << 16,
                });
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One client transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    /// Sending process.
    pub pid: ProcessId,
    /// Transaction timestamp on the sender's clock.
    pub timestamp: HostTime,
    /// Commands in application order.
    pub commands: Vec<Command>,
}

impl Packet {
    /// Creates an empty packet.
    #[must_use]
    pub fn new(pid: ProcessId, timestamp: HostTime) -> Self {
        Self {
            pid,
            timestamp,
            commands: Vec::new(),
        }
    }

    /// Appends a command, builder style.
    #[must_use]
    pub fn with(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Serializes the packet, moving modifier assets into `cache`.
    #[must_use]
    pub fn encode(&self, cache: &mut PayloadCache) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u32(self.pid.0);
        w.write_u64(self.timestamp.0);
        w.write_len(self.commands.len());
        for command in &self.commands {
            command.encode(&mut w, cache);
        }
        w.into_bytes()
    }

    /// Reads a packet written by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8], cache: &PayloadCache) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let pid = ProcessId(r.read_u32()?);
        let timestamp = HostTime(r.read_u64()?);
        let count = r.read_len(MAX_PACKET_COMMANDS, "packet command count")?;
        // Each command is at least a type pair plus an id.
        let mut commands = Vec::with_capacity(count.min(r.remaining() / 12));
        for _ in 0..count {
            commands.push(Command::decode(&mut r, cache)?);
        }
        Ok(Self {
            pid,
            timestamp,
            commands,
        })
    }
}
