// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channels for [`SceneStore`](super::SceneStore).
//!
//! - [`PROPERTIES`] propagates to descendants: a transform or alpha change
//!   affects everything below the node.
//! - [`CONTENT`] is local: modifiers and draw commands belong to one node.
//!   Replayed nodes are marked here after a snapshot decode.
//! - [`TOPOLOGY`] is marked on create/destroy/link/unlink.

use understory_dirty::Channel;

/// Scalar properties changed; propagates to descendants.
pub const PROPERTIES: Channel = Channel::new(0);

/// Modifiers or draw commands changed; local only.
pub const CONTENT: Channel = Channel::new(1);

/// Tree shape changed.
pub const TOPOLOGY: Channel = Channel::new(2);
