// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types for capturing and deterministically replaying a compositor's
//! scene-graph mutation stream.
//!
//! `rewind_core` is `no_std` compatible (with `alloc`). It holds everything
//! that does not touch storage: identifier and time virtualization, the
//! payload cache, the byte codec, and the scene data model that replayed
//! commands are applied to.
//!
//! # Architecture
//!
//! ```text
//!   live producer ──► Packet { Command* } ──► CommandStats (diagnostics)
//!                          │
//!              capture:    ▼                     replay:
//!          encode + PayloadCache            decode + patch ids/time
//!                          │                        │
//!                          ▼                        ▼
//!                    trace container          NodeMap::apply
//! ```
//!
//! **[`id`]**: Bit-packed node and process identifiers with the patched bit
//! and the mock process-id range.
//!
//! **[`time`]**: Nanosecond [`HostTime`](time::HostTime) and
//! [`Duration`](time::Duration).
//!
//! **[`mode`]**: The capture/replay [`Mode`](mode::Mode) and the
//! [`Origin`](mode::Origin) of a piece of traffic.
//!
//! **[`clock`]**: [`ReplayClock`](clock::ReplayClock): time correction and
//! pause/resume bookkeeping.
//!
//! **[`codec`]**: Little-endian [`ByteWriter`](codec::ByteWriter) and
//! bounds-checked [`ByteReader`](codec::ByteReader).
//!
//! **[`payload`]**: First-writer-wins [`PayloadCache`](payload::PayloadCache)
//! for large binary assets.
//!
//! **[`scene`]**: Node model, the [`NodeMap`](scene::NodeMap) collaborator
//! trait, and the in-memory [`SceneStore`](scene::SceneStore).
//!
//! **[`command`]**: Scene mutation commands and their wire form.
//!
//! **[`diag`]**: Lock-free command counters and the recent-packet ring.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod clock;
pub mod codec;
pub mod command;
pub mod diag;
pub mod id;
pub mod mode;
pub mod payload;
pub mod scene;
pub mod time;
