// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Persistent trace container and scene snapshot codec.
//!
//! A trace file holds one capture session: a global header (session start
//! time, owning process ids, a first-frame snapshot, the serialized payload
//! cache, and per-layer tables) plus any number of layers, each a fixed set
//! of append-only [`Track`]s of `(time, bytes)` records.
//!
//! ```text
//! ┌──────┬─────────┬──────────────┬─────────────── ─ ─ ┬──────────────┬────────┐
//! │"RPLY"│ version │ header offset│ records ...         │ layer headers│ header │
//! └──────┴─────────┴──────────────┴─────────────── ─ ─ ┴──────────────┴────────┘
//! ```
//!
//! The header lives after the records and is rewritten on
//! [`flush_headers`](TraceFile::flush_headers) and
//! [`close`](TraceFile::close); the offset field in the prelude is patched to
//! point at it. Its width depends on the format [`version`].
//!
//! - [`TraceFile`]: create/open/write/read/restart/close.
//! - [`snapshot`]: full scene-graph snapshot encode/decode.
//! - [`dump`]: JSON rendering of a scene for offline inspection.

mod error;
mod file;
mod header;
mod limits;
mod track;

pub mod dump;
pub mod snapshot;
pub mod version;

pub use error::TraceError;
pub use file::TraceFile;
pub use header::AnimationStart;
pub use limits::TraceLimits;
pub use track::{ReadOutcome, Track};

/// Magic tag at offset 0 of every trace file.
pub const MAGIC: [u8; 4] = *b"RPLY";
