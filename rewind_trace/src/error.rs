// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use rewind_core::codec::DecodeError;

use crate::track::Track;

/// Errors produced by [`TraceFile`](crate::TraceFile).
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The underlying storage failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The file does not start with the trace magic tag.
    #[error("not a trace file (magic {found:02x?})")]
    BadMagic {
        /// The four bytes found instead.
        found: [u8; 4],
    },
    /// The format version is outside the supported range.
    #[error("unsupported trace version {found} (supported {min}..={max})")]
    UnsupportedVersion {
        /// Version read from the file or requested by the caller.
        found: u32,
        /// Oldest readable version.
        min: u32,
        /// Newest readable version.
        max: u32,
    },
    /// The header could not be trusted.
    #[error("file is damaged: {reason}")]
    Damaged {
        /// What was wrong.
        reason: String,
    },
    /// One record could not be read; the rest of the track is unaffected.
    #[error("record {index} of the {track} track on layer {layer} is corrupted: {reason}")]
    CorruptRecord {
        /// Track the record belongs to.
        track: Track,
        /// Layer the record belongs to.
        layer: u32,
        /// Position in the track.
        index: usize,
        /// What was wrong.
        reason: String,
    },
    /// A record or the header grew past what the format can address.
    #[error("{what} at {value} exceeds the format's addressable range")]
    Overflow {
        /// Which quantity overflowed.
        what: &'static str,
        /// Its value.
        value: u64,
    },
    /// Metadata could not be serialized.
    #[error("metadata serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    /// No such layer.
    #[error("layer {0} does not exist")]
    UnknownLayer(u32),
    /// The file has been closed.
    #[error("trace file is closed")]
    Closed,
    /// The file was opened for replay and cannot be written.
    #[error("trace file is open read-only")]
    ReadOnly,
}

impl TraceError {
    pub(crate) fn damaged(reason: impl Into<String>) -> Self {
        Self::Damaged {
            reason: reason.into(),
        }
    }
}

impl From<DecodeError> for TraceError {
    fn from(err: DecodeError) -> Self {
        Self::damaged(err.to_string())
    }
}
