// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use serde::{Deserialize, Serialize};

/// Sanity ceilings applied to every on-disk length before it is trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceLimits {
    /// Largest record body a read will accept.
    pub max_record_len: usize,
    /// Largest first-frame snapshot in the header.
    pub max_first_frame_len: usize,
    /// Largest JSON metadata blob (session or layer).
    pub max_metadata_len: usize,
    /// Largest single payload cache entry.
    pub max_payload_len: usize,
    /// Largest count in any header table.
    pub max_table_entries: usize,
    /// Most bytes read from the header offset when opening a trace.
    ///
    /// Sized to hold a full first frame plus a full payload cache.
    pub max_header_len: u64,
}

impl Default for TraceLimits {
    fn default() -> Self {
        Self {
            max_record_len: 256 << 20,
            max_first_frame_len: 300 << 20,
            max_metadata_len: 1 << 20,
            max_payload_len: 512 << 20,
            max_table_entries: 16 << 20,
            max_header_len: (300 << 20) + (1 << 30) + (64 << 20),
        }
    }
}
