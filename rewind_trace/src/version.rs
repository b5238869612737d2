// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Format version gates.
//!
//! | version | change |
//! |---|---|
//! | [`V1`] | 4-byte header offset |
//! | [`V2`] | node-group byte in snapshot node properties |
//! | [`V3`] | 8-byte header offset, animation start times, session metadata |
//!
//! Writers always produce [`LATEST`] unless a test asks otherwise. Readers
//! accept [`MIN_SUPPORTED`]`..=`[`LATEST`] and reject everything else
//! outright.

/// Narrow header offset.
pub const V1: u32 = 1;
/// Snapshot node-group byte.
pub const V2: u32 = 2;
/// Wide header offset and session extras.
pub const V3: u32 = 3;

/// Version written by default.
pub const LATEST: u32 = V3;
/// Oldest version still readable.
pub const MIN_SUPPORTED: u32 = V1;

/// Returns whether `version` can be read and written.
#[must_use]
pub const fn is_supported(version: u32) -> bool {
    version >= MIN_SUPPORTED && version <= LATEST
}

/// Returns the width in bytes of the header offset field.
#[must_use]
pub const fn header_offset_width(version: u32) -> usize {
    if version >= V3 { 8 } else { 4 }
}

/// Returns the file offset where records start.
#[must_use]
pub const fn data_start(version: u32) -> u64 {
    8 + header_offset_width(version) as u64
}

/// Returns whether snapshot node properties carry the node-group byte.
#[must_use]
pub const fn has_node_group(version: u32) -> bool {
    version >= V2
}

/// Returns whether the header carries animation start times and session
/// metadata.
#[must_use]
pub const fn has_session_extras(version: u32) -> bool {
    version >= V3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_range() {
        assert!(!is_supported(0));
        assert!(is_supported(V1) && is_supported(V2) && is_supported(LATEST));
        assert!(!is_supported(LATEST + 1));
    }

    #[test]
    fn offset_width_dispatch() {
        assert_eq!(header_offset_width(V1), 4);
        assert_eq!(header_offset_width(V2), 4);
        assert_eq!(header_offset_width(V3), 8);
        assert_eq!(data_start(V1), 12);
        assert_eq!(data_start(V3), 16);
    }
}
