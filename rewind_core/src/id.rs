// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bit-packed node and process identifiers.
//!
//! A [`NodeId`] packs the owning process id into bits 63..32 and a local
//! sequence number into bits 31..0:
//!
//! ```text
//!  63 62 61        32 31                 0
//! ┌──┬──┬───────────┬────────────────────┐
//! │  │P │  owner pid │      local id      │
//! └──┴──┴───────────┴────────────────────┘
//! ```
//!
//! Bit 62 ([`PATCHED_BIT`]) marks an identifier as belonging to the replay
//! namespace. It is the same bit as [`MOCK_PID_BIT`] in the owner half, so
//! patching a node id also moves its owner into the mock process range:
//! `patch(id).pid() == mock_pid(id.pid())`.
//!
//! Real OS process ids stay below [`MOCK_PID_BIT`] (Linux caps them at
//! 2^22), so a mock pid can never be confused with a live one.

use core::fmt;

/// Bit set in a [`ProcessId`] to move it into the mock range.
pub const MOCK_PID_BIT: u32 = 1 << 30;

/// Bit set in a [`NodeId`] once it has been virtualized for replay.
pub const PATCHED_BIT: u64 = (MOCK_PID_BIT as u64) << 32;

const LOCAL_MASK: u64 = 0xFFFF_FFFF;

/// An operating-system process id, or a mock id standing in for one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Returns the mock counterpart of this process id.
    ///
    /// Idempotent: a mock pid maps to itself.
    #[inline]
    #[must_use]
    pub const fn mock(self) -> Self {
        Self(self.0 | MOCK_PID_BIT)
    }

    /// Returns whether this id lies in the mock range.
    #[inline]
    #[must_use]
    pub const fn is_mock(self) -> bool {
        self.0 & MOCK_PID_BIT != 0
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mock() {
            write!(f, "ProcessId(mock {})", self.0 & !MOCK_PID_BIT)
        } else {
            write!(f, "ProcessId({})", self.0)
        }
    }
}

/// A scene-graph node identifier (also used to key cached payloads).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Composes an identifier from its owner and local sequence number.
    #[inline]
    #[must_use]
    pub const fn new(pid: ProcessId, local: u32) -> Self {
        Self(((pid.0 as u64) << 32) | local as u64)
    }

    /// Returns the raw 64-bit value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the owning process id (bits 63..32).
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "shift leaves only the high 32 bits"
    )]
    pub const fn pid(self) -> ProcessId {
        ProcessId((self.0 >> 32) as u32)
    }

    /// Returns the local sequence number (bits 31..0).
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "masked to the low 32 bits"
    )]
    pub const fn local(self) -> u32 {
        (self.0 & LOCAL_MASK) as u32
    }

    /// Returns this identifier moved into the replay namespace.
    #[inline]
    #[must_use]
    pub const fn patched(self) -> Self {
        Self(self.0 | PATCHED_BIT)
    }

    /// Returns this identifier with the replay marker cleared.
    #[inline]
    #[must_use]
    pub const fn unpatched(self) -> Self {
        Self(self.0 & !PATCHED_BIT)
    }

    /// Returns whether the replay marker is set.
    #[inline]
    #[must_use]
    pub const fn is_patched(self) -> bool {
        self.0 & PATCHED_BIT != 0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_patched() { "*" } else { "" };
        write!(
            f,
            "NodeId({}{}:{})",
            marker,
            self.unpatched().pid().0,
            self.local()
        )
    }
}

// ---------------------------------------------------------------------------
// Free-function accessors
// ---------------------------------------------------------------------------

/// Composes a node id from a process id and a local id.
#[inline]
#[must_use]
pub const fn compose(pid: ProcessId, local: u32) -> NodeId {
    NodeId::new(pid, local)
}

/// Composes a capture-issued payload key from a process id and a counter.
#[inline]
#[must_use]
pub const fn compose_data_id(pid: ProcessId, seq: u32) -> u64 {
    NodeId::new(pid, seq).0
}

/// Extracts the owning process id.
#[inline]
#[must_use]
pub const fn extract_pid(id: NodeId) -> ProcessId {
    id.pid()
}

/// Extracts the local sequence number.
#[inline]
#[must_use]
pub const fn extract_local_id(id: NodeId) -> u32 {
    id.local()
}

/// Sets the patched bit. Idempotent.
#[inline]
#[must_use]
pub const fn patch(id: NodeId) -> NodeId {
    id.patched()
}

/// Clears the patched bit.
#[inline]
#[must_use]
pub const fn unpatch(id: NodeId) -> NodeId {
    id.unpatched()
}

/// Tests the patched bit.
#[inline]
#[must_use]
pub const fn is_patched(id: NodeId) -> bool {
    id.is_patched()
}

/// Maps a process id into the mock range.
#[inline]
#[must_use]
pub const fn mock_pid(pid: ProcessId) -> ProcessId {
    pid.mock()
}

/// Tests whether a process id is in the mock range.
#[inline]
#[must_use]
pub const fn is_mock_pid(pid: ProcessId) -> bool {
    pid.is_mock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compose_and_extract() {
        let id = compose(ProcessId(1234), 77);
        assert_eq!(extract_pid(id), ProcessId(1234));
        assert_eq!(extract_local_id(id), 77);
        assert!(!is_patched(id), "fresh ids are live");
    }

    #[test]
    fn patched_bit_is_the_mock_bit_of_the_owner() {
        let id = compose(ProcessId(42), 9);
        assert_eq!(extract_pid(patch(id)), mock_pid(ProcessId(42)));
        assert_eq!(extract_local_id(patch(id)), 9);
        assert_eq!(PATCHED_BIT, 1 << 62);
    }

    #[test]
    fn unpatch_restores_live_id() {
        let id = compose(ProcessId(5), 3);
        assert_eq!(unpatch(patch(id)), id);
    }

    #[test]
    fn debug_marks_patched_ids() {
        let id = compose(ProcessId(5), 3);
        assert_eq!(alloc::format!("{id:?}"), "NodeId(5:3)");
        assert_eq!(alloc::format!("{:?}", patch(id)), "NodeId(*5:3)");
    }

    proptest! {
        #[test]
        fn patch_is_detectable(raw in any::<u64>()) {
            prop_assert!(is_patched(patch(NodeId(raw))));
        }

        #[test]
        fn patch_is_idempotent(raw in any::<u64>()) {
            let once = patch(NodeId(raw));
            prop_assert_eq!(patch(once), once);
        }

        #[test]
        fn mock_pid_never_collides_with_real_pid(real in 0..MOCK_PID_BIT, other in 0..MOCK_PID_BIT) {
            let id = compose(ProcessId(other), 1);
            prop_assert_ne!(mock_pid(ProcessId(real)), extract_pid(id));
            prop_assert!(is_mock_pid(mock_pid(ProcessId(real))));
        }
    }
}
