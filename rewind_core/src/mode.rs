// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capture/replay mode and traffic origin.

use core::fmt;

/// What the engine is currently doing.
///
/// [`Mode::None`] is both the initial state and the torn-down state; every
/// virtualization function is the identity while in it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Inert.
    #[default]
    None,
    /// Capturing a live device's stream.
    Write,
    /// Capturing a synthetic or offline input.
    WriteEmulated,
    /// Replaying alongside another process's live stream.
    Read,
    /// Replaying an offline file with no live producer.
    ReadEmulated,
}

impl Mode {
    /// Returns whether the mode replays a trace.
    #[inline]
    #[must_use]
    pub const fn is_reading(self) -> bool {
        matches!(self, Self::Read | Self::ReadEmulated)
    }

    /// Returns whether the mode captures a trace.
    #[inline]
    #[must_use]
    pub const fn is_writing(self) -> bool {
        matches!(self, Self::Write | Self::WriteEmulated)
    }

    /// Returns whether the mode runs without a live device.
    #[inline]
    #[must_use]
    pub const fn is_emulated(self) -> bool {
        matches!(self, Self::WriteEmulated | Self::ReadEmulated)
    }

    /// Returns whether identifiers of the given origin must be patched.
    ///
    /// In [`Mode::ReadEmulated`] there is no live producer, so everything is
    /// replay traffic. In [`Mode::Read`] only replayed traffic is moved into
    /// the replay namespace and the live producer is left alone.
    #[inline]
    #[must_use]
    pub const fn patches(self, origin: Origin) -> bool {
        match self {
            Self::ReadEmulated => true,
            Self::Read => matches!(origin, Origin::Replayed),
            Self::None | Self::Write | Self::WriteEmulated => false,
        }
    }

    /// Returns a short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Write => "write",
            Self::WriteEmulated => "write-emulated",
            Self::Read => "read",
            Self::ReadEmulated => "read-emulated",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a command or identifier came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Produced by a live client of the compositor.
    Live,
    /// Decoded from a trace.
    Replayed,
}
