// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

/// The kinds of stream every layer carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Track {
    /// Scene mutation packets.
    Commands,
    /// Overlay and composition results.
    Composition,
    /// Periodic performance samples.
    Metrics,
    /// Trace-event spans.
    TraceEvents,
    /// Log lines.
    Logs,
}

impl Track {
    /// Number of tracks per layer.
    pub const COUNT: usize = 5;

    /// Every track, in on-disk table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Commands,
        Self::Composition,
        Self::Metrics,
        Self::TraceEvents,
        Self::Logs,
    ];

    /// Returns the position of this track's table in a layer header.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Commands => 0,
            Self::Composition => 1,
            Self::Metrics => 2,
            Self::TraceEvents => 3,
            Self::Logs => 4,
        }
    }

    /// Returns a short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::Composition => "composition",
            Self::Metrics => "metrics",
            Self::TraceEvents => "trace-events",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one [`TraceFile::read`](crate::TraceFile::read).
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome {
    /// The next record was due and has been consumed.
    Record {
        /// Session-relative time in seconds.
        time: f64,
        /// Record body.
        bytes: Vec<u8>,
    },
    /// The next record is later than the requested time; try again later.
    NotYet,
    /// Every record has been consumed.
    EndOfTrack,
}
