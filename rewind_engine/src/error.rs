// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use rewind_core::mode::Mode;
use rewind_trace::TraceError;
use rewind_trace::snapshot::SnapshotError;

/// Errors produced by capture and replay sessions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The trace file failed.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// A scene snapshot could not be decoded.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// The configuration file is not valid TOML for [`EngineConfig`].
    ///
    /// [`EngineConfig`]: crate::EngineConfig
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    /// Reading configuration or spawning a worker failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The operation needs the engine in another mode.
    #[error("engine is in {actual} mode, expected {expected}")]
    WrongMode {
        /// Description of the acceptable modes.
        expected: &'static str,
        /// Current mode.
        actual: Mode,
    },
    /// [`ReplaySession::poll`](crate::ReplaySession::poll) was called before
    /// [`ReplaySession::start`](crate::ReplaySession::start).
    #[error("replay has not been started")]
    NotStarted,
}
