// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capture and deterministic replay of compositor mutation streams.
//!
//! [`CaptureReplayEngine`] is the single context object holding the mode,
//! the replay clock, command diagnostics, the payload cache and the pending
//! queue. Nothing here is global; pass the engine to whatever needs it.
//!
//! A capture runs through a [`CaptureSession`]:
//!
//! ```no_run
//! # use rewind_core::{command::Packet, id::ProcessId, scene::SceneStore, time::HostTime};
//! # use rewind_engine::{CaptureReplayEngine, CaptureSession, EngineConfig};
//! # fn main() -> Result<(), rewind_engine::EngineError> {
//! let config = EngineConfig::live();
//! let mut engine = CaptureReplayEngine::new(config.pending_capacity);
//! let scene = SceneStore::new();
//! let pid = ProcessId(1000);
//!
//! let mut session = CaptureSession::start(&mut engine, &config, pid, &scene, HostTime(1))?;
//! session.record_packet(&mut engine, &Packet::new(pid, HostTime(2)), HostTime(2))?;
//! session.stop(&mut engine)?;
//! # Ok(())
//! # }
//! ```
//!
//! and a replay through a [`ReplaySession`], polled once per frame until it
//! reports [`PollReport::finished`]. Replayed nodes carry patched
//! identifiers, so they coexist with the live scene and
//! [`ReplaySession::stop`] can remove exactly them.

mod capture;
mod config;
mod engine;
mod error;
mod pending;
mod replay;
mod sampler;

pub use capture::CaptureSession;
pub use config::EngineConfig;
pub use engine::{ApplyReport, CaptureReplayEngine};
pub use error::EngineError;
pub use pending::PendingQueue;
pub use replay::{PollReport, ReplaySession};
pub use sampler::{MetricSample, MetricsSampler, MetricsSource};
