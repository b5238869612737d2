// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Re-injecting a recorded stream into a live node map.

use rewind_core::command::Packet;
use rewind_core::mode::Mode;
use rewind_core::payload::PayloadCache;
use rewind_core::scene::NodeMap;
use rewind_core::time::{Duration, HostTime};
use rewind_trace::snapshot::{self, SnapshotError, SnapshotReport};
use rewind_trace::{ReadOutcome, TraceError, TraceFile, Track};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::{ApplyReport, CaptureReplayEngine};
use crate::error::EngineError;

/// What one [`ReplaySession::poll`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Packets read and applied.
    pub packets: usize,
    /// Commands applied, deferred and skipped across those packets.
    pub commands: ApplyReport,
    /// Records skipped because they could not be read or decoded.
    pub skipped_corrupt: usize,
    /// The command track is exhausted.
    pub finished: bool,
}

/// One replay from [`prepare`](Self::prepare) to [`stop`](Self::stop).
#[derive(Debug)]
pub struct ReplaySession {
    trace: TraceFile,
    layer: u32,
    record_start: HostTime,
    pause_after: Option<Duration>,
    emulated: bool,
    started: Option<HostTime>,
    first_frame: Option<Result<SnapshotReport, SnapshotError>>,
}

impl ReplaySession {
    /// Opens the trace and loads its header into the engine and `map`.
    ///
    /// A trace whose header cannot be read fails here and replay cannot
    /// start. A first frame that only partly decodes does not: the nodes that
    /// did decode stay in `map` and the outcome is kept in
    /// [`first_frame`](Self::first_frame).
    pub fn prepare<M: NodeMap + ?Sized>(
        engine: &mut CaptureReplayEngine,
        config: &EngineConfig,
        map: &mut M,
    ) -> Result<Self, EngineError> {
        if engine.mode() != Mode::None {
            return Err(EngineError::WrongMode {
                expected: "none",
                actual: engine.mode(),
            });
        }
        let trace = TraceFile::open_with_limits(&config.trace_path, config.limits)?;
        if trace.layer_count() == 0 {
            return Err(TraceError::UnknownLayer(0).into());
        }

        engine.set_cache(trace.take_payload_cache());
        engine.load_animation_start_times(&trace.animation_start_times());

        let frame = trace.first_frame();
        let first_frame = if frame.is_empty() {
            None
        } else {
            let outcome = snapshot::decode(&frame, map, engine.cache(), trace.version());
            match &outcome {
                Ok(report) => debug!(created = report.nodes_created, "first frame decoded"),
                Err(err) => warn!(%err, "first frame decoded partially"),
            }
            Some(outcome)
        };

        info!(
            path = %config.trace_path.display(),
            version = trace.version(),
            packets = trace.record_count(Track::Commands, 0)?,
            "replay prepared"
        );
        Ok(Self {
            record_start: HostTime::from_secs_f64(trace.write_time()),
            trace,
            layer: 0,
            pause_after: config.pause_at_secs.map(Duration::from_secs_f64),
            emulated: config.emulated,
            started: None,
            first_frame,
        })
    }

    /// Returns how the first-frame snapshot decoded, if the trace had one.
    #[must_use]
    pub fn first_frame(&self) -> Option<&Result<SnapshotReport, SnapshotError>> {
        self.first_frame.as_ref()
    }

    /// Returns the trace being replayed.
    #[must_use]
    pub fn trace(&self) -> &TraceFile {
        &self.trace
    }

    /// Starts the replay clock at `now` and puts the engine into a reading
    /// mode.
    pub fn start(&mut self, engine: &mut CaptureReplayEngine, now: HostTime) {
        engine.set_time_correction(now, self.record_start);
        if let Some(after) = self.pause_after {
            engine.pause_at(now, now + after);
        }
        engine.set_mode(if self.emulated {
            Mode::ReadEmulated
        } else {
            Mode::Read
        });
        self.started = Some(now);
        info!(correction_ns = engine.clock().correction(), "replay started");
    }

    /// Applies every command record due at `now`.
    ///
    /// Records that cannot be read or decoded are skipped; the rest of the
    /// track keeps playing.
    pub fn poll<M: NodeMap + ?Sized>(
        &mut self,
        engine: &mut CaptureReplayEngine,
        now: HostTime,
        map: &mut M,
    ) -> Result<PollReport, EngineError> {
        let started = self.started.ok_or(EngineError::NotStarted)?;
        if !engine.mode().is_reading() {
            return Err(EngineError::WrongMode {
                expected: "read",
                actual: engine.mode(),
            });
        }
        let until = engine
            .patch_time(now)
            .saturating_duration_since(started)
            .as_secs_f64();

        let mut report = PollReport::default();
        loop {
            match self.trace.read(Track::Commands, self.layer, until) {
                Ok(ReadOutcome::Record { time, bytes }) => match Packet::decode(&bytes, engine.cache()) {
                    Ok(packet) => {
                        report.commands.merge(engine.apply_replayed(packet, map));
                        report.packets += 1;
                    }
                    Err(err) => {
                        warn!(time, %err, "undecodable packet skipped");
                        report.skipped_corrupt += 1;
                    }
                },
                Ok(ReadOutcome::NotYet) => break,
                Ok(ReadOutcome::EndOfTrack) => {
                    report.finished = true;
                    break;
                }
                Err(err @ TraceError::CorruptRecord { .. }) => {
                    warn!(%err, "corrupt record skipped");
                    report.skipped_corrupt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(report)
    }

    /// Rewinds to the first command record and restarts the clock at `now`.
    ///
    /// Nodes created by the previous pass stay in the map, so the second pass
    /// skips their creation.
    pub fn restart(&mut self, engine: &mut CaptureReplayEngine, now: HostTime) -> Result<(), EngineError> {
        self.trace.restart(Track::Commands, self.layer)?;
        engine.reset_clock();
        self.start(engine, now);
        Ok(())
    }

    /// Removes every replayed node from `map`, drops the payload cache and
    /// returns the engine to [`Mode::None`].
    ///
    /// Returns how many nodes were removed.
    pub fn stop<M: NodeMap + ?Sized>(
        self,
        engine: &mut CaptureReplayEngine,
        map: &mut M,
    ) -> Result<usize, EngineError> {
        let removed = map.filter_patched();
        engine.set_cache(PayloadCache::new());
        engine.set_mode(Mode::None);
        self.trace.close()?;
        info!(removed, "replay stopped");
        Ok(removed)
    }
}
