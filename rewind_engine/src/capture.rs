// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording a live mutation stream.

use std::path::PathBuf;
use std::sync::Arc;

use rewind_core::command::{Command, Packet};
use rewind_core::id::ProcessId;
use rewind_core::mode::Mode;
use rewind_core::scene::NodeMap;
use rewind_core::time::HostTime;
use rewind_trace::{TraceFile, Track, snapshot, version};
use serde_json::json;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::engine::CaptureReplayEngine;
use crate::error::EngineError;
use crate::sampler::{MetricSample, MetricsSampler, MetricsSource};

/// One capture from [`start`](Self::start) to [`stop`](Self::stop).
///
/// The session owns the trace file; the engine carries the mode, payload
/// cache and animation table that end up in the trace header.
#[derive(Debug)]
pub struct CaptureSession {
    trace: Arc<TraceFile>,
    layer: u32,
    start: HostTime,
    remove_last: usize,
    metrics_interval: Option<std::time::Duration>,
    sampler: Option<MetricsSampler>,
    packets: usize,
}

impl CaptureSession {
    /// Creates the trace file, snapshots `map` as the first frame and puts
    /// the engine into a writing mode.
    pub fn start<M: NodeMap + ?Sized>(
        engine: &mut CaptureReplayEngine,
        config: &EngineConfig,
        pid: ProcessId,
        map: &M,
        now: HostTime,
    ) -> Result<Self, EngineError> {
        if engine.mode() != Mode::None {
            return Err(EngineError::WrongMode {
                expected: "none",
                actual: engine.mode(),
            });
        }

        let trace = TraceFile::create_with_version(&config.trace_path, version::LATEST, config.limits)?;
        let layer = trace.add_layer()?;
        trace.add_pid(pid);
        trace.set_write_time(now.as_secs_f64());
        trace.set_layer_property(layer, "pid", json!(pid.0))?;
        trace.set_layer_property(layer, "emulated", json!(config.emulated))?;

        let frame = snapshot::encode(map, engine.cache_mut(), version::LATEST);
        let frame_len = frame.len();
        trace.set_first_frame(frame);

        engine.set_mode(if config.emulated {
            Mode::WriteEmulated
        } else {
            Mode::Write
        });
        engine.set_record_start(now);
        info!(
            path = %config.trace_path.display(),
            pid = pid.0,
            nodes = map.len(),
            frame_len,
            "capture started"
        );

        Ok(Self {
            trace: Arc::new(trace),
            layer,
            start: now,
            remove_last: config.remove_last_records,
            metrics_interval: config.metrics_interval(),
            sampler: None,
            packets: 0,
        })
    }

    /// Starts sampling `source` into the metrics track at the configured
    /// interval. Does nothing when sampling is disabled or already running.
    pub fn start_metrics(&mut self, source: impl MetricsSource, now: HostTime) -> Result<(), EngineError> {
        let Some(interval) = self.metrics_interval else {
            return Ok(());
        };
        if self.sampler.is_some() {
            return Ok(());
        }
        let offset = self.relative(now);
        self.sampler = Some(MetricsSampler::spawn(
            Arc::clone(&self.trace),
            self.layer,
            interval,
            offset,
            source,
        )?);
        Ok(())
    }

    /// Returns the trace being written.
    #[must_use]
    pub fn trace(&self) -> &TraceFile {
        &self.trace
    }

    /// Returns how many packets have been recorded.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packets
    }

    /// Records one packet of live commands.
    ///
    /// Modifier assets move into the engine's payload cache and animation
    /// starts into its shadow table.
    pub fn record_packet(
        &mut self,
        engine: &mut CaptureReplayEngine,
        packet: &Packet,
        now: HostTime,
    ) -> Result<(), EngineError> {
        check_writing(engine)?;
        for command in &packet.commands {
            engine.on_command(command);
            if let Command::StartAnimation { id, animation, start } = command {
                engine.observe_animation_start(*id, *animation, *start);
            }
        }
        let bytes = packet.encode(engine.cache_mut());
        let time = self.relative(now);
        self.trace.write(Track::Commands, self.layer, time, &bytes)?;
        engine.end_packet(time, u32::try_from(bytes.len()).unwrap_or(u32::MAX));
        self.packets += 1;
        Ok(())
    }

    /// Records one metrics sample.
    pub fn record_metrics(&self, sample: &MetricSample, now: HostTime) -> Result<(), EngineError> {
        let bytes = sample.to_bytes().map_err(rewind_trace::TraceError::from)?;
        self.trace
            .write(Track::Metrics, self.layer, self.relative(now), &bytes)?;
        Ok(())
    }

    /// Records one log line.
    pub fn record_log(&self, message: &str, now: HostTime) -> Result<(), EngineError> {
        self.trace
            .write(Track::Logs, self.layer, self.relative(now), message.as_bytes())?;
        Ok(())
    }

    /// Finishes the capture: drops the configured number of trailing command
    /// records, writes the header with the payload cache and animation table,
    /// closes the file and returns the engine to [`Mode::None`].
    pub fn stop(mut self, engine: &mut CaptureReplayEngine) -> Result<PathBuf, EngineError> {
        if let Some(sampler) = self.sampler.take() {
            if let Some(err) = sampler.stop() {
                warn!(%err, "metrics sampler reported a write failure");
            }
        }
        let mut removed = 0;
        for _ in 0..self.remove_last {
            if !self.trace.unwrite_last(Track::Commands, self.layer)? {
                break;
            }
            removed += 1;
        }

        self.trace
            .set_animation_start_times(engine.animation_start_times());
        let cache = engine.take_cache();
        let payloads = cache.len();
        self.trace.set_payload_cache(cache);
        let path = self.trace.path();
        let result = self.trace.close();
        engine.set_mode(Mode::None);
        result?;

        info!(
            path = %path.display(),
            packets = self.packets - removed.min(self.packets),
            removed,
            payloads,
            "capture stopped"
        );
        Ok(path)
    }

    fn relative(&self, now: HostTime) -> f64 {
        now.saturating_duration_since(self.start).as_secs_f64()
    }
}

fn check_writing(engine: &CaptureReplayEngine) -> Result<(), EngineError> {
    if engine.mode().is_writing() {
        Ok(())
    } else {
        Err(EngineError::WrongMode {
            expected: "write",
            actual: engine.mode(),
        })
    }
}
