// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Captures a synthetic animated scene, then replays it next to a live one.
//!
//! Runs 30 simulated frames of a sliding row of canvases through a capture
//! session, replays the resulting trace into a scene that already holds a
//! live node, and logs the replayed scene as JSON before tearing it down.
//!
//! Pass a TOML file as the first argument to override the engine settings;
//! `RUST_LOG` controls log verbosity.

use kurbo::Affine;
use rewind_core::command::{Command, Packet};
use rewind_core::id::{NodeId, ProcessId};
use rewind_core::scene::{Modifier, ModifierType, NodeKind, NodeMap, NodeProperties, SceneNode, SceneStore};
use rewind_core::time::{Duration, HostTime};
use rewind_engine::{CaptureReplayEngine, CaptureSession, EngineConfig, EngineError, MetricSample, ReplaySession};
use rewind_trace::dump;
use tracing::{error, info};

const FRAME_COUNT: u32 = 30;
const CANVAS_COUNT: u32 = 4;
/// 16.6ms refresh interval in nanoseconds (≈60 Hz).
const REFRESH_INTERVAL_NS: u64 = 16_666_667;

const PRODUCER: ProcessId = ProcessId(4242);
const LIVE: ProcessId = ProcessId(17);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        error!(%err, "demo failed");
        std::process::exit(1);
    }
}

fn run() -> Result<(), EngineError> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig {
            trace_path: std::env::temp_dir().join("rewind-demo.rply"),
            metrics_interval_ms: 0,
            ..EngineConfig::offline()
        },
    };

    capture(&config)?;
    replay(&config)
}

fn node(local: u32) -> NodeId {
    NodeId::new(PRODUCER, local)
}

fn frame_time(frame: u32) -> HostTime {
    HostTime(1_000_000_000 + u64::from(frame) * REFRESH_INTERVAL_NS)
}

fn capture(config: &EngineConfig) -> Result<(), EngineError> {
    let mut scene = SceneStore::new();
    scene.create(SceneNode::new(node(0), NodeKind::Root));
    for i in 1..=CANVAS_COUNT {
        scene.create(SceneNode::new(node(i), NodeKind::Canvas));
        scene.add_child(node(0), node(i));
    }

    let mut engine = CaptureReplayEngine::new(config.pending_capacity);
    let mut session = CaptureSession::start(&mut engine, config, PRODUCER, &scene, frame_time(0))?;

    for frame in 1..=FRAME_COUNT {
        let now = frame_time(frame);
        let mut packet = Packet::new(PRODUCER, now);
        for i in 1..=CANVAS_COUNT {
            let x = f64::from(frame * 4 + i * 100);
            packet = packet.with(Command::SetProperties {
                id: node(i),
                props: NodeProperties {
                    transform: Affine::translate((x, 0.0)),
                    ..NodeProperties::default()
                },
            });
        }
        if frame == 10 {
            let badge = node(CANVAS_COUNT + 1);
            let pixels = vec![0xff_u8; 64 * 64 * 4];
            packet = packet
                .with(Command::CreateNode {
                    id: badge,
                    kind: NodeKind::CanvasDrawing,
                })
                .with(Command::AddChild {
                    parent: node(1),
                    child: badge,
                })
                .with(Command::AddModifier {
                    id: badge,
                    modifier: Modifier::new(ModifierType::IMAGE, 1, vec![64, 64]).with_asset(0xbad9e, 0, &pixels),
                })
                .with(Command::StartAnimation {
                    id: badge,
                    animation: 1,
                    start: now,
                });
        }
        session.record_packet(&mut engine, &packet, now)?;
        session.record_metrics(&MetricSample::default().with("frame", f64::from(frame)), now)?;
    }
    session.record_log("synthetic capture finished", frame_time(FRAME_COUNT))?;

    while let Some(summary) = engine.next_packet_summary() {
        tracing::debug!(
            time = summary.time_secs,
            commands = summary.command_count,
            size = summary.packet_size,
            "packet"
        );
    }
    let path = session.stop(&mut engine)?;
    info!(path = %path.display(), "trace written");
    Ok(())
}

fn replay(config: &EngineConfig) -> Result<(), EngineError> {
    let mut live = SceneStore::new();
    live.create(SceneNode::new(NodeId::new(LIVE, 1), NodeKind::Display));

    let mut engine = CaptureReplayEngine::new(config.pending_capacity);
    let mut session = ReplaySession::prepare(&mut engine, config, &mut live)?;

    let start = HostTime(50_000_000_000);
    session.start(&mut engine, start);
    for frame in 1_u64.. {
        let now = start + Duration(frame * REFRESH_INTERVAL_NS);
        let report = session.poll(&mut engine, now, &mut live)?;
        if report.packets > 0 {
            info!(
                frame,
                packets = report.packets,
                applied = report.commands.applied,
                deferred = report.commands.deferred,
                nodes = live.len(),
                "replayed"
            );
        }
        if report.finished {
            break;
        }
    }
    info!(executed = engine.take_execute_count(), "replay finished");

    if let Some(start) = engine.animation_start_time(node(CANVAS_COUNT + 1).patched(), 1) {
        info!(start = start.as_secs_f64(), "badge animation start in replay time");
    }
    let scene = dump::dump_scene(&live, true);
    info!("replayed scene:\n{}", serde_json::to_string_pretty(&scene).unwrap_or_default());

    let removed = session.stop(&mut engine, &mut live)?;
    info!(removed, remaining = live.len(), "replay torn down");
    Ok(())
}
