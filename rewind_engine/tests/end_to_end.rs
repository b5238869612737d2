// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capture a scene, replay it next to a live one, and tear it down again.

use std::path::Path;

use rewind_core::command::{Command, Packet};
use rewind_core::id::{NodeId, ProcessId};
use rewind_core::mode::Mode;
use rewind_core::scene::{
    Modifier, ModifierType, NodeKind, NodeMap, NodeProperties, SceneNode, SceneStore,
};
use rewind_core::time::HostTime;
use rewind_engine::{CaptureReplayEngine, CaptureSession, EngineConfig, MetricSample, ReplaySession};
use rewind_trace::{ReadOutcome, TraceFile, TraceLimits, Track};

const PID: ProcessId = ProcessId(1234);

fn id(local: u32) -> NodeId {
    NodeId::new(PID, local)
}

fn at(secs: f64) -> HostTime {
    HostTime::from_secs_f64(secs)
}

fn config(path: &Path) -> EngineConfig {
    EngineConfig {
        trace_path: path.to_path_buf(),
        metrics_interval_ms: 0,
        ..EngineConfig::live()
    }
}

fn initial_scene() -> SceneStore {
    let mut scene = SceneStore::new();
    scene.create(SceneNode::new(id(1), NodeKind::Root));
    scene.create(SceneNode::new(id(2), NodeKind::Surface));
    scene.add_child(id(1), id(2));
    scene
}

/// Records three packets at +0.5 s, +1.0 s and +2.0 s after a start at 100 s.
fn capture(config: &EngineConfig) {
    let mut engine = CaptureReplayEngine::new(config.pending_capacity);
    let scene = initial_scene();
    let mut session = CaptureSession::start(&mut engine, config, PID, &scene, at(100.0)).unwrap();

    let image = Modifier::new(ModifierType::IMAGE, 1, vec![1]).with_asset(77, 16, &[3; 256]);
    let first = Packet::new(PID, at(100.5))
        .with(Command::CreateNode {
            id: id(3),
            kind: NodeKind::Canvas,
        })
        .with(Command::AddChild {
            parent: id(1),
            child: id(3),
        })
        .with(Command::AddModifier {
            id: id(3),
            modifier: image,
        })
        .with(Command::StartAnimation {
            id: id(3),
            animation: 5,
            start: at(100.6),
        });
    session.record_packet(&mut engine, &first, at(100.5)).unwrap();

    let second = Packet::new(PID, at(101.0))
        .with(Command::SetProperties {
            id: id(3),
            props: NodeProperties {
                alpha: 0.5,
                ..NodeProperties::default()
            },
        })
        .with(Command::AddChild {
            parent: id(3),
            child: id(4),
        })
        .with(Command::CreateNode {
            id: id(4),
            kind: NodeKind::Display,
        });
    session.record_packet(&mut engine, &second, at(101.0)).unwrap();

    let third = Packet::new(PID, at(102.0)).with(Command::DestroyNode { id: id(2) });
    session.record_packet(&mut engine, &third, at(102.0)).unwrap();

    session
        .record_metrics(&MetricSample::default().with("fps", 60.0), at(100.7))
        .unwrap();
    session.record_log("captured three packets", at(102.0)).unwrap();
    assert_eq!(engine.take_command_count(), 8);
    session.stop(&mut engine).unwrap();
}

#[test]
fn capture_then_replay_next_to_a_live_scene() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("session.rply"));
    capture(&config);

    let mut live = SceneStore::new();
    let live_root = NodeId::new(ProcessId(77), 1);
    live.create(SceneNode::new(live_root, NodeKind::Root));

    let mut engine = CaptureReplayEngine::new(config.pending_capacity);
    let mut replay = ReplaySession::prepare(&mut engine, &config, &mut live).unwrap();
    let frame = replay.first_frame().unwrap().as_ref().unwrap();
    assert_eq!(frame.nodes_created, 2);
    assert_eq!(live.parent(id(2).patched()), Some(id(1).patched()));
    assert_eq!(engine.cache().len(), 1, "payload cache loaded from the header");

    let start = at(500.0);
    replay.start(&mut engine, start);
    assert_eq!(engine.mode(), Mode::Read);

    let report = replay.poll(&mut engine, at(500.6), &mut live).unwrap();
    assert_eq!(report.packets, 1);
    assert_eq!(report.commands.applied, 4);
    assert_eq!(report.commands.timestamp, at(500.5), "recorded 100.5 s plus the 400 s correction");
    assert!(!report.finished);

    let canvas = live.node(id(3).patched()).unwrap();
    let asset = canvas.modifiers[0].asset.as_ref().unwrap();
    assert_eq!(asset.bytes.len(), 256);
    assert_eq!(asset.skip_bytes, 16);
    assert_eq!(live.parent(id(3).patched()), Some(id(1).patched()));

    let expected_anim = start
        .checked_add(at(100.6).saturating_duration_since(at(100.0)))
        .unwrap();
    assert_eq!(engine.animation_start_time(id(3).patched(), 5), Some(expected_anim));

    let report = replay.poll(&mut engine, at(505.0), &mut live).unwrap();
    assert_eq!(report.packets, 2);
    assert_eq!(report.commands.timestamp, at(502.0));
    assert_eq!(report.commands.deferred, 1, "link before its child exists");
    assert!(report.finished);
    assert!(engine.pending().is_empty());
    assert_eq!(live.parent(id(4).patched()), Some(id(3).patched()));
    assert_eq!(live.node(id(3).patched()).unwrap().props.alpha, 0.5);
    assert!(!live.contains(id(2).patched()));

    assert!(live.contains(live_root));
    assert!(!live.contains(id(1)), "replayed ids never land on raw ids");

    let removed = replay.stop(&mut engine, &mut live).unwrap();
    assert_eq!(removed, 3);
    assert_eq!(live.node_ids(), vec![live_root]);
    assert_eq!(engine.mode(), Mode::None);
    assert!(engine.cache().is_empty());
}

#[test]
fn side_tracks_are_readable_after_capture() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("side.rply"));
    capture(&config);

    let trace = TraceFile::open(&config.trace_path).unwrap();
    let ReadOutcome::Record { time, bytes } = trace.read(Track::Metrics, 0, 10.0).unwrap() else {
        panic!("metrics record missing");
    };
    assert!((time - 0.7).abs() < 1e-6);
    assert_eq!(MetricSample::from_bytes(&bytes).unwrap().values["fps"], 60.0);

    let ReadOutcome::Record { bytes, .. } = trace.read(Track::Logs, 0, 10.0).unwrap() else {
        panic!("log record missing");
    };
    assert_eq!(bytes, b"captured three packets");
    assert_eq!(trace.animation_start_times().len(), 1);
}

#[test]
fn pause_holds_replay_until_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        pause_at_secs: Some(0.75),
        emulated: true,
        ..config(&dir.path().join("pause.rply"))
    };
    capture(&config);

    let mut live = SceneStore::new();
    let mut engine = CaptureReplayEngine::new(config.pending_capacity);
    let mut replay = ReplaySession::prepare(&mut engine, &config, &mut live).unwrap();
    replay.start(&mut engine, at(500.0));
    assert_eq!(engine.mode(), Mode::ReadEmulated);

    let report = replay.poll(&mut engine, at(510.0), &mut live).unwrap();
    assert_eq!(report.packets, 1, "time stops at the pause boundary");
    let report = replay.poll(&mut engine, at(520.0), &mut live).unwrap();
    assert_eq!(report.packets, 0);

    engine.resume(at(520.0));
    let report = replay.poll(&mut engine, at(520.3), &mut live).unwrap();
    assert_eq!(report.packets, 1, "only 0.3 s of replay time passed since resuming");
    let report = replay.poll(&mut engine, at(530.0), &mut live).unwrap();
    assert_eq!(report.packets, 1);
    assert!(report.finished);
}

#[test]
fn oversized_records_are_skipped_during_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.rply");
    let capture_config = config(&path);

    let mut engine = CaptureReplayEngine::new(16);
    let mut session =
        CaptureSession::start(&mut engine, &capture_config, PID, &SceneStore::new(), at(1.0)).unwrap();
    let packets = [
        Packet::new(PID, at(1.1)).with(Command::CreateNode {
            id: id(1),
            kind: NodeKind::Root,
        }),
        Packet::new(PID, at(1.2)).with(Command::AddModifier {
            id: id(1),
            modifier: Modifier::new(ModifierType::DRAW_COMMANDS, 1, vec![0; 4096]),
        }),
        Packet::new(PID, at(1.3)).with(Command::CreateNode {
            id: id(2),
            kind: NodeKind::Base,
        }),
    ];
    for (i, packet) in packets.iter().enumerate() {
        let now = at(1.1 + 0.1 * f64::from(u32::try_from(i).unwrap()));
        session.record_packet(&mut engine, packet, now).unwrap();
    }
    session.stop(&mut engine).unwrap();

    let replay_config = EngineConfig {
        limits: TraceLimits {
            max_record_len: 1024,
            ..TraceLimits::default()
        },
        emulated: true,
        ..capture_config
    };
    let mut live = SceneStore::new();
    let mut replay = ReplaySession::prepare(&mut engine, &replay_config, &mut live).unwrap();
    replay.start(&mut engine, at(50.0));
    let report = replay.poll(&mut engine, at(60.0), &mut live).unwrap();
    assert_eq!(report.packets, 2);
    assert_eq!(report.skipped_corrupt, 1);
    assert!(report.finished);
    assert!(live.contains(id(1).patched()) && live.contains(id(2).patched()));
    assert_eq!(live.node(id(1).patched()).unwrap().modifiers.len(), 0);
}

#[test]
fn damaged_header_prevents_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("damaged.rply");
    let config = config(&path);
    capture(&config);

    let mut bytes = std::fs::read(&path).unwrap();
    let len = bytes.len();
    bytes.truncate(len - 5);
    std::fs::write(&path, &bytes).unwrap();

    let mut engine = CaptureReplayEngine::new(4);
    let mut live = SceneStore::new();
    assert!(ReplaySession::prepare(&mut engine, &config, &mut live).is_err());
    assert!(live.is_empty());
    assert_eq!(engine.mode(), Mode::None);
}

#[test]
fn restart_replays_from_the_first_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        emulated: true,
        ..config(&dir.path().join("loop.rply"))
    };
    capture(&config);

    let mut live = SceneStore::new();
    let mut engine = CaptureReplayEngine::new(config.pending_capacity);
    let mut replay = ReplaySession::prepare(&mut engine, &config, &mut live).unwrap();
    replay.start(&mut engine, at(10.0));
    assert!(replay.poll(&mut engine, at(20.0), &mut live).unwrap().finished);

    replay.restart(&mut engine, at(30.0)).unwrap();
    let report = replay.poll(&mut engine, at(30.6), &mut live).unwrap();
    assert_eq!(report.packets, 1);
    assert!(report.commands.skipped >= 1, "second pass finds its nodes already created");
}

#[test]
fn deferred_commands_land_on_the_node_created_later() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        emulated: true,
        ..config(&dir.path().join("deferred.rply"))
    };

    let mut scene = SceneStore::new();
    scene.create(SceneNode::new(id(1), NodeKind::Root));
    let mut engine = CaptureReplayEngine::new(config.pending_capacity);
    let mut session = CaptureSession::start(&mut engine, &config, PID, &scene, at(10.0)).unwrap();
    let faded = NodeProperties {
        alpha: 0.25,
        ..NodeProperties::default()
    };
    let tint = Modifier::new(ModifierType::ALPHA, 1, vec![64]);
    let packets = [
        Packet::new(PID, at(10.2))
            .with(Command::SetProperties { id: id(5), props: faded })
            .with(Command::AddChild {
                parent: id(1),
                child: id(5),
            })
            .with(Command::AddModifier {
                id: id(5),
                modifier: tint.clone(),
            })
            .with(Command::AddChild {
                parent: id(5),
                child: id(6),
            }),
        Packet::new(PID, at(10.4)).with(Command::CreateNode {
            id: id(6),
            kind: NodeKind::Base,
        }),
        Packet::new(PID, at(10.6)).with(Command::CreateNode {
            id: id(5),
            kind: NodeKind::Canvas,
        }),
    ];
    for packet in &packets {
        session.record_packet(&mut engine, packet, packet.timestamp).unwrap();
    }
    session.stop(&mut engine).unwrap();

    let mut live = SceneStore::new();
    let bystander = NodeId::new(ProcessId(77), 5);
    live.create(SceneNode::new(bystander, NodeKind::Canvas));

    let mut replay = ReplaySession::prepare(&mut engine, &config, &mut live).unwrap();
    replay.start(&mut engine, at(100.0));
    let report = replay.poll(&mut engine, at(100.3), &mut live).unwrap();
    assert_eq!(report.commands.deferred, 4);
    assert_eq!(engine.pending().waiting_for(id(5).patched()), 4);

    let report = replay.poll(&mut engine, at(101.0), &mut live).unwrap();
    assert!(report.finished);
    assert_eq!(report.commands.applied, 6, "two creates plus four released commands");
    assert!(engine.pending().is_empty());

    // The state a producer that created node 5 first would have built.
    let (root, five, six) = (id(1).patched(), id(5).patched(), id(6).patched());
    assert_eq!(live.children(root), vec![five]);
    assert_eq!(live.children(five), vec![six]);
    let node = live.node(five).unwrap();
    assert_eq!(node.kind, NodeKind::Canvas);
    assert_eq!(node.props, faded);
    assert_eq!(node.modifiers, vec![tint]);
    assert!(live.node(six).unwrap().modifiers.is_empty());

    let untouched = live.node(bystander).unwrap();
    assert_eq!(untouched.props, NodeProperties::default());
    assert!(untouched.modifiers.is_empty());
    assert_eq!(live.parent(bystander), None);
}
