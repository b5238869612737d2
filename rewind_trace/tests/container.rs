// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! On-disk behavior of the trace container, including damaged files.

use std::fs;
use std::path::{Path, PathBuf};

use rewind_core::id::{NodeId, ProcessId};
use rewind_core::payload::PayloadCache;
use rewind_core::scene::{NodeKind, NodeMap, SceneNode, SceneStore};
use rewind_core::time::Duration;
use rewind_trace::{AnimationStart, ReadOutcome, TraceError, TraceFile, TraceLimits, Track, snapshot, version};
use tempfile::TempDir;

fn temp() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.rply");
    (dir, path)
}

fn write_records(path: &Path, records: &[(Track, f64, &[u8])]) {
    let trace = TraceFile::create(path).unwrap();
    let layer = trace.add_layer().unwrap();
    for (track, time, bytes) in records {
        trace.write(*track, layer, *time, bytes).unwrap();
    }
    trace.close().unwrap();
}

fn drain(trace: &TraceFile, track: Track) -> Vec<(f64, Vec<u8>)> {
    let mut out = Vec::new();
    while let ReadOutcome::Record { time, bytes } = trace.read(track, 0, f64::MAX).unwrap() {
        out.push((time, bytes));
    }
    out
}

#[test]
fn every_track_reads_back_in_write_order() {
    let (_dir, path) = temp();
    let records: Vec<(Track, f64, &[u8])> = vec![
        (Track::Commands, 0.0, b"c0"),
        (Track::Metrics, 0.1, b"m0"),
        (Track::Commands, 0.2, b"c1"),
        (Track::Logs, 0.2, b"l0"),
        (Track::Composition, 0.3, b"x0"),
        (Track::TraceEvents, 0.4, b""),
        (Track::Commands, 0.5, b"c2"),
    ];
    write_records(&path, &records);

    let trace = TraceFile::open(&path).unwrap();
    for track in Track::ALL {
        let expected: Vec<(f64, Vec<u8>)> = records
            .iter()
            .filter(|(t, ..)| *t == track)
            .map(|(_, time, bytes)| (*time, bytes.to_vec()))
            .collect();
        assert_eq!(drain(&trace, track), expected, "{track}");
    }
}

#[test]
fn concrete_metrics_scenario() {
    let (_dir, path) = temp();
    write_records(
        &path,
        &[
            (Track::Metrics, 1.0, b"one"),
            (Track::Metrics, 2.0, b"two"),
            (Track::Metrics, 3.0, b"three"),
        ],
    );
    let trace = TraceFile::open(&path).unwrap();

    let first = trace.read(Track::Metrics, 0, 2.5).unwrap();
    assert_eq!(first, ReadOutcome::Record { time: 1.0, bytes: b"one".to_vec() });
    let second = trace.read(Track::Metrics, 0, 2.5).unwrap();
    assert_eq!(second, ReadOutcome::Record { time: 2.0, bytes: b"two".to_vec() });
    assert_eq!(trace.read(Track::Metrics, 0, 2.5).unwrap(), ReadOutcome::NotYet);

    trace.restart(Track::Metrics, 0).unwrap();
    assert_eq!(trace.read(Track::Metrics, 0, 2.5).unwrap(), first);
}

#[test]
fn oversized_record_fails_only_its_own_read() {
    let (_dir, path) = temp();
    let big = [7_u8; 100];
    write_records(
        &path,
        &[
            (Track::Commands, 1.0, b"small"),
            (Track::Commands, 2.0, &big),
            (Track::Commands, 3.0, b"after"),
        ],
    );
    let limits = TraceLimits {
        max_record_len: 16,
        ..TraceLimits::default()
    };
    let trace = TraceFile::open_with_limits(&path, limits).unwrap();

    assert!(matches!(trace.read(Track::Commands, 0, 9.0), Ok(ReadOutcome::Record { .. })));
    let err = trace.read(Track::Commands, 0, 9.0).unwrap_err();
    assert!(
        matches!(err, TraceError::CorruptRecord { track: Track::Commands, layer: 0, index: 1, .. }),
        "{err}"
    );
    assert_eq!(
        trace.read(Track::Commands, 0, 9.0).unwrap(),
        ReadOutcome::Record { time: 3.0, bytes: b"after".to_vec() }
    );
}

#[test]
fn corrupted_header_offset_fails_open() {
    let (_dir, path) = temp();
    write_records(&path, &[(Track::Commands, 1.0, b"x")]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let err = TraceFile::open(&path).unwrap_err();
    assert!(matches!(err, TraceError::Damaged { .. }), "{err}");
}

#[test]
fn header_offset_into_records_fails_open() {
    let (_dir, path) = temp();
    write_records(&path, &[(Track::Commands, 1.0, b"not a header at all")]);

    let mut bytes = fs::read(&path).unwrap();
    let data_start = version::data_start(version::LATEST);
    bytes[8..16].copy_from_slice(&data_start.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(TraceFile::open(&path), Err(TraceError::Damaged { .. })));
}

#[test]
fn truncated_header_fails_open() {
    let (_dir, path) = temp();
    write_records(&path, &[(Track::Commands, 1.0, b"x")]);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

    assert!(matches!(TraceFile::open(&path), Err(TraceError::Damaged { .. })));
}

#[test]
fn foreign_files_are_rejected() {
    let (_dir, path) = temp();

    fs::write(&path, b"NOPE\x03\0\0\0\0\0\0\0\0\0\0\0").unwrap();
    assert!(matches!(
        TraceFile::open(&path),
        Err(TraceError::BadMagic { found }) if &found == b"NOPE"
    ));

    fs::write(&path, b"RPLY\x63\0\0\0\0\0\0\0\0\0\0\0").unwrap();
    assert!(matches!(
        TraceFile::open(&path),
        Err(TraceError::UnsupportedVersion { found: 99, .. })
    ));

    fs::write(&path, b"RP").unwrap();
    assert!(matches!(TraceFile::open(&path), Err(TraceError::Damaged { .. })));

    fs::write(&path, b"RPLY\x03\0\0\0\0\0\0\0\0\0\0\0").unwrap();
    let err = TraceFile::open(&path).unwrap_err();
    assert!(err.to_string().contains("never written"), "{err}");
}

#[test]
fn unsupported_version_cannot_be_created() {
    let (_dir, path) = temp();
    assert!(matches!(
        TraceFile::create_with_version(&path, 0, TraceLimits::default()),
        Err(TraceError::UnsupportedVersion { found: 0, .. })
    ));
}

#[test]
fn every_supported_version_round_trips() {
    for v in version::MIN_SUPPORTED..=version::LATEST {
        let (_dir, path) = temp();
        let trace = TraceFile::create_with_version(&path, v, TraceLimits::default()).unwrap();
        trace.add_layer().unwrap();
        trace.add_pid(ProcessId(11));
        trace.write(Track::Commands, 0, 0.25, b"payload").unwrap();
        trace.close().unwrap();

        let trace = TraceFile::open(&path).unwrap();
        assert_eq!(trace.version(), v);
        assert_eq!(trace.pids(), vec![ProcessId(11)]);
        assert_eq!(drain(&trace, Track::Commands), vec![(0.25, b"payload".to_vec())]);
    }
}

#[test]
fn session_extras_need_the_latest_version() {
    let starts = vec![AnimationStart {
        node: NodeId::new(ProcessId(1), 2),
        animation: 3,
        offset: Duration::from_millis(40),
    }];
    let mut meta = serde_json::Map::new();
    meta.insert("device".into(), "test".into());

    let (_dir, latest) = temp();
    let trace = TraceFile::create(&latest).unwrap();
    trace.set_animation_start_times(starts.clone());
    trace.set_session_metadata(meta.clone());
    trace.close().unwrap();
    let trace = TraceFile::open(&latest).unwrap();
    assert_eq!(trace.animation_start_times(), starts);
    assert_eq!(trace.session_metadata(), meta);

    let (_dir, old) = temp();
    let trace = TraceFile::create_with_version(&old, version::V2, TraceLimits::default()).unwrap();
    trace.set_animation_start_times(starts);
    trace.close().unwrap();
    assert!(TraceFile::open(&old).unwrap().animation_start_times().is_empty());
}

#[test]
fn first_frame_snapshot_travels_with_its_payloads() {
    let (_dir, path) = temp();
    let pid = ProcessId(5);
    let mut scene = SceneStore::new();
    scene.create(SceneNode::new(NodeId::new(pid, 1), NodeKind::Root));
    scene.create(SceneNode::new(NodeId::new(pid, 2), NodeKind::Canvas));
    scene.add_child(NodeId::new(pid, 1), NodeId::new(pid, 2));

    let mut cache = PayloadCache::new();
    let frame = snapshot::encode(&scene, &mut cache, version::LATEST);
    let trace = TraceFile::create(&path).unwrap();
    trace.set_first_frame(frame);
    trace.set_payload_cache(cache);
    trace.close().unwrap();

    let trace = TraceFile::open(&path).unwrap();
    let cache = trace.take_payload_cache();
    let mut replayed = SceneStore::new();
    let report = snapshot::decode(&trace.first_frame(), &mut replayed, &cache, trace.version()).unwrap();
    assert_eq!(report.nodes_created, 2);
    assert_eq!(report.edges_linked, 1);
    assert_eq!(
        replayed.parent(NodeId::new(pid, 2).patched()),
        Some(NodeId::new(pid, 1).patched())
    );
}
