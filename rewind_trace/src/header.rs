// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Global and per-layer header encoding.
//!
//! Global header:
//!
//! ```text
//! f64 start_time
//! u32 n + n × u32 pid
//! u32 len + first-frame snapshot
//! [V3] u32 n + n × { u64 node, u64 animation, u64 offset_ns }
//! [V3] u32 len + session metadata (JSON object)
//! payload cache
//! u32 n + n × { u64 offset, u32 len }     layer headers
//! ```
//!
//! Layer header:
//!
//! ```text
//! u32 len + properties (JSON object)
//! Track::COUNT × { u32 n + n × { u64 offset, u32 len } }
//! ```

use rewind_core::codec::{ByteReader, ByteWriter};
use rewind_core::id::{NodeId, ProcessId};
use rewind_core::payload::PayloadCache;
use rewind_core::time::Duration;
use serde_json::{Map, Value};

use crate::error::TraceError;
use crate::limits::TraceLimits;
use crate::track::Track;
use crate::version;

/// When an animation started, relative to the capture session start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationStart {
    /// Animated node, in the replay namespace.
    pub node: NodeId,
    /// Animation identifier.
    pub animation: u64,
    /// Start offset from the session start.
    pub offset: Duration,
}

/// Location of one record in the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Markup {
    pub(crate) offset: u64,
    /// Body length plus the 8-byte timestamp.
    pub(crate) len: u32,
}

/// Append-only markup table plus the replay read cursor.
#[derive(Clone, Debug, Default)]
pub(crate) struct TrackTable {
    pub(crate) markup: Vec<Markup>,
    pub(crate) read_index: usize,
}

/// One layer's metadata and tracks.
#[derive(Clone, Debug, Default)]
pub(crate) struct Layer {
    pub(crate) properties: Map<String, Value>,
    pub(crate) tracks: [TrackTable; Track::COUNT],
}

impl Layer {
    pub(crate) fn encode(&self) -> Result<Vec<u8>, TraceError> {
        let mut w = ByteWriter::new();
        w.write_bytes(&serde_json::to_vec(&self.properties)?);
        for table in &self.tracks {
            w.write_len(table.markup.len());
            for m in &table.markup {
                w.write_u64(m.offset);
                w.write_u32(m.len);
            }
        }
        Ok(w.into_bytes())
    }

    pub(crate) fn decode(bytes: &[u8], limits: &TraceLimits) -> Result<Self, TraceError> {
        let mut r = ByteReader::new(bytes);
        let properties = parse_object(r.read_bytes(limits.max_metadata_len, "layer properties")?)?;
        let mut layer = Self {
            properties,
            tracks: <[TrackTable; Track::COUNT]>::default(),
        };
        for table in &mut layer.tracks {
            let n = r.read_len(limits.max_table_entries, "markup table")?;
            table.markup.reserve(n.min(r.remaining() / 12));
            for _ in 0..n {
                let offset = r.read_u64()?;
                let len = r.read_u32()?;
                table.markup.push(Markup { offset, len });
            }
        }
        Ok(layer)
    }
}

/// Everything in the global header except the layer table.
#[derive(Clone, Debug, Default)]
pub(crate) struct SessionHeader {
    pub(crate) start_time: f64,
    pub(crate) pids: Vec<ProcessId>,
    pub(crate) first_frame: Vec<u8>,
    pub(crate) animation_starts: Vec<AnimationStart>,
    pub(crate) metadata: Map<String, Value>,
    pub(crate) cache: PayloadCache,
}

impl SessionHeader {
    pub(crate) fn encode(&self, version: u32, layers: &[(u64, u32)]) -> Result<Vec<u8>, TraceError> {
        let mut w = ByteWriter::new();
        w.write_f64(self.start_time);
        w.write_len(self.pids.len());
        for pid in &self.pids {
            w.write_u32(pid.0);
        }
        w.write_bytes(&self.first_frame);
        if version::has_session_extras(version) {
            w.write_len(self.animation_starts.len());
            for a in &self.animation_starts {
                w.write_u64(a.node.0);
                w.write_u64(a.animation);
                w.write_u64(a.offset.0);
            }
            w.write_bytes(&serde_json::to_vec(&self.metadata)?);
        }
        self.cache.serialize(&mut w);
        w.write_len(layers.len());
        for (offset, len) in layers {
            w.write_u64(*offset);
            w.write_u32(*len);
        }
        Ok(w.into_bytes())
    }

    pub(crate) fn decode(
        bytes: &[u8],
        version: u32,
        limits: &TraceLimits,
    ) -> Result<(Self, Vec<(u64, u32)>), TraceError> {
        let mut r = ByteReader::new(bytes);
        let start_time = r.read_f64()?;
        if !start_time.is_finite() {
            return Err(TraceError::damaged("session start time is not finite"));
        }

        let n = r.read_len(limits.max_table_entries, "pid list")?;
        let mut pids = Vec::with_capacity(n.min(r.remaining() / 4));
        for _ in 0..n {
            pids.push(ProcessId(r.read_u32()?));
        }

        let first_frame = r
            .read_bytes(limits.max_first_frame_len, "first frame")?
            .to_vec();

        let mut animation_starts = Vec::new();
        let mut metadata = Map::new();
        if version::has_session_extras(version) {
            let n = r.read_len(limits.max_table_entries, "animation start table")?;
            animation_starts.reserve(n.min(r.remaining() / 24));
            for _ in 0..n {
                animation_starts.push(AnimationStart {
                    node: NodeId(r.read_u64()?),
                    animation: r.read_u64()?,
                    offset: Duration(r.read_u64()?),
                });
            }
            metadata = parse_object(r.read_bytes(limits.max_metadata_len, "session metadata")?)?;
        }

        let cache = PayloadCache::deserialize(&mut r, limits.max_table_entries, limits.max_payload_len)?;

        let n = r.read_len(limits.max_table_entries, "layer table")?;
        let mut layers = Vec::with_capacity(n.min(r.remaining() / 12));
        for _ in 0..n {
            layers.push((r.read_u64()?, r.read_u32()?));
        }

        Ok((
            Self {
                start_time,
                pids,
                first_frame,
                animation_starts,
                metadata,
                cache,
            },
            layers,
        ))
    }
}

fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>, TraceError> {
    if bytes.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TraceError::damaged("metadata is not a JSON object")),
        Err(err) => Err(TraceError::damaged(format!("metadata is not valid JSON: {err}"))),
    }
}
