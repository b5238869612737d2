// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The trace container.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rewind_core::id::ProcessId;
use rewind_core::payload::PayloadCache;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::MAGIC;
use crate::error::TraceError;
use crate::header::{AnimationStart, Layer, Markup, SessionHeader};
use crate::limits::TraceLimits;
use crate::track::{ReadOutcome, Track};
use crate::version;

/// Records due "now" are read even if their time is a hair later.
const TIME_EPSILON: f64 = 1e-9;

/// Size of the record timestamp that precedes every body.
const TIME_LEN: u32 = 8;

/// A multi-track, multi-layer trace file.
///
/// Every operation takes the file's single mutex for its whole duration, so
/// concurrent writers block rather than interleave. The type is `Sync`; share
/// it behind an `Arc` between the capture thread and background samplers.
#[derive(Debug)]
pub struct TraceFile {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: Option<File>,
    path: PathBuf,
    version: u32,
    writable: bool,
    dirty: bool,
    write_cursor: u64,
    limits: TraceLimits,
    header: SessionHeader,
    layers: Vec<Layer>,
}

impl TraceFile {
    // -- Lifecycle --

    /// Creates (or truncates) a trace file in the latest format.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Self::create_with_version(path, version::LATEST, TraceLimits::default())
    }

    /// Creates a trace file in a specific format version.
    pub fn create_with_version(
        path: impl AsRef<Path>,
        version: u32,
        limits: TraceLimits,
    ) -> Result<Self, TraceError> {
        check_version(version)?;
        let path = path.as_ref().to_path_buf();
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&MAGIC)?;
        file.write_all(&version.to_le_bytes())?;
        let width = version::header_offset_width(version);
        file.write_all(&[0_u8; 8][..width])?;

        info!(path = %path.display(), version, "trace created");
        Ok(Self {
            inner: Mutex::new(Inner {
                file: Some(file),
                path,
                version,
                writable: true,
                dirty: true,
                write_cursor: version::data_start(version),
                limits,
                header: SessionHeader::default(),
                layers: Vec::new(),
            }),
        })
    }

    /// Opens an existing trace file for replay with default limits.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Self::open_with_limits(path, TraceLimits::default())
    }

    /// Opens an existing trace file for replay.
    ///
    /// Headers are parsed eagerly; record bodies are read on demand. Any
    /// problem with the prelude or headers fails the whole open.
    pub fn open_with_limits(path: impl AsRef<Path>, limits: TraceLimits) -> Result<Self, TraceError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut prelude = [0_u8; 8];
        read_exact_or_damaged(&mut file, &mut prelude, "file is shorter than its prelude")?;
        let mut magic = [0_u8; 4];
        magic.copy_from_slice(&prelude[..4]);
        if magic != MAGIC {
            return Err(TraceError::BadMagic { found: magic });
        }
        let mut version_bytes = [0_u8; 4];
        version_bytes.copy_from_slice(&prelude[4..]);
        let version = u32::from_le_bytes(version_bytes);
        check_version(version)?;

        let width = version::header_offset_width(version);
        let mut offset_bytes = [0_u8; 8];
        read_exact_or_damaged(&mut file, &mut offset_bytes[..width], "header offset is truncated")?;
        let header_offset = u64::from_le_bytes(offset_bytes);
        let data_start = version::data_start(version);
        if header_offset == 0 {
            return Err(TraceError::damaged("header was never written"));
        }
        if header_offset < data_start || header_offset >= file_len {
            return Err(TraceError::damaged(format!(
                "header offset {header_offset} is outside the file ({file_len} bytes)"
            )));
        }

        // Records written after a flush may follow the header, so the region
        // is capped rather than rejected.
        let header_len = (file_len - header_offset).min(limits.max_header_len);
        let header_bytes = read_region(&mut file, header_offset, header_len)?;
        let (header, layer_table) = SessionHeader::decode(&header_bytes, version, &limits)?;

        let mut layers = Vec::with_capacity(layer_table.len());
        for (i, (offset, len)) in layer_table.into_iter().enumerate() {
            let end = offset.checked_add(u64::from(len));
            if offset < data_start || end.is_none_or(|end| end > file_len) {
                return Err(TraceError::damaged(format!(
                    "layer {i} header at {offset}+{len} is outside the file"
                )));
            }
            let bytes = read_region(&mut file, offset, u64::from(len))?;
            layers.push(Layer::decode(&bytes, &limits)?);
        }

        info!(
            path = %path.display(),
            version,
            layers = layers.len(),
            payloads = header.cache.len(),
            "trace opened"
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                file: Some(file),
                path,
                version,
                writable: false,
                dirty: false,
                write_cursor: file_len,
                limits,
                header,
                layers,
            }),
        })
    }

    /// Writes pending headers and releases the file.
    ///
    /// Calling it again is a no-op.
    pub fn close(&self) -> Result<(), TraceError> {
        let mut inner = self.inner.lock();
        if inner.file.is_none() {
            return Ok(());
        }
        let result = if inner.writable && inner.dirty {
            inner.write_headers().map(|_| ())
        } else {
            Ok(())
        };
        if let Some(file) = inner.file.take() {
            if inner.writable {
                file.sync_all()?;
            }
        }
        inner.layers.clear();
        inner.header = SessionHeader::default();
        info!(path = %inner.path.display(), "trace closed");
        result
    }

    /// Writes the headers for everything recorded so far without closing.
    ///
    /// Later records are appended after the flushed headers, so the file
    /// stays readable up to the flush even if it is never closed. The next
    /// flush or close writes fresh headers past them.
    pub fn flush_headers(&self) -> Result<(), TraceError> {
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        inner.write_cursor = inner.write_headers()?;
        Ok(())
    }

    /// Returns whether the file is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.lock().file.is_some()
    }

    /// Returns the format version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.lock().version
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    // -- Layers and records --

    /// Appends an empty layer and returns its id.
    pub fn add_layer(&self) -> Result<u32, TraceError> {
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        let id = u32::try_from(inner.layers.len()).map_err(|_| TraceError::Overflow {
            what: "layer count",
            value: inner.layers.len() as u64,
        })?;
        inner.layers.push(Layer::default());
        inner.dirty = true;
        Ok(id)
    }

    /// Returns the number of layers.
    #[must_use]
    pub fn layer_count(&self) -> u32 {
        u32::try_from(self.inner.lock().layers.len()).unwrap_or(u32::MAX)
    }

    /// Appends one record at `time` (session-relative seconds).
    pub fn write(&self, track: Track, layer: u32, time: f64, bytes: &[u8]) -> Result<(), TraceError> {
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        inner.layer(layer)?;
        let len = u32::try_from(bytes.len())
            .ok()
            .and_then(|n| n.checked_add(TIME_LEN))
            .ok_or(TraceError::Overflow {
                what: "record length",
                value: bytes.len() as u64,
            })?;

        let offset = inner.write_cursor;
        let file = inner.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&time.to_le_bytes())?;
        file.write_all(bytes)?;

        inner.write_cursor = offset + u64::from(len);
        inner.dirty = true;
        inner.layer_mut(layer)?.tracks[track.index()]
            .markup
            .push(Markup { offset, len });
        Ok(())
    }

    /// Forgets the most recent record of a track.
    ///
    /// The bytes stay in the file but are no longer reachable. Returns
    /// whether there was a record to forget.
    pub fn unwrite_last(&self, track: Track, layer: u32) -> Result<bool, TraceError> {
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        let removed = inner.layer_mut(layer)?.tracks[track.index()].markup.pop();
        if removed.is_some() {
            inner.dirty = true;
        }
        Ok(removed.is_some())
    }

    /// Reads the next record of a track if its time is at most `until`.
    ///
    /// A corrupted record fails this call only; the read cursor moves past it
    /// so the next call continues with the following record.
    pub fn read(&self, track: Track, layer: u32, until: f64) -> Result<ReadOutcome, TraceError> {
        let mut guard = self.inner.lock();
        let Inner {
            file,
            layers,
            limits,
            ..
        } = &mut *guard;
        let file = file.as_mut().ok_or(TraceError::Closed)?;
        let table = &mut layers
            .get_mut(layer as usize)
            .ok_or(TraceError::UnknownLayer(layer))?
            .tracks[track.index()];

        let index = table.read_index;
        let Some(&Markup { offset, len }) = table.markup.get(index) else {
            return Ok(ReadOutcome::EndOfTrack);
        };
        let corrupt = |reason: String| TraceError::CorruptRecord {
            track,
            layer,
            index,
            reason,
        };

        if len < TIME_LEN || (len - TIME_LEN) as usize > limits.max_record_len {
            table.read_index += 1;
            warn!(%track, layer, index, len, "skipping record with implausible length");
            return Err(corrupt(format!(
                "declared length {len} outside 8..={}",
                limits.max_record_len + TIME_LEN as usize
            )));
        }

        let mut time_bytes = [0_u8; 8];
        if let Err(err) = file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut time_bytes))
        {
            table.read_index += 1;
            return Err(corrupt(format!("timestamp unreadable: {err}")));
        }
        let time = f64::from_le_bytes(time_bytes);
        if time.is_nan() {
            table.read_index += 1;
            return Err(corrupt("timestamp is NaN".into()));
        }
        if time >= until + TIME_EPSILON {
            return Ok(ReadOutcome::NotYet);
        }

        let mut bytes = vec![0_u8; (len - TIME_LEN) as usize];
        table.read_index += 1;
        if let Err(err) = file.read_exact(&mut bytes) {
            return Err(corrupt(format!("body unreadable: {err}")));
        }
        debug!(%track, layer, index, time, len, "record read");
        Ok(ReadOutcome::Record { time, bytes })
    }

    /// Rewinds a track's read cursor to its first record.
    pub fn restart(&self, track: Track, layer: u32) -> Result<(), TraceError> {
        let mut inner = self.inner.lock();
        inner.layer_mut(layer)?.tracks[track.index()].read_index = 0;
        Ok(())
    }

    /// Returns the number of reachable records in a track.
    pub fn record_count(&self, track: Track, layer: u32) -> Result<usize, TraceError> {
        let inner = self.inner.lock();
        Ok(inner.layer(layer)?.tracks[track.index()].markup.len())
    }

    /// Returns the time of a track's last record, if it has any.
    pub fn end_time(&self, track: Track, layer: u32) -> Result<Option<f64>, TraceError> {
        let mut guard = self.inner.lock();
        let Some(&Markup { offset, .. }) = guard.layer(layer)?.tracks[track.index()].markup.last() else {
            return Ok(None);
        };
        let file = guard.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut time_bytes = [0_u8; 8];
        file.read_exact(&mut time_bytes)?;
        Ok(Some(f64::from_le_bytes(time_bytes)))
    }

    // -- Header fields --

    /// Sets the session start time (host seconds).
    pub fn set_write_time(&self, secs: f64) {
        let mut inner = self.inner.lock();
        inner.header.start_time = secs;
        inner.dirty = true;
    }

    /// Returns the session start time (host seconds).
    #[must_use]
    pub fn write_time(&self) -> f64 {
        self.inner.lock().header.start_time
    }

    /// Records a process whose data is in the trace.
    pub fn add_pid(&self, pid: ProcessId) {
        let mut inner = self.inner.lock();
        if !inner.header.pids.contains(&pid) {
            inner.header.pids.push(pid);
            inner.dirty = true;
        }
    }

    /// Returns the recorded process ids.
    #[must_use]
    pub fn pids(&self) -> Vec<ProcessId> {
        self.inner.lock().header.pids.clone()
    }

    /// Sets the first-frame snapshot.
    pub fn set_first_frame(&self, bytes: Vec<u8>) {
        let mut inner = self.inner.lock();
        inner.header.first_frame = bytes;
        inner.dirty = true;
    }

    /// Returns a copy of the first-frame snapshot.
    #[must_use]
    pub fn first_frame(&self) -> Vec<u8> {
        self.inner.lock().header.first_frame.clone()
    }

    /// Sets the animation start table.
    pub fn set_animation_start_times(&self, starts: Vec<AnimationStart>) {
        let mut inner = self.inner.lock();
        inner.header.animation_starts = starts;
        inner.dirty = true;
    }

    /// Returns the animation start table.
    #[must_use]
    pub fn animation_start_times(&self) -> Vec<AnimationStart> {
        self.inner.lock().header.animation_starts.clone()
    }

    /// Sets free-form session metadata.
    pub fn set_session_metadata(&self, metadata: Map<String, Value>) {
        let mut inner = self.inner.lock();
        inner.header.metadata = metadata;
        inner.dirty = true;
    }

    /// Returns free-form session metadata.
    #[must_use]
    pub fn session_metadata(&self) -> Map<String, Value> {
        self.inner.lock().header.metadata.clone()
    }

    /// Sets one string-keyed layer property.
    pub fn set_layer_property(&self, layer: u32, key: &str, value: Value) -> Result<(), TraceError> {
        let mut inner = self.inner.lock();
        inner.layer_mut(layer)?.properties.insert(key.to_owned(), value);
        inner.dirty = true;
        Ok(())
    }

    /// Returns one layer property.
    pub fn layer_property(&self, layer: u32, key: &str) -> Result<Option<Value>, TraceError> {
        let inner = self.inner.lock();
        Ok(inner.layer(layer)?.properties.get(key).cloned())
    }

    /// Replaces the payload cache written into the header.
    pub fn set_payload_cache(&self, cache: PayloadCache) {
        let mut inner = self.inner.lock();
        inner.header.cache = cache;
        inner.dirty = true;
    }

    /// Moves the payload cache out of the header.
    #[must_use]
    pub fn take_payload_cache(&self) -> PayloadCache {
        core::mem::take(&mut self.inner.lock().header.cache)
    }
}

impl Drop for TraceFile {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(%err, "closing trace on drop failed");
        }
    }
}

impl Inner {
    fn check_writable(&self) -> Result<(), TraceError> {
        if self.file.is_none() {
            Err(TraceError::Closed)
        } else if !self.writable {
            Err(TraceError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn file_mut(&mut self) -> Result<&mut File, TraceError> {
        self.file.as_mut().ok_or(TraceError::Closed)
    }

    fn layer(&self, layer: u32) -> Result<&Layer, TraceError> {
        self.layers
            .get(layer as usize)
            .ok_or(TraceError::UnknownLayer(layer))
    }

    fn layer_mut(&mut self, layer: u32) -> Result<&mut Layer, TraceError> {
        self.layers
            .get_mut(layer as usize)
            .ok_or(TraceError::UnknownLayer(layer))
    }

    /// Writes layer headers then the global header at the write cursor and
    /// patches the prelude's header offset. Returns the end of the headers.
    fn write_headers(&mut self) -> Result<u64, TraceError> {
        let mut pos = self.write_cursor;
        let mut table = Vec::with_capacity(self.layers.len());
        let mut blobs = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let bytes = layer.encode()?;
            let len = u32::try_from(bytes.len()).map_err(|_| TraceError::Overflow {
                what: "layer header length",
                value: bytes.len() as u64,
            })?;
            table.push((pos, len));
            pos += u64::from(len);
            blobs.push(bytes);
        }
        let header_offset = pos;
        let header = self.header.encode(self.version, &table)?;

        let width = version::header_offset_width(self.version);
        let offset_bytes = if width == 4 {
            u32::try_from(header_offset)
                .map_err(|_| TraceError::Overflow {
                    what: "header offset",
                    value: header_offset,
                })?
                .to_le_bytes()
                .to_vec()
        } else {
            header_offset.to_le_bytes().to_vec()
        };

        let start = self.write_cursor;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(start))?;
        for blob in &blobs {
            file.write_all(blob)?;
        }
        file.write_all(&header)?;
        let end = header_offset + header.len() as u64;
        file.set_len(end)?;
        file.seek(SeekFrom::Start(8))?;
        file.write_all(&offset_bytes)?;
        file.flush()?;

        self.dirty = false;
        debug!(header_offset, header_len = header.len(), layers = table.len(), "trace headers written");
        Ok(end)
    }
}

fn check_version(version: u32) -> Result<(), TraceError> {
    if version::is_supported(version) {
        Ok(())
    } else {
        Err(TraceError::UnsupportedVersion {
            found: version,
            min: version::MIN_SUPPORTED,
            max: version::LATEST,
        })
    }
}

fn read_exact_or_damaged(file: &mut File, buf: &mut [u8], reason: &str) -> Result<(), TraceError> {
    match file.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(TraceError::damaged(reason)),
        Err(err) => Err(err.into()),
    }
}

fn read_region(file: &mut File, offset: u64, len: u64) -> Result<Vec<u8>, TraceError> {
    let len = usize::try_from(len).map_err(|_| TraceError::damaged("header region too large"))?;
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = vec![0_u8; len];
    read_exact_or_damaged(file, &mut bytes, "header region is truncated")?;
    Ok(bytes)
}
