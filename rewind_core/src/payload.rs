// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Key-addressed store for large binary assets.
//!
//! Pixel buffers and font blobs normally travel between processes as
//! shared-memory handles that mean nothing once the producer exits. During
//! capture, [`PayloadCache`] mirrors their bytes under a stable key; the cache
//! is then serialized into the trace header so a replay process can resolve
//! the same keys without the producer.
//!
//! Entries are immutable: the first [`put`](PayloadCache::put) for a key wins
//! and later ones are ignored. [`get`](PayloadCache::get) hands out a borrowed
//! view; callers that need the bytes past the current call copy them.
//!
//! # Serialized layout
//!
//! ```text
//! u32 entry_count
//! entry_count × { u64 key, u32 skip_bytes, u32 len, len × u8 }
//! ```

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::codec::{ByteReader, ByteWriter, DecodeError};
use crate::id::{NodeId, ProcessId};

/// Total bytes the cache accepts before [`fits`](PayloadCache::fits) says no.
pub const MAX_CONSUMPTION: usize = 1 << 30;

/// A byte buffer that originates in cross-process shared memory.
///
/// Implemented by whatever wraps the platform's shared-memory mapping. The
/// cache copies [`bytes`](Self::bytes) and remembers
/// [`header_len`](Self::header_len) so replay can skip the transport header.
pub trait SharedBuffer {
    /// Returns the mapped bytes, including any transport header.
    fn bytes(&self) -> &[u8];

    /// Returns the length of the transport header at the front of
    /// [`bytes`](Self::bytes).
    fn header_len(&self) -> u32 {
        0
    }
}

impl SharedBuffer for [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl SharedBuffer for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
}

/// One cached asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadEntry {
    /// Bytes at the front of [`bytes`](Self::bytes) that replay skips.
    pub skip_bytes: u32,
    /// The raw bytes as captured.
    pub bytes: Vec<u8>,
}

impl PayloadEntry {
    /// Returns the bytes after the skipped header.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        let skip = (self.skip_bytes as usize).min(self.bytes.len());
        &self.bytes[skip..]
    }
}

/// First-writer-wins store of captured binary assets.
#[derive(Clone, Debug, Default)]
pub struct PayloadCache {
    entries: BTreeMap<u64, PayloadEntry>,
    consumption: usize,
}

impl PayloadCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a copy of `bytes` under `key` unless the key is already taken.
    ///
    /// Returns whether the entry was inserted.
    pub fn put(&mut self, key: u64, bytes: &[u8], skip_bytes: u32) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.consumption += bytes.len();
        self.entries.insert(
            key,
            PayloadEntry {
                skip_bytes,
                bytes: bytes.to_vec(),
            },
        );
        true
    }

    /// Mirrors a shared-memory buffer under `key`.
    pub fn mirror<B: SharedBuffer + ?Sized>(&mut self, key: u64, buffer: &B) -> bool {
        self.put(key, buffer.bytes(), buffer.header_len())
    }

    /// Stores `bytes` under a content-derived key, falling back to `raw_key`
    /// when the content key is already taken by different bytes.
    ///
    /// Returns the key the bytes can be found under. Identical content
    /// deduplicates onto one entry. The fallback never probes further: if
    /// `raw_key` is also taken, the existing entry there wins as usual.
    pub fn put_by_content(&mut self, pid: ProcessId, raw_key: u64, bytes: &[u8], skip_bytes: u32) -> u64 {
        let key = content_key(pid, bytes);
        match self.entries.get(&key) {
            None => {
                self.put(key, bytes, skip_bytes);
                key
            }
            Some(existing) if existing.bytes == bytes => key,
            Some(_) => {
                self.put(raw_key, bytes, skip_bytes);
                raw_key
            }
        }
    }

    /// Returns the entry stored under `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&PayloadEntry> {
        self.entries.get(&key)
    }

    /// Returns whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the total number of cached bytes.
    #[must_use]
    pub fn consumption(&self) -> usize {
        self.consumption
    }

    /// Returns whether `size` more bytes stay under [`MAX_CONSUMPTION`].
    #[must_use]
    pub fn fits(&self, size: usize) -> bool {
        self.consumption.saturating_add(size) <= MAX_CONSUMPTION
    }

    /// Drops every entry.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.consumption = 0;
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &PayloadEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Appends the whole cache to `out`.
    pub fn serialize(&self, out: &mut ByteWriter) {
        out.write_len(self.entries.len());
        for (key, entry) in &self.entries {
            out.write_u64(*key);
            out.write_u32(entry.skip_bytes);
            out.write_bytes(&entry.bytes);
        }
    }

    /// Reads a cache written by [`serialize`](Self::serialize).
    ///
    /// `max_entries` bounds the entry count and `max_entry_len` each entry's
    /// length. Duplicate keys keep the first occurrence.
    pub fn deserialize(
        input: &mut ByteReader<'_>,
        max_entries: usize,
        max_entry_len: usize,
    ) -> Result<Self, DecodeError> {
        let count = input.read_len(max_entries, "payload cache entry count")?;
        let mut cache = Self::new();
        for _ in 0..count {
            let key = input.read_u64()?;
            let skip_bytes = input.read_u32()?;
            let bytes = input.read_bytes(max_entry_len, "payload entry")?;
            cache.put(key, bytes, skip_bytes);
        }
        Ok(cache)
    }
}

/// Derives a payload key from a 32-bit FNV-1a hash of `bytes`.
///
/// The hash is short, so distinct assets can collide; see
/// [`PayloadCache::put_by_content`] for the fallback.
#[must_use]
pub fn content_key(pid: ProcessId, bytes: &[u8]) -> u64 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    NodeId::new(pid, hash).get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn first_writer_wins() {
        let mut cache = PayloadCache::new();
        assert!(cache.put(7, b"first", 0));
        assert!(!cache.put(7, b"second", 0), "second put is a no-op");
        assert_eq!(cache.get(7).map(|e| e.bytes.as_slice()), Some(&b"first"[..]));
        assert_eq!(cache.consumption(), 5);
    }

    #[test]
    fn missing_key_is_none() {
        let cache = PayloadCache::new();
        assert!(cache.get(1).is_none());
        assert!(!cache.contains(1));
    }

    #[test]
    fn body_skips_transport_header() {
        let mut cache = PayloadCache::new();
        cache.put(1, &[0, 0, 0, 9, 8], 3);
        assert_eq!(cache.get(1).map(PayloadEntry::body), Some(&[9, 8][..]));

        // A skip longer than the entry yields an empty body.
        cache.put(2, &[1], 24);
        assert_eq!(cache.get(2).map(PayloadEntry::body), Some(&[][..]));
    }

    #[test]
    fn mirror_keeps_header_len() {
        struct Ashmem(Vec<u8>);
        impl SharedBuffer for Ashmem {
            fn bytes(&self) -> &[u8] {
                &self.0
            }
            fn header_len(&self) -> u32 {
                2
            }
        }
        let mut cache = PayloadCache::new();
        cache.mirror(5, &Ashmem(vec![0xAA, 0xBB, 1, 2]));
        assert_eq!(cache.get(5).map(|e| e.skip_bytes), Some(2));
    }

    #[test]
    fn serialize_then_deserialize() {
        let mut cache = PayloadCache::new();
        cache.put(3, b"abc", 0);
        cache.put(1, b"z", 24);
        let mut w = ByteWriter::new();
        cache.serialize(&mut w);
        let bytes = w.into_bytes();

        let loaded = PayloadCache::deserialize(&mut ByteReader::new(&bytes), 16, 16).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(1).map(|e| e.skip_bytes), Some(24));
        assert_eq!(loaded.get(3).map(|e| e.bytes.as_slice()), Some(&b"abc"[..]));
    }

    #[test]
    fn deserialize_rejects_oversized_entry() {
        let mut cache = PayloadCache::new();
        cache.put(1, &[0; 32], 0);
        let mut w = ByteWriter::new();
        cache.serialize(&mut w);
        let bytes = w.into_bytes();
        let err = PayloadCache::deserialize(&mut ByteReader::new(&bytes), 16, 8).unwrap_err();
        assert!(
            matches!(err, DecodeError::LengthTooLarge { len: 32, .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn identical_content_deduplicates() {
        let mut cache = PayloadCache::new();
        let pid = ProcessId(10);
        let a = cache.put_by_content(pid, 100, b"pixels", 0);
        let b = cache.put_by_content(pid, 200, b"pixels", 0);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn content_collision_falls_back_to_raw_key() {
        let mut cache = PayloadCache::new();
        let pid = ProcessId(10);
        // Occupy the content key of "font" with different bytes.
        let taken = content_key(pid, b"font");
        cache.put(taken, b"something else", 0);

        let key = cache.put_by_content(pid, 999, b"font", 0);
        assert_eq!(key, 999, "falls back to the raw identifier");
        assert_eq!(cache.get(999).map(|e| e.bytes.as_slice()), Some(&b"font"[..]));
        assert_eq!(
            cache.get(taken).map(|e| e.bytes.as_slice()),
            Some(&b"something else"[..]),
            "existing entry untouched"
        );
    }

    #[test]
    fn fits_respects_consumption_cap() {
        let mut cache = PayloadCache::new();
        cache.put(1, &[0; 16], 0);
        assert!(cache.fits(MAX_CONSUMPTION - 16));
        assert!(!cache.fits(MAX_CONSUMPTION - 15));
        cache.reset();
        assert!(cache.is_empty() && cache.consumption() == 0);
    }
}
