// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque, versioned per-node modifiers.
//!
//! The capture/replay engine never interprets a modifier's bytes. It only
//! needs to move them through the trace and ask the live modifier system
//! whether a recorded `(type, version)` pair can still be reconstructed.
//!
//! # Wire layout
//!
//! ```text
//! u16 type, u16 version, u32 len + data,
//! u8 has_asset, [u64 asset_key, u64 storage_key]
//! ```
//!
//! Asset bytes never appear inline. [`encode_modifier`] moves them into the
//! [`PayloadCache`] under a content-derived storage key (see
//! [`PayloadCache::put_by_content`]) and [`decode_modifier`] copies them back
//! out. An asset that would push the cache past its cap is dropped from the
//! modifier.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::codec::{ByteReader, ByteWriter, DecodeError};
use crate::id::NodeId;
use crate::payload::PayloadCache;

/// Largest modifier data blob accepted on decode.
pub const MAX_MODIFIER_LEN: usize = 50_000_000;

/// Numeric modifier type as assigned by the live modifier system.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModifierType(pub u16);

impl ModifierType {
    /// Alpha.
    pub const ALPHA: Self = Self(1);
    /// 2D transform.
    pub const TRANSFORM: Self = Self(2);
    /// Bounds rectangle.
    pub const BOUNDS: Self = Self(3);
    /// Frame rectangle.
    pub const FRAME: Self = Self(4);
    /// Background color.
    pub const BACKGROUND_COLOR: Self = Self(5);
    /// Recorded draw-command list.
    pub const DRAW_COMMANDS: Self = Self(6);
    /// Pixel image; carries an asset.
    pub const IMAGE: Self = Self(7);
    /// Shaped text blob; carries an asset.
    pub const TEXT_BLOB: Self = Self(8);

    /// Returns a readable name for known types.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            1 => "Alpha",
            2 => "Transform",
            3 => "Bounds",
            4 => "Frame",
            5 => "BackgroundColor",
            6 => "DrawCommands",
            7 => "Image",
            8 => "TextBlob",
            _ => "Unknown",
        }
    }
}

impl fmt::Debug for ModifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModifierType({} {})", self.0, self.name())
    }
}

/// Large binary content a modifier refers to by key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    /// Payload cache key.
    pub key: u64,
    /// Transport header length to skip on replay.
    pub skip_bytes: u32,
    /// The asset bytes, header included.
    pub bytes: Arc<[u8]>,
}

/// One unit of opaque per-node state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modifier {
    /// Type as assigned by the modifier system.
    pub ty: ModifierType,
    /// Format version of `data`.
    pub version: u16,
    /// Opaque serialized state.
    pub data: Vec<u8>,
    /// Large content held out of line.
    pub asset: Option<Asset>,
}

impl Modifier {
    /// Creates a modifier with no asset.
    #[must_use]
    pub fn new(ty: ModifierType, version: u16, data: Vec<u8>) -> Self {
        Self {
            ty,
            version,
            data,
            asset: None,
        }
    }

    /// Attaches an asset.
    #[must_use]
    pub fn with_asset(mut self, key: u64, skip_bytes: u32, bytes: &[u8]) -> Self {
        self.asset = Some(Asset {
            key,
            skip_bytes,
            bytes: Arc::from(bytes),
        });
        self
    }
}

/// The live modifier system, as far as replay needs to know it.
pub trait ModifierSystem {
    /// Returns whether a recorded modifier of this type and version can be
    /// reconstructed by the running build.
    fn supports(&self, ty: ModifierType, version: u16) -> bool;
}

/// Accepts the built-in modifier types at or below their current version.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinModifiers;

impl BuiltinModifiers {
    /// Current format version of every built-in type.
    pub const CURRENT_VERSION: u16 = 1;
}

impl ModifierSystem for BuiltinModifiers {
    fn supports(&self, ty: ModifierType, version: u16) -> bool {
        (ModifierType::ALPHA.0..=ModifierType::TEXT_BLOB.0).contains(&ty.0)
            && version <= Self::CURRENT_VERSION
    }
}

/// Appends `m` to `w`, moving any asset bytes into `cache`.
pub fn encode_modifier(m: &Modifier, w: &mut ByteWriter, cache: &mut PayloadCache) {
    w.write_u16(m.ty.0);
    w.write_u16(m.version);
    w.write_bytes(&m.data);
    match &m.asset {
        Some(asset) if cache.fits(asset.bytes.len()) => {
            let pid = NodeId(asset.key).pid();
            let storage = cache.put_by_content(pid, asset.key, &asset.bytes, asset.skip_bytes);
            w.write_bool(true);
            w.write_u64(asset.key);
            w.write_u64(storage);
        }
        _ => w.write_bool(false),
    }
}

/// Reads a modifier written by [`encode_modifier`], resolving its asset from
/// `cache`.
pub fn decode_modifier(r: &mut ByteReader<'_>, cache: &PayloadCache) -> Result<Modifier, DecodeError> {
    let ty = ModifierType(r.read_u16()?);
    let version = r.read_u16()?;
    let data = r.read_bytes(MAX_MODIFIER_LEN, "modifier data")?.to_vec();
    let asset = if r.read_bool()? {
        let key = r.read_u64()?;
        let storage = r.read_u64()?;
        let entry = cache.get(storage).ok_or(DecodeError::MissingPayload { key })?;
        Some(Asset {
            key,
            skip_bytes: entry.skip_bytes,
            bytes: Arc::from(entry.bytes.as_slice()),
        })
    } else {
        None
    };
    Ok(Modifier {
        ty,
        version,
        data,
        asset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn asset_bytes_go_to_the_cache() {
        let m = Modifier::new(ModifierType::IMAGE, 1, vec![1, 2]).with_asset(77, 24, &[9; 40]);
        let mut cache = PayloadCache::new();
        let mut w = ByteWriter::new();
        encode_modifier(&m, &mut w, &mut cache);
        let bytes = w.into_bytes();

        assert_eq!(cache.len(), 1, "asset cached");
        assert!(bytes.len() < 40, "asset not inline");

        let back = decode_modifier(&mut ByteReader::new(&bytes), &cache).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn reused_key_with_new_bytes_keeps_both_assets() {
        let first = Modifier::new(ModifierType::IMAGE, 1, vec![]).with_asset(3, 0, b"frame one");
        let second = Modifier::new(ModifierType::IMAGE, 1, vec![]).with_asset(3, 0, b"frame two");
        let mut cache = PayloadCache::new();
        let mut w = ByteWriter::new();
        encode_modifier(&first, &mut w, &mut cache);
        encode_modifier(&second, &mut w, &mut cache);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(decode_modifier(&mut r, &cache).unwrap(), first);
        assert_eq!(decode_modifier(&mut r, &cache).unwrap(), second);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn identical_assets_share_one_entry() {
        let a = Modifier::new(ModifierType::TEXT_BLOB, 1, vec![]).with_asset(10, 0, b"glyphs");
        let b = Modifier::new(ModifierType::TEXT_BLOB, 1, vec![]).with_asset(11, 0, b"glyphs");
        let mut cache = PayloadCache::new();
        let mut w = ByteWriter::new();
        encode_modifier(&a, &mut w, &mut cache);
        encode_modifier(&b, &mut w, &mut cache);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.consumption(), 6);
    }

    #[test]
    fn missing_asset_is_reported() {
        let m = Modifier::new(ModifierType::TEXT_BLOB, 1, vec![]).with_asset(5, 0, b"glyphs");
        let mut w = ByteWriter::new();
        encode_modifier(&m, &mut w, &mut PayloadCache::new());
        let bytes = w.into_bytes();
        assert_eq!(
            decode_modifier(&mut ByteReader::new(&bytes), &PayloadCache::new()),
            Err(DecodeError::MissingPayload { key: 5 })
        );
    }

    #[test]
    fn builtin_system_rejects_newer_versions_and_unknown_types() {
        let sys = BuiltinModifiers;
        assert!(sys.supports(ModifierType::ALPHA, 1));
        assert!(!sys.supports(ModifierType::ALPHA, 2));
        assert!(!sys.supports(ModifierType(999), 1));
    }
}
