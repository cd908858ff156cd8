// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Object-memory images: the serializer's on-disk form (`spec.md` §3's
//! "Image (ObjectMemory)", §4.F-§4.I).
//!
//! This module ties together three collaborators that all center on the
//! same [`Image`] descriptor:
//!
//! - [`writer`] turns a [`crate::heap::SnapshotGraph`] into the exact byte
//!   layout from `spec.md` §4.G, relocating pointers from the live heap's
//!   real addresses into the canonical address domain.
//! - [`loader`] does the inverse: reads that byte layout back, verifies
//!   its header and parent lineage, and relocates pointers into whatever
//!   real address the caller wants the image to live at.
//! - [`registry`] is the suite registry of `spec.md` §4.I: the slot table
//!   of every loaded image, with the reference-counted removal rule.
//!
//! Channel I/O and file transport are explicit Non-goals (`spec.md` §1):
//! nothing here opens a file or socket. [`ImageSource`] is the seam an
//! embedder fills in with whatever transport it has; this crate only
//! cares about the bytes.

mod bitmap;
mod error;
pub mod loader;
pub mod registry;
pub mod writer;

#[cfg(test)]
mod loader_test;

extern crate alloc;

use alloc::rc::Rc;
use alloc::string::String;

pub use bitmap::OopBitmap;
pub use error::{BadImage, BadLineage, GcDuringRelocation, ImageError, RegistryConflict};
pub use loader::{load, ImageSource, NoRelocationWatch, RelocationWatch};
pub use registry::{SuiteRegistry, BOOTSTRAP_SLOT};

use crate::types::Address;

/// An immutable, loaded object-memory image (`spec.md` §3).
///
/// `canonical_start == parent.map_or(0, |p| p.canonical_end())`, and
/// `canonical_end == canonical_start + size`. `residence` is the real
/// address this image's bytes occupy right now, used only so that a
/// *child* image being serialized on top of this one can recognize
/// cross-image pointers and relocate them into canonical form (`spec.md`
/// §4.F's "walk every ancestor P in the parent chain").
#[derive(Debug)]
pub struct Image {
    parent: Option<Rc<Image>>,
    canonical_start: u64,
    size: usize,
    root_offset: usize,
    hash: u32,
    bytes: alloc::boxed::Box<[u8]>,
    typemap: Option<alloc::boxed::Box<[u8]>>,
    residence: Address,
    parent_url: String,
}

impl Image {
    /// The canonical address this image's bytes would occupy if laid out
    /// back-to-back after its ancestors (`spec.md` §3).
    #[must_use]
    pub const fn canonical_start(&self) -> u64 {
        self.canonical_start
    }

    /// `canonical_start + size`: the next free canonical address after
    /// this image, handed to a child image as its own `canonical_start`.
    #[must_use]
    pub const fn canonical_end(&self) -> u64 {
        self.canonical_start + self.size as u64
    }

    /// Length of this image's `memory[]` region in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Byte offset of the root object within [`Self::bytes`].
    #[must_use]
    pub const fn root_offset(&self) -> usize {
        self.root_offset
    }

    /// Additive lineage checksum over the canonical-form bytes
    /// (`spec.md` §4.G).
    #[must_use]
    pub const fn hash(&self) -> u32 {
        self.hash
    }

    /// The relocated, resident bytes of this image's graph.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte offset of the root object, relative to [`Self::residence`]:
    /// the absolute address callers should treat as this image's root.
    #[must_use]
    pub fn root_address(&self) -> Address {
        self.residence.add(self.root_offset as u64)
    }

    /// The per-byte type map, if this image carries one (`spec.md` §4.G
    /// attributes bit 0).
    #[must_use]
    pub fn typemap(&self) -> Option<&[u8]> {
        self.typemap.as_deref()
    }

    /// Real address this image's bytes currently occupy.
    #[must_use]
    pub const fn residence(&self) -> Address {
        self.residence
    }

    /// This image's parent, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Rc<Image>> {
        self.parent.as_ref()
    }

    /// URL this image's header names as its parent (empty if none).
    #[must_use]
    pub fn parent_url(&self) -> &str {
        &self.parent_url
    }

    /// Ancestors from nearest parent to the root bootstrap image.
    pub fn ancestors(&self) -> impl Iterator<Item = &Image> {
        core::iter::successors(self.parent.as_deref(), |img| img.parent.as_deref())
    }
}

/// One ancestor's address-space remap, direction-agnostic: "pointers in
/// `[from_start, from_end)` become `to_start + (pointer - from_start)`".
/// The writer walks ancestors real → canonical; the loader walks them
/// canonical → real (`spec.md` §4.F, §4.H) — same shape, opposite roles.
pub(crate) struct AncestorRemap {
    pub(crate) from_start: u64,
    pub(crate) from_end: u64,
    pub(crate) to_start: u64,
}

/// Rewrite every pointer the bitmap marks, in place.
///
/// A pointer landing in `[own_from_start, own_from_end)` is an
/// intra-graph reference and becomes `own_to_start + (pointer -
/// own_from_start)`. Failing that, the first matching ancestor remap
/// applies. A pointer matching neither (null, or a permanent address
/// outside every known image) is left untouched.
pub(crate) fn relocate_pointers(
    bytes: &mut [u8],
    bitmap: &OopBitmap,
    own_from_start: u64,
    own_from_end: u64,
    own_to_start: u64,
    ancestors: &[AncestorRemap],
) {
    for word in bitmap.iter() {
        let ptr = read_ptr(bytes, word);
        if ptr == 0 {
            continue;
        }
        if ptr >= own_from_start && ptr < own_from_end {
            write_ptr(bytes, word, own_to_start + (ptr - own_from_start));
            continue;
        }
        if let Some(remap) = ancestors.iter().find(|r| ptr >= r.from_start && ptr < r.from_end) {
            write_ptr(bytes, word, remap.to_start + (ptr - remap.from_start));
        }
    }
}

fn read_ptr(bytes: &[u8], word_offset: usize) -> u64 {
    let start = word_offset * crate::types::WORD_SIZE;
    let end = start + crate::types::WORD_SIZE;
    u64::from_ne_bytes(bytes[start..end].try_into().expect("word-sized slice"))
}

fn write_ptr(bytes: &mut [u8], word_offset: usize, value: u64) {
    let start = word_offset * crate::types::WORD_SIZE;
    bytes[start..start + crate::types::WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
}

/// Additive lineage checksum (`spec.md` §4.G): "weak" by design, this is
/// a fingerprint for detecting accidental lineage mismatches, not a
/// cryptographic digest.
#[must_use]
pub fn additive_hash(bytes: &[u8]) -> u32 {
    let mut hash = bytes.len() as u32;
    for &b in bytes {
        hash = hash.wrapping_add(u32::from(b));
    }
    hash
}

/// Leading magic number of every image stream (`spec.md` §4.G).
pub(crate) const MAGIC: u32 = 0xDEAD_BEEF;
pub(crate) const MINOR_VERSION: u16 = 1;
pub(crate) const MAJOR_VERSION: u16 = 1;
/// `attributes` bit 0: a typemap region follows `memory[]`.
pub(crate) const ATTR_HAS_TYPEMAP: u32 = 1 << 0;
/// `attributes` bit 1: this image targets a 32-bit word size.
pub(crate) const ATTR_32BIT: u32 = 1 << 1;
