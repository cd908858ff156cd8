// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Errors the image writer, loader, and suite registry can raise
//! (`spec.md` §7).

extern crate alloc;

use alloc::string::String;
use core::fmt;

use crate::heap::HeapError;

/// The on-disk stream did not describe a valid image (`spec.md` §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadImage {
    /// The leading magic number did not match `0xDEADBEEF`.
    BadMagic { found: u32 },
    /// `attributes` bit 1 (32-bit) did not match this build's word width.
    BitWidthMismatch,
    /// The stream ended before a declared field could be fully read.
    Truncated,
    /// Bytes remained in the stream after the declared `memory`/`typemap`
    /// region.
    TrailingBytes { extra: usize },
    /// `root_offset` does not address a location inside `memory[]`.
    InvalidRootOffset { offset: u32, size: u32 },
    /// The declared `size` is implausibly large (would not fit in this
    /// build's address space, or is zero when a root is required).
    OversizeMemory { size: u32 },
}

impl fmt::Display for BadImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic { found } => write!(f, "bad image magic: found {found:#010x}, expected 0xdeadbeef"),
            Self::BitWidthMismatch => write!(f, "image bit-width does not match this build"),
            Self::Truncated => write!(f, "image stream truncated"),
            Self::TrailingBytes { extra } => write!(f, "{extra} trailing byte(s) after image body"),
            Self::InvalidRootOffset { offset, size } => {
                write!(f, "root offset {offset} outside memory region of size {size}")
            }
            Self::OversizeMemory { size } => write!(f, "oversize memory region: {size} bytes"),
        }
    }
}

/// A parent-chain mismatch: the named parent's hash does not agree with
/// what this image recorded when it was saved (`spec.md` §4.H, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadLineage {
    /// URL of the image being loaded.
    pub url: String,
    /// URL of the parent it names.
    pub parent_url: String,
    /// Hash recorded in this image's header.
    pub expected_hash: u32,
    /// Hash actually computed for the loaded parent.
    pub actual_hash: u32,
}

impl fmt::Display for BadLineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lineage mismatch loading {}: parent {} has hash {:#010x}, expected {:#010x}",
            self.url, self.parent_url, self.actual_hash, self.expected_hash
        )
    }
}

/// A concurrent collection relocated the buffer being loaded before
/// relocation completed (`spec.md` §4.H, §7). The loader retries up to
/// five times; this type only distinguishes the condition from any other
/// error while that retry loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcDuringRelocation;

impl fmt::Display for GcDuringRelocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer relocated by a concurrent collection")
    }
}

/// A registry slot could not be installed or removed as requested
/// (`spec.md` §4.I, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryConflict {
    /// The requested slot is already occupied.
    SlotOccupied { slot: usize },
    /// Removal was requested for an image still referenced by a child.
    StillReferenced { url: String, referencing_children: usize },
    /// No URL in the registry matches the request.
    NotFound { url: String },
}

impl fmt::Display for RegistryConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotOccupied { slot } => write!(f, "registry slot {slot} is already occupied"),
            Self::StillReferenced { url, referencing_children } => {
                write!(f, "image {url} still referenced by {referencing_children} child image(s)")
            }
            Self::NotFound { url } => write!(f, "no image registered for url {url}"),
        }
    }
}

/// Any failure the image subsystem can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    BadImage(BadImage),
    BadLineage(BadLineage),
    GcDuringRelocation(GcDuringRelocation),
    RegistryConflict(RegistryConflict),
    /// The collector/serializer failed while producing the graph being
    /// saved (an exhausted to-space, a reentrant call, or a reachable
    /// `ObjectMemory` object — `spec.md` §9's Open Question).
    Heap(HeapError),
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadImage(e) => e.fmt(f),
            Self::BadLineage(e) => e.fmt(f),
            Self::GcDuringRelocation(e) => e.fmt(f),
            Self::RegistryConflict(e) => e.fmt(f),
            Self::Heap(e) => e.fmt(f),
        }
    }
}

impl From<BadImage> for ImageError {
    fn from(e: BadImage) -> Self {
        Self::BadImage(e)
    }
}

impl From<BadLineage> for ImageError {
    fn from(e: BadLineage) -> Self {
        Self::BadLineage(e)
    }
}

impl From<GcDuringRelocation> for ImageError {
    fn from(e: GcDuringRelocation) -> Self {
        Self::GcDuringRelocation(e)
    }
}

impl From<RegistryConflict> for ImageError {
    fn from(e: RegistryConflict) -> Self {
        Self::RegistryConflict(e)
    }
}

impl From<HeapError> for ImageError {
    fn from(e: HeapError) -> Self {
        Self::Heap(e)
    }
}
