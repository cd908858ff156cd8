// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Image loader: the inverse of [`super::writer`] (`spec.md` §4.H).
//!
//! `load` never touches a file or socket itself — [`ImageSource`] is the
//! seam an embedder fills with whatever transport it has (`spec.md` §1's
//! "channel I/O and file transport" Non-goal). Everything downstream of
//! `fetch` — header parsing, parent-chain verification, relocation — lives
//! here.

extern crate alloc;

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use super::{additive_hash, AncestorRemap, BadImage, BadLineage, GcDuringRelocation, Image, ImageError, OopBitmap, SuiteRegistry, ATTR_32BIT, ATTR_HAS_TYPEMAP, MAGIC};
use crate::types::{Address, WORD_SIZE};

/// A relocation attempt aborts and retries after this many consecutive
/// `GCDuringRelocation` detections (`spec.md` §4.H).
const MAX_RELOCATION_ATTEMPTS: u32 = 5;

/// The transport collaborator `load` delegates byte-fetching to.
///
/// `fetch` is expected to block until the named image's complete byte
/// stream is available; how it does so (filesystem, network, embedded
/// blob) is entirely out of scope here.
pub trait ImageSource {
    /// Retrieve the raw byte stream for `url`.
    fn fetch(&self, url: &str) -> Vec<u8>;

    /// Choose the real address an image's relocated bytes should occupy.
    ///
    /// The default places an image at its own canonical address, i.e. no
    /// translation at all — adequate for a hosted test heap where
    /// "canonical" and "real" coincide. An embedder backing a real
    /// two-semispace heap overrides this to return wherever it actually
    /// placed (or allocated, for `read_only` loads) the buffer.
    fn residence_for(&self, url: &str, canonical_start: u64, read_only: bool) -> Address {
        let _ = (url, read_only);
        Address::new(canonical_start)
    }
}

/// Detects a concurrent collection relocating the buffer being loaded
/// mid-relocation (`spec.md` §4.H's `GCDuringRelocation`).
///
/// Production code never sees this happen inside `load`'s single
/// relocation pass — this seam exists so tests can simulate the race
/// deterministically (`spec.md` §8 scenario 6) without a real second
/// thread.
pub trait RelocationWatch {
    /// Called once per relocation attempt (1-based). Returning `true`
    /// simulates the buffer having moved during that attempt, forcing a
    /// retry; the real condition this stands in for is detected by
    /// comparing a stable object identity against address arithmetic.
    fn moved(&self, attempt: u32) -> bool {
        let _ = attempt;
        false
    }
}

/// A [`RelocationWatch`] that never reports movement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelocationWatch;

impl RelocationWatch for NoRelocationWatch {}

/// `load(url, read_only)` (`spec.md` §4.H).
///
/// If `url` is already registered, returns the cached image. Otherwise
/// reads and verifies the header, recursively loads the parent chain,
/// verifies lineage, relocates pointers into the chosen residence, and
/// registers the result.
///
/// # Errors
///
/// Returns [`ImageError::BadImage`] for a malformed stream,
/// [`ImageError::BadLineage`] on a parent hash mismatch, or
/// [`ImageError::GcDuringRelocation`] after [`MAX_RELOCATION_ATTEMPTS`]
/// retries.
pub fn load<S: ImageSource, W: RelocationWatch>(
    source: &S,
    registry: &mut SuiteRegistry,
    url: &str,
    read_only: bool,
    watch: &W,
) -> Result<Rc<Image>, ImageError> {
    if let Some(cached) = registry.lookup_by_url(url) {
        return Ok(cached);
    }

    let raw = source.fetch(url);
    let mut r = Reader::new(&raw);

    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(BadImage::BadMagic { found: magic }.into());
    }
    let _minor_version = r.u16()?;
    let _major_version = r.u16()?;

    let attributes = r.u32()?;
    if (attributes & ATTR_32BIT != 0) != (WORD_SIZE == 4) {
        return Err(BadImage::BitWidthMismatch.into());
    }
    let has_typemap = attributes & ATTR_HAS_TYPEMAP != 0;

    let parent_hash = r.u32()?;
    let parent_url = r.utf8()?;

    let parent = if parent_url.is_empty() {
        None
    } else {
        let loaded_parent = load(source, registry, &parent_url, read_only, watch)?;
        if loaded_parent.hash() != parent_hash {
            return Err(BadLineage {
                url: String::from(url),
                parent_url: parent_url.clone(),
                expected_hash: parent_hash,
                actual_hash: loaded_parent.hash(),
            }
            .into());
        }
        Some(loaded_parent)
    };

    let root_offset = r.u32()? as usize;
    let size = r.u32()? as usize;
    if size == 0 {
        return Err(BadImage::OversizeMemory { size: 0 }.into());
    }
    if root_offset >= size {
        return Err(BadImage::InvalidRootOffset { offset: root_offset as u32, size: size as u32 }.into());
    }

    let word_count = size / WORD_SIZE;
    let oopmap_len = word_count.div_ceil(8);
    let bitmap = OopBitmap::from_bytes(word_count, r.take(oopmap_len)?);

    let pad = padding_len(r.pos);
    let _padding = r.take(pad)?;

    let memory = r.take(size)?.to_vec();
    let typemap = if has_typemap { Some(r.take(size)?.to_vec()) } else { None };

    if r.remaining() != 0 {
        return Err(BadImage::TrailingBytes { extra: r.remaining() }.into());
    }

    // Hashed in canonical form, before relocation, matching what the
    // writer hashed (`spec.md` §4.G).
    let hash = additive_hash(&memory);
    let canonical_start = parent.as_ref().map_or(0, |p| p.canonical_end());

    let ancestors: Vec<AncestorRemap> = parent
        .as_ref()
        .map(|p| {
            core::iter::once(p.as_ref())
                .chain(p.ancestors())
                .map(|a| AncestorRemap {
                    from_start: a.canonical_start(),
                    from_end: a.canonical_end(),
                    to_start: a.residence().as_u64(),
                })
                .collect()
        })
        .unwrap_or_default();

    let residence = source.residence_for(url, canonical_start, read_only);

    let mut attempt = 0u32;
    let relocated = loop {
        attempt += 1;
        let mut buf = memory.clone();
        super::relocate_pointers(&mut buf, &bitmap, canonical_start, canonical_start + size as u64, residence.as_u64(), &ancestors);
        if !watch.moved(attempt) {
            break buf;
        }
        if attempt >= MAX_RELOCATION_ATTEMPTS {
            return Err(GcDuringRelocation.into());
        }
    };

    let image = Rc::new(Image {
        parent,
        canonical_start,
        size,
        root_offset,
        hash,
        bytes: relocated.into_boxed_slice(),
        typemap: typemap.map(Vec::into_boxed_slice),
        residence,
        parent_url,
    });

    registry.install(image.clone(), String::from(url));
    Ok(image)
}

/// Bytes needed after `written_before_memory` to reach the next
/// word-aligned offset — the loader's mirror of
/// [`super::writer::padding_len`] (not reused directly since that
/// function is private to the writer and computed from a different
/// running total).
const fn padding_len(written_before_memory: usize) -> usize {
    let rem = written_before_memory % WORD_SIZE;
    if rem == 0 {
        0
    } else {
        WORD_SIZE - rem
    }
}

/// A forward-only cursor over an image byte stream.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BadImage> {
        let end = self.pos.checked_add(n).ok_or(BadImage::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(BadImage::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, BadImage> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().expect("2-byte slice")))
    }

    fn u32(&mut self) -> Result<u32, BadImage> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().expect("4-byte slice")))
    }

    fn utf8(&mut self) -> Result<String, BadImage> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| BadImage::Truncated)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}
