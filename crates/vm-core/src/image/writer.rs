// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Image writer: encodes a snapshot graph to the exact byte layout of
//! `spec.md` §4.G.
//!
//! `spec.md` §6.2 describes this as `image_writer.save(url, control_block,
//! parent) -> ()`, i.e. something that also performs the file write. That
//! half is the excluded "channel I/O and file transport" collaborator
//! (`spec.md` §1); [`encode`] only produces the byte stream, leaving the
//! caller to hand it to whatever transport it has.

extern crate alloc;

use alloc::vec::Vec;

use super::{additive_hash, AncestorRemap, Image, OopBitmap, ATTR_32BIT, ATTR_HAS_TYPEMAP, MAGIC, MAJOR_VERSION, MINOR_VERSION};
use crate::heap::SnapshotGraph;
use crate::types::WORD_SIZE;

/// Encode a just-copied snapshot graph into an image byte stream.
///
/// `parent`, when present, is `(url, image)`: the URL this image's header
/// should name as its parent, and the already-loaded parent [`Image`]
/// whose canonical/real address ranges are needed to recognize
/// cross-image pointers (`spec.md` §4.F's relocation pass). `typemap`,
/// when present, must be exactly `graph.bytes.len()` bytes long.
#[must_use]
pub fn encode(graph: &SnapshotGraph, parent: Option<(&str, &Image)>, typemap: Option<&[u8]>) -> Vec<u8> {
    let canonical_start = parent.map_or(0, |(_, p)| p.canonical_end());
    let mut bytes = graph.bytes.clone();
    let word_count = bytes.len() / WORD_SIZE;
    let bitmap = OopBitmap::from_offsets(word_count, &graph.oop_offsets);

    let residence = graph.residence.as_u64();
    let ancestors: alloc::vec::Vec<AncestorRemap> = parent
        .map(|(_, p)| {
            core::iter::once(p)
                .chain(p.ancestors())
                .map(|a| AncestorRemap {
                    from_start: a.residence().as_u64(),
                    from_end: a.residence().as_u64() + a.size() as u64,
                    to_start: a.canonical_start(),
                })
                .collect()
        })
        .unwrap_or_default();
    super::relocate_pointers(&mut bytes, &bitmap, residence, residence + bytes.len() as u64, canonical_start, &ancestors);

    let hash = additive_hash(&bytes);

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.extend_from_slice(&MINOR_VERSION.to_be_bytes());
    out.extend_from_slice(&MAJOR_VERSION.to_be_bytes());

    let mut attributes = 0u32;
    if typemap.is_some() {
        attributes |= ATTR_HAS_TYPEMAP;
    }
    if WORD_SIZE == 4 {
        attributes |= ATTR_32BIT;
    }
    out.extend_from_slice(&attributes.to_be_bytes());

    let parent_hash = parent.map_or(0, |(_, p)| p.hash());
    out.extend_from_slice(&parent_hash.to_be_bytes());

    let parent_url = parent.map_or("", |(url, _)| url);
    out.extend_from_slice(&(parent_url.len() as u32).to_be_bytes());
    out.extend_from_slice(parent_url.as_bytes());

    out.extend_from_slice(&(graph.root_offset as u32).to_be_bytes());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());

    out.extend_from_slice(bitmap.as_bytes());

    let padding = padding_len(out.len());
    out.extend(core::iter::repeat_n(0u8, padding));

    out.extend_from_slice(&bytes);

    if let Some(map) = typemap {
        debug_assert_eq!(map.len(), bytes.len(), "typemap must match memory region size");
        out.extend_from_slice(map);
    }

    out
}

/// Bytes needed after `written_before_memory` to reach the next
/// word-aligned offset (`spec.md` §4.G: "the writer computes padding as
/// `bytes_written_before_memory mod word_size`, then `word_size -  that`
/// if non-zero").
fn padding_len(written_before_memory: usize) -> usize {
    let rem = written_before_memory % WORD_SIZE;
    if rem == 0 {
        0
    } else {
        WORD_SIZE - rem
    }
}
