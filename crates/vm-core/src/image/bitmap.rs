// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The pointer-location bitmap recorded alongside a serialized image
//! (`spec.md` §3 "Oop bitmap", §4.G).
//!
//! Bit `n` means word offset `n` (from the image's base) holds a pointer.
//! Stored as a packed byte array so it round-trips directly into the
//! on-disk layout described in §4.G.

extern crate alloc;

use alloc::vec::Vec;

/// A finite set of word indices, packed one bit per word.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OopBitmap {
    bits: Vec<u8>,
    word_count: usize,
}

impl OopBitmap {
    /// An empty bitmap sized to cover `word_count` words, all unset.
    #[must_use]
    pub fn new(word_count: usize) -> Self {
        Self {
            bits: alloc::vec![0u8; word_count.div_ceil(8)],
            word_count,
        }
    }

    /// Build a bitmap from a list of word offsets, as produced by
    /// [`crate::heap::SnapshotGraph::oop_offsets`].
    #[must_use]
    pub fn from_offsets(word_count: usize, offsets: &[usize]) -> Self {
        let mut bitmap = Self::new(word_count);
        for &offset in offsets {
            bitmap.set(offset);
        }
        bitmap
    }

    /// Reconstruct a bitmap from its packed on-disk byte form.
    #[must_use]
    pub fn from_bytes(word_count: usize, bytes: &[u8]) -> Self {
        let mut bits = bytes.to_vec();
        bits.resize(word_count.div_ceil(8), 0);
        Self { bits, word_count }
    }

    /// The packed byte form written to an image stream (`spec.md` §4.G's
    /// `oopmap[ ceil(size / word_size / 8) ]`).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Number of words this bitmap covers.
    #[must_use]
    pub const fn word_count(&self) -> usize {
        self.word_count
    }

    /// Mark word offset `n` as holding a pointer.
    pub fn set(&mut self, n: usize) {
        debug_assert!(n < self.word_count, "oop bitmap index {n} out of range {}", self.word_count);
        self.bits[n / 8] |= 1 << (n % 8);
    }

    /// Whether word offset `n` is marked.
    #[must_use]
    pub fn get(&self, n: usize) -> bool {
        self.bits.get(n / 8).is_some_and(|byte| byte & (1 << (n % 8)) != 0)
    }

    /// Word indices set in this bitmap, in ascending order (`spec.md`
    /// §3's iterator contract).
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.word_count).filter(|&n| self.get(n))
    }
}
