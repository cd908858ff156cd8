// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Errors the collector itself can raise.

use core::fmt;

use crate::memory::BadAddress;

/// No space remained in to-space to complete a collection.
///
/// A healthy system never sees this: it indicates the live set exceeds
/// one semi-space, a sizing bug rather than transient pressure (`spec.md`
/// §7). There is no retry; the caller halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    /// Bytes the failed allocation needed.
    pub requested: usize,
    /// Bytes left in the active to-space.
    pub available: usize,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "heap exhausted: requested {} bytes, {} available in to-space",
            self.requested, self.available
        )
    }
}

/// The collector or serializer was entered out of its required protocol
/// order (`spec.md` §5, §7): a recursive `collect`/`snapshot` call, a
/// snapshot pass taken out of turn, or an `ObjectMemory` object reached
/// from a snapshot root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidSequence {
    /// `collect()` or `snapshot()` was called while a collection was
    /// already in progress.
    Reentrant,
    /// Pass 2 of a snapshot was requested without a preceding pass 1, or
    /// pass 1 was requested again before pass 2 consumed the previous
    /// sizing result.
    WrongSnapshotPass,
    /// An `ObjectMemory` object was reachable from a snapshot root.
    ObjectMemoryReachable,
}

impl fmt::Display for InvalidSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reentrant => write!(f, "collector re-entered while already collecting"),
            Self::WrongSnapshotPass => write!(f, "snapshot pass requested out of sequence"),
            Self::ObjectMemoryReachable => {
                write!(f, "snapshot root reaches a live ObjectMemory object")
            }
        }
    }
}

/// Any failure the collector can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    BadAddress(BadAddress),
    Exhausted(Exhausted),
    InvalidSequence(InvalidSequence),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadAddress(e) => e.fmt(f),
            Self::Exhausted(e) => e.fmt(f),
            Self::InvalidSequence(e) => e.fmt(f),
        }
    }
}

impl From<BadAddress> for HeapError {
    fn from(e: BadAddress) -> Self {
        Self::BadAddress(e)
    }
}

impl From<Exhausted> for HeapError {
    fn from(e: Exhausted) -> Self {
        Self::Exhausted(e)
    }
}

impl From<InvalidSequence> for HeapError {
    fn from(e: InvalidSequence) -> Self {
        Self::InvalidSequence(e)
    }
}
