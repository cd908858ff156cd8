// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for [`super::loader::load`] (`spec.md` §4.H, §8 scenarios 4-6).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::string::{String, ToString};
use std::vec::Vec;

use super::loader::{load, ImageSource, NoRelocationWatch, RelocationWatch};
use super::registry::SuiteRegistry;
use super::writer::encode;
use super::{BadImage, ImageError};
use crate::heap::SnapshotGraph;
use crate::types::{Address, WORD_SIZE};

/// A fixed table of named byte streams, standing in for the excluded
/// file/channel transport (`spec.md` §1).
#[derive(Default)]
struct TableSource {
    streams: BTreeMap<String, Vec<u8>>,
}

impl TableSource {
    fn put(&mut self, url: &str, bytes: Vec<u8>) {
        self.streams.insert(url.to_string(), bytes);
    }
}

impl ImageSource for TableSource {
    fn fetch(&self, url: &str) -> Vec<u8> {
        self.streams.get(url).cloned().unwrap_or_default()
    }
}

fn leaf_graph(residence: u64, payload: u64) -> SnapshotGraph {
    let mut bytes = vec![0u8; WORD_SIZE];
    bytes.copy_from_slice(&payload.to_ne_bytes());
    SnapshotGraph {
        residence: Address::new(residence),
        bytes,
        oop_offsets: vec![],
        root_offset: 0,
    }
}

#[test]
fn loading_an_unknown_url_yields_truncated_image_error() {
    let source = TableSource::default();
    let mut registry = SuiteRegistry::new();

    let err = load(&source, &mut registry, "file://missing.suite", false, &NoRelocationWatch).unwrap_err();
    assert!(matches!(err, ImageError::BadImage(BadImage::Truncated)));
}

#[test]
fn round_trip_preserves_hash_and_payload() {
    let mut source = TableSource::default();
    let graph = leaf_graph(0x1000, 0xBEEF);
    let bytes = encode(&graph, None, None);
    source.put("file://leaf.suite", bytes);

    let mut registry = SuiteRegistry::new();
    let image = load(&source, &mut registry, "file://leaf.suite", false, &NoRelocationWatch).unwrap();

    assert_eq!(image.size(), WORD_SIZE);
    let word = u64::from_ne_bytes(image.bytes().try_into().unwrap());
    assert_eq!(word, 0xBEEF);
    assert_eq!(image.canonical_start(), 0);
}

#[test]
fn loading_the_same_url_twice_returns_the_cached_image() {
    let mut source = TableSource::default();
    let bytes = encode(&leaf_graph(0x1000, 1), None, None);
    source.put("file://leaf.suite", bytes);

    let mut registry = SuiteRegistry::new();
    let first = load(&source, &mut registry, "file://leaf.suite", false, &NoRelocationWatch).unwrap();
    let second = load(&source, &mut registry, "file://leaf.suite", false, &NoRelocationWatch).unwrap();

    assert!(std::rc::Rc::ptr_eq(&first, &second));
}

#[test]
fn child_image_resolves_its_parent_and_lands_after_it_canonically() {
    let mut source = TableSource::default();
    let parent_graph = leaf_graph(0x1000, 1);
    let parent_bytes = encode(&parent_graph, None, None);
    source.put("file://parent.suite", parent_bytes);

    let mut registry = SuiteRegistry::new();
    let parent = load(&source, &mut registry, "file://parent.suite", false, &NoRelocationWatch).unwrap();

    let child_graph = leaf_graph(0x2000, 2);
    let child_bytes = encode(&child_graph, Some(("file://parent.suite", &parent)), None);
    source.put("file://child.suite", child_bytes);

    let child = load(&source, &mut registry, "file://child.suite", false, &NoRelocationWatch).unwrap();
    assert_eq!(child.canonical_start(), parent.canonical_end());
}

#[test]
fn parent_hash_mismatch_fails_lineage_without_registering_child() {
    let mut source = TableSource::default();
    let parent_graph = leaf_graph(0x1000, 1);
    let mut parent_bytes = encode(&parent_graph, None, None);
    // Corrupt one byte inside the canonical memory region so the parent's
    // recomputed hash no longer matches what the child's header recorded.
    let last = parent_bytes.len() - 1;
    parent_bytes[last] ^= 0xFF;
    source.put("file://parent.suite", parent_bytes);

    // Build the child against an *uncorrupted* parent so its header
    // records the original (now stale) hash.
    let mut registry = SuiteRegistry::new();
    let clean_parent_graph = leaf_graph(0x1000, 1);
    let clean_parent = {
        let bytes = encode(&clean_parent_graph, None, None);
        let mut staging = TableSource::default();
        staging.put("file://parent.suite", bytes);
        let mut staging_registry = SuiteRegistry::new();
        load(&staging, &mut staging_registry, "file://parent.suite", false, &NoRelocationWatch).unwrap()
    };
    let child_graph = leaf_graph(0x2000, 2);
    let child_bytes = encode(&child_graph, Some(("file://parent.suite", &clean_parent)), None);
    source.put("file://child.suite", child_bytes);

    let err = load(&source, &mut registry, "file://child.suite", false, &NoRelocationWatch).unwrap_err();
    assert!(matches!(err, ImageError::BadLineage(_)));
    assert!(registry.lookup_by_url("file://child.suite").is_none());
}

/// Reports movement on the first attempt only (`spec.md` §8 scenario 6).
struct MovesOnce {
    calls: Cell<u32>,
}

impl RelocationWatch for MovesOnce {
    fn moved(&self, attempt: u32) -> bool {
        self.calls.set(self.calls.get() + 1);
        attempt == 1
    }
}

/// Always reports movement, to exercise the bounded-retry failure path.
struct AlwaysMoves;

impl RelocationWatch for AlwaysMoves {
    fn moved(&self, _attempt: u32) -> bool {
        true
    }
}

#[test]
fn gc_during_relocation_retries_once_and_succeeds() {
    let mut source = TableSource::default();
    let bytes = encode(&leaf_graph(0x1000, 42), None, None);
    source.put("file://leaf.suite", bytes);

    let mut registry = SuiteRegistry::new();
    let watch = MovesOnce { calls: Cell::new(0) };
    let image = load(&source, &mut registry, "file://leaf.suite", false, &watch).unwrap();

    assert_eq!(watch.calls.get(), 2);
    assert_eq!(u64::from_ne_bytes(image.bytes().try_into().unwrap()), 42);
}

#[test]
fn gc_during_relocation_gives_up_after_five_attempts() {
    let mut source = TableSource::default();
    let bytes = encode(&leaf_graph(0x1000, 42), None, None);
    source.put("file://leaf.suite", bytes);

    let mut registry = SuiteRegistry::new();
    let err = load(&source, &mut registry, "file://leaf.suite", false, &AlwaysMoves).unwrap_err();

    assert!(matches!(err, ImageError::GcDuringRelocation(_)));
}
