// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for [`Heap::collect`] and the snapshot passes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;

use proptest::prelude::*;

use super::*;
use crate::klass::{ClassDescriptor, StaticClassTable};
use crate::memory::HostMemory;
use crate::roots::VecRootProvider;
use crate::types::Address;

type TestHeap = Heap<HostMemory, StaticClassTable, VecRootProvider>;

fn make_heap(heap_words: usize) -> (TestHeap, Address, Address) {
    let mem = HostMemory::new(Address::new(0x1_0000), heap_words * WORD_SIZE);
    let mut classes = StaticClassTable::new();
    let object_array = classes.register(ClassDescriptor::object_array());
    let point = classes.register(ClassDescriptor::instance(2, vec![0, 1]));
    let roots = VecRootProvider::new();
    (Heap::new(mem, classes, roots, GcOptions::default()), object_array, point)
}

#[test]
fn cycle_through_array_survives_collection() {
    let (mut heap, object_array, _point) = make_heap(256);
    let array = heap.allocate_object(object_array, 1).unwrap();
    heap.mem_mut().write(array, array.as_word()).unwrap();
    let slot = heap.roots.push_global(array);

    heap.collect().unwrap();

    let new_array = heap.roots.global(slot);
    let self_ref: Word = heap.mem().read(new_array).unwrap();
    assert_eq!(self_ref.as_address(), new_array);
}

#[test]
fn unreachable_objects_are_not_copied() {
    let (mut heap, object_array, _point) = make_heap(256);
    let _garbage = heap.allocate_object(object_array, 4).unwrap();
    let kept = heap.allocate_object(object_array, 1).unwrap();
    let slot = heap.roots.push_global(kept);

    let bytes_before = heap.to_space().alloc_ptr.diff(heap.to_space().start);
    heap.collect().unwrap();
    let bytes_after = heap.to_space().alloc_ptr.diff(heap.to_space().start);

    assert!(bytes_after < bytes_before);
    assert!(!heap.roots.global(slot).is_null());
}

#[test]
fn instance_reference_fields_are_traced() {
    let (mut heap, object_array, point) = make_heap(256);
    let target = heap.allocate_object(object_array, 1).unwrap();
    let p = heap.allocate_object(point, 0).unwrap();
    heap.mem_mut().write(p, target.as_word()).unwrap();
    let slot = heap.roots.push_global(p);

    heap.collect().unwrap();

    let new_p = heap.roots.global(slot);
    let field: Word = heap.mem().read(new_p).unwrap();
    assert!(!field.as_address().is_null());
}

#[test]
fn exhausted_when_live_set_too_large() {
    let (mut heap, object_array, _point) = make_heap(32);
    let mut last = Address::zero();
    loop {
        match heap.allocate_object(object_array, 4) {
            Ok(addr) => {
                heap.mem_mut().write(addr, last.as_word()).unwrap();
                last = addr;
            }
            Err(HeapError::Exhausted(_)) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    heap.roots.push_global(last);
    assert!(matches!(heap.collect(), Ok(true) | Err(HeapError::Exhausted(_))));
}

#[test]
fn reentrant_collect_is_rejected() {
    let (mut heap, _object_array, _point) = make_heap(256);
    heap.collecting = true;
    assert_eq!(heap.collect(), Err(HeapError::InvalidSequence(InvalidSequence::Reentrant)));
}

#[test]
fn snapshot_pass_out_of_order_is_rejected() {
    let (mut heap, object_array, _point) = make_heap(256);
    let root = heap.allocate_object(object_array, 0).unwrap();
    let sizing = heap.snapshot_size(root, None).unwrap();
    assert!(heap.snapshot_size(root, None).is_err());
    heap.snapshot_copy(sizing).unwrap();
}

#[test]
fn snapshot_copy_before_size_is_rejected() {
    let (mut heap, object_array, _point) = make_heap(256);
    let root = heap.allocate_object(object_array, 0).unwrap();
    let sizing = SnapshotSizing { root, isolate: None, size: 64 };
    assert!(matches!(
        heap.snapshot_copy(sizing),
        Err(HeapError::InvalidSequence(InvalidSequence::WrongSnapshotPass))
    ));
}

#[test]
fn snapshot_leaves_real_heap_unchanged() {
    let (mut heap, object_array, _point) = make_heap(256);
    let root = heap.allocate_object(object_array, 1).unwrap();
    let before = heap.to_space().alloc_ptr;

    let sizing = heap.snapshot_size(root, None).unwrap();
    let graph = heap.snapshot_copy(sizing).unwrap();

    assert_eq!(heap.to_space().alloc_ptr, before);
    assert!(graph.bytes.len() >= (HEADER_WORDS + 1) * WORD_SIZE);
}

#[test]
fn snapshot_records_internal_pointer_offsets() {
    let (mut heap, object_array, point) = make_heap(256);
    let target = heap.allocate_object(object_array, 0).unwrap();
    let p = heap.allocate_object(point, 0).unwrap();
    heap.mem_mut().write(p, target.as_word()).unwrap();

    let sizing = heap.snapshot_size(p, None).unwrap();
    let graph = heap.snapshot_copy(sizing).unwrap();

    assert!(!graph.oop_offsets.is_empty());
}

#[test]
fn successive_snapshots_of_an_unchanged_graph_are_byte_identical() {
    let (mut heap, object_array, point) = make_heap(256);
    let target = heap.allocate_object(object_array, 0).unwrap();
    let p = heap.allocate_object(point, 0).unwrap();
    heap.mem_mut().write(p, target.as_word()).unwrap();

    let first_sizing = heap.snapshot_size(p, None).unwrap();
    let first = heap.snapshot_copy(first_sizing).unwrap();
    let second_sizing = heap.snapshot_size(p, None).unwrap();
    let second = heap.snapshot_copy(second_sizing).unwrap();

    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.oop_offsets, second.oop_offsets);
    assert_eq!(first.root_offset, second.root_offset);
}

/// A finalizer whose object is still reachable from a root must be
/// re-queued for the next collection, not handed off for execution
/// (`spec.md` §4.E.1 step 5).
#[test]
fn finalizer_on_reachable_object_is_requeued_not_executed() {
    let (mut heap, object_array, _point) = make_heap(256);
    let object = heap.allocate_object(object_array, 0).unwrap();
    let slot = heap.roots.push_global(object);
    heap.register_finalizer(object, IsolateId(0));

    heap.collect().unwrap();

    assert_eq!(heap.finalizers.len(), 1);
    let requeued = heap.finalizers.front().unwrap();
    assert_eq!(requeued.object, heap.roots.global(slot));
}

/// A finalizer whose object did not survive collection must be drained
/// from the queue and handed off for execution exactly once.
#[test]
fn finalizer_on_unreachable_object_is_drained_for_execution() {
    let (mut heap, object_array, _point) = make_heap(256);
    let object = heap.allocate_object(object_array, 0).unwrap();
    heap.register_finalizer(object, IsolateId(0));

    heap.collect().unwrap();

    assert!(heap.finalizers.is_empty());
}

/// A snapshot pass must never drain the real heap's finalizer queue
/// (`spec.md` §4.F: "the snapshot leaves the real heap unchanged").
#[test]
fn snapshot_does_not_drain_the_real_finalizer_queue() {
    let (mut heap, object_array, _point) = make_heap(256);
    let root = heap.allocate_object(object_array, 0).unwrap();
    let slot = heap.roots.push_global(root);
    let pending = heap.allocate_object(object_array, 0).unwrap();
    heap.register_finalizer(pending, IsolateId(0));

    let sizing = heap.snapshot_size(heap.roots.global(slot), None).unwrap();
    heap.snapshot_copy(sizing).unwrap();

    assert_eq!(heap.finalizers.len(), 1);
}

/// Number of nodes in a generated single-out-edge graph.
const MAX_GRAPH_NODES: usize = 12;

/// One outgoing edge per node, to index `n` or nowhere; node 0 is always
/// the root. Cycles are legal and expected (`spec.md` §8 scenario 1).
fn arb_single_edge_graph() -> impl Strategy<Value = Vec<Option<usize>>> {
    (1..=MAX_GRAPH_NODES).prop_flat_map(|n| prop::collection::vec(prop::option::of(0..n), n))
}

/// The graph-theoretic reachable set from `root`, following each node's
/// single outgoing edge until it hits `None` or a node already visited.
fn reachable_from(edges: &[Option<usize>], root: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut cursor = Some(root);
    while let Some(i) = cursor {
        if !seen.insert(i) {
            break;
        }
        cursor = edges[i];
    }
    seen
}

/// Walk the live to-space chain starting at `root`, returning each visited
/// object's `(block_start, block_end)` byte range.
fn live_blocks(heap: &TestHeap, root: Address, block_size: u64) -> Vec<(Address, Address)> {
    let mut seen = BTreeSet::new();
    let mut blocks = Vec::new();
    let mut cursor = root;
    while !cursor.is_null() {
        if !seen.insert(cursor.as_u64()) {
            break;
        }
        let start = cursor.sub((HEADER_WORDS * WORD_SIZE) as u64);
        blocks.push((start, start.add(block_size)));
        let next: Word = heap.mem().read(cursor).unwrap();
        cursor = next.as_address();
    }
    blocks
}

proptest! {
    /// Conservation, Non-overlap, and Forwarding-bit-cleanliness
    /// (`spec.md` §8) over arbitrary, possibly cyclic single-out-edge
    /// object graphs.
    #[test]
    fn conservation_non_overlap_and_clean_forwarding_hold_after_collection(edges in arb_single_edge_graph()) {
        let before = reachable_from(&edges, 0).len();

        let (mut heap, object_array, _point) = make_heap(4096);
        let nodes: Vec<Address> = (0..edges.len())
            .map(|_| heap.allocate_object(object_array, 1).unwrap())
            .collect();
        for (i, edge) in edges.iter().enumerate() {
            if let Some(target) = edge {
                heap.mem_mut().write(nodes[i], nodes[*target].as_word()).unwrap();
            }
        }
        let slot = heap.roots.push_global(nodes[0]);

        heap.collect().unwrap();

        let block_size = ((HEADER_WORDS + 1) * WORD_SIZE) as u64;
        let new_root = heap.roots.global(slot);
        let blocks = live_blocks(&heap, new_root, block_size);

        // Conservation: the reachable set's size is unchanged by collection.
        prop_assert_eq!(blocks.len(), before);

        // Non-overlap: sorted live blocks never overlap.
        let mut sorted = blocks.clone();
        sorted.sort_by_key(|(start, _)| start.as_u64());
        for pair in sorted.windows(2) {
            prop_assert!(pair[0].1.as_u64() <= pair[1].0.as_u64());
        }

        // Forwarding-bit cleanliness: outside a collection, no class word
        // in a live object has its low tag bit set.
        for (start, _) in &blocks {
            let header: Word = heap.mem().read(*start).unwrap();
            prop_assert!(!header.low_bit_set());
        }
    }
}
