// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Two-semispace copying collector (`spec.md` §4.E).
//!
//! [`Heap`] owns the two semi-spaces and drives `collect()`, the full
//! stop-the-world collection described in §4.E.1. The graph serializer in
//! [`crate::image::serializer`] re-enters the same copy machinery through
//! [`Heap::snapshot_size`]/[`Heap::snapshot_copy`] rather than duplicating
//! it, mirroring how the teacher's `realm::copy` routines are themselves
//! reused by every value variant.

mod error;
mod stack;

#[cfg(test)]
mod heap_test;

pub use error::{Exhausted, HeapError, InvalidSequence};
pub use stack::{FRAME_METHOD, FRAME_RETURN_FP, FRAME_RETURN_IP, LOCAL_ARRAY_LAST_FP, LOCAL_ARRAY_NEXT, LOCAL_ARRAY_OWNER};

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::klass::{ClassId, Klass, HEADER_WORDS};
use crate::memory::MemorySpace;
use crate::roots::{RootCell, RootProvider};
use crate::types::{Address, Word, WORD_SIZE};

/// Identifies an isolate for the isolation check in §4.E.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsolateId(pub u32);

/// Runtime-tunable collector behavior (`spec.md` §6.4's `-egc`/`-nogc`/
/// `-stats` flags, expressed as a config struct rather than a CLI parser;
/// this crate has no command-line front-end of its own).
#[derive(Debug, Clone, Copy)]
pub struct GcOptions {
    /// Collect before every allocation (`-egc`): exercises the collector
    /// far more often, for validation.
    pub eager_gc: bool,
    /// Refuse user-initiated collection requests (`-nogc`); automatic
    /// collection on allocation failure is unaffected.
    pub disable_user_gc: bool,
    /// Track collection counters for `-stats` reporting.
    pub stats: bool,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self {
            eager_gc: false,
            disable_user_gc: false,
            stats: false,
        }
    }
}

/// Counters surfaced when [`GcOptions::stats`] is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    pub collections: u64,
    pub bytes_copied: u64,
}

#[derive(Debug, Clone, Copy)]
struct SemiSpace {
    start: Address,
    end: Address,
    alloc_ptr: Address,
}

impl SemiSpace {
    const fn contains(&self, addr: Address) -> bool {
        addr.hieq(self.start) && addr.lo(self.end)
    }

    const fn remaining(&self) -> usize {
        (self.end.diff(self.alloc_ptr)) as usize
    }
}

/// One pending finalizer (`spec.md` §3, §4.E.1 step 5).
#[derive(Debug, Clone, Copy)]
pub struct FinalizerRecord {
    pub object: Address,
    pub isolate: IsolateId,
}

/// Outcome of draining the finalizer queue for one collection: records
/// whose object survived (re-queued) versus records handed to their
/// isolate for execution.
#[derive(Debug, Default)]
pub struct FinalizerOutcome {
    pub requeued: Vec<FinalizerRecord>,
    pub for_execution: Vec<FinalizerRecord>,
}

/// Measured size of a snapshot graph, produced by [`Heap::snapshot_size`]
/// and consumed by [`Heap::snapshot_copy`] (`spec.md` §4.F pass 1/2,
/// §6.3's control block).
#[derive(Debug, Clone, Copy)]
pub struct SnapshotSizing {
    root: Address,
    isolate: Option<IsolateId>,
    size: usize,
}

impl SnapshotSizing {
    /// Minimum byte size pass 2's destination buffer must provide.
    #[must_use]
    pub const fn required_size(&self) -> usize {
        self.size
    }
}

/// Result of pass 2: the copied graph, still at its real (non-canonical)
/// to-space address, plus the oop bitmap needed to relocate it.
#[derive(Debug)]
pub struct SnapshotGraph {
    /// Address the graph bytes were copied to (inside the real heap's
    /// to-space; the caller reads `bytes.len()` worth of data from here
    /// before the next collection reclaims it).
    pub residence: Address,
    pub bytes: Vec<u8>,
    /// Word-aligned offsets (from `residence`) that hold a pointer.
    pub oop_offsets: Vec<usize>,
    /// Byte offset of the root object within `bytes`.
    pub root_offset: usize,
}

/// The collector and the heap it manages (`spec.md` §4.E).
///
/// Generic over the memory façade, the class system, and the root
/// provider so the same algorithm serves a hosted test heap and an
/// eventual embedded target without a trait object in the hot scan loop.
pub struct Heap<M: MemorySpace, K: Klass, R: RootProvider> {
    mem: M,
    klass: K,
    roots: R,
    spaces: [SemiSpace; 2],
    to_index: usize,
    collecting: bool,
    expecting_snapshot_second_pass: bool,
    finalizers: VecDeque<FinalizerRecord>,
    options: GcOptions,
    stats: GcStats,
    snapshot_active: bool,
    snapshot_isolate: Option<IsolateId>,
    snapshot_oop_offsets: Vec<usize>,
    forwarding_repairs: Vec<(Address, Word)>,
}

impl<M: MemorySpace, K: Klass, R: RootProvider> Heap<M, K, R> {
    /// Carve `mem`'s entire region into two equal-sized, word-aligned
    /// semi-spaces and start with space 0 active (`spec.md` §3).
    #[must_use]
    pub fn new(mem: M, klass: K, roots: R, options: GcOptions) -> Self {
        let base = mem.base();
        let half = mem.len() / 2;
        let mid = base.add(half as u64).round_up_to_word();
        let end = mem.end();
        let spaces = [
            SemiSpace { start: base, end: mid, alloc_ptr: base },
            SemiSpace { start: mid, end, alloc_ptr: mid },
        ];
        Self {
            mem,
            klass,
            roots,
            spaces,
            to_index: 0,
            collecting: false,
            expecting_snapshot_second_pass: false,
            finalizers: VecDeque::new(),
            options,
            stats: GcStats::default(),
            snapshot_active: false,
            snapshot_isolate: None,
            snapshot_oop_offsets: Vec::new(),
            forwarding_repairs: Vec::new(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    #[must_use]
    pub fn mem(&self) -> &M {
        &self.mem
    }

    #[must_use]
    pub fn mem_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    #[must_use]
    pub fn klass(&self) -> &K {
        &self.klass
    }

    fn to_space(&self) -> SemiSpace {
        self.spaces[self.to_index]
    }

    fn from_space(&self) -> SemiSpace {
        self.spaces[1 - self.to_index]
    }

    fn in_snapshot(&self) -> bool {
        self.snapshot_active
    }

    /// Allocate a fresh object in the active to-space (used by fixtures
    /// and tests; the bytecode interpreter that would call this in a full
    /// VM is out of scope here).
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] if the active semi-space has no room.
    pub fn allocate_object(&mut self, class: Address, array_length: usize) -> Result<Address, HeapError> {
        let class_id = self.klass.class_id(class);
        let body_size = self.klass.body_size(class, array_length);
        let block_size = HEADER_WORDS * WORD_SIZE + body_size;
        let to = self.to_space();
        let new_end = to.alloc_ptr.add(block_size as u64);
        if new_end.hi(to.end) {
            return Err(Exhausted { requested: block_size, available: to.remaining() }.into());
        }
        let block = to.alloc_ptr;
        self.mem.zero(block, block_size)?;
        self.mem.write(block, class.as_word())?;
        if class_id.is_array() {
            self.mem.write(block.add(WORD_SIZE as u64), Word::new(array_length as u64))?;
        }
        self.spaces[self.to_index].alloc_ptr = new_end;
        Ok(block.add((HEADER_WORDS * WORD_SIZE) as u64))
    }

    /// Full collection (`spec.md` §4.E.1).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSequence::Reentrant`] on recursive entry, or
    /// [`Exhausted`] if to-space cannot hold the live set.
    pub fn collect(&mut self) -> Result<bool, HeapError> {
        if self.collecting {
            return Err(InvalidSequence::Reentrant.into());
        }
        self.collecting = true;
        let result = self.collect_inner();
        self.collecting = false;
        result
    }

    fn collect_inner(&mut self) -> Result<bool, HeapError> {
        self.to_index = 1 - self.to_index;
        self.spaces[self.to_index].alloc_ptr = self.spaces[self.to_index].start;
        let from = self.from_space();
        self.mem.memory_protect(from.start, from.end);

        self.copy_roots()?;
        self.scan_to_fixed_point()?;

        let from = self.from_space();
        self.mem.memory_unprotect(from.start, from.end);
        #[cfg(debug_assertions)]
        self.mem.fill(from.start, from.end.diff(from.start) as usize, 0xDE)?;

        self.stats.collections += 1;
        self.stats.bytes_copied += self.to_space().alloc_ptr.diff(self.to_space().start) as u64;
        Ok(true)
    }

    fn copy_roots(&mut self) -> Result<(), HeapError> {
        for mut cell in self.roots.global_roots() {
            let old = cell.get();
            let new = self.copy_object(old)?;
            if new != old {
                cell.set(new);
            }
        }
        let threads = self.roots.threads();
        for (index, thread) in threads.into_iter().enumerate() {
            if thread.top_chunk.is_null() {
                continue;
            }
            let new_top = self.copy_object(thread.top_chunk)?;
            if new_top != thread.top_chunk {
                self.roots.set_thread_top_chunk(index, new_top);
            }
        }
        Ok(())
    }

    /// Scans to-space to a fixed point, then drains the finalizer queue
    /// (re-copying survivors pulls in more unscanned objects, so finalizer
    /// draining and scanning alternate until both are quiescent).
    ///
    /// Skipped entirely in snapshot mode: a snapshot only ever copies the
    /// subgraph reachable from its own root, and must leave the real
    /// heap's finalizer queue untouched (`spec.md` §4.F).
    fn scan_to_fixed_point(&mut self) -> Result<(), HeapError> {
        let mut scan_ptr = self.to_space().start;
        loop {
            while scan_ptr.lo(self.to_space().alloc_ptr) {
                scan_ptr = self.scan_one(scan_ptr)?;
            }
            if self.in_snapshot() {
                break;
            }
            let outcome = self.drain_finalizers()?;
            if outcome.requeued.is_empty() && outcome.for_execution.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Decode and scan the object whose block starts at `block`, dispatch
    /// per class-ID, and return the block start of the next object
    /// (`spec.md` §4.E.1 step 4).
    fn scan_one(&mut self, block: Address) -> Result<Address, HeapError> {
        let class_word: Word = self.mem.read(block)?;
        debug_assert!(!class_word.low_bit_set(), "to-space object must not be forwarded");
        let class = class_word.as_address();
        let class_id = self.klass.class_id(class);
        let array_length = if class_id.is_array() {
            let len: Word = self.mem.read(block.add(WORD_SIZE as u64))?;
            len.as_u64() as usize
        } else {
            0
        };
        let body_size = self.klass.body_size(class, array_length);
        let oop = block.add((HEADER_WORDS * WORD_SIZE) as u64);

        match class_id {
            ClassId::PrimitiveArray | ClassId::String => {}
            ClassId::BytecodeArray => {
                self.update_reference(oop)?;
            }
            ClassId::GlobalArray => {
                let (first_variable, ref_count) = self.klass.global_ref_range(class);
                for i in first_variable..first_variable + ref_count {
                    self.update_reference(oop.add((i * WORD_SIZE) as u64))?;
                }
            }
            ClassId::LocalArray => {
                stack::update_stack_chunk(self, oop)?;
            }
            ClassId::ObjectArray => {
                let count = body_size / WORD_SIZE;
                for i in 0..count {
                    self.update_reference(oop.add((i * WORD_SIZE) as u64))?;
                }
            }
            ClassId::Instance | ClassId::ObjectMemory => {
                for &offset in self.klass.ref_bitmap(class) {
                    self.update_reference(oop.add((offset * WORD_SIZE) as u64))?;
                }
            }
        }

        Ok(oop.add(body_size as u64))
    }

    /// `copy_object` (`spec.md` §4.E.2).
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] if to-space has no room for the copy, or
    /// [`InvalidSequence::ObjectMemoryReachable`] while serializing a
    /// snapshot if `addr`'s class is `ObjectMemory`.
    pub(crate) fn copy_object(&mut self, addr: Address) -> Result<Address, HeapError> {
        if addr.is_null() {
            return Ok(addr);
        }
        let from = self.from_space();
        if !from.contains(addr) {
            return Ok(addr);
        }

        let header_slot = addr.sub((HEADER_WORDS * WORD_SIZE) as u64);
        let header_word: Word = self.mem.read(header_slot)?;
        if header_word.low_bit_set() {
            return Ok(header_word.without_low_bit().as_address());
        }

        let class = header_word.as_address();
        let class_id = self.klass.class_id(class);
        if self.in_snapshot() && class_id == ClassId::ObjectMemory {
            return Err(InvalidSequence::ObjectMemoryReachable.into());
        }

        let array_length = if class_id.is_array() {
            let len: Word = self.mem.read(addr.sub(WORD_SIZE as u64))?;
            len.as_u64() as usize
        } else {
            0
        };
        let body_size = self.klass.body_size(class, array_length);
        let block_size = HEADER_WORDS * WORD_SIZE + body_size;
        let block = addr.sub((HEADER_WORDS * WORD_SIZE) as u64);

        let to = self.to_space();
        let new_block = to.alloc_ptr;
        let new_end = new_block.add(block_size as u64);
        if new_end.hi(to.end) {
            return Err(Exhausted { requested: block_size, available: to.remaining() }.into());
        }

        self.mem.copy_bytes(block, new_block, block_size, false)?;
        self.spaces[self.to_index].alloc_ptr = new_end;
        let new_oop = new_block.add((HEADER_WORDS * WORD_SIZE) as u64);

        if self.in_snapshot() {
            self.forwarding_repairs.push((header_slot, header_word));
        }
        self.mem.write(header_slot, new_oop.as_word().with_low_bit())?;

        if class_id == ClassId::LocalArray {
            stack::update_stack_chunk_frame_pointers(self, addr, new_oop, body_size)?;
        }

        Ok(new_oop)
    }

    /// `update_reference` (`spec.md` §4.E.3): re-point `slot` at the
    /// (possibly just-copied) object it references, and, in snapshot
    /// mode, record the slot in the oop bitmap when it actually moved.
    pub(crate) fn update_reference(&mut self, slot: Address) -> Result<(), HeapError> {
        let old: Word = self.mem.read(slot)?;
        let old_addr = old.as_address();
        let new_addr = self.copy_object(old_addr)?;
        if new_addr != old_addr {
            self.mem.write(slot, new_addr.as_word())?;
            if self.in_snapshot() {
                self.record_pointer(slot);
            }
        }
        Ok(())
    }

    fn record_pointer(&mut self, slot: Address) {
        let to = self.to_space();
        let offset = (slot.diff(to.start) / WORD_SIZE as i64) as usize;
        self.snapshot_oop_offsets.push(offset);
    }

    fn drain_finalizers(&mut self) -> Result<FinalizerOutcome, HeapError> {
        let mut outcome = FinalizerOutcome::default();
        let pending: Vec<FinalizerRecord> = self.finalizers.drain(..).collect();
        for record in pending {
            let header_slot = record.object.sub((HEADER_WORDS * WORD_SIZE) as u64);
            let header_word: Word = self.mem.read(header_slot)?;
            if header_word.low_bit_set() {
                let survivor = FinalizerRecord {
                    object: header_word.without_low_bit().as_address(),
                    isolate: record.isolate,
                };
                outcome.requeued.push(survivor);
                self.finalizers.push_back(survivor);
            } else {
                let new_object = self.copy_object(record.object)?;
                outcome.for_execution.push(FinalizerRecord { object: new_object, isolate: record.isolate });
            }
        }
        Ok(outcome)
    }

    /// Queue a finalizer for the next collection in which its object is
    /// found unreachable.
    pub fn register_finalizer(&mut self, object: Address, isolate: IsolateId) {
        self.finalizers.push_back(FinalizerRecord { object, isolate });
    }

    /// Pass 1 of the graph serializer (`spec.md` §4.F): measure the
    /// subgraph rooted at `root` without disturbing the real heap.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSequence`] if a snapshot pass is already open, or
    /// any error [`Heap::copy_object`] can raise while walking the graph.
    pub fn snapshot_size(&mut self, root: Address, isolate: Option<IsolateId>) -> Result<SnapshotSizing, HeapError> {
        if self.expecting_snapshot_second_pass {
            return Err(InvalidSequence::WrongSnapshotPass.into());
        }
        let (_start, size, _root_offset) = self.run_snapshot_pass(root, isolate)?;
        self.repair_from_space()?;
        self.expecting_snapshot_second_pass = true;
        Ok(SnapshotSizing { root, isolate, size })
    }

    /// Pass 2 of the graph serializer: repeat the copy, this time keeping
    /// the bytes and the oop bitmap.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSequence::WrongSnapshotPass`] if pass 1 was not
    /// called first.
    pub fn snapshot_copy(&mut self, sizing: SnapshotSizing) -> Result<SnapshotGraph, HeapError> {
        if !self.expecting_snapshot_second_pass {
            return Err(InvalidSequence::WrongSnapshotPass.into());
        }
        let (start, size, root_offset) = self.run_snapshot_pass(sizing.root, sizing.isolate)?;
        let mut bytes = alloc::vec![0u8; size];
        bytes.copy_from_slice(self.mem.slice(start, size)?);
        let graph = SnapshotGraph {
            residence: start,
            bytes,
            oop_offsets: core::mem::take(&mut self.snapshot_oop_offsets),
            root_offset,
        };
        self.repair_from_space()?;
        self.expecting_snapshot_second_pass = false;
        Ok(graph)
    }

    /// Run one snapshot copy pass, toggling the real heap's spaces back
    /// afterward so the live heap is left untouched (`spec.md` §4.F:
    /// "toggles spaces back, the snapshot leaves the real heap
    /// unchanged"). Returns `(snapshot residence start, graph size in
    /// bytes, root offset)`.
    fn run_snapshot_pass(&mut self, root: Address, isolate: Option<IsolateId>) -> Result<(Address, usize, usize), HeapError> {
        let to_index_before = self.to_index;
        self.to_index = 1 - self.to_index;
        self.spaces[self.to_index].alloc_ptr = self.spaces[self.to_index].start;
        self.snapshot_active = true;
        self.snapshot_isolate = isolate;
        self.snapshot_oop_offsets.clear();
        self.forwarding_repairs.clear();

        let new_root = self.copy_object(root)?;
        self.scan_to_fixed_point()?;

        let to = self.to_space();
        let start = to.start;
        let size = to.alloc_ptr.diff(to.start) as usize;
        let root_offset = new_root.diff(to.start) as usize;
        self.snapshot_active = false;
        self.snapshot_isolate = None;
        self.to_index = to_index_before;
        Ok((start, size, root_offset))
    }

    fn repair_from_space(&mut self) -> Result<(), HeapError> {
        for (slot, original) in self.forwarding_repairs.drain(..) {
            self.mem.write(slot, original)?;
        }
        Ok(())
    }
}
