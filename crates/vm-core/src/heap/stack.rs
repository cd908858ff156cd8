// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Stack-chunk frame fix-up (`spec.md` §4.E.4).
//!
//! A stack chunk is an array-shaped object whose body holds activation
//! frames, each carrying an absolute `previous_fp`/`return_fp` pointer
//! into the *same* chunk. Because those pointers are ordinary addresses
//! rather than object references the collector's class system knows
//! about, they need a dedicated two-pass fix-up: a byte-identical copy
//! first (run from [`super::Heap::copy_object`]), then a pointer rewrite
//! that tracks the chunk's own relocation before any frame slot is
//! scanned for ordinary references.

use super::{Heap, HeapError};
use crate::klass::Klass;
use crate::memory::MemorySpace;
use crate::roots::RootProvider;
use crate::types::{Address, Word, WORD_SIZE};

/// Word offset (from the chunk's oop) of the `owner` reference.
pub const LOCAL_ARRAY_OWNER: usize = 0;
/// Word offset of the `next` chain-link reference.
pub const LOCAL_ARRAY_NEXT: usize = 1;
/// Word offset of the raw (non-reference) `last_fp` address.
pub const LOCAL_ARRAY_LAST_FP: usize = 2;
/// Word offset at which activation frames begin.
pub const LOCAL_ARRAY_FRAMES_START: usize = 3;

/// Word offset (from a frame's `fp`) of the method reference.
pub const FRAME_METHOD: i64 = 0;
/// Word offset of the `previous_fp`/`return_fp` chain link.
pub const FRAME_RETURN_FP: i64 = 1;
/// Word offset of the return instruction pointer, inside the method's
/// bytecode.
pub const FRAME_RETURN_IP: i64 = 2;
/// Word offset of the first (ascending) parameter slot.
pub const FRAME_PARAM0: i64 = 3;
/// Word offset of the first (descending) local slot.
pub const FRAME_LOCAL0: i64 = -1;

fn read_address<M: MemorySpace>(mem: &M, slot: Address) -> Result<Address, HeapError> {
    let word: Word = mem.read(slot)?;
    Ok(word.as_address())
}

fn write_address<M: MemorySpace>(mem: &mut M, slot: Address, value: Address) -> Result<(), HeapError> {
    mem.write(slot, value.as_word())?;
    Ok(())
}

/// Rewrite every `previous_fp` link (plus the chunk's own `last_fp`
/// header field) in the just-copied `new_chunk` so each points at the
/// corresponding frame *inside the new chunk*, before any reference scan
/// reads those pointers (`spec.md` §4.E.4: "This must run before any
/// activation-frame scan").
///
/// Must run immediately after the byte copy, while the frame pointers
/// still hold their original (pre-relocation) values.
pub(super) fn update_stack_chunk_frame_pointers<M: MemorySpace, K: Klass, R: RootProvider>(
    heap: &mut Heap<M, K, R>,
    old_chunk: Address,
    new_chunk: Address,
    _body_size: usize,
) -> Result<(), HeapError> {
    let last_fp_slot = new_chunk.add((LOCAL_ARRAY_LAST_FP * WORD_SIZE) as u64);
    let old_last_fp = read_address(heap.mem(), last_fp_slot)?;
    if old_last_fp.is_null() {
        return Ok(());
    }

    let remap = |old_fp: Address| -> Address { new_chunk.add_offset(old_fp.diff(old_chunk)) };

    write_address(heap.mem_mut(), last_fp_slot, remap(old_last_fp))?;

    let mut cur_old_fp = old_last_fp;
    while !cur_old_fp.is_null() {
        let new_fp = remap(cur_old_fp);
        let prev_slot = new_fp.add_offset(FRAME_RETURN_FP * WORD_SIZE as i64);
        let old_prev_fp = read_address(heap.mem(), prev_slot)?;
        if !old_prev_fp.is_null() {
            write_address(heap.mem_mut(), prev_slot, remap(old_prev_fp))?;
        }
        cur_old_fp = old_prev_fp;
    }

    Ok(())
}

/// Scan a stack chunk already resident in to-space: fix up the header
/// references, then walk the (already-relocated) frame chain updating
/// each frame's method pointer, its dependent `return_ip`, and its
/// reference slots per the method's oop-map (`spec.md` §4.E.4 step 2-3).
pub(super) fn update_stack_chunk<M: MemorySpace, K: Klass, R: RootProvider>(
    heap: &mut Heap<M, K, R>,
    chunk: Address,
) -> Result<(), HeapError> {
    heap.update_reference(chunk.add((LOCAL_ARRAY_OWNER * WORD_SIZE) as u64))?;
    heap.update_reference(chunk.add((LOCAL_ARRAY_NEXT * WORD_SIZE) as u64))?;

    let last_fp_slot = chunk.add((LOCAL_ARRAY_LAST_FP * WORD_SIZE) as u64);
    let mut fp = read_address(heap.mem(), last_fp_slot)?;
    let mut innermost = true;

    while !fp.is_null() {
        let method_slot = fp.add_offset(FRAME_METHOD * WORD_SIZE as i64);
        let old_method = read_address(heap.mem(), method_slot)?;
        let new_method = heap.copy_object(old_method)?;
        let delta = new_method.diff(old_method);
        if new_method != old_method {
            write_address(heap.mem_mut(), method_slot, new_method)?;
            let ip_slot = fp.add_offset(FRAME_RETURN_IP * WORD_SIZE as i64);
            let old_ip = read_address(heap.mem(), ip_slot)?;
            write_address(heap.mem_mut(), ip_slot, old_ip.add_offset(delta))?;
        }

        if !innermost {
            if let Some(oopmap) = heap.klass().method_oopmap(old_method) {
                for (i, &is_ref) in oopmap.parameter_refs.iter().enumerate() {
                    if is_ref {
                        let slot = fp.add_offset((FRAME_PARAM0 + i as i64) * WORD_SIZE as i64);
                        heap.update_reference(slot)?;
                    }
                }
                for (i, &is_ref) in oopmap.local_refs.iter().enumerate() {
                    if is_ref {
                        let slot = fp.add_offset((FRAME_LOCAL0 - i as i64) * WORD_SIZE as i64);
                        heap.update_reference(slot)?;
                    }
                }
            }
        }

        let prev_slot = fp.add_offset(FRAME_RETURN_FP * WORD_SIZE as i64);
        fp = read_address(heap.mem(), prev_slot)?;
        innermost = false;
    }

    Ok(())
}
