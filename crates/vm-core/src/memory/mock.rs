// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Host-backed [`MemorySpace`] implementation for hosted/debug builds.

use super::{BadAddress, MemorySpace, TypeTag};
use crate::types::Address;

/// A memory region backed by a plain heap-allocated buffer.
///
/// Every access is bounds-checked. An optional per-byte type map can be
/// enabled to catch type confusion, matching the optional debug-mode type
/// map described in `spec.md` §4.B.
pub struct HostMemory {
    base: Address,
    bytes: Box<[u8]>,
    type_map: Option<Box<[TypeTag]>>,
    protected: Option<core::ops::Range<u64>>,
}

impl HostMemory {
    /// Create a new region of `size` bytes starting at `base`, zeroed.
    #[must_use]
    pub fn new(base: Address, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0u8; size].into_boxed_slice(),
            type_map: None,
            protected: None,
        }
    }

    /// Like [`Self::new`], but also tracks a per-byte type tag.
    #[must_use]
    pub fn with_type_map(base: Address, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0u8; size].into_boxed_slice(),
            type_map: Some(vec![TypeTag::Unknown; size].into_boxed_slice()),
            protected: None,
        }
    }

    /// Raw access to the backing buffer (debugging/testing only).
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }

    /// Record a type tag for `len` bytes starting at `addr`. No-op when the
    /// type map is disabled.
    pub fn tag(&mut self, addr: Address, len: usize, tag: TypeTag) {
        let Some(map) = self.type_map.as_mut() else {
            return;
        };
        let offset = addr.diff(self.base) as usize;
        if let Some(slots) = map.get_mut(offset..offset + len) {
            slots.fill(tag);
        }
    }

    /// Read back the type tag recorded at `addr`, if the type map is
    /// enabled and the address is in range.
    #[must_use]
    pub fn tag_at(&self, addr: Address) -> Option<TypeTag> {
        let map = self.type_map.as_ref()?;
        let offset = addr.diff(self.base) as usize;
        map.get(offset).copied()
    }

    fn check(&self, addr: Address, len: usize) -> Result<usize, BadAddress> {
        let valid = self.base.as_u64()..self.end().as_u64();
        if !self.contains(addr) {
            return Err(BadAddress {
                requested: addr.as_u64()..addr.add(len as u64).as_u64(),
                valid,
            });
        }
        let offset = addr.diff(self.base) as usize;
        let Some(end) = offset.checked_add(len) else {
            return Err(BadAddress {
                requested: addr.as_u64()..u64::MAX,
                valid,
            });
        };
        if end > self.bytes.len() {
            return Err(BadAddress {
                requested: addr.as_u64()..addr.add(len as u64).as_u64(),
                valid,
            });
        }
        if let Some(protected) = &self.protected {
            let req = addr.as_u64()..addr.add(len as u64).as_u64();
            if req.start < protected.end && protected.start < req.end {
                return Err(BadAddress {
                    requested: req,
                    valid: protected.clone(),
                });
            }
        }
        Ok(offset)
    }
}

impl MemorySpace for HostMemory {
    fn base(&self) -> Address {
        self.base
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read<T: Copy>(&self, addr: Address) -> Result<T, BadAddress> {
        let size = core::mem::size_of::<T>();
        let offset = self.check(addr, size)?;
        let ptr = self.bytes[offset..].as_ptr().cast::<T>();
        // SAFETY: `check` verified `size` bytes are in range; `HostMemory`
        // buffers are plain byte arrays with no alignment requirement.
        Ok(unsafe { ptr.read_unaligned() })
    }

    fn write<T>(&mut self, addr: Address, value: T) -> Result<(), BadAddress> {
        let size = core::mem::size_of::<T>();
        let offset = self.check(addr, size)?;
        let ptr = self.bytes[offset..].as_mut_ptr().cast::<T>();
        // SAFETY: `check` verified `size` bytes are in range.
        unsafe { ptr.write_unaligned(value) };
        Ok(())
    }

    fn slice(&self, addr: Address, len: usize) -> Result<&[u8], BadAddress> {
        let offset = self.check(addr, len)?;
        Ok(&self.bytes[offset..offset + len])
    }

    fn slice_mut(&mut self, addr: Address, len: usize) -> Result<&mut [u8], BadAddress> {
        let offset = self.check(addr, len)?;
        Ok(&mut self.bytes[offset..offset + len])
    }

    fn copy_bytes(
        &mut self,
        src: Address,
        dst: Address,
        n: usize,
        overlap_safe: bool,
    ) -> Result<(), BadAddress> {
        let src_off = self.check(src, n)?;
        let dst_off = self.check(dst, n)?;
        if overlap_safe {
            // `copy_within` picks the correct direction itself (it lowers
            // to `memmove`), but the spec calls this out as an explicit
            // choice the caller makes, so we keep it as a named branch.
            self.bytes.copy_within(src_off..src_off + n, dst_off);
        } else {
            // Disjoint ranges: a straight-line copy is correct and avoids
            // the overlap check `copy_within` otherwise performs.
            let mut buf = vec![0u8; n];
            buf.copy_from_slice(&self.bytes[src_off..src_off + n]);
            self.bytes[dst_off..dst_off + n].copy_from_slice(&buf);
        }
        Ok(())
    }

    fn memory_protect(&mut self, lo: Address, hi: Address) -> bool {
        self.protected = Some(lo.as_u64()..hi.as_u64());
        true
    }

    fn memory_unprotect(&mut self, lo: Address, hi: Address) {
        if self.protected.as_ref().map(|r| (r.start, r.end)) == Some((lo.as_u64(), hi.as_u64())) {
            self.protected = None;
        }
    }
}
