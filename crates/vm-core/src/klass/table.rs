// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! A minimal, Vec-backed [`Klass`](super::Klass) implementation.
//!
//! `StaticClassTable` plays the same role for the `klass` module that
//! `HostMemory` plays for `memory`: a concrete, host-only implementation
//! good enough to drive the collector's own test suite, standing in for a
//! real class loader that this crate does not implement.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::{ClassId, MethodOopMap};
use crate::types::Address;

/// One class's layout description, as `StaticClassTable` understands it.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub class_id: ClassId,
    /// Word offsets (from the body start) that hold references, for
    /// `ClassId::Instance`.
    pub ref_bitmap: Vec<usize>,
    /// Fixed body size in words, for `ClassId::Instance`. Ignored for
    /// array-shaped classes, whose body size is `array_length`-dependent.
    pub instance_words: usize,
    /// `(first_variable, ref_count)` for `ClassId::GlobalArray`.
    pub global_ref_range: (usize, usize),
    /// Element size in bytes, for array-shaped classes other than
    /// `GlobalArray`/`ObjectArray`/`LocalArray` (which are word-sized).
    pub element_size: usize,
}

impl ClassDescriptor {
    /// A plain fixed-shape instance with the given reference bitmap.
    #[must_use]
    pub fn instance(instance_words: usize, ref_bitmap: Vec<usize>) -> Self {
        Self {
            class_id: ClassId::Instance,
            ref_bitmap,
            instance_words,
            global_ref_range: (0, 0),
            element_size: 0,
        }
    }

    /// An array of raw, untraced elements of `element_size` bytes each.
    #[must_use]
    pub fn primitive_array(element_size: usize) -> Self {
        Self {
            class_id: ClassId::PrimitiveArray,
            ref_bitmap: Vec::new(),
            instance_words: 0,
            global_ref_range: (0, 0),
            element_size,
        }
    }

    /// An array of object references.
    #[must_use]
    pub fn object_array() -> Self {
        Self {
            class_id: ClassId::ObjectArray,
            ref_bitmap: Vec::new(),
            instance_words: 0,
            global_ref_range: (0, 0),
            element_size: crate::types::WORD_SIZE,
        }
    }

    /// An interned character string: untraced bytes, no references.
    #[must_use]
    pub fn string() -> Self {
        Self {
            class_id: ClassId::String,
            ref_bitmap: Vec::new(),
            instance_words: 0,
            global_ref_range: (0, 0),
            element_size: 1,
        }
    }

    /// A stack chunk (`spec.md` §4.E.4): array-shaped, word-sized
    /// elements, with the `owner`/`next` header references handled
    /// directly by the collector rather than through `ref_bitmap`.
    #[must_use]
    pub fn local_array() -> Self {
        Self {
            class_id: ClassId::LocalArray,
            ref_bitmap: Vec::new(),
            instance_words: 0,
            global_ref_range: (0, 0),
            element_size: crate::types::WORD_SIZE,
        }
    }

    /// A compiled method's bytecode, with a single defining-class
    /// reference slot in the header.
    #[must_use]
    pub fn bytecode_array() -> Self {
        Self {
            class_id: ClassId::BytecodeArray,
            ref_bitmap: Vec::new(),
            instance_words: 0,
            global_ref_range: (0, 0),
            element_size: 1,
        }
    }

    /// A class-state table with `ref_count` trailing reference slots
    /// starting at word `first_variable`.
    #[must_use]
    pub fn global_array(first_variable: usize, ref_count: usize) -> Self {
        Self {
            class_id: ClassId::GlobalArray,
            ref_bitmap: Vec::new(),
            instance_words: 0,
            global_ref_range: (first_variable, ref_count),
            element_size: crate::types::WORD_SIZE,
        }
    }

    /// A previously serialized image root, opaque to the collector.
    #[must_use]
    pub fn object_memory() -> Self {
        Self {
            class_id: ClassId::ObjectMemory,
            ref_bitmap: Vec::new(),
            instance_words: 0,
            global_ref_range: (0, 0),
            element_size: 0,
        }
    }

    /// Every class uses the same two-word header: a class pointer at
    /// `block + 0` and a length word (meaningful only for array-shaped
    /// classes) at `block + 1`, so that `oop == block + HEADER_WORDS`
    /// uniformly. Placing the class pointer at a fixed, class-independent
    /// offset from the block start is what lets the collector's
    /// scan-to-completion loop decode each object it reaches purely by
    /// forward arithmetic, without first knowing that object's class.
    /// Class-specific extra fields that the data model calls out as
    /// "header slots" (`BytecodeArray`'s defining class,  `LocalArray`'s
    /// `owner`/`next`/`last_fp`) are therefore modeled as the leading
    /// words of the body instead of true header words; the collector
    /// dispatch in `heap` reads them at fixed body offsets.
    fn header_words(&self) -> usize {
        super::HEADER_WORDS
    }
}

/// A fixed registry of classes, addressed by the `Address` of each
/// descriptor's slot.
///
/// Class descriptors never move: `StaticClassTable` hands out stable
/// addresses for the lifetime of the table, satisfying the collector's
/// requirement that class pointers live outside the semispaces
/// (`spec.md` §4.E.5).
#[derive(Debug, Default)]
pub struct StaticClassTable {
    classes: BTreeMap<u64, ClassDescriptor>,
    methods: BTreeMap<u64, MethodOopMap>,
    next_slot: u64,
}

/// Arbitrary, collision-free base so class/method addresses can't alias a
/// real heap address in tests that use both in the same space.
const CLASS_TABLE_BASE: u64 = 0x7000_0000_0000;

impl StaticClassTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes: BTreeMap::new(),
            methods: BTreeMap::new(),
            next_slot: CLASS_TABLE_BASE,
        }
    }

    /// Register a class descriptor and return the permanent `Address` by
    /// which the collector will refer to it.
    pub fn register(&mut self, descriptor: ClassDescriptor) -> Address {
        let slot = self.next_slot;
        self.next_slot += crate::types::WORD_SIZE as u64;
        self.classes.insert(slot, descriptor);
        Address::new(slot)
    }

    /// Register a method's oop-map and return its permanent `Address`.
    pub fn register_method(&mut self, oopmap: MethodOopMap) -> Address {
        let slot = self.next_slot;
        self.next_slot += crate::types::WORD_SIZE as u64;
        self.methods.insert(slot, oopmap);
        Address::new(slot)
    }

    fn descriptor(&self, class: Address) -> &ClassDescriptor {
        self.classes
            .get(&class.as_u64())
            .expect("class address must have been returned by StaticClassTable::register")
    }
}

impl super::Klass for StaticClassTable {
    fn class_id(&self, class: Address) -> ClassId {
        self.descriptor(class).class_id
    }

    fn header_words(&self, class: Address) -> usize {
        self.descriptor(class).header_words()
    }

    fn body_size(&self, class: Address, array_length: usize) -> usize {
        let descriptor = self.descriptor(class);
        match descriptor.class_id {
            ClassId::Instance | ClassId::ObjectMemory => {
                descriptor.instance_words * crate::types::WORD_SIZE
            }
            ClassId::GlobalArray => {
                let (first_variable, ref_count) = descriptor.global_ref_range;
                (first_variable + ref_count) * crate::types::WORD_SIZE
            }
            _ => array_length * descriptor.element_size,
        }
    }

    fn ref_bitmap(&self, class: Address) -> &[usize] {
        &self.descriptor(class).ref_bitmap
    }

    fn global_ref_range(&self, class: Address) -> (usize, usize) {
        self.descriptor(class).global_ref_range
    }

    fn method_oopmap(&self, method: Address) -> Option<&MethodOopMap> {
        self.methods.get(&method.as_u64())
    }
}
