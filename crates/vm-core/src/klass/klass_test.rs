// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for [`StaticClassTable`].

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::types::Address;

#[test]
fn instance_layout_round_trips() {
    let mut table = StaticClassTable::new();
    let point = table.register(ClassDescriptor::instance(2, vec![0, 1]));

    assert_eq!(table.class_id(point), ClassId::Instance);
    assert_eq!(table.header_words(point), HEADER_WORDS);
    assert_eq!(table.body_size(point, 0), 2 * crate::types::WORD_SIZE);
    assert_eq!(table.ref_bitmap(point), &[0, 1]);
}

#[test]
fn primitive_array_is_not_traced() {
    let mut table = StaticClassTable::new();
    let bytes = table.register(ClassDescriptor::primitive_array(1));

    assert_eq!(table.class_id(bytes), ClassId::PrimitiveArray);
    assert!(table.class_id(bytes).is_array());
    assert_eq!(table.body_size(bytes, 10), 10);
    assert!(table.ref_bitmap(bytes).is_empty());
}

#[test]
fn object_array_element_size_is_word_sized() {
    let mut table = StaticClassTable::new();
    let array = table.register(ClassDescriptor::object_array());

    assert_eq!(table.body_size(array, 4), 4 * crate::types::WORD_SIZE);
}

#[test]
fn global_array_body_covers_fixed_and_variable_parts() {
    let mut table = StaticClassTable::new();
    let globals = table.register(ClassDescriptor::global_array(3, 5));

    assert_eq!(table.global_ref_range(globals), (3, 5));
    assert_eq!(table.body_size(globals, 0), 8 * crate::types::WORD_SIZE);
}

#[test]
fn every_class_shares_the_uniform_header() {
    let mut table = StaticClassTable::new();
    let chunk = table.register(ClassDescriptor::local_array());
    let instance = table.register(ClassDescriptor::instance(1, vec![0]));

    assert_eq!(table.header_words(chunk), HEADER_WORDS);
    assert_eq!(table.header_words(instance), HEADER_WORDS);
    assert!(table.class_id(chunk).is_array());
}

#[test]
fn object_memory_is_not_array_shaped() {
    let mut table = StaticClassTable::new();
    let image_root = table.register(ClassDescriptor::object_memory());

    assert!(!table.class_id(image_root).is_array());
}

#[test]
fn method_oopmap_round_trips() {
    let mut table = StaticClassTable::new();
    let method = table.register_method(MethodOopMap {
        parameter_refs: vec![true, false],
        local_refs: vec![true, true, false],
    });

    let oopmap = table.method_oopmap(method).unwrap();
    assert_eq!(oopmap.parameter_count(), 2);
    assert_eq!(oopmap.local_count(), 3);
}

#[test]
fn unregistered_method_address_returns_none() {
    let table = StaticClassTable::new();
    assert!(table.method_oopmap(Address::new(0xDEAD)).is_none());
}

#[test]
fn class_slots_never_collide() {
    let mut table = StaticClassTable::new();
    let a = table.register(ClassDescriptor::string());
    let b = table.register(ClassDescriptor::string());
    assert_ne!(a, b);
}
