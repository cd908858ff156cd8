// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for [`VecRootProvider`].

use super::*;

#[test]
fn global_roots_are_mutable_in_place() {
    let mut provider = VecRootProvider::new();
    provider.push_global(Address::new(0x1000));
    provider.push_global(Address::new(0x2000));

    for cell in &mut provider.global_roots() {
        let forwarded = cell.get().add(0x10);
        cell.set(forwarded);
    }

    assert_eq!(provider.global(0), Address::new(0x1010));
    assert_eq!(provider.global(1), Address::new(0x2010));
}

#[test]
fn thread_top_chunk_updates_after_scan() {
    let mut provider = VecRootProvider::new();
    let idx = provider.push_thread(Address::new(0x3000));

    assert_eq!(provider.threads()[idx].top_chunk, Address::new(0x3000));
    provider.set_thread_top_chunk(idx, Address::new(0x4000));
    assert_eq!(provider.threads()[idx].top_chunk, Address::new(0x4000));
}

#[test]
fn empty_provider_has_no_roots() {
    let mut provider = VecRootProvider::new();
    assert!(provider.global_roots().is_empty());
    assert!(provider.threads().is_empty());
}
