// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # vm-core
//!
//! Managed-memory core of a small embedded virtual machine: a two-space
//! copying garbage collector coupled with an object-graph serializer that
//! produces relocatable "object memory" images loadable by peer VM
//! instances.
//!
//! This crate provides:
//! - [`types`]: typed machine-word/address arithmetic (`Address`, `Word`).
//! - [`memory`]: a byte-addressable memory façade (`MemorySpace`), plus a
//!   host-backed reference implementation for tests.
//! - [`klass`]: the contract the collector requires of the class system
//!   (`Klass`), plus a minimal in-memory class table.
//! - [`roots`]: the root set the collector copies from (`RootProvider`).
//! - [`heap`]: the copying collector itself (`Heap::collect`), and the
//!   graph-serializer re-entry it exposes for snapshotting (`Heap::snapshot_size`/
//!   `Heap::snapshot_copy`).
//! - [`image`]: the on-disk object-memory format — writer, loader, and
//!   suite registry.
//!
//! The bytecode interpreter, class loader/translator, thread scheduler, and
//! any file/channel transport are explicit collaborators outside this
//! crate's scope; it only implements the managed-memory core and the
//! byte-stream shape of an image.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod heap;
pub mod image;
pub mod klass;
pub mod memory;
pub mod roots;
pub mod types;

pub use heap::{GcOptions, Heap, IsolateId};
pub use image::Image;
pub use klass::{ClassId, Klass};
pub use types::{Address, Word};
