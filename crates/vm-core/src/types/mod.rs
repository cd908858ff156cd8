// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Core type definitions for the managed-memory core.
//!
//! This module provides type-safe wrappers for addresses and machine words.
//! Using newtypes prevents mixing a raw bit pattern with a location in the
//! heap, and keeps every arithmetic operation the collector needs in one
//! place.


mod address;

pub use address::{Address, Word, WORD_SIZE};
