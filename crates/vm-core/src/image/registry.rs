// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Suite registry: the numbered array of loaded images (`spec.md` §4.I).

extern crate alloc;

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use super::{Image, RegistryConflict};
use crate::types::Address;

/// Slot 0 is reserved for the bootstrap image created at VM start
/// (`spec.md` §4.I).
pub const BOOTSTRAP_SLOT: usize = 0;

#[derive(Debug)]
enum Slot {
    /// Never assigned, or assigned and later removed.
    Empty,
    /// Claimed by an in-flight concurrent load, not yet filled
    /// (`spec.md` §4.I's "sentinel value").
    Reserved,
    Occupied { url: String, image: Rc<Image> },
}

/// The registry of every loaded image (`spec.md` §4.I, §6.2's
/// `registry.lookup_by_url`/`lookup_by_root`).
///
/// Reference counting piggybacks on [`Rc`]: every child image holds its
/// own clone of its parent's `Rc<Image>`, so a slot's entry is the only
/// holder left — and therefore safe to remove — exactly when
/// `Rc::strong_count` reads back `1`.
#[derive(Debug, Default)]
pub struct SuiteRegistry {
    slots: Vec<Slot>,
}

impl SuiteRegistry {
    /// An empty registry with slot 0 reserved for the bootstrap image.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: alloc::vec![Slot::Empty] }
    }

    /// Install the bootstrap image into slot 0.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryConflict::SlotOccupied`] if slot 0 is already
    /// filled.
    pub fn install_bootstrap(&mut self, url: String, image: Rc<Image>) -> Result<(), RegistryConflict> {
        if !matches!(self.slots[BOOTSTRAP_SLOT], Slot::Empty) {
            return Err(RegistryConflict::SlotOccupied { slot: BOOTSTRAP_SLOT });
        }
        self.slots[BOOTSTRAP_SLOT] = Slot::Occupied { url, image };
        Ok(())
    }

    /// Claim the lowest free slot above the bootstrap slot without
    /// filling it yet, so a concurrent load of the same URL can observe
    /// the reservation (`spec.md` §4.I's sentinel).
    pub fn reserve(&mut self) -> usize {
        if let Some(slot) = (1..self.slots.len()).find(|&i| matches!(self.slots[i], Slot::Empty)) {
            self.slots[slot] = Slot::Reserved;
            slot
        } else {
            self.slots.push(Slot::Reserved);
            self.slots.len() - 1
        }
    }

    /// Fill a slot previously returned by [`Self::reserve`].
    pub fn fill(&mut self, slot: usize, url: String, image: Rc<Image>) {
        debug_assert!(matches!(self.slots[slot], Slot::Reserved), "fill of a non-reserved slot");
        self.slots[slot] = Slot::Occupied { url, image };
    }

    /// Release a reservation without filling it (the load that claimed
    /// it failed).
    pub fn cancel(&mut self, slot: usize) {
        self.slots[slot] = Slot::Empty;
    }

    /// Install `image` into the lowest free slot above the bootstrap
    /// slot, bypassing the reserve/fill protocol. Returns the assigned
    /// slot number.
    pub fn install(&mut self, image: Rc<Image>, url: String) -> usize {
        let slot = self.reserve();
        self.fill(slot, url, image);
        slot
    }

    /// The image registered under `url`, if any.
    #[must_use]
    pub fn lookup_by_url(&self, url: &str) -> Option<Rc<Image>> {
        self.slots.iter().find_map(|slot| match slot {
            Slot::Occupied { url: u, image } if u == url => Some(Rc::clone(image)),
            _ => None,
        })
    }

    /// The image whose root object resides at `root`, if any.
    #[must_use]
    pub fn lookup_by_root(&self, root: Address) -> Option<Rc<Image>> {
        self.slots.iter().find_map(|slot| match slot {
            Slot::Occupied { image, .. } if image.root_address() == root => Some(Rc::clone(image)),
            _ => None,
        })
    }

    /// Remove the image registered under `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryConflict::NotFound`] if no image is registered
    /// under `url`, or [`RegistryConflict::StillReferenced`] if any other
    /// holder — necessarily a child image's parent link — still keeps it
    /// alive.
    pub fn remove(&mut self, url: &str) -> Result<(), RegistryConflict> {
        let slot = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Occupied { url: u, .. } if u == url))
            .ok_or_else(|| RegistryConflict::NotFound { url: String::from(url) })?;

        let Slot::Occupied { image, .. } = &self.slots[slot] else {
            unreachable!("position() only matches Occupied slots")
        };
        let referencing_children = Rc::strong_count(image) - 1;
        if referencing_children > 0 {
            return Err(RegistryConflict::StillReferenced { url: String::from(url), referencing_children });
        }

        self.slots[slot] = Slot::Empty;
        Ok(())
    }

    /// Number of slots currently holding an image (occupied or
    /// reserved).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| !matches!(s, Slot::Empty)).count()
    }

    /// Whether no image is currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
