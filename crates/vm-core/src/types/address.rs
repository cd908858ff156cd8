// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Address and machine-word newtypes.
//!
//! `Address` is an opaque, word-wide quantity interpreted as a location in
//! the heap or in an image byte stream. `Word` is the same width but
//! semantically an unsigned bit pattern (used for header tag bits and raw
//! class-pointer words). Conversion between the two is a pure
//! reinterpretation of the bits — neither type ever changes the value.

use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, BitAnd, BitOr, Sub};

/// Size in bytes of one machine word on this target.
pub const WORD_SIZE: usize = core::mem::size_of::<u64>();

/// A location in the heap or in a serialized image.
///
/// Equality is value equality; comparisons (`lo`/`hi`/...) are always
/// unsigned, even though the underlying representation is a plain `u64`,
/// because addresses are never negative quantities.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Address(u64);

impl Address {
    /// The null address. By convention this means "no object".
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The largest representable address.
    #[inline]
    #[must_use]
    pub const fn max() -> Self {
        Self(u64::MAX)
    }

    /// Construct an address from a raw bit pattern.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Read the raw bit pattern back out.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// True if this is the null address.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Add a byte count, wrapping on overflow (addresses never trap).
    #[inline]
    #[must_use]
    pub const fn add(self, n: u64) -> Self {
        Self(self.0.wrapping_add(n))
    }

    /// Subtract a byte count, wrapping on underflow.
    #[inline]
    #[must_use]
    pub const fn sub(self, n: u64) -> Self {
        Self(self.0.wrapping_sub(n))
    }

    /// Add a signed byte offset, as produced by [`Self::diff`].
    #[inline]
    #[must_use]
    pub const fn add_offset(self, offset: i64) -> Self {
        Self(self.0.wrapping_add_signed(offset))
    }

    /// Signed byte distance `self - other`.
    ///
    /// Positive when `self` is the higher address. This is the inverse of
    /// [`Self::add_offset`]: `a.add_offset(a.diff(b)) == a` and
    /// `b.add_offset(a.diff(b)) == a`.
    #[inline]
    #[must_use]
    pub const fn diff(self, other: Self) -> i64 {
        self.0.wrapping_sub(other.0) as i64
    }

    /// Round up to a multiple of `align` (which must be a power of two).
    #[inline]
    #[must_use]
    pub const fn round_up(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        let mask = align - 1;
        Self((self.0.wrapping_add(mask)) & !mask)
    }

    /// Round up to the next machine-word boundary.
    #[inline]
    #[must_use]
    pub const fn round_up_to_word(self) -> Self {
        self.round_up(WORD_SIZE as u64)
    }

    /// Unsigned "strictly lower than".
    #[inline]
    #[must_use]
    pub const fn lo(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Unsigned "lower than or equal".
    #[inline]
    #[must_use]
    pub const fn loeq(self, other: Self) -> bool {
        self.0 <= other.0
    }

    /// Unsigned "strictly higher than".
    #[inline]
    #[must_use]
    pub const fn hi(self, other: Self) -> bool {
        self.0 > other.0
    }

    /// Unsigned "higher than or equal".
    #[inline]
    #[must_use]
    pub const fn hieq(self, other: Self) -> bool {
        self.0 >= other.0
    }

    /// Bitwise OR with a raw word, reinterpreting both as bit patterns.
    #[inline]
    #[must_use]
    pub const fn or(self, word: Word) -> Self {
        Self(self.0 | word.as_u64())
    }

    /// Bitwise AND with a raw word, reinterpreting both as bit patterns.
    #[inline]
    #[must_use]
    pub const fn and(self, word: Word) -> Self {
        Self(self.0 & word.as_u64())
    }

    /// Reinterpret this address as a raw [`Word`].
    #[inline]
    #[must_use]
    pub const fn as_word(self) -> Word {
        Word::new(self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add<u64> for Address {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        self.add(rhs)
    }
}

impl Sub<u64> for Address {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        self.sub(rhs)
    }
}

impl From<Word> for Address {
    fn from(word: Word) -> Self {
        Self(word.as_u64())
    }
}

/// An unsigned machine-word bit pattern.
///
/// `Word` is the same width as [`Address`] but carries no positional
/// meaning — it is used for header tag bits, forwarding-pointer payloads,
/// and oop-map words. Conversion to/from `Address` never changes the bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Word(u64);

impl Word {
    /// The zero word.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Construct a word from a raw `u64`.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Read the raw bit pattern back out.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reinterpret this word as an [`Address`].
    #[inline]
    #[must_use]
    pub const fn as_address(self) -> Address {
        Address::new(self.0)
    }

    /// True if the low-order bit (bit 0) is set.
    ///
    /// Used to test the forwarding tag bit on a class-pointer word.
    #[inline]
    #[must_use]
    pub const fn low_bit_set(self) -> bool {
        self.0 & 1 != 0
    }

    /// Set the low-order tag bit.
    #[inline]
    #[must_use]
    pub const fn with_low_bit(self) -> Self {
        Self(self.0 | 1)
    }

    /// Clear the low-order tag bit.
    #[inline]
    #[must_use]
    pub const fn without_low_bit(self) -> Self {
        Self(self.0 & !1)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({:#x})", self.0)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<Address> for Word {
    fn from(addr: Address) -> Self {
        Self(addr.as_u64())
    }
}

impl From<u64> for Word {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl BitAnd for Word {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for Word {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
