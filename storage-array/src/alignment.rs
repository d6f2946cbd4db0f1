// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Alignment arithmetic on [`DeviceSize`] values.
//!
//! Every alignment the device reports (offset alignments, memory requirement alignments and the
//! host-mapping alignment) is a power of two, which [`DeviceAlignment`] guarantees by
//! construction. The free functions below never overflow silently: rounding up past
//! [`DeviceSize::MAX`] is reported as [`None`] by [`checked_align_up`].

use crate::{DeviceSize, NonZeroDeviceSize};
use std::{
    cmp::Ordering,
    error::Error,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    mem::align_of,
};

/// Vulkan analog of std's [`Alignment`], stored as a [`DeviceSize`] that is guaranteed to be a
/// valid Vulkan alignment.
///
/// [`Alignment`]: std::ptr::Alignment
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DeviceAlignment(NonZeroDeviceSize);

impl DeviceAlignment {
    /// The smallest possible alignment, 1.
    pub const MIN: Self = Self(NonZeroDeviceSize::MIN);

    /// The largest possible alignment, 2<sup>63</sup>.
    pub const MAX: Self = match NonZeroDeviceSize::new(1 << 63) {
        Some(alignment) => Self(alignment),
        None => unreachable!(),
    };

    /// Returns the alignment for a type.
    #[inline]
    pub const fn of<T>() -> Self {
        // SAFETY: rustc guarantees that the alignment of types is a power of two.
        unsafe { DeviceAlignment::new_unchecked(align_of::<T>() as DeviceSize) }
    }

    /// Tries to create a `DeviceAlignment` from a [`DeviceSize`], returning [`None`] if it's not a
    /// power of two.
    #[inline]
    pub const fn new(alignment: DeviceSize) -> Option<Self> {
        if alignment.is_power_of_two() {
            Some(unsafe { DeviceAlignment::new_unchecked(alignment) })
        } else {
            None
        }
    }

    /// Creates a `DeviceAlignment` from a [`DeviceSize`] without checking if it's a power of two.
    ///
    /// # Safety
    ///
    /// - `alignment` must be a power of two, which also means it must be non-zero.
    #[inline]
    pub const unsafe fn new_unchecked(alignment: DeviceSize) -> Self {
        debug_assert!(alignment.is_power_of_two());

        DeviceAlignment(unsafe { NonZeroDeviceSize::new_unchecked(alignment) })
    }

    /// Returns the alignment as a [`DeviceSize`].
    #[inline]
    pub const fn as_devicesize(self) -> DeviceSize {
        self.0.get()
    }

    /// Returns the alignment as a [`NonZeroDeviceSize`].
    #[inline]
    pub const fn as_nonzero(self) -> NonZeroDeviceSize {
        self.0
    }

    /// Returns the base-2 logarithm of the alignment.
    #[inline]
    pub const fn log2(self) -> u32 {
        self.0.trailing_zeros()
    }
}

impl Default for DeviceAlignment {
    #[inline]
    fn default() -> Self {
        DeviceAlignment::MIN
    }
}

impl Debug for DeviceAlignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:?} (1 << {:?})", self.as_nonzero(), self.log2())
    }
}

impl TryFrom<DeviceSize> for DeviceAlignment {
    type Error = TryFromIntError;

    #[inline]
    fn try_from(alignment: DeviceSize) -> Result<Self, Self::Error> {
        DeviceAlignment::new(alignment).ok_or(TryFromIntError)
    }
}

impl From<DeviceAlignment> for DeviceSize {
    #[inline]
    fn from(alignment: DeviceAlignment) -> Self {
        alignment.as_devicesize()
    }
}

impl PartialOrd for DeviceAlignment {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeviceAlignment {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Error that can happen when trying to convert an integer to a `DeviceAlignment`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryFromIntError;

impl Error for TryFromIntError {}

impl Display for TryFromIntError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("attempted to convert a non-power-of-two integer to a `DeviceAlignment`")
    }
}

/// Rounds `val` up to the next multiple of `alignment`.
///
/// The result wraps around if it doesn't fit in a [`DeviceSize`]; use [`checked_align_up`] when
/// `val` comes from user input.
#[inline(always)]
pub const fn align_up(val: DeviceSize, alignment: DeviceAlignment) -> DeviceSize {
    align_down(
        val.wrapping_add(alignment.as_devicesize() - 1),
        alignment,
    )
}

/// Rounds `val` up to the next multiple of `alignment`, returning [`None`] on overflow.
#[inline]
pub const fn checked_align_up(val: DeviceSize, alignment: DeviceAlignment) -> Option<DeviceSize> {
    match val.checked_add(alignment.as_devicesize() - 1) {
        Some(val) => Some(align_down(val, alignment)),
        None => None,
    }
}

/// Rounds `val` down to the previous multiple of `alignment`.
#[inline(always)]
pub const fn align_down(val: DeviceSize, alignment: DeviceAlignment) -> DeviceSize {
    val & !(alignment.as_devicesize() - 1)
}

/// Returns whether `val` is a multiple of `alignment`.
#[inline(always)]
pub const fn is_aligned(val: DeviceSize, alignment: DeviceAlignment) -> bool {
    val & (alignment.as_devicesize() - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_non_powers_of_two() {
        assert!(DeviceAlignment::new(0).is_none());
        assert!(DeviceAlignment::new(3).is_none());
        assert!(DeviceAlignment::new(48).is_none());
        assert_eq!(DeviceAlignment::new(64).unwrap().as_devicesize(), 64);
        assert_eq!(DeviceAlignment::new(64).unwrap().log2(), 6);
        assert_eq!(DeviceAlignment::MAX.log2(), 63);
    }

    #[test]
    fn rounding() {
        let a16 = DeviceAlignment::new(16).unwrap();

        assert_eq!(align_up(0, a16), 0);
        assert_eq!(align_up(1, a16), 16);
        assert_eq!(align_up(16, a16), 16);
        assert_eq!(align_up(17, a16), 32);
        assert_eq!(align_down(31, a16), 16);
        assert!(is_aligned(1024, a16));
        assert!(!is_aligned(1025, a16));
        assert_eq!(align_up(1023, DeviceAlignment::MIN), 1023);
    }

    #[test]
    fn checked_rounding_overflow() {
        let a256 = DeviceAlignment::new(256).unwrap();

        assert_eq!(checked_align_up(DeviceSize::MAX - 10, a256), None);
        assert_eq!(checked_align_up(1000, a256), Some(1024));
    }

    #[test]
    fn ordering() {
        let a4 = DeviceAlignment::new(4).unwrap();
        let a64 = DeviceAlignment::new(64).unwrap();

        assert!(a4 < a64);
        assert_eq!(a4.max(a64), a64);
        assert_eq!(a64.max(a4), a64);
        assert_eq!(DeviceAlignment::of::<u32>(), a4);
    }
}
