//! Densely bit-packed arrays of fixed-width integers.
//!
//! [`PackedArray`] stores homogeneous `w`-bit elements for any `w` in
//! `1..=32` with no padding between elements. Widths of 8/16/32 bits
//! degenerate to plain typed storage with no bit math; every other width
//! goes through word-granular bit splicing, widening to a single
//! double-word access when an element's bit range crosses a word boundary.
//! The storage strategy is picked once at construction and dispatched
//! through a closed enum.

mod packed;

use std::marker::PhantomData;

use crate::packed::PackedBits;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackedArrayError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackedArrayError {
    #[error("unsupported element width {0} (supported: 1..=32 bits)")]
    UnsupportedWidth(u8),
}

fn width_mask(width: u8) -> u32 {
    if width == 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

fn sign_extend(bits: u32, width: u8) -> i32 {
    if width == 32 {
        return bits as i32;
    }
    let msb = 1u32 << (width - 1);
    (bits ^ msb).wrapping_sub(msb) as i32
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
}

/// Element type of a [`PackedArray`]: `u32` reads are zero-extended from
/// the element width, `i32` reads are sign-extended.
pub trait Element: Copy + sealed::Sealed {
    #[doc(hidden)]
    fn from_bits(bits: u32, width: u8) -> Self;
    #[doc(hidden)]
    fn to_bits(self, width: u8) -> u32;
}

impl Element for u32 {
    fn from_bits(bits: u32, _width: u8) -> Self {
        bits
    }

    fn to_bits(self, width: u8) -> u32 {
        self & width_mask(width)
    }
}

impl Element for i32 {
    fn from_bits(bits: u32, width: u8) -> Self {
        sign_extend(bits, width)
    }

    fn to_bits(self, width: u8) -> u32 {
        (self as u32) & width_mask(width)
    }
}

#[derive(Debug)]
enum Repr {
    Exact8(Vec<u8>),
    Exact16(Vec<u16>),
    Exact32(Vec<u32>),
    Packed(PackedBits),
    /// Reserved concurrent-write strategy: quadruple-word granular backing
    /// is allocated, but the accessors are not implemented. See
    /// [`PackedArray::new_concurrent_write`].
    ConcurrentReserved { _buf: Vec<u8> },
}

/// A fixed-length array of `width`-bit integers packed back to back.
///
/// Accessors are fixed-time. Indices are caller-checked: the packed
/// strategies only `debug_assert!` the logical bound, matching the raw
/// unchecked accessor intent of the design.
#[derive(Debug)]
pub struct PackedArray<T: Element = u32> {
    repr: Repr,
    width: u8,
    len: usize,
    _elem: PhantomData<T>,
}

impl<T: Element> PackedArray<T> {
    /// Creates an array of `len` elements of `width` bits each.
    ///
    /// Widths 8, 16 and 32 select naturally aligned typed storage; all
    /// other widths in `1..=32` select the packed strategy.
    pub fn new(width: u8, len: usize) -> Result<Self> {
        let repr = match width {
            8 => Repr::Exact8(vec![0; len]),
            16 => Repr::Exact16(vec![0; len]),
            32 => Repr::Exact32(vec![0; len]),
            1..=31 => Repr::Packed(PackedBits::new(width, len)),
            _ => return Err(PackedArrayError::UnsupportedWidth(width)),
        };
        Ok(Self {
            repr,
            width,
            len,
            _elem: PhantomData,
        })
    }

    /// Creates the reserved concurrent-write variant.
    ///
    /// The quadruple-word rounded backing is allocated so the strategy
    /// keeps its memory footprint, but `get`/`set` are unimplemented
    /// stubs: the atomic compare-and-swap bit splice is reserved for
    /// future work. Exact widths fall back to the aligned strategy, whose
    /// single-word stores need no splicing.
    pub fn new_concurrent_write(width: u8, len: usize) -> Result<Self> {
        let repr = match width {
            8 => Repr::Exact8(vec![0; len]),
            16 => Repr::Exact16(vec![0; len]),
            32 => Repr::Exact32(vec![0; len]),
            1..=31 => Repr::ConcurrentReserved {
                _buf: vec![0; PackedBits::concurrent_byte_len(width, len)],
            },
            _ => return Err(PackedArrayError::UnsupportedWidth(width)),
        };
        Ok(Self {
            repr,
            width,
            len,
            _elem: PhantomData,
        })
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads element `index`, zero- or sign-extending to the element type.
    pub fn get(&self, index: usize) -> T {
        debug_assert!(index < self.len);
        let bits = match &self.repr {
            Repr::Exact8(buf) => buf[index] as u32,
            Repr::Exact16(buf) => buf[index] as u32,
            Repr::Exact32(buf) => buf[index],
            Repr::Packed(bits) => bits.get(index),
            Repr::ConcurrentReserved { .. } => {
                unimplemented!("concurrent-write packed accessors are reserved")
            }
        };
        T::from_bits(bits, self.width)
    }

    /// Writes element `index`. Values wider than the element width are
    /// truncated to it.
    pub fn set(&mut self, index: usize, value: T) {
        debug_assert!(index < self.len);
        let bits = value.to_bits(self.width);
        match &mut self.repr {
            Repr::Exact8(buf) => buf[index] = bits as u8,
            Repr::Exact16(buf) => buf[index] = bits as u16,
            Repr::Exact32(buf) => buf[index] = bits,
            Repr::Packed(packed) => packed.set(index, bits),
            Repr::ConcurrentReserved { .. } => {
                unimplemented!("concurrent-write packed accessors are reserved")
            }
        }
    }
}
