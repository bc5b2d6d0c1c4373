//! AsRaw provides a way to move fixed-layout records between their in-memory
//! form and the bytes stored in flash.
//!
//! Each record names a byte array as its raw representation.  Decoding reads
//! the fields out of that array one at a time, so any bit pattern read from
//! flash produces a value, and nothing is ever reinterpreted in place.  All
//! multi-byte fields are little endian.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use core::mem::size_of;

pub use byteorder::{ByteOrder, LittleEndian};

/// A record that can be decoded from its fixed-size raw form.
pub trait FromRaw: Sized {
    /// The raw representation, a byte array of the on-flash size.
    type Raw: AsRef<[u8]> + AsMut<[u8]> + Default;

    fn from_raw(raw: &Self::Raw) -> Self;
}

/// A record that can also be encoded back into its raw form.
pub trait ToRaw: FromRaw {
    fn to_raw(&self) -> Self::Raw;
}

/// Size, in bytes, of the raw form of a record.
pub const fn raw_size<T: FromRaw>() -> usize {
    size_of::<T::Raw>()
}

/// Decode a record from the front of `bytes`.  Returns None if there are not
/// enough bytes.
pub fn decode<T: FromRaw>(bytes: &[u8]) -> Option<T> {
    let mut raw = T::Raw::default();
    let dest = raw.as_mut();
    let src = bytes.get(..dest.len())?;
    dest.copy_from_slice(src);
    Some(T::from_raw(&raw))
}

/// Encode a record into the front of `bytes`.  Returns None if it doesn't fit.
pub fn encode<T: ToRaw>(item: &T, bytes: &mut [u8]) -> Option<()> {
    let raw = item.to_raw();
    let src = raw.as_ref();
    bytes.get_mut(..src.len())?.copy_from_slice(src);
    Some(())
}
