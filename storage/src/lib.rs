//! Storage types.
//!
//! The boot selector only needs a narrow view of the flash: byte addressable
//! reads, writes, and erases at sector granularity.  All operations are
//! synchronous.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[cfg(feature = "embedded-storage")]
pub mod nor;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    NotAligned,
    OutOfBounds,
    NotWritten,
    NotErased,
    /// The device itself reported a failure.
    Io,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Read only interface into flash.
pub trait ReadFlash {
    /// What is the read size (alignment and size multiple).
    fn read_size(&self) -> usize;
    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()>;
    fn capacity(&self) -> usize;
}

/// Flash that can be written to.
pub trait Flash: ReadFlash {
    /// Write size (alignment and size multiple).
    fn write_size(&self) -> usize;
    /// Erase size (alignment and size multiple).
    fn erase_size(&self) -> usize;

    fn erase(&mut self, from: usize, to: usize) -> Result<()>;
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;

    /// Erase a single sector, by index.
    fn erase_sector(&mut self, sector: usize) -> Result<()> {
        let size = self.erase_size();
        let from = sector.checked_mul(size).ok_or(Error::OutOfBounds)?;
        let to = from.checked_add(size).ok_or(Error::OutOfBounds)?;
        self.erase(from, to)
    }
}

// Utilities taken from embedded-storage for validating arguments.
pub fn check_read<T: ReadFlash>(
    flash: &T,
    offset: usize,
    length: usize,
) -> Result<()> {
    check_slice(flash, flash.read_size(), offset, length)
}

pub fn check_erase<T: Flash>(
    flash: &T,
    from: usize,
    to: usize,
) -> Result<()> {
    if from > to || to > flash.capacity() {
        return Err(Error::OutOfBounds);
    }
    if from % flash.erase_size() != 0 || to % flash.erase_size() != 0 {
        return Err(Error::NotAligned);
    }
    Ok(())
}

pub fn check_write<T: Flash>(
    flash: &T,
    offset: usize,
    length: usize,
) -> Result<()> {
    check_slice(flash, flash.write_size(), offset, length)
}

pub fn check_slice<T: ReadFlash>(
    flash: &T,
    align: usize,
    offset: usize,
    length: usize,
) -> Result<()> {
    if length > flash.capacity() || offset > flash.capacity() - length {
        return Err(Error::OutOfBounds);
    }
    if offset % align != 0 || length % align != 0 {
        return Err(Error::NotAligned);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Just enough of a device to exercise the argument checks.
    struct Fake {
        erased: Vec<(usize, usize)>,
    }

    impl ReadFlash for Fake {
        fn read_size(&self) -> usize {
            1
        }
        fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()> {
            check_read(self, offset, bytes.len())
        }
        fn capacity(&self) -> usize {
            0x4000
        }
    }

    impl Flash for Fake {
        fn write_size(&self) -> usize {
            4
        }
        fn erase_size(&self) -> usize {
            0x1000
        }
        fn erase(&mut self, from: usize, to: usize) -> Result<()> {
            check_erase(self, from, to)?;
            self.erased.push((from, to));
            Ok(())
        }
        fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
            check_write(self, offset, bytes.len())
        }
    }

    #[test]
    fn bounds() {
        let mut f = Fake { erased: vec![] };
        let mut buf = [0u8; 16];
        assert_eq!(f.read(0x3ff0, &mut buf), Ok(()));
        assert_eq!(f.read(0x3ff1, &mut buf), Err(Error::OutOfBounds));
        assert_eq!(f.read(usize::MAX, &mut buf), Err(Error::OutOfBounds));
        assert_eq!(f.write(2, &buf), Err(Error::NotAligned));
        assert_eq!(f.write(4, &buf[..3]), Err(Error::NotAligned));
        assert_eq!(f.erase(0, 0x800), Err(Error::NotAligned));
        assert_eq!(f.erase(0x2000, 0x1000), Err(Error::OutOfBounds));
    }

    #[test]
    fn sector_erase() {
        let mut f = Fake { erased: vec![] };
        f.erase_sector(3).unwrap();
        assert_eq!(f.erased, vec![(0x3000, 0x4000)]);
        assert_eq!(f.erase_sector(4), Err(Error::OutOfBounds));
        assert_eq!(f.erase_sector(usize::MAX), Err(Error::OutOfBounds));
    }
}
