//! Adapter for drivers written against `embedded-storage`.
//!
//! Most HAL flash drivers implement `ReadNorFlash` and `NorFlash`.  Wrapping one
//! in a [`NorStorage`] makes it usable by the boot selector.  Offsets that do
//! not fit in a `u32` are rejected before reaching the driver.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use crate::{Error, Flash, ReadFlash, Result};

pub struct NorStorage<T> {
    inner: T,
}

impl<T> NorStorage<T> {
    pub fn new(inner: T) -> Self {
        NorStorage { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn convert<E: NorFlashError>(e: E) -> Error {
    match e.kind() {
        NorFlashErrorKind::NotAligned => Error::NotAligned,
        NorFlashErrorKind::OutOfBounds => Error::OutOfBounds,
        _ => Error::Io,
    }
}

fn offset32(offset: usize) -> Result<u32> {
    u32::try_from(offset).map_err(|_| Error::OutOfBounds)
}

impl<T: ReadNorFlash> ReadFlash for NorStorage<T> {
    fn read_size(&self) -> usize {
        T::READ_SIZE
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()> {
        let offset = offset32(offset)?;
        self.inner.read(offset, bytes).map_err(convert)
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl<T: NorFlash> Flash for NorStorage<T> {
    fn write_size(&self) -> usize {
        T::WRITE_SIZE
    }

    fn erase_size(&self) -> usize {
        T::ERASE_SIZE
    }

    fn erase(&mut self, from: usize, to: usize) -> Result<()> {
        let from = offset32(from)?;
        let to = offset32(to)?;
        self.inner.erase(from, to).map_err(convert)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let offset = offset32(offset)?;
        self.inner.write(offset, bytes).map_err(convert)
    }
}
