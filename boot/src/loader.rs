//! Copying the chosen image into RAM.
//!
//! This runs after selection, on an image that has already been validated, so
//! it does no checking of its own beyond refusing sections the platform has
//! no memory for.

use core::cell::RefCell;

use storage::ReadFlash;

use crate::image::Image;
use crate::{Error, Result};

/// Largest single flash read made while loading.
pub const READ_SIZE: usize = 0x1000;

/// The memory sections are loaded into.
pub trait Ram {
    /// The memory backing `len` bytes starting at RAM address `address`, or
    /// None if that range cannot be loaded.
    fn region(&mut self, address: u32, len: usize) -> Option<&mut [u8]>;
}

/// Load the legacy image at `load_address` into RAM, returning its entry
/// point.
pub fn load_image<F: ReadFlash, R: Ram>(
    flash: &RefCell<F>,
    load_address: u32,
    ram: &mut R,
) -> Result<u32> {
    let image = Image::from_load_address(flash, load_address)?;
    for section in image.sections() {
        let section = section?;
        let len = section.length as usize;
        let dest = ram
            .region(section.address, len)
            .filter(|dest| dest.len() == len)
            .ok_or(Error::InvalidLoad)?;

        let mut pos = section.data_offset() as usize;
        for chunk in dest.chunks_mut(READ_SIZE) {
            flash.borrow_mut().read(pos, chunk)?;
            pos += chunk.len();
        }
    }
    Ok(image.entry())
}
