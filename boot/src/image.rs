//! Boot image support
//!
//! An image is a list of sections, each copied to its own RAM address by the
//! loader.  There are two header formats:
//!
//! - The legacy format, an 8 byte header followed directly by the sections.
//! - The extended format, whose 16 byte header is followed by a region that
//!   stays in flash (the "irom" region), and then a complete legacy image.
//!
//! After the last section, padding runs to the last byte of a 16 byte block,
//! which holds an XOR checksum over the section data.  Section headers and
//! padding are not covered.

use core::cell::RefCell;

use asraw::{ByteOrder, FromRaw, LittleEndian};
use storage::ReadFlash;

use crate::{Error, Result};

/// Legacy image header magic.
pub const IMAGE_MAGIC: u8 = 0xe9;

/// Extended image headers carry these two bytes.
pub const EXTENDED_MAGIC1: u8 = 0xea;
pub const EXTENDED_MAGIC2: u8 = 0x04;

/// Size of the extended header, before the irom region.
pub const EXTENDED_HEADER_SIZE: u32 = asraw::raw_size::<ExtendedHeader>() as u32;

/// Size of the legacy header.
const HEADER_SIZE: u32 = asraw::raw_size::<ImageHeader>() as u32;

/// Size of each section header.
const SECTION_HEADER_SIZE: u32 = asraw::raw_size::<SectionHeader>() as u32;

/// Initial value of the checksum.
pub const CHECKSUM_INIT: u8 = 0xef;

/// Scratch space for checksumming.  Bounds the stack, not the image.
const BUFFER_SIZE: usize = 0x100;

/// The legacy image header.  Also found at offset 0 of the flash, where it
/// describes the boot loader itself.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct ImageHeader {
    pub magic: u8,
    /// Number of sections that follow.
    pub count: u8,
    /// SPI mode.
    pub flags1: u8,
    /// Size class (high nibble) and SPI speed (low nibble).
    pub flags2: u8,
    /// Entry point, in the loaded image.
    pub entry: u32,
}

impl FromRaw for ImageHeader {
    type Raw = [u8; 8];

    fn from_raw(raw: &[u8; 8]) -> Self {
        ImageHeader {
            magic: raw[0],
            count: raw[1],
            flags1: raw[2],
            flags2: raw[3],
            entry: LittleEndian::read_u32(&raw[4..8]),
        }
    }
}

/// The extended header.  Only the magic values and the irom length are
/// consulted.  The entry point that matters is in the legacy header that
/// follows.
#[derive(Debug, Default)]
#[allow(dead_code)]
struct ExtendedHeader {
    magic: u8,
    magic2: u8,
    flags1: u8,
    flags2: u8,
    entry: u32,
    /// Always zero.
    add: u32,
    /// Length of the irom region.
    len: u32,
}

impl FromRaw for ExtendedHeader {
    type Raw = [u8; 16];

    fn from_raw(raw: &[u8; 16]) -> Self {
        ExtendedHeader {
            magic: raw[0],
            magic2: raw[1],
            flags1: raw[2],
            flags2: raw[3],
            entry: LittleEndian::read_u32(&raw[4..8]),
            add: LittleEndian::read_u32(&raw[8..12]),
            len: LittleEndian::read_u32(&raw[12..16]),
        }
    }
}

/// Each section is preceded by this header.
#[derive(Debug, Default)]
struct SectionHeader {
    /// RAM address to load to.
    address: u32,
    length: u32,
}

impl FromRaw for SectionHeader {
    type Raw = [u8; 8];

    fn from_raw(raw: &[u8; 8]) -> Self {
        SectionHeader {
            address: LittleEndian::read_u32(&raw[0..4]),
            length: LittleEndian::read_u32(&raw[4..8]),
        }
    }
}

/// Read a record from flash.
pub(crate) fn read_raw<T: FromRaw, F: ReadFlash>(flash: &RefCell<F>, offset: u32) -> Result<T> {
    let mut raw = T::Raw::default();
    flash.borrow_mut().read(offset as usize, raw.as_mut())?;
    Ok(T::from_raw(&raw))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ImageFormat {
    Legacy,
    /// Extended header, with an irom region of the given length.
    Extended { irom_len: u32 },
}

/// An image found in flash.  This holds on to a RefCell to the flash to bind
/// the data to a particular flash.
pub struct Image<'f, F> {
    flash: &'f RefCell<F>,
    /// The legacy header, at the load address.
    pub header: ImageHeader,
    pub format: ImageFormat,
    load_address: u32,
    /// Offset of the first section header.
    body: u32,
}

impl<'f, F: ReadFlash> Image<'f, F> {
    /// Find an image at the given flash offset, if there is a recognized
    /// header there.  This does not indicate that the image itself is valid,
    /// merely that the header indicates an image is present.
    pub fn from_flash(flash: &'f RefCell<F>, offset: u32) -> Result<Image<'f, F>> {
        // Zero is the boot loader itself, and all ones is erased.
        if offset == 0 || offset == u32::MAX {
            return Err(Error::InvalidImage);
        }

        let mut raw = [0u8; 16];
        flash.borrow_mut().read(offset as usize, &mut raw)?;
        let ext = ExtendedHeader::from_raw(&raw);

        let (format, load_address, header) = if ext.magic == IMAGE_MAGIC {
            let header: ImageHeader = asraw::decode(&raw).ok_or(Error::InvalidImage)?;
            (ImageFormat::Legacy, offset, header)
        } else if ext.magic == EXTENDED_MAGIC1 && ext.magic2 == EXTENDED_MAGIC2 {
            // Skip the irom region, the legacy image follows.  Only its
            // section count and entry are used, its magic is not checked.
            let load_address = offset
                .checked_add(ext.len)
                .and_then(|a| a.checked_add(EXTENDED_HEADER_SIZE))
                .ok_or(Error::InvalidImage)?;
            let header: ImageHeader = read_raw(flash, load_address)?;
            (ImageFormat::Extended { irom_len: ext.len }, load_address, header)
        } else {
            return Err(Error::InvalidImage);
        };

        Image::with_header(flash, format, load_address, header)
    }

    /// The legacy image at a load address, as returned by `check_image`.  The
    /// header is taken as is, without looking at its magic.
    pub fn from_load_address(flash: &'f RefCell<F>, load_address: u32) -> Result<Image<'f, F>> {
        let header: ImageHeader = read_raw(flash, load_address)?;
        Image::with_header(flash, ImageFormat::Legacy, load_address, header)
    }

    fn with_header(
        flash: &'f RefCell<F>,
        format: ImageFormat,
        load_address: u32,
        header: ImageHeader,
    ) -> Result<Image<'f, F>> {
        let body = load_address
            .checked_add(HEADER_SIZE)
            .ok_or(Error::InvalidImage)?;
        Ok(Image {
            flash,
            header,
            format,
            load_address,
            body,
        })
    }

    /// Iterate over the sections of the image.
    pub fn sections<'a>(&'a self) -> SectionIter<'a, 'f, F> {
        SectionIter {
            image: self,
            pos: self.body,
            remaining: self.header.count,
        }
    }

    /// Validate this image.  Every byte of every section is folded into the
    /// checksum, which must match the byte stored after the last section.
    pub fn validate(&self) -> Result<()> {
        let mut checksum = CHECKSUM_INIT;
        let mut buffer = [0u8; BUFFER_SIZE];
        let mut end = self.body;

        for section in self.sections() {
            let section = section?;
            let mut pos = section.data;
            let mut remaining = section.length as usize;
            while remaining > 0 {
                let todo = remaining.min(buffer.len());
                let buf = &mut buffer[..todo];
                self.flash.borrow_mut().read(pos as usize, buf)?;
                checksum = buf.iter().fold(checksum, |sum, b| sum ^ b);
                // Within the section, whose end was checked for overflow.
                pos += todo as u32;
                remaining -= todo;
            }
            end = section.end();
        }

        let mut stored = [0u8; 1];
        self.flash
            .borrow_mut()
            .read((end | 0x0f) as usize, &mut stored)?;
        if stored[0] != checksum {
            warn!(
                "Checksum mismatch at {:#x}: stored {:#x}, computed {:#x}",
                self.load_address,
                stored[0],
                checksum
            );
            return Err(Error::InvalidImage);
        }
        Ok(())
    }
}

impl<'f, F> Image<'f, F> {
    /// The flash offset of the runnable image.  For the extended format, this
    /// is past the irom region, and not where the image was found.
    pub fn load_address(&self) -> u32 {
        self.load_address
    }

    pub fn entry(&self) -> u32 {
        self.header.entry
    }
}

/// Check the image at a flash offset, returning its load address if it is
/// structurally sound and its checksum matches.
pub fn check_image<F: ReadFlash>(flash: &RefCell<F>, offset: u32) -> Result<u32> {
    let image = Image::from_flash(flash, offset)?;
    image.validate()?;
    Ok(image.load_address())
}

/// A single section, as described by its header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Section {
    /// RAM address this section loads to.
    pub address: u32,
    pub length: u32,
    /// Flash offset of the section data.
    data: u32,
}

impl Section {
    pub fn data_offset(&self) -> u32 {
        self.data
    }

    /// Flash offset just past the section data.
    fn end(&self) -> u32 {
        // Checked when the section was read.
        self.data + self.length
    }
}

pub struct SectionIter<'a, 'f, F> {
    image: &'a Image<'f, F>,
    pos: u32,
    remaining: u8,
}

impl<'a, 'f, F: ReadFlash> SectionIter<'a, 'f, F> {
    fn read_next(&mut self) -> Result<Section> {
        let header: SectionHeader = read_raw(self.image.flash, self.pos)?;
        let data = self
            .pos
            .checked_add(SECTION_HEADER_SIZE)
            .ok_or(Error::InvalidImage)?;
        let end = data
            .checked_add(header.length)
            .ok_or(Error::InvalidImage)?;
        self.pos = end;
        Ok(Section {
            address: header.address,
            length: header.length,
            data,
        })
    }
}

impl<'a, 'f, F: ReadFlash> Iterator for SectionIter<'a, 'f, F> {
    type Item = Result<Section>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.read_next();
        // Nothing after a bad section header can be trusted.
        self.remaining = if item.is_ok() { self.remaining - 1 } else { 0 };
        Some(item)
    }
}
