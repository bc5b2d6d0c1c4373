//! Image generation.
//!
//! Builds firmware images in the two formats the boot selector accepts.  The
//! section payloads are pseudo-random, derived from a seed, so each test gets
//! reproducible but distinct images.
//!
//! Legacy layout:
//!
//! ```text
//! e9 count flags1 flags2 entry:u32
//! (address:u32 length:u32 data[length]) * count
//! zero padding up to an offset of 15 mod 16
//! checksum:u8
//! ```
//!
//! The extended layout adds a 16 byte header and a leading "irom" region ahead
//! of a complete legacy image.

use std::ops::Range;

use anyhow::{bail, Result};
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// Seed for the XOR checksum over section data.
pub const CHECKSUM_INIT: u8 = 0xef;

/// Size of the extended header.
pub const EXTENDED_HEADER_SIZE: usize = 16;

/// A section as placed in a generated image.
#[derive(Debug, Clone)]
pub struct GenSection {
    /// RAM address the section loads to.
    pub address: u32,
    /// Where the section's payload lies, relative to the start of the image.
    pub data: Range<usize>,
}

pub struct GeneratedImage {
    pub data: Vec<u8>,
    /// Offset, within `data`, of the legacy header.  This is what the
    /// validator reports as the load address (relative to the image).
    pub header_offset: usize,
    /// Entry point recorded in the header.
    pub entry: u32,
    pub sections: Vec<GenSection>,
    /// Offset of the checksum byte.
    pub checksum_offset: usize,
}

impl GeneratedImage {
    /// Payload of a section.
    pub fn section_data(&self, index: usize) -> &[u8] {
        &self.data[self.sections[index].data.clone()]
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Format {
    Legacy,
    /// Extended format, with a leading irom region of this many bytes.
    Extended(usize),
}

pub struct GenBuilder {
    format: Format,
    /// Sizes of each section.
    sections: Vec<usize>,
    /// Seed for the PRNG
    seed: usize,
    entry: u32,
    flags: [u8; 2],
}

impl Default for GenBuilder {
    fn default() -> Self {
        GenBuilder {
            format: Format::Legacy,
            sections: vec![0x3a1, 0x1c4, 0x2000],
            seed: 1,
            entry: 0x4010_0004,
            flags: [2, 0x20],
        }
    }
}

impl GenBuilder {
    pub fn format(&mut self, format: Format) -> &mut Self {
        self.format = format;
        self
    }

    pub fn sections(&mut self, sizes: &[usize]) -> &mut Self {
        self.sections = sizes.to_vec();
        self
    }

    pub fn seed(&mut self, seed: usize) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn entry(&mut self, entry: u32) -> &mut Self {
        self.entry = entry;
        self
    }

    pub fn build(&self) -> Result<GeneratedImage> {
        if self.sections.len() > u8::MAX as usize {
            bail!("Too many sections: {}", self.sections.len());
        }

        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed as u64);
        let mut data = Vec::new();

        if let Format::Extended(irom_len) = self.format {
            data.extend_from_slice(&[0xea, 0x04, self.flags[0], self.flags[1]]);
            data.extend_from_slice(&self.entry.to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&(irom_len as u32).to_le_bytes());
            let start = data.len();
            data.resize(start + irom_len, 0);
            rng.fill_bytes(&mut data[start..]);
        }

        let header_offset = data.len();
        data.extend_from_slice(&[
            0xe9,
            self.sections.len() as u8,
            self.flags[0],
            self.flags[1],
        ]);
        data.extend_from_slice(&self.entry.to_le_bytes());

        let mut checksum = CHECKSUM_INIT;
        let mut sections = Vec::new();
        let mut address = 0x3ffe_8000u32;
        for &size in &self.sections {
            data.extend_from_slice(&address.to_le_bytes());
            data.extend_from_slice(&(size as u32).to_le_bytes());
            let start = data.len();
            data.resize(start + size, 0);
            rng.fill_bytes(&mut data[start..]);
            for &b in &data[start..] {
                checksum ^= b;
            }
            sections.push(GenSection {
                address,
                data: start..start + size,
            });
            address = address.wrapping_add(size as u32 + 0x100) & !3;
        }

        // The checksum sits at the last byte of the current 16 byte block.
        let checksum_offset = data.len() | 0x0f;
        data.resize(checksum_offset, 0);
        data.push(checksum);

        Ok(GeneratedImage {
            data,
            header_offset,
            entry: self.entry,
            sections,
            checksum_offset,
        })
    }
}
