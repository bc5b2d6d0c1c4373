//! Simulated flash
//!
//! The boot selector runs against SPI NOR flash: reads are byte addressable,
//! writes can only clear bits, and erase sets a whole sector back to 0xff.
//! This simulator captures those rules, and adds the things that are hard to
//! provoke on real hardware:
//!
//! - Read faults over chosen address ranges, to stand in for a driver error.
//! - A power-loss budget.  After a given number of erase/write operations, all
//!   further modifications fail and leave the contents untouched, as if the
//!   device had been reset mid sequence.
//! - Counters of reads, writes and per-sector erases, so tests can assert what
//!   was (and was not) modified.
//!
//! The device is available through both the `storage` traits and the
//! `embedded-storage` NOR traits.

use std::{fs, ops::Range, path::Path};

use anyhow::{anyhow, bail, Result};
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use storage::{Flash, ReadFlash};

pub mod gen;
pub mod styles;

/// The richer error type used in the simulator, for the NOR traits.
#[derive(Debug, Clone, Copy)]
pub enum SimError {
    Inner(NorFlashErrorKind),
}

impl From<NorFlashErrorKind> for SimError {
    fn from(inner: NorFlashErrorKind) -> Self {
        SimError::Inner(inner)
    }
}

impl From<storage::Error> for SimError {
    fn from(e: storage::Error) -> Self {
        let kind = match e {
            storage::Error::NotAligned => NorFlashErrorKind::NotAligned,
            storage::Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            _ => NorFlashErrorKind::Other,
        };
        SimError::Inner(kind)
    }
}

impl NorFlashError for SimError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            SimError::Inner(inner) => *inner,
        }
    }
}

/// Counts of operations that reached the device.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Stats {
    pub reads: usize,
    pub writes: usize,
    pub erases: usize,
}

pub struct SimFlash {
    data: Vec<u8>,
    read_size: usize,
    write_size: usize,
    erase_size: usize,
    stats: Stats,
    sector_erases: Vec<usize>,
    /// Modifications left before simulated power loss.  None is unlimited.
    power: Option<usize>,
    bad_reads: Vec<Range<usize>>,
}

impl SimFlash {
    /// Build a fully erased device.  The sizes must agree with the NOR trait
    /// constants, which are fixed for the type.
    pub fn new(
        read_size: usize,
        write_size: usize,
        erase_size: usize,
        sectors: usize,
    ) -> Result<SimFlash> {
        let nor = (
            <SimFlash as ReadNorFlash>::READ_SIZE,
            <SimFlash as NorFlash>::WRITE_SIZE,
            <SimFlash as NorFlash>::ERASE_SIZE,
        );
        if (read_size, write_size, erase_size) != nor {
            bail!(
                "Unsupported flash sizes {:?}, the NOR view uses {:?}",
                (read_size, write_size, erase_size),
                nor
            );
        }
        let capacity = erase_size
            .checked_mul(sectors)
            .ok_or_else(|| anyhow!("Flash too large"))?;
        Ok(SimFlash {
            data: vec![0xff; capacity],
            read_size,
            write_size,
            erase_size,
            stats: Stats::default(),
            sector_erases: vec![0; sectors],
            power: None,
            bad_reads: Vec::new(),
        })
    }

    /// Place data directly into the flash, as a programmer would.  This
    /// ignores the NOR write rules and does not count as an operation.
    pub fn install(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| anyhow!("Install of {} bytes at {:#x} past end of flash", data.len(), offset))?;
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Invert a single byte of the flash.
    pub fn corrupt(&mut self, offset: usize) {
        self.data[offset] ^= 0xff;
    }

    /// The raw flash contents.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Any read touching `range` will fail.
    pub fn fail_reads(&mut self, range: Range<usize>) {
        self.bad_reads.push(range);
    }

    pub fn clear_faults(&mut self) {
        self.bad_reads.clear();
        self.power = None;
    }

    /// Allow `ops` more erase or write operations, after which the device
    /// behaves as though power was lost.
    pub fn power_loss_after(&mut self, ops: usize) {
        self.power = Some(ops);
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Number of times a given sector has been erased.
    pub fn sector_erases(&self, sector: usize) -> usize {
        self.sector_erases[sector]
    }

    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
        self.sector_erases.fill(0);
    }

    /// Write the contents out to a file, to capture a device state.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.data)?;
        Ok(())
    }

    /// Replace the contents with a previously saved state.  The file must
    /// match the size of this device.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let data = fs::read(path)?;
        if data.len() != self.data.len() {
            bail!(
                "Saved image is {} bytes, device is {} bytes",
                data.len(),
                self.data.len()
            );
        }
        self.data = data;
        Ok(())
    }

    /// Consume one modification from the power budget.
    fn spend(&mut self) -> storage::Result<()> {
        match self.power {
            Some(0) => Err(storage::Error::Io),
            Some(ref mut n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl ReadFlash for SimFlash {
    fn read_size(&self) -> usize {
        self.read_size
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> storage::Result<()> {
        storage::check_read(self, offset, bytes.len())?;
        let range = offset..offset + bytes.len();
        if self
            .bad_reads
            .iter()
            .any(|bad| bad.start < range.end && range.start < bad.end)
        {
            return Err(storage::Error::Io);
        }
        self.stats.reads += 1;
        bytes.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Flash for SimFlash {
    fn write_size(&self) -> usize {
        self.write_size
    }

    fn erase_size(&self) -> usize {
        self.erase_size
    }

    fn erase(&mut self, from: usize, to: usize) -> storage::Result<()> {
        storage::check_erase(self, from, to)?;
        self.spend()?;
        self.stats.erases += 1;
        self.data[from..to].fill(0xff);
        for sector in from / self.erase_size..to / self.erase_size {
            self.sector_erases[sector] += 1;
        }
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> storage::Result<()> {
        storage::check_write(self, offset, bytes.len())?;
        let dest = &self.data[offset..offset + bytes.len()];
        // NOR can only clear bits.
        if dest.iter().zip(bytes).any(|(&d, &s)| d & s != s) {
            return Err(storage::Error::NotErased);
        }
        self.spend()?;
        self.stats.writes += 1;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl ErrorType for SimFlash {
    type Error = SimError;
}

impl ReadNorFlash for SimFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> core::result::Result<(), SimError> {
        Ok(ReadFlash::read(self, offset as usize, bytes)?)
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for SimFlash {
    // Every device shares these, `new` refuses other sizes.
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> core::result::Result<(), SimError> {
        Ok(Flash::erase(self, from as usize, to as usize)?)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> core::result::Result<(), SimError> {
        Ok(Flash::write(self, offset as usize, bytes)?)
    }
}
