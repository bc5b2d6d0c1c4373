//! Boot configuration
//!
//! The configuration is a 16 bit flag word at the start of a record sector.
//! Two bits carry meaning:
//!
//! - `DEFAULT_ROM` (bit 0): the bank tried first.  Clear for the primary bank.
//! - `BOOTING_DEFAULT` (bit 2): the last boot ran from the default bank.
//!
//! The remaining bits must match a fixed pattern, which is how a record that
//! was never written, or was damaged, is told apart from a real one.
//!
//! Updates never modify a record in place.  The new record is written to the
//! other of two record sectors, and only once that is complete does the
//! selector sector get rewritten to point at it.  Losing power part way
//! leaves the selector on the old, intact record.

use asraw::{ByteOrder, FromRaw, LittleEndian, ToRaw};

/// Default bank is the secondary one.
pub const DEFAULT_ROM: u16 = 0x0001;

/// The last boot used the default bank.
pub const BOOTING_DEFAULT: u16 = 0x0004;

/// Configuration used when the stored one is not valid: primary bank, booted
/// from default.
pub const DEFAULT_CONFIG: u16 = 0xe7fc;

/// Bytes of the record sector that belong to the record.
pub const RECORD_SIZE: usize = 8;

/// One of the two firmware banks.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Bank {
    Primary,
    Secondary,
}

impl Bank {
    pub fn other(self) -> Bank {
        match self {
            Bank::Primary => Bank::Secondary,
            Bank::Secondary => Bank::Primary,
        }
    }

    /// Number shown on the console, counting from 1.
    pub fn number(self) -> u8 {
        match self {
            Bank::Primary => 1,
            Bank::Secondary => 2,
        }
    }
}

/// A validated configuration word.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BootConfig {
    bits: u16,
}

impl BootConfig {
    /// Check the reserved bits against the expected pattern.
    pub fn is_valid(bits: u16) -> bool {
        bits & 0x1f00 == 0x0700
            && bits & 0x6000 != 0x2000
            && bits & 0x8000 != 0
            && bits & 0x0002 == 0
    }

    pub fn from_bits(bits: u16) -> Option<BootConfig> {
        if BootConfig::is_valid(bits) {
            Some(BootConfig { bits })
        } else {
            None
        }
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn default_bank(&self) -> Bank {
        if self.bits & DEFAULT_ROM != 0 {
            Bank::Secondary
        } else {
            Bank::Primary
        }
    }

    pub fn with_default_bank(mut self, bank: Bank) -> BootConfig {
        match bank {
            Bank::Primary => self.bits &= !DEFAULT_ROM,
            Bank::Secondary => self.bits |= DEFAULT_ROM,
        }
        self
    }

    pub fn booting_default(&self) -> bool {
        self.bits & BOOTING_DEFAULT != 0
    }

    pub fn set_booting_default(&mut self, booting: bool) {
        if booting {
            self.bits |= BOOTING_DEFAULT;
        } else {
            self.bits &= !BOOTING_DEFAULT;
        }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            bits: DEFAULT_CONFIG,
        }
    }
}

/// The record as stored at the start of its sector.  Only `config` is
/// interpreted; the rest is carried along unchanged.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Record {
    pub config: u16,
    pub reserved: [u8; 6],
}

impl Record {
    pub fn erased() -> Record {
        Record {
            config: 0xffff,
            reserved: [0xff; 6],
        }
    }
}

impl FromRaw for Record {
    type Raw = [u8; RECORD_SIZE];

    fn from_raw(raw: &[u8; RECORD_SIZE]) -> Self {
        let mut reserved = [0u8; 6];
        reserved.copy_from_slice(&raw[2..]);
        Record {
            config: LittleEndian::read_u16(&raw[..2]),
            reserved,
        }
    }
}

impl ToRaw for Record {
    fn to_raw(&self) -> [u8; RECORD_SIZE] {
        let mut raw = [0u8; RECORD_SIZE];
        LittleEndian::write_u16(&mut raw[..2], self.config);
        raw[2..].copy_from_slice(&self.reserved);
        raw
    }
}

/// The first word of the selector sector.  A non-zero first byte selects the
/// upper record sector (n-2), zero selects the lower one (n-3).  Erased flash
/// thus selects the upper sector.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SectorSelector {
    pub sector: u8,
    pub reserved: [u8; 3],
}

impl SectorSelector {
    pub fn erased() -> SectorSelector {
        SectorSelector {
            sector: 0xff,
            reserved: [0xff; 3],
        }
    }

    pub fn upper(&self) -> bool {
        self.sector != 0
    }

    /// The selector pointing at the other record sector.
    pub fn flipped(&self) -> SectorSelector {
        SectorSelector {
            sector: if self.upper() { 0 } else { 1 },
            reserved: self.reserved,
        }
    }
}

impl FromRaw for SectorSelector {
    type Raw = [u8; 4];

    fn from_raw(raw: &[u8; 4]) -> Self {
        SectorSelector {
            sector: raw[0],
            reserved: [raw[1], raw[2], raw[3]],
        }
    }
}

impl ToRaw for SectorSelector {
    fn to_raw(&self) -> [u8; 4] {
        [self.sector, self.reserved[0], self.reserved[1], self.reserved[2]]
    }
}
