// Shared test fixtures.

#![allow(dead_code)]

use std::cell::RefCell;

use boot::{Hardware, Ram, ResetReason};
use simflash::{gen::GeneratedImage, styles::ChipStyle, SimFlash};

/// Hardware with its effects recorded.
pub struct TestHardware {
    pub reason: ResetReason,
    pub consoles: usize,
    pub chip_size: Option<u32>,
}

impl TestHardware {
    pub fn new() -> TestHardware {
        TestHardware::with_reason(ResetReason::PowerOn)
    }

    pub fn with_reason(reason: ResetReason) -> TestHardware {
        TestHardware {
            reason,
            consoles: 0,
            chip_size: None,
        }
    }
}

impl Hardware for TestHardware {
    fn reset_reason(&self) -> ResetReason {
        self.reason
    }

    fn init_console(&mut self) {
        self.consoles += 1;
    }

    fn set_chip_size(&mut self, size: u32) {
        self.chip_size = Some(size);
    }
}

/// RAM made of a few disjoint regions, like the data and instruction RAM of
/// the target.
pub struct TestRam {
    pub regions: Vec<(u32, Vec<u8>)>,
}

impl TestRam {
    pub fn new() -> TestRam {
        TestRam {
            regions: vec![
                (0x3ffe_8000, vec![0; 0x18000]),
                (0x4010_0000, vec![0; 0x8000]),
            ],
        }
    }

    /// Read back loaded memory.
    pub fn get(&self, address: u32, len: usize) -> &[u8] {
        for (base, mem) in &self.regions {
            if address >= *base && (address - base) as usize + len <= mem.len() {
                let start = (address - base) as usize;
                return &mem[start..start + len];
            }
        }
        panic!("No RAM at {:#x}", address);
    }
}

impl Ram for TestRam {
    fn region(&mut self, address: u32, len: usize) -> Option<&mut [u8]> {
        for (base, mem) in &mut self.regions {
            if address >= *base && (address - *base) as usize + len <= mem.len() {
                let start = (address - *base) as usize;
                return Some(&mut mem[start..start + len]);
            }
        }
        None
    }
}

pub const SECTOR: usize = 0x1000;

/// Offsets of the configuration sectors for a style.
pub fn selector_offset(style: &ChipStyle) -> usize {
    style.size - SECTOR
}

pub fn upper_record_offset(style: &ChipStyle) -> usize {
    style.size - 2 * SECTOR
}

pub fn lower_record_offset(style: &ChipStyle) -> usize {
    style.size - 3 * SECTOR
}

/// Build a chip, with images in either bank.
pub fn chip(
    style: &ChipStyle,
    primary: Option<&GeneratedImage>,
    secondary: Option<(usize, &GeneratedImage)>,
) -> RefCell<SimFlash> {
    let mut flash = style.build().unwrap();
    if let Some(img) = primary {
        flash.install(&img.data, 0x1000).unwrap();
    }
    if let Some((offset, img)) = secondary {
        flash.install(&img.data, offset).unwrap();
    }
    RefCell::new(flash)
}

/// Store a configuration word, in the given record slot, and point the
/// selector at it.
pub fn store_config(flash: &RefCell<SimFlash>, style: &ChipStyle, upper: bool, bits: u16) {
    let mut flash = flash.borrow_mut();
    let record = if upper {
        upper_record_offset(style)
    } else {
        lower_record_offset(style)
    };
    flash.install(&bits.to_le_bytes(), record).unwrap();
    flash
        .install(&[upper as u8, 0xff, 0xff, 0xff], selector_offset(style))
        .unwrap();
}

/// The configuration word the selector currently points at.
pub fn stored_config(flash: &RefCell<SimFlash>, style: &ChipStyle) -> (bool, u16) {
    let flash = flash.borrow();
    let data = flash.contents();
    let upper = data[selector_offset(style)] != 0;
    let record = if upper {
        upper_record_offset(style)
    } else {
        lower_record_offset(style)
    };
    (upper, u16::from_le_bytes([data[record], data[record + 1]]))
}
