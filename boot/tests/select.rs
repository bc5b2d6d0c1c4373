// Boot selection testing.

mod common;

use std::cell::RefCell;

use boot::{select_boot_image, Bank, Error, ResetReason, DEFAULT_CONFIG};
use common::{
    chip, lower_record_offset, selector_offset, store_config, stored_config,
    upper_record_offset, TestHardware, SECTOR,
};
use simflash::{
    gen::{Format, GenBuilder, GeneratedImage},
    styles::{self, ChipStyle},
    SimFlash,
};
use storage::{Flash, ReadFlash};

fn images() -> (GeneratedImage, GeneratedImage) {
    let a = GenBuilder::default().seed(10).build().unwrap();
    let b = GenBuilder::default()
        .sections(&[0x800, 0x40])
        .seed(11)
        .build()
        .unwrap();
    (a, b)
}

/// A chip with both banks holding good images.
fn both_good(style: &ChipStyle) -> RefCell<SimFlash> {
    let (a, b) = images();
    let secondary = boot::FlashGeometry::from_class(style.class).secondary_bank() as usize;
    chip(style, Some(&a), Some((secondary, &b)))
}

fn selector_erases(flash: &RefCell<SimFlash>, style: &ChipStyle) -> usize {
    flash.borrow().sector_erases(selector_offset(style) / SECTOR)
}

#[test]
fn fresh_flash() {
    let style = &styles::ESP_1M;
    let flash = both_good(style);
    let mut hw = TestHardware::new();

    let report = select_boot_image(&flash, &mut hw).unwrap();
    assert_eq!(report.load_address, 0x1000);
    assert_eq!(report.bank, Bank::Primary);
    assert!(!report.config_valid);
    assert!(report.updated);
    assert!(report.booted_default());
    assert_eq!(report.attempts.len(), 1);

    // The erased selector pointed at the upper slot, so the record moved to
    // the lower one.
    assert_eq!(stored_config(&flash, style), (false, DEFAULT_CONFIG));
    assert_eq!(hw.chip_size, Some(0x100000));
    assert_eq!(hw.consoles, 1);
}

#[test]
fn default_bank_good_no_write() {
    let style = &styles::ESP_1M;
    for (upper, bits, bank) in [
        (true, 0xe7fc, Bank::Primary),
        (false, 0xe7fc, Bank::Primary),
        (true, 0xe7fd, Bank::Secondary),
    ] {
        let flash = both_good(style);
        store_config(&flash, style, upper, bits);

        let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
        assert_eq!(report.bank, bank);
        let expect = boot::FlashGeometry::from_class(style.class).bank_address(bank);
        assert_eq!(report.load_address, expect);
        assert!(report.config_valid);
        assert!(!report.updated);

        let stats = flash.borrow().stats();
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.erases, 0);
    }
}

#[test]
fn fallback_to_other_bank() {
    let style = &styles::ESP_1M;
    let (a, _) = images();
    let flash = both_good(style);
    store_config(&flash, style, true, 0xe7fc);
    flash.borrow_mut().corrupt(0x1000 + a.sections[0].data.start);
    let before_upper = flash.borrow().contents()
        [upper_record_offset(style)..upper_record_offset(style) + SECTOR]
        .to_vec();

    let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
    assert_eq!(report.load_address, 0x81000);
    assert_eq!(report.bank, Bank::Secondary);
    assert!(!report.booted_default());
    assert!(report.updated);
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[0].bank, Bank::Primary);
    assert_eq!(report.attempts[0].result, Err(Error::InvalidImage));
    assert_eq!(report.attempts[1].result, Ok(0x81000));

    // Default bank is unchanged, only the booted-default flag clears.
    assert_eq!(stored_config(&flash, style), (false, 0xe7f8));
    assert_eq!(selector_erases(&flash, style), 1);
    assert_eq!(flash.borrow().sector_erases(lower_record_offset(style) / SECTOR), 1);
    assert_eq!(flash.borrow().sector_erases(upper_record_offset(style) / SECTOR), 0);

    // The old record is left as it was.
    let after_upper = flash.borrow().contents()
        [upper_record_offset(style)..upper_record_offset(style) + SECTOR]
        .to_vec();
    assert_eq!(before_upper, after_upper);
}

#[test]
fn secondary_default_falls_back_to_primary() {
    let style = &styles::ESP_4M_C1;
    let (_, b) = images();
    let flash = both_good(style);
    store_config(&flash, style, false, 0xe7fd);
    flash.borrow_mut().corrupt(0x101000 + b.checksum_offset);

    let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
    assert_eq!(report.load_address, 0x1000);
    assert_eq!(report.bank, Bank::Primary);
    assert_eq!(report.config.default_bank(), Bank::Secondary);
    assert_eq!(stored_config(&flash, style), (true, 0xe7f9));
}

#[test]
fn both_bad() {
    let style = &styles::ESP_1M;
    let flash = chip(style, None, None);
    store_config(&flash, style, true, 0xe7fc);

    let err = select_boot_image(&flash, &mut TestHardware::new()).unwrap_err();
    assert_eq!(err, Error::NoImage);
    let stats = flash.borrow().stats();
    assert_eq!(stats.writes, 0);
    assert_eq!(stats.erases, 0);

    // Even with nothing valid stored.
    let flash = chip(style, None, None);
    assert_eq!(
        select_boot_image(&flash, &mut TestHardware::new()).unwrap_err(),
        Error::NoImage
    );
    assert_eq!(flash.borrow().stats().erases, 0);
}

#[test]
fn corrupt_record_uses_default() {
    let style = &styles::ESP_1M;
    // Several of these have the default-bank bit set, which must be ignored.
    for bits in [0xffff, 0x0000, 0xe7fe, 0x67fd, 0xa7fd, 0xe6fd, 0xeffd] {
        let flash = both_good(style);
        store_config(&flash, style, true, bits);

        let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
        assert!(!report.config_valid, "{:#x} accepted", bits);
        assert_eq!(report.config.default_bank(), Bank::Primary);
        assert_eq!(report.load_address, 0x1000);
        assert_eq!(stored_config(&flash, style), (false, DEFAULT_CONFIG));
    }
}

#[test]
fn corrupt_record_resets_raw_bytes() {
    let style = &styles::ESP_1M;
    let flash = both_good(style);
    let upper = upper_record_offset(style);
    flash
        .borrow_mut()
        .install(&[0x00, 0x00, 1, 2, 3, 4, 5, 6, 0x55, 0xaa], upper)
        .unwrap();

    select_boot_image(&flash, &mut TestHardware::new()).unwrap();

    let lower = lower_record_offset(style);
    let data = flash.borrow();
    let data = data.contents();
    // The record portion is reset, the rest of the sector carried over.
    assert_eq!(
        &data[lower..lower + 10],
        &[0xfc, 0xe7, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x55, 0xaa]
    );
}

#[test]
fn idempotent() {
    let style = &styles::ESP_2M;
    let (a, _) = images();

    for corrupt in [false, true] {
        let flash = both_good(style);
        if corrupt {
            flash.borrow_mut().corrupt(0x1000 + a.sections[2].data.end - 1);
        }

        let first = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
        assert!(first.updated);
        flash.borrow_mut().reset_stats();

        let second = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
        assert_eq!(first.load_address, second.load_address);
        assert_eq!(first.config, second.config);
        assert!(second.config_valid);
        assert!(!second.updated);
        let stats = flash.borrow().stats();
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.erases, 0);
    }
}

#[test]
fn recovers_when_default_repaired() {
    let style = &styles::ESP_1M;
    let (a, _) = images();
    let flash = both_good(style);
    store_config(&flash, style, true, 0xe7fc);

    flash.borrow_mut().corrupt(0x1000 + a.sections[0].data.start);
    let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
    assert_eq!(report.bank, Bank::Secondary);
    assert_eq!(stored_config(&flash, style), (false, 0xe7f8));

    flash.borrow_mut().install(&a.data, 0x1000).unwrap();
    let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
    assert_eq!(report.bank, Bank::Primary);
    assert!(report.updated);
    assert_eq!(stored_config(&flash, style), (true, 0xe7fc));
    assert_eq!(selector_erases(&flash, style), 2);
}

#[test]
fn power_loss_during_update() {
    let style = &styles::ESP_1M;
    let (a, _) = images();

    // Allow the record erase, the record write, then the selector erase.
    for budget in 0..=3 {
        let flash = both_good(style);
        store_config(&flash, style, true, 0xe7fc);
        flash.borrow_mut().corrupt(0x1000 + a.sections[1].data.start);
        flash.borrow_mut().power_loss_after(budget);

        let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
        // The image still boots, the update just didn't land.
        assert_eq!(report.load_address, 0x81000);
        assert!(!report.updated);

        // The selector still names the old, intact record.  If power went
        // after the selector erase, the sector reads as erased, which also
        // selects the upper record.
        if budget == 3 {
            assert_eq!(flash.borrow().contents()[selector_offset(style)], 0xff);
        }
        assert_eq!(stored_config(&flash, style), (true, 0xe7fc));

        // Power comes back and the next boot reaches the same decision.
        flash.borrow_mut().clear_faults();
        let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
        assert_eq!(report.load_address, 0x81000);
        assert!(report.config_valid);
        assert!(report.updated);
        assert_eq!(stored_config(&flash, style), (false, 0xe7f8));
    }
}

#[test]
fn unreadable_config_uses_default() {
    let style = &styles::ESP_1M;
    let flash = both_good(style);
    store_config(&flash, style, true, 0xe7fd);
    let upper = upper_record_offset(style);
    flash.borrow_mut().fail_reads(upper..upper + 1);

    let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
    assert!(!report.config_valid);
    assert_eq!(report.load_address, 0x1000);
    // Written to the lower slot, which can still be read.
    flash.borrow_mut().clear_faults();
    assert_eq!(stored_config(&flash, style), (false, DEFAULT_CONFIG));
}

#[test]
fn unreadable_selector() {
    let style = &styles::ESP_1M;
    let flash = both_good(style);
    // Valid record in the upper slot, which an erased selector also names.
    store_config(&flash, style, true, 0xe7fd);
    let sel = selector_offset(style);
    flash.borrow_mut().fail_reads(sel..sel + 4);

    let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
    assert!(report.config_valid);
    assert_eq!(report.bank, Bank::Secondary);
    assert!(!report.updated);
}

#[test]
fn unreadable_boot_header() {
    let style = &styles::ESP_1M;
    let (a, _) = images();
    let flash = chip(style, Some(&a), None);
    flash.borrow_mut().fail_reads(0..8);

    let mut hw = TestHardware::new();
    let report = select_boot_image(&flash, &mut hw).unwrap();
    assert_eq!(report.geometry.label(), "unknown");
    assert_eq!(hw.chip_size, Some(0x80000));
    assert_eq!(report.load_address, 0x1000);

    // The configuration went to the end of the assumed 512KB part.
    let data = flash.borrow();
    let data = data.contents();
    assert_eq!(&data[0x7d000..0x7d002], &DEFAULT_CONFIG.to_le_bytes());
    assert_eq!(data[0x7f000], 0);
}

#[test]
fn unknown_size_class() {
    let style = &styles::ESP_UNKNOWN;
    let flash = both_good(style);
    let mut hw = TestHardware::new();
    let report = select_boot_image(&flash, &mut hw).unwrap();
    assert_eq!(report.geometry.label(), "unknown");
    assert_eq!(report.geometry.secondary_bank(), 0x41000);
    assert_eq!(hw.chip_size, Some(0x80000));
}

#[test]
fn console_after_soft_restart() {
    let style = &styles::ESP_1M;
    let flash = both_good(style);

    let mut hw = TestHardware::with_reason(ResetReason::SoftRestart);
    select_boot_image(&flash, &mut hw).unwrap();
    assert_eq!(hw.consoles, 0);

    let mut hw = TestHardware::with_reason(ResetReason::Watchdog);
    select_boot_image(&flash, &mut hw).unwrap();
    assert_eq!(hw.consoles, 1);
}

#[test]
fn extended_image_in_bank() {
    let style = &styles::ESP_2M_C1;
    let img = GenBuilder::default()
        .format(Format::Extended(0x8000))
        .seed(5)
        .build()
        .unwrap();
    let flash = chip(style, None, Some((0x101000, &img)));
    store_config(&flash, style, true, 0xe7fd);

    let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
    assert_eq!(report.load_address, 0x101000 + 0x8000 + 16);
    assert!(!report.updated);
}

#[test]
fn all_chips() {
    let (a, b) = images();
    for (style, flash) in styles::all_chips() {
        let mut flash = flash.unwrap();
        let geometry = boot::FlashGeometry::from_class(style.class);
        assert_eq!(geometry.size() as usize, style.size);
        flash.install(&a.data, 0x1000).unwrap();
        flash
            .install(&b.data, geometry.secondary_bank() as usize)
            .unwrap();
        flash.corrupt(0x1000 + a.checksum_offset);
        let flash = RefCell::new(flash);

        let mut hw = TestHardware::new();
        let report = select_boot_image(&flash, &mut hw).unwrap();
        assert_eq!(report.geometry.label(), geometry.label());
        assert_eq!(report.load_address, geometry.secondary_bank());
        assert_eq!(hw.chip_size, Some(style.size as u32));
        // Erased config is replaced by the default, then booted from backup.
        assert_eq!(stored_config(&flash, style), (false, 0xe7f8));
    }
}

/// A device that erases in larger units than the configuration sectors.
struct WideErase(SimFlash);

impl ReadFlash for WideErase {
    fn read_size(&self) -> usize {
        self.0.read_size()
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> storage::Result<()> {
        ReadFlash::read(&mut self.0, offset, bytes)
    }

    fn capacity(&self) -> usize {
        ReadFlash::capacity(&self.0)
    }
}

impl Flash for WideErase {
    fn write_size(&self) -> usize {
        self.0.write_size()
    }

    fn erase_size(&self) -> usize {
        2 * SECTOR
    }

    fn erase(&mut self, from: usize, to: usize) -> storage::Result<()> {
        storage::check_erase(self, from, to)?;
        Flash::erase(&mut self.0, from, to)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> storage::Result<()> {
        Flash::write(&mut self.0, offset, bytes)
    }
}

#[test]
fn wide_erase_leaves_config_alone() {
    let style = &styles::ESP_1M;
    let (a, _) = images();
    let flash = both_good(style);
    store_config(&flash, style, true, 0xe7fc);
    flash.borrow_mut().corrupt(0x1000 + a.sections[0].data.start);
    let before = flash.borrow().contents().to_vec();

    let flash = RefCell::new(WideErase(flash.into_inner()));
    let report = select_boot_image(&flash, &mut TestHardware::new()).unwrap();
    assert_eq!(report.bank, Bank::Secondary);
    assert!(!report.updated);

    let flash = flash.into_inner().0;
    assert_eq!(flash.stats().erases, 0);
    assert_eq!(flash.contents(), &before[..]);
}
