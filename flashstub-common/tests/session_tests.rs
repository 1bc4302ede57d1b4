// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for the plain/encrypted write session and erase-ahead scheduling.

use flashstub_common::sim::{Op, SimFlash, Violation, ENCRYPTION_KEY};
use flashstub_common::{
    EraseUnit, ErrorCode, Flasher, FLASH_BLOCK_SIZE, FLASH_SECTOR_SIZE, SECTORS_PER_BLOCK,
};

const CAPACITY: usize = 4 * 1024 * 1024;

fn flasher() -> Flasher<SimFlash> {
    Flasher::new(SimFlash::new(CAPACITY))
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + (i >> 8)) as u8).collect()
}

fn index_of(ops: &[Op], pred: impl Fn(&Op) -> bool) -> Vec<usize> {
    ops.iter()
        .enumerate()
        .filter(|(_, op)| pred(op))
        .map(|(i, _)| i)
        .collect()
}

// =============================================================================
// begin tests
// =============================================================================

#[test]
fn test_begin_plans_erase_span() {
    let cases = [
        (0u32, 9000u32, 0u32, 3u32),
        (FLASH_SECTOR_SIZE * 5, FLASH_SECTOR_SIZE, 5, 1),
        (FLASH_SECTOR_SIZE * 5 + 1, FLASH_SECTOR_SIZE, 5, 2),
        (FLASH_SECTOR_SIZE - 1, 2, 0, 2),
        (0x10_0000, 0, 0x100, 0),
    ];

    for (offset, size, next_sector, sectors) in cases {
        let mut f = flasher();
        f.begin(size, offset).unwrap();
        let erase = f.session().erase();
        assert_eq!(erase.next_sector(), next_sector, "offset={offset} size={size}");
        assert_eq!(erase.sectors_remaining(), sectors, "offset={offset} size={size}");
        assert_eq!(f.session().write_cursor(), offset);
        assert_eq!(f.session().bytes_remaining(), size);
    }
}

#[test]
fn test_begin_unlocks_protection_once() {
    let mut f = flasher();
    f.begin(100, 0).unwrap();
    assert_eq!(f.flash().ops(), &[Op::Unlock]);
    assert!(f.is_in_flash_mode());
}

#[test]
fn test_begin_unlock_failure_leaves_session_inactive() {
    let mut sim = SimFlash::new(CAPACITY);
    sim.fail_unlock(true);
    let mut f = Flasher::new(sim);

    assert_eq!(f.begin(100, 0), Err(ErrorCode::FailedSpiUnlock));
    assert!(!f.is_in_flash_mode());

    f.write(&[0u8; 100]);
    assert_eq!(f.flash().programmed_bytes(), 0);
    assert_eq!(f.end(), Err(ErrorCode::NotInFlashMode));
}

#[test]
fn test_begin_clears_previous_error() {
    let mut f = flasher();
    f.flash_mut().fail_next_program();
    f.begin(10, 0).unwrap();
    f.write(&[1u8; 10]);
    assert_eq!(f.end(), Err(ErrorCode::FailedSpiOp));

    f.begin(10, FLASH_SECTOR_SIZE).unwrap();
    assert_eq!(f.last_error(), None);
    f.write(&[2u8; 10]);
    assert_eq!(f.end(), Ok(()));
}

// =============================================================================
// write tests
// =============================================================================

#[test]
fn test_plain_write_scenario() {
    let mut f = flasher();
    let data = pattern(9000);

    f.begin(9000, 0).unwrap();
    assert_eq!(f.session().erase().sectors_remaining(), 3);

    f.write(&data);

    let ops = f.flash().ops();
    let erases = index_of(ops, |op| matches!(op, Op::Erase { .. }));
    let programs = index_of(ops, |op| matches!(op, Op::Program { .. }));
    assert!(erases.len() >= 3);
    assert_eq!(programs.len(), 1);
    assert!(erases[2] < programs[0]);

    assert_eq!(f.end(), Ok(()));
    assert_eq!(f.flash().read(0, 9000), &data[..]);
    assert!(f.flash().violations().is_empty());
}

#[test]
fn test_write_zero_length_is_noop() {
    let mut f = flasher();
    f.begin(100, 0).unwrap();
    f.flash_mut().clear_ops();
    let before = *f.session();

    f.write(&[]);

    assert_eq!(*f.session(), before);
    assert!(f.flash().ops().is_empty());
}

#[test]
fn test_write_after_exhausted_is_noop() {
    let mut f = flasher();
    f.begin(16, 0).unwrap();
    f.write(&[0xAB; 16]);
    f.flash_mut().clear_ops();
    let before = *f.session();

    f.write(&[0xCD; 64]);

    assert_eq!(*f.session(), before);
    assert!(f.flash().ops().is_empty());
    assert_eq!(f.flash().read(0, 16), &[0xAB; 16]);
}

#[test]
fn test_write_clamps_to_declared_size() {
    let mut f = flasher();
    f.begin(100, 0).unwrap();
    f.write(&[0x11; 60]);
    f.write(&[0x22; 1024]); // padded final block

    assert_eq!(f.session().bytes_remaining(), 0);
    assert_eq!(f.session().write_cursor(), 100);
    assert_eq!(f.flash().programmed_bytes(), 100);
    assert_eq!(f.flash().read(60, 40), &[0x22; 40]);
    assert_eq!(f.flash().read(100, 1), &[0xFF]); // erased, never programmed
    assert_eq!(f.end(), Ok(()));
}

#[test]
fn test_erase_frontier_stays_ahead_of_cursor() {
    let offset = FLASH_SECTOR_SIZE * 3 + 123;
    let size = 200_000u32;
    let data = pattern(size as usize);
    let mut f = Flasher::new(
        SimFlash::new(CAPACITY)
            .with_erase_latency(7)
            .with_program_latency(2),
    );
    f.begin(size, offset).unwrap();

    for chunk in data.chunks(777) {
        f.write(chunk);
        let s = f.session();
        assert!(s.erase().frontier() >= s.write_cursor());
    }

    assert_eq!(f.end(), Ok(()));
    assert_eq!(f.flash().read(offset, size as usize), &data[..]);
    assert!(f.flash().violations().is_empty());
}

#[test]
fn test_erase_never_runs_past_span() {
    let mut f = flasher();
    f.begin(FLASH_SECTOR_SIZE * 2, 0).unwrap();
    f.write(&pattern(FLASH_SECTOR_SIZE as usize * 2));

    assert_eq!(
        f.flash().erases(),
        vec![(0, EraseUnit::Sector), (FLASH_SECTOR_SIZE, EraseUnit::Sector)]
    );
    assert!(f.session().erase().is_done());
}

// =============================================================================
// deferred error tests
// =============================================================================

#[test]
fn test_deferred_program_failure() {
    let mut f = flasher();
    f.begin(10, 0).unwrap();
    f.flash_mut().fail_next_program();
    f.write(&[7u8; 10]);

    // Data phase kept accounting
    assert_eq!(f.session().bytes_remaining(), 0);
    assert!(f.is_in_flash_mode());

    assert_eq!(f.end(), Err(ErrorCode::FailedSpiOp));
    assert_eq!(f.last_error(), Some(ErrorCode::FailedSpiOp));
}

#[test]
fn test_writes_continue_after_failure() {
    let mut f = flasher();
    f.flash_mut().fail_all_programs(true);
    f.begin(300, 0).unwrap();
    f.write(&[1u8; 100]);
    f.write(&[2u8; 100]);
    f.write(&[3u8; 100]);

    assert_eq!(f.session().write_cursor(), 300);
    assert_eq!(f.flash().programmed_bytes(), 300);
    assert_eq!(f.end(), Err(ErrorCode::FailedSpiOp));
}

#[test]
fn test_end_with_missing_data() {
    let mut f = flasher();
    f.begin(100, 0).unwrap();
    assert_eq!(f.end(), Err(ErrorCode::NotEnoughData));
    assert!(f.is_in_flash_mode());
}

#[test]
fn test_end_twice() {
    let mut f = flasher();
    f.begin(4, 0).unwrap();
    f.write(&[1, 2, 3, 4]);
    assert_eq!(f.end(), Ok(()));
    assert!(!f.is_in_flash_mode());
    assert_eq!(f.end(), Err(ErrorCode::NotInFlashMode));
}

// =============================================================================
// erase-ahead scheduler tests
// =============================================================================

#[test]
fn test_block_erase_when_aligned() {
    let mut f = flasher();
    f.begin(FLASH_BLOCK_SIZE, 0).unwrap();
    assert_eq!(f.session().erase().sectors_remaining(), SECTORS_PER_BLOCK);

    assert!(f.advance_erase());
    assert_eq!(f.flash().erases(), vec![(0, EraseUnit::Block)]);
    assert!(f.session().erase().is_done());
    assert!(!f.advance_erase());
}

#[test]
fn test_mixed_sector_and_block_erases() {
    let offset = FLASH_SECTOR_SIZE * (SECTORS_PER_BLOCK - 1);
    let size = FLASH_SECTOR_SIZE * (SECTORS_PER_BLOCK + 2);
    let mut f = flasher();
    f.begin(size, offset).unwrap();
    while f.advance_erase() {}

    assert_eq!(
        f.flash().erases(),
        vec![
            (offset, EraseUnit::Sector),
            (FLASH_BLOCK_SIZE, EraseUnit::Block),
            (FLASH_BLOCK_SIZE * 2, EraseUnit::Sector),
        ]
    );
    assert!(f.flash().violations().is_empty());
}

#[test]
fn test_advance_erase_does_not_wait_for_busy_device() {
    let mut f = Flasher::new(SimFlash::new(CAPACITY).with_erase_latency(3));
    f.begin(FLASH_SECTOR_SIZE * 4, 0).unwrap();

    assert!(f.advance_erase());
    assert!(f.flash().is_busy());
    assert!(!f.advance_erase());
    assert_eq!(f.flash().erases().len(), 1);

    // Busy polls drain the latency
    assert!(!f.advance_erase());
    assert!(!f.advance_erase());
    assert!(f.advance_erase());
    assert_eq!(f.flash().erases().len(), 2);
}

#[test]
fn test_write_enable_precedes_every_erase() {
    let mut f = Flasher::new(SimFlash::new(CAPACITY).with_erase_latency(4));
    f.begin(50_000, 0).unwrap();
    f.write(&pattern(50_000));

    let ops = f.flash().ops();
    for i in index_of(ops, |op| matches!(op, Op::Erase { .. })) {
        assert_eq!(ops[i - 1], Op::WriteEnable);
    }
    assert!(!f
        .flash()
        .violations()
        .contains(&Violation::MissingWriteEnable));
}

// =============================================================================
// encrypted write tests
// =============================================================================

#[test]
fn test_encrypted_write_toggles_latch() {
    let mut f = Flasher::new(SimFlash::new(CAPACITY).with_encryption());
    f.begin(32, 0).unwrap();
    f.write_encrypted(&[0x0F; 32]);

    let ops: Vec<Op> = f
        .flash()
        .ops()
        .iter()
        .copied()
        .filter(|op| !matches!(op, Op::Erase { .. } | Op::WriteEnable | Op::Unlock))
        .collect();
    assert_eq!(
        ops,
        vec![
            Op::EncryptLatch(true),
            Op::ProgramEncrypted { addr: 0, len: 32 },
            Op::EncryptLatch(false),
        ]
    );
    assert_eq!(f.flash().read(0, 32), &[0x0F ^ ENCRYPTION_KEY; 32]);
    assert_eq!(f.end(), Ok(()));
}

#[test]
fn test_encrypted_zero_length_touches_nothing() {
    let mut f = Flasher::new(SimFlash::new(CAPACITY).with_encryption());
    f.begin(32, 0).unwrap();
    f.flash_mut().clear_ops();
    f.write_encrypted(&[]);
    assert!(f.flash().ops().is_empty());
}

#[test]
fn test_encrypted_write_shares_accounting() {
    let mut f = Flasher::new(SimFlash::new(CAPACITY).with_encryption());
    let data = pattern(10_000);
    f.begin(10_000, FLASH_SECTOR_SIZE).unwrap();
    for chunk in data.chunks(1024) {
        f.write_encrypted(chunk);
    }
    assert_eq!(f.session().write_cursor(), FLASH_SECTOR_SIZE + 10_000);
    assert_eq!(f.end(), Ok(()));
    assert!(f.flash().violations().is_empty());
}

#[test]
fn test_encrypted_write_unsupported_is_deferred() {
    let mut f = flasher();
    f.begin(16, 0).unwrap();
    f.write_encrypted(&[0u8; 16]);
    assert_eq!(f.session().bytes_remaining(), 0);
    assert_eq!(f.end(), Err(ErrorCode::FailedSpiOp));
}
