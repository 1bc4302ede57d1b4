// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Fixed flash geometry and buffer sizes.
//!
//! These follow the NOR chip family the stub targets and are never negotiated
//! with the host.

// --- Flash geometry ---

pub const FLASH_SECTOR_SIZE: u32 = 4096;
pub const SECTORS_PER_BLOCK: u32 = 16;
pub const FLASH_BLOCK_SIZE: u32 = FLASH_SECTOR_SIZE * SECTORS_PER_BLOCK; // 64KB
pub const FLASH_PAGE_SIZE: u32 = 256;

// --- Buffers ---

/// Decompressed output is staged here before it is written to flash.
/// Doubles as the inflate dictionary, so it must cover the 32KB deflate window.
pub const INFLATE_BUFFER_SIZE: usize = 32 * 1024;

/// Largest payload of a single data command.
pub const MAX_DATA_BLOCK_SIZE: usize = 1024;

// Compile-time geometry checks
const _: () = assert!(FLASH_BLOCK_SIZE == 64 * 1024);
const _: () = assert!(FLASH_SECTOR_SIZE % FLASH_PAGE_SIZE == 0);
const _: () = assert!(INFLATE_BUFFER_SIZE.is_power_of_two());
const _: () = assert!(INFLATE_BUFFER_SIZE >= 32 * 1024);

/// Sector index containing `addr`.
pub const fn sector_of(addr: u32) -> u32 {
    addr / FLASH_SECTOR_SIZE
}

/// Number of sectors touched by `size` bytes starting at `offset`.
pub fn sectors_spanned(offset: u32, size: u32) -> u32 {
    let span = (offset % FLASH_SECTOR_SIZE) as u64 + size as u64;
    span.div_ceil(FLASH_SECTOR_SIZE as u64) as u32
}
