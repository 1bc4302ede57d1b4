// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash driver primitives consumed by the write engine.
//!
//! The engine never touches registers itself. A board provides a
//! [`FlashDriver`]; tests use [`crate::sim::SimFlash`].
//!
//! The device is a single exclusively-owned resource: every method runs its
//! register transaction to completion before returning, but erase only waits
//! for the command to be accepted, not for the erase to finish.

use crate::error::HwError;
use crate::layout::{FLASH_BLOCK_SIZE, FLASH_SECTOR_SIZE, SECTORS_PER_BLOCK};

/// Status register: write in progress.
pub const STATUS_WIP_BIT: u32 = 1 << 0;
/// Status register (second byte): quad I/O enable.
pub const STATUS_QIE_BIT: u32 = 1 << 9;

/// Erase size class.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraseUnit {
    /// 4KB sector erase.
    Sector,
    /// 64KB block erase.
    Block,
}

impl EraseUnit {
    /// Number of sectors covered by one erase of this unit.
    pub const fn sectors(self) -> u32 {
        match self {
            EraseUnit::Sector => 1,
            EraseUnit::Block => SECTORS_PER_BLOCK,
        }
    }

    pub const fn bytes(self) -> u32 {
        match self {
            EraseUnit::Sector => FLASH_SECTOR_SIZE,
            EraseUnit::Block => FLASH_BLOCK_SIZE,
        }
    }

    /// SPI NOR opcode for this erase.
    pub const fn opcode(self) -> u8 {
        match self {
            EraseUnit::Sector => 0x20,
            EraseUnit::Block => 0xD8,
        }
    }
}

/// Blocking and non-blocking flash primitives.
pub trait FlashDriver {
    /// Non-blocking poll of the WIP bit.
    fn is_ready(&mut self) -> bool;

    /// Spin until the device is idle. No bound on the wait.
    fn wait_ready(&mut self) {
        while !self.is_ready() {}
    }

    /// Set the write enable latch. Waits for the device to be idle first.
    fn write_enable(&mut self);

    /// Issue an erase at `addr` and return once the command is accepted.
    fn erase_unit(&mut self, addr: u32, unit: EraseUnit);

    /// Program `data` at `addr`. The target range must already be erased.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), HwError>;

    /// Program `data` through the flash encryption unit.
    fn program_encrypted(&mut self, _addr: u32, _data: &[u8]) -> Result<(), HwError> {
        Err(HwError::Unsupported)
    }

    /// Toggle the encrypted-write latch. Only some chips have one.
    fn set_encrypted_writes(&mut self, _enabled: bool) {}

    /// Clear the status register protection bits.
    fn unlock_protection(&mut self) -> Result<(), HwError>;
}

/// Status register value with every protection bit cleared.
///
/// Only the quad enable bit survives; dropping it would disable quad I/O on
/// chips booted in QIO mode.
pub const fn unlocked_status(status: u32) -> u32 {
    status & STATUS_QIE_BIT
}
