// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Erase-ahead scheduling.
//!
//! Flash for a session is erased lazily, a sector or block at a time, just
//! ahead of the write cursor. Erase commands are fire-and-forget: the next
//! primitive that needs the device polls WIP, so erase latency overlaps
//! whatever the caller does in between (host transfer, decompression).

use crate::driver::{EraseUnit, FlashDriver};
use crate::layout::{sector_of, sectors_spanned, FLASH_SECTOR_SIZE, SECTORS_PER_BLOCK};

/// Erase progress over the session span, in sector units.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EraseAhead {
    next_sector: u32,
    sectors_remaining: u32,
}

impl EraseAhead {
    /// Nothing to erase.
    pub const fn new_empty() -> Self {
        Self {
            next_sector: 0,
            sectors_remaining: 0,
        }
    }

    /// Plan erasure of every sector touched by `total_size` bytes at `offset`.
    pub fn new(offset: u32, total_size: u32) -> Self {
        Self {
            next_sector: sector_of(offset),
            sectors_remaining: sectors_spanned(offset, total_size),
        }
    }

    /// Index of the next sector awaiting erase.
    pub fn next_sector(&self) -> u32 {
        self.next_sector
    }

    /// Sectors still to erase to cover the session span.
    pub fn sectors_remaining(&self) -> u32 {
        self.sectors_remaining
    }

    /// First byte address that has not been erased yet.
    pub fn frontier(&self) -> u32 {
        self.next_sector.saturating_mul(FLASH_SECTOR_SIZE)
    }

    pub fn is_done(&self) -> bool {
        self.sectors_remaining == 0
    }

    /// Unit the next erase would use, if any.
    ///
    /// A block erase is only chosen when a whole block remains and the cursor
    /// sits on a block boundary.
    pub fn next_unit(&self) -> Option<EraseUnit> {
        if self.is_done() {
            None
        } else if self.sectors_remaining >= SECTORS_PER_BLOCK
            && self.next_sector % SECTORS_PER_BLOCK == 0
        {
            Some(EraseUnit::Block)
        } else {
            Some(EraseUnit::Sector)
        }
    }

    /// Issue the next erase if there is one and the device is idle.
    ///
    /// Returns whether an erase was issued. Never waits for the device.
    pub fn advance<D: FlashDriver>(&mut self, flash: &mut D) -> bool {
        let Some(unit) = self.next_unit() else {
            return false; // nothing left to erase
        };
        if !flash.is_ready() {
            return false; // caller polls again later
        }

        flash.write_enable();
        flash.erase_unit(self.frontier(), unit);

        self.next_sector += unit.sectors();
        self.sectors_remaining -= unit.sectors();
        true
    }

    /// Erase until `last_sector` is covered or the span is exhausted.
    pub fn erase_through<D: FlashDriver>(&mut self, flash: &mut D, last_sector: u32) {
        while !self.is_done() && self.next_sector <= last_sector {
            self.advance(flash);
        }
    }
}
