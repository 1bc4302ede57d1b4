// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Direct SPI command access to the external QSPI flash.
//!
//! The boot ROM routines erase synchronously, which would stall the stub for
//! the whole erase. Instead the flash is taken out of XIP mode once and
//! driven through the SSI data register with chip select forced via the
//! IO_QSPI override, so erase commands can be issued and left running.
//!
//! Nothing may execute from or read through XIP once [`QspiFlash::take`] has
//! been called; the stub runs from SRAM and is reset when done.

use flashstub_common::driver::{unlocked_status, EraseUnit, FlashDriver, STATUS_WIP_BIT};
use flashstub_common::layout::FLASH_PAGE_SIZE;
use flashstub_common::HwError;

/// Flash fitted to the board (W25Q16JV).
pub const FLASH_CAPACITY: u32 = 2 * 1024 * 1024;

// SSI registers (XIP_SSI block)
const XIP_SSI_BASE: usize = 0x1800_0000;
const SSI_SR: *const u32 = (XIP_SSI_BASE + 0x28) as *const u32;
const SSI_DR0: *mut u32 = (XIP_SSI_BASE + 0x60) as *mut u32;
const SSI_SR_TFNF: u32 = 1 << 1;
const SSI_SR_RFNE: u32 = 1 << 3;

// IO_QSPI chip select control
const QSPI_SS_CTRL: *mut u32 = 0x4001_800c as *mut u32;
const SS_OUTOVER_LSB: u32 = 8;
const SS_OUTOVER_MASK: u32 = 0b11 << SS_OUTOVER_LSB;
const SS_OUTOVER_LOW: u32 = 2;
const SS_OUTOVER_HIGH: u32 = 3;

/// RX FIFO is 16 deep; leave headroom so it never overflows.
const MAX_IN_FLIGHT: usize = 14;

// SPI NOR opcodes
const CMD_READ_STATUS: u8 = 0x05;
const CMD_READ_STATUS2: u8 = 0x35;
const CMD_WRITE_STATUS: u8 = 0x01;
const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_PAGE_PROGRAM: u8 = 0x02;

/// BP0-2, TB, SEC, SRP0 (SR1) and SRP1, CMP (SR2).
const PROTECTION_BITS: u32 = 0b0111_1100 | (1 << 7) | (1 << 8) | (1 << 14);

pub struct QspiFlash {
    capacity: u32,
}

impl QspiFlash {
    /// Switch the flash from XIP to direct command mode.
    ///
    /// # Safety
    /// The caller must be executing from SRAM, and nothing may access XIP
    /// flash afterwards.
    pub unsafe fn take(capacity: u32) -> Self {
        cortex_m::interrupt::free(|_| {
            rp2040_hal::rom_data::connect_internal_flash();
            rp2040_hal::rom_data::flash_exit_xip();
        });
        Self { capacity }
    }

    /// Clock out `tx` with chip select asserted, capturing the first
    /// `rx.len()` bytes clocked in. Zeros are sent once `tx` runs out.
    fn transfer(&mut self, tx: &[&[u8]], rx: &mut [u8]) {
        let tx_total: usize = tx.iter().map(|part| part.len()).sum();
        let total = tx_total.max(rx.len());
        let mut tx_bytes = tx.iter().flat_map(|part| part.iter().copied());

        cs_force(SS_OUTOVER_LOW);
        let mut tx_left = total;
        let mut rx_left = total;
        let mut rx_pos = 0;
        while tx_left > 0 || rx_left > 0 {
            let sr = unsafe { SSI_SR.read_volatile() };
            if sr & SSI_SR_TFNF != 0 && tx_left > 0 && rx_left - tx_left < MAX_IN_FLIGHT {
                let byte = tx_bytes.next().unwrap_or(0);
                unsafe { SSI_DR0.write_volatile(byte as u32) };
                tx_left -= 1;
            }
            if sr & SSI_SR_RFNE != 0 && rx_left > 0 {
                let byte = unsafe { SSI_DR0.read_volatile() } as u8;
                if let Some(slot) = rx.get_mut(rx_pos) {
                    *slot = byte;
                }
                rx_pos += 1;
                rx_left -= 1;
            }
        }
        cs_force(SS_OUTOVER_HIGH);
    }

    fn command(&mut self, op: u8) {
        self.transfer(&[&[op]], &mut []);
    }

    fn command_addr(&mut self, op: u8, addr: u32, data: &[u8]) {
        let header = [op, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8];
        self.transfer(&[&header, data], &mut []);
    }

    fn read_register(&mut self, op: u8) -> u8 {
        let mut rx = [0u8; 2];
        self.transfer(&[&[op]], &mut rx);
        rx[1]
    }

    /// Status registers 1 and 2 as one 16-bit value.
    fn read_status(&mut self) -> u32 {
        let low = self.read_register(CMD_READ_STATUS) as u32;
        let high = self.read_register(CMD_READ_STATUS2) as u32;
        low | (high << 8)
    }

    fn in_range(&self, addr: u32, len: usize) -> bool {
        (addr as u64) + (len as u64) <= self.capacity as u64
    }
}

impl FlashDriver for QspiFlash {
    fn is_ready(&mut self) -> bool {
        (self.read_register(CMD_READ_STATUS) as u32) & STATUS_WIP_BIT == 0
    }

    fn write_enable(&mut self) {
        self.wait_ready();
        self.command(CMD_WRITE_ENABLE);
    }

    fn erase_unit(&mut self, addr: u32, unit: EraseUnit) {
        if !self.in_range(addr, unit.bytes() as usize) {
            defmt::warn!("erase outside flash at 0x{:08x}", addr);
            return;
        }
        self.command_addr(unit.opcode(), addr, &[]);
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), HwError> {
        if !self.in_range(addr, data.len()) {
            return Err(HwError::OutOfRange);
        }

        let mut addr = addr;
        let mut data = data;
        while !data.is_empty() {
            let room = (FLASH_PAGE_SIZE - addr % FLASH_PAGE_SIZE) as usize;
            let (page, rest) = data.split_at(room.min(data.len()));
            self.write_enable();
            self.command_addr(CMD_PAGE_PROGRAM, addr, page);
            self.wait_ready();
            addr += page.len() as u32;
            data = rest;
        }
        Ok(())
    }

    fn unlock_protection(&mut self) -> Result<(), HwError> {
        let status = self.read_status();
        let unlocked = unlocked_status(status);
        if unlocked != status {
            self.write_enable();
            self.transfer(
                &[&[CMD_WRITE_STATUS, unlocked as u8, (unlocked >> 8) as u8]],
                &mut [],
            );
            self.wait_ready();
        }

        let after = self.read_status();
        if after & PROTECTION_BITS != 0 {
            defmt::warn!("flash still protected: status 0x{:04x}", after);
            return Err(HwError::Locked);
        }
        Ok(())
    }
}

fn cs_force(level: u32) {
    unsafe {
        let ctrl = QSPI_SS_CTRL.read_volatile();
        QSPI_SS_CTRL.write_volatile((ctrl & !SS_OUTOVER_MASK) | (level << SS_OUTOVER_LSB));
    }
}
