// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Simulated NOR flash for host-side testing of the write engine.
//!
//! [`SimFlash`] keeps an in-memory array with NOR semantics (erase sets 0xFF,
//! program can only clear bits), models WIP busy time as a number of status
//! polls, and records every primitive call plus any misuse of the device.

use crate::driver::{unlocked_status, EraseUnit, FlashDriver};
use crate::error::HwError;

/// Content of flash that was never erased during the test.
pub const STALE_BYTE: u8 = 0x5A;

/// Encrypted programs store `data ^ ENCRYPTION_KEY`.
pub const ENCRYPTION_KEY: u8 = 0xA5;

/// A driver primitive call, in issue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Unlock,
    WriteEnable,
    Erase { addr: u32, unit: EraseUnit },
    Program { addr: u32, len: usize },
    ProgramEncrypted { addr: u32, len: usize },
    EncryptLatch(bool),
}

/// Misuse of the device by the code under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    /// Programmed a byte that was not erased since it was last programmed.
    ProgramUnerased { addr: u32 },
    /// Erased a unit containing bytes programmed during this run.
    EraseWritten { addr: u32 },
    /// Erase address not aligned to the erase unit.
    MisalignedErase { addr: u32 },
    /// Erase or program issued while the device was still busy.
    CommandWhileBusy,
    /// Erase issued without a preceding write enable.
    MissingWriteEnable,
    /// Erase outside the device.
    OutOfRange { addr: u32 },
    /// Encrypted program issued with the encrypt latch off, or plain
    /// program issued with it on.
    EncryptLatch { addr: u32, latched: bool },
}

pub struct SimFlash {
    mem: Vec<u8>,
    erased: Vec<bool>,
    programmed: Vec<bool>,
    busy: u32,
    write_enabled: bool,
    encrypt_latch: bool,
    erase_latency: u32,
    program_latency: u32,
    supports_encryption: bool,
    fail_next_program: bool,
    fail_all_programs: bool,
    fail_unlock: bool,
    status: u32,
    polls: u64,
    ops: Vec<Op>,
    violations: Vec<Violation>,
}

impl SimFlash {
    /// A device of `capacity` bytes holding stale data, idle, not encrypted.
    pub fn new(capacity: usize) -> Self {
        Self {
            mem: vec![STALE_BYTE; capacity],
            erased: vec![false; capacity],
            programmed: vec![false; capacity],
            busy: 0,
            write_enabled: false,
            encrypt_latch: false,
            erase_latency: 0,
            program_latency: 0,
            supports_encryption: false,
            fail_next_program: false,
            fail_all_programs: false,
            fail_unlock: false,
            status: 0,
            polls: 0,
            ops: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Each erase keeps the device busy for `polls` ready checks.
    pub fn with_erase_latency(mut self, polls: u32) -> Self {
        self.erase_latency = polls;
        self
    }

    /// Each program keeps the device busy for `polls` ready checks.
    pub fn with_program_latency(mut self, polls: u32) -> Self {
        self.program_latency = polls;
        self
    }

    pub fn with_encryption(mut self) -> Self {
        self.supports_encryption = true;
        self
    }

    /// Initial status register contents.
    pub fn with_status(mut self, status: u32) -> Self {
        self.status = status;
        self
    }

    pub fn fail_next_program(&mut self) {
        self.fail_next_program = true;
    }

    pub fn fail_all_programs(&mut self, fail: bool) {
        self.fail_all_programs = fail;
    }

    pub fn fail_unlock(&mut self, fail: bool) {
        self.fail_unlock = fail;
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Erase commands issued so far.
    pub fn erases(&self) -> Vec<(u32, EraseUnit)> {
        self.ops
            .iter()
            .filter_map(|op| match *op {
                Op::Erase { addr, unit } => Some((addr, unit)),
                _ => None,
            })
            .collect()
    }

    /// Total bytes passed to program primitives (plain and encrypted).
    pub fn programmed_bytes(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match *op {
                Op::Program { len, .. } | Op::ProgramEncrypted { len, .. } => len,
                _ => 0,
            })
            .sum()
    }

    pub fn read(&self, addr: u32, len: usize) -> &[u8] {
        &self.mem[addr as usize..addr as usize + len]
    }

    pub fn is_busy(&self) -> bool {
        self.busy > 0
    }

    pub fn status(&self) -> u32 {
        self.status
    }

    /// Number of ready polls seen.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    fn check_idle(&mut self) {
        if self.busy > 0 {
            self.violations.push(Violation::CommandWhileBusy);
        }
    }

    fn check_latch(&mut self, addr: u32, encrypted: bool) {
        if self.encrypt_latch != encrypted {
            self.violations.push(Violation::EncryptLatch {
                addr,
                latched: self.encrypt_latch,
            });
        }
    }

    fn range(&self, addr: u32, len: usize) -> Option<core::ops::Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(len)?;
        (end <= self.mem.len()).then_some(start..end)
    }

    fn store(&mut self, addr: u32, data: &[u8], key: u8) {
        let start = addr as usize;
        for (i, &byte) in data.iter().enumerate() {
            let at = start + i;
            if !self.erased[at] {
                self.violations.push(Violation::ProgramUnerased { addr: at as u32 });
            }
            self.mem[at] &= byte ^ key;
            self.erased[at] = false;
            self.programmed[at] = true;
        }
        self.busy = self.program_latency;
    }

    fn take_program_fault(&mut self) -> bool {
        let fail = self.fail_all_programs || self.fail_next_program;
        self.fail_next_program = false;
        fail
    }
}

impl FlashDriver for SimFlash {
    fn is_ready(&mut self) -> bool {
        self.polls += 1;
        if self.busy > 0 {
            self.busy -= 1;
            false
        } else {
            true
        }
    }

    fn write_enable(&mut self) {
        self.wait_ready();
        self.ops.push(Op::WriteEnable);
        self.write_enabled = true;
    }

    fn erase_unit(&mut self, addr: u32, unit: EraseUnit) {
        self.ops.push(Op::Erase { addr, unit });
        self.check_idle();
        if !self.write_enabled {
            self.violations.push(Violation::MissingWriteEnable);
        }
        self.write_enabled = false;

        if addr % unit.bytes() != 0 {
            self.violations.push(Violation::MisalignedErase { addr });
        }
        let Some(range) = self.range(addr, unit.bytes() as usize) else {
            self.violations.push(Violation::OutOfRange { addr });
            return;
        };

        if let Some(i) = range.clone().find(|&i| self.programmed[i]) {
            self.violations.push(Violation::EraseWritten { addr: i as u32 });
        }
        for i in range {
            self.mem[i] = 0xFF;
            self.erased[i] = true;
            self.programmed[i] = false;
        }
        self.busy = self.erase_latency;
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), HwError> {
        self.ops.push(Op::Program {
            addr,
            len: data.len(),
        });
        self.check_idle();
        self.check_latch(addr, false);
        if self.range(addr, data.len()).is_none() {
            return Err(HwError::OutOfRange);
        }
        if self.take_program_fault() {
            return Err(HwError::Failed);
        }
        self.store(addr, data, 0);
        Ok(())
    }

    fn program_encrypted(&mut self, addr: u32, data: &[u8]) -> Result<(), HwError> {
        self.ops.push(Op::ProgramEncrypted {
            addr,
            len: data.len(),
        });
        if !self.supports_encryption {
            return Err(HwError::Unsupported);
        }
        self.check_idle();
        self.check_latch(addr, true);
        if self.range(addr, data.len()).is_none() {
            return Err(HwError::OutOfRange);
        }
        if self.take_program_fault() {
            return Err(HwError::Failed);
        }
        self.store(addr, data, ENCRYPTION_KEY);
        Ok(())
    }

    fn set_encrypted_writes(&mut self, enabled: bool) {
        self.ops.push(Op::EncryptLatch(enabled));
        self.encrypt_latch = enabled;
    }

    fn unlock_protection(&mut self) -> Result<(), HwError> {
        self.ops.push(Op::Unlock);
        if self.fail_unlock {
            return Err(HwError::Locked);
        }
        self.status = unlocked_status(self.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::STATUS_QIE_BIT;

    #[test]
    fn test_erase_then_program() {
        let mut sim = SimFlash::new(8192);
        sim.write_enable();
        sim.erase_unit(4096, EraseUnit::Sector);
        assert_eq!(sim.read(4096, 4), &[0xFF; 4]);

        sim.program(4096, &[1, 2, 3, 4]).unwrap();
        assert_eq!(sim.read(4096, 4), &[1, 2, 3, 4]);
        assert!(sim.violations().is_empty());
    }

    #[test]
    fn test_program_unerased_is_a_violation() {
        let mut sim = SimFlash::new(4096);
        sim.program(0, &[0xFF]).unwrap();
        assert_eq!(sim.violations(), &[Violation::ProgramUnerased { addr: 0 }]);
        assert_eq!(sim.read(0, 1), &[STALE_BYTE]);
    }

    #[test]
    fn test_erase_latency_counts_polls() {
        let mut sim = SimFlash::new(4096).with_erase_latency(3);
        sim.write_enable();
        sim.erase_unit(0, EraseUnit::Sector);
        assert!(!sim.is_ready());
        assert!(!sim.is_ready());
        assert!(!sim.is_ready());
        assert!(sim.is_ready());
    }

    #[test]
    fn test_erase_without_write_enable() {
        let mut sim = SimFlash::new(4096);
        sim.erase_unit(0, EraseUnit::Sector);
        assert_eq!(sim.violations(), &[Violation::MissingWriteEnable]);
    }

    #[test]
    fn test_unlock_preserves_quad_enable() {
        let mut sim = SimFlash::new(0).with_status(0x1C | STATUS_QIE_BIT);
        sim.unlock_protection().unwrap();
        assert_eq!(sim.status(), STATUS_QIE_BIT);
    }

    #[test]
    fn test_encrypted_program_unsupported_by_default() {
        let mut sim = SimFlash::new(4096);
        assert_eq!(sim.program_encrypted(0, &[0]), Err(HwError::Unsupported));
    }

    #[test]
    fn test_encrypted_program_needs_latch() {
        let mut sim = SimFlash::new(8192).with_encryption();
        sim.write_enable();
        sim.erase_unit(0, EraseUnit::Sector);
        sim.program_encrypted(0, &[1]).unwrap();
        assert_eq!(
            sim.violations(),
            &[Violation::EncryptLatch {
                addr: 0,
                latched: false
            }]
        );

        sim.set_encrypted_writes(true);
        sim.program_encrypted(1, &[2]).unwrap();
        sim.program(2, &[3]).unwrap();
        assert_eq!(
            &sim.violations()[1..],
            &[Violation::EncryptLatch {
                addr: 2,
                latched: true
            }]
        );

        sim.set_encrypted_writes(false);
        sim.program(3, &[4]).unwrap();
        assert_eq!(sim.violations().len(), 2);
        assert_eq!(sim.read(0, 4), &[1 ^ ENCRYPTION_KEY, 2 ^ ENCRYPTION_KEY, 3, 4]);
    }
}
