// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash write session: begin -> data* -> end.
//!
//! Data calls have no error path. A failure during the data phase is latched
//! and reported by [`WriteSession::end`]; the byte accounting keeps advancing
//! regardless, so a session always terminates deterministically once the host
//! has sent the declared number of bytes.

use crate::driver::FlashDriver;
use crate::erase::EraseAhead;
use crate::error::ErrorCode;
use crate::layout::sector_of;

/// Program primitive used for a data call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WritePath {
    Plain,
    Encrypted,
}

/// State of the single flash write session.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteSession {
    active: bool,
    write_cursor: u32,
    bytes_remaining: u32,
    erase: EraseAhead,
    sticky_error: Option<ErrorCode>,
}

impl Default for WriteSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteSession {
    /// An idle session, as at power-on.
    pub const fn new() -> Self {
        Self {
            active: false,
            write_cursor: 0,
            bytes_remaining: 0,
            erase: EraseAhead::new_empty(),
            sticky_error: None,
        }
    }

    /// Start a session writing `total_size` bytes at `offset`.
    ///
    /// Clears the flash protection bits first. If that fails the session
    /// stays idle and no data will be accepted.
    pub fn begin<D: FlashDriver>(
        &mut self,
        flash: &mut D,
        total_size: u32,
        offset: u32,
    ) -> Result<(), ErrorCode> {
        *self = Self {
            active: true,
            write_cursor: offset,
            bytes_remaining: total_size,
            erase: EraseAhead::new(offset, total_size),
            sticky_error: None,
        };

        if flash.unlock_protection().is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("flash unlock failed at begin (offset=0x{:08x})", offset);
            *self = Self::new();
            return Err(ErrorCode::FailedSpiUnlock);
        }

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "flash begin: {} bytes at 0x{:08x}, {} sectors to erase",
            total_size,
            offset,
            self.erase.sectors_remaining()
        );
        Ok(())
    }

    /// Write the next bytes of the image with the plain program primitive.
    pub fn write<D: FlashDriver>(&mut self, flash: &mut D, data: &[u8]) {
        self.write_via(flash, data, WritePath::Plain);
    }

    /// Write the next bytes of the image through the flash encryption unit.
    pub fn write_encrypted<D: FlashDriver>(&mut self, flash: &mut D, data: &[u8]) {
        self.write_via(flash, data, WritePath::Encrypted);
    }

    fn write_via<D: FlashDriver>(&mut self, flash: &mut D, data: &[u8], path: WritePath) {
        // The final block may carry padding beyond the declared size
        let len = data.len().min(self.bytes_remaining as usize);
        if len == 0 {
            return;
        }
        let data = &data[..len];
        let len = len as u32;

        // Erase at least as far as the sector this write ends in
        let last_sector = sector_of(self.write_cursor.saturating_add(len));
        self.erase.erase_through(flash, last_sector);
        flash.wait_ready();

        let result = match path {
            WritePath::Plain => flash.program(self.write_cursor, data),
            WritePath::Encrypted => {
                flash.set_encrypted_writes(true);
                let result = flash.program_encrypted(self.write_cursor, data);
                flash.set_encrypted_writes(false);
                result
            }
        };

        if let Err(_e) = result {
            #[cfg(feature = "defmt")]
            defmt::warn!("program failed at 0x{:08x}: {}", self.write_cursor, _e);
            self.latch(ErrorCode::FailedSpiOp);
        }

        self.write_cursor = self.write_cursor.saturating_add(len);
        self.bytes_remaining -= len;
    }

    /// Finish the session and report its outcome.
    ///
    /// A session short of data stays active so the host can still complete it.
    pub fn end(&mut self) -> Result<(), ErrorCode> {
        if !self.active {
            return Err(ErrorCode::NotInFlashMode);
        }
        if self.bytes_remaining > 0 {
            return Err(ErrorCode::NotEnoughData);
        }

        self.active = false;

        #[cfg(feature = "defmt")]
        defmt::debug!("flash end: {}", self.sticky_error);
        match self.sticky_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Issue the next erase-ahead unit if the device is idle.
    pub fn advance_erase<D: FlashDriver>(&mut self, flash: &mut D) -> bool {
        self.erase.advance(flash)
    }

    /// Record a data-phase error. The first one wins until the next begin.
    pub(crate) fn latch(&mut self, err: ErrorCode) {
        if self.sticky_error.is_none() {
            #[cfg(feature = "defmt")]
            defmt::warn!("latched {}", err);
            self.sticky_error = Some(err);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Address of the next write.
    pub fn write_cursor(&self) -> u32 {
        self.write_cursor
    }

    /// Plain bytes still expected before the session can end.
    pub fn bytes_remaining(&self) -> u32 {
        self.bytes_remaining
    }

    pub fn erase(&self) -> &EraseAhead {
        &self.erase
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        self.sticky_error
    }
}
