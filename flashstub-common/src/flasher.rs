// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The flash write engine as one owned context.
//!
//! [`Flasher`] owns the flash driver, the session record and the decompressor
//! state. There is exactly one of each, so there is exactly one session.

use crate::driver::FlashDriver;
use crate::error::ErrorCode;
use crate::inflate::{InflatePhase, Inflater};
use crate::session::WriteSession;

pub struct Flasher<D: FlashDriver> {
    flash: D,
    session: WriteSession,
    inflater: Inflater,
}

impl<D: FlashDriver> Flasher<D> {
    pub fn new(flash: D) -> Self {
        Self {
            flash,
            session: WriteSession::new(),
            inflater: Inflater::new(),
        }
    }

    /// Begin an uncompressed session of `total_size` bytes at `offset`.
    pub fn begin(&mut self, total_size: u32, offset: u32) -> Result<(), ErrorCode> {
        // No stream state survives into an uncompressed session
        self.inflater.reset(0);
        self.session.begin(&mut self.flash, total_size, offset)
    }

    /// Begin a compressed session.
    ///
    /// `uncompressed_size` bytes will be written at `offset` from a zlib
    /// stream of `compressed_size` bytes.
    pub fn deflated_begin(
        &mut self,
        uncompressed_size: u32,
        compressed_size: u32,
        offset: u32,
    ) -> Result<(), ErrorCode> {
        let result = self.session.begin(&mut self.flash, uncompressed_size, offset);
        self.inflater.reset(compressed_size);
        result
    }

    pub fn write(&mut self, data: &[u8]) {
        self.session.write(&mut self.flash, data);
    }

    pub fn write_encrypted(&mut self, data: &[u8]) {
        self.session.write_encrypted(&mut self.flash, data);
    }

    /// Feed the next block of the compressed stream.
    pub fn deflated_write(&mut self, data: &[u8]) {
        self.inflater.feed(&mut self.session, &mut self.flash, data);
    }

    pub fn end(&mut self) -> Result<(), ErrorCode> {
        self.session.end()
    }

    /// Opportunistic erase-ahead, e.g. while waiting for the host.
    pub fn advance_erase(&mut self) -> bool {
        self.session.advance_erase(&mut self.flash)
    }

    pub fn is_in_flash_mode(&self) -> bool {
        self.session.is_active()
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        self.session.last_error()
    }

    pub fn session(&self) -> &WriteSession {
        &self.session
    }

    pub fn inflate_phase(&self) -> InflatePhase {
        self.inflater.phase()
    }

    pub fn flash(&self) -> &D {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut D {
        &mut self.flash
    }

    /// Give the driver back, dropping all session state.
    pub fn release(self) -> D {
        self.flash
    }
}
