// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error types for the flash write engine.
//!
//! [`ErrorCode`] is what the host sees: returned from `begin`/`end` and
//! latched during the data phase. [`HwError`] is what a driver primitive
//! reports; the engine folds it into an [`ErrorCode`].

use serde::{Deserialize, Serialize};

/// Session-level error reported to the host.
///
/// Success is `Ok(())` on the Rust side; on the wire it is status byte 0.
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A program primitive reported a hardware failure.
    FailedSpiOp = 0xC4,
    /// Clearing the flash protection bits failed at `begin`.
    FailedSpiUnlock = 0xC5,
    /// `end` (or a data block) arrived without an active session.
    NotInFlashMode = 0xC6,
    /// The compressed stream is corrupt.
    InflateError = 0xC7,
    /// Fewer bytes were written than the session declared.
    NotEnoughData = 0xC8,
    /// More bytes arrived than the session declared.
    TooMuchData = 0xC9,
}

impl ErrorCode {
    /// Wire status byte for this error.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire status byte. `0` (success) and unknown values yield `None`.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0xC4 => Some(Self::FailedSpiOp),
            0xC5 => Some(Self::FailedSpiUnlock),
            0xC6 => Some(Self::NotInFlashMode),
            0xC7 => Some(Self::InflateError),
            0xC8 => Some(Self::NotEnoughData),
            0xC9 => Some(Self::TooMuchData),
            _ => None,
        }
    }
}

/// Wire status byte for a session result.
pub fn status_code(result: Result<(), ErrorCode>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

/// Failure reported by a flash driver primitive.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    /// The chip rejected or did not complete the operation.
    Failed,
    /// Protection bits were still set after a status register write.
    Locked,
    /// The address range lies outside the device.
    OutOfRange,
    /// The chip has no such primitive (e.g. no flash encryption unit).
    Unsupported,
}
