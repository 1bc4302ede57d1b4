// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host <-> stub protocol types.
//!
//! Messages are postcard-serialized and COBS-framed (0x00 delimiter) on the
//! serial link. Types work in both `no_std` (stub) and `std` (host) builds.

#[cfg(feature = "std")]
extern crate alloc;

use crc::{Crc, CRC_32_ISO_HDLC};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

pub use crate::layout::MAX_DATA_BLOCK_SIZE;

/// Checksum carried by every data block.
pub const BLOCK_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// How the payload of a data block is written.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Raw image bytes, programmed as-is.
    Plain,
    /// Part of a zlib stream opened with `FlashDeflBegin`.
    Deflated,
    /// Raw image bytes, programmed through the flash encryption unit.
    Encrypted,
}

#[derive(Serialize, Deserialize, Debug)]
#[allow(clippy::large_enum_variant)] // no_std, no allocator for Box
pub enum Command {
    GetStatus,
    FlashBegin {
        total_size: u32,
        offset: u32,
    },
    FlashDeflBegin {
        uncompressed_size: u32,
        compressed_size: u32,
        offset: u32,
    },
    #[cfg(not(feature = "std"))]
    FlashData {
        kind: DataKind,
        seq: u32,
        crc32: u32,
        data: heapless::Vec<u8, MAX_DATA_BLOCK_SIZE>,
    },
    #[cfg(feature = "std")]
    FlashData {
        kind: DataKind,
        seq: u32,
        crc32: u32,
        data: alloc::vec::Vec<u8>,
    },
    FlashEnd,
    Reboot,
}

impl Command {
    /// Kind and payload of a data block.
    pub fn payload(&self) -> Option<(DataKind, &[u8])> {
        match self {
            Command::FlashData { kind, data, .. } => Some((*kind, &data[..])),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Response {
    Ack(AckStatus),
    Status {
        in_flash_mode: bool,
        last_error: Option<ErrorCode>,
        bytes_remaining: u32,
    },
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    /// Session error, either returned directly or latched earlier.
    Failed(ErrorCode),
    /// Block checksum did not match; the block was dropped.
    BadChecksum,
    /// Block out of sequence; the block was dropped.
    BadSequence,
    /// Block kind does not match how the session was opened; the block was dropped.
    WrongKind,
}

impl From<Result<(), ErrorCode>> for AckStatus {
    fn from(result: Result<(), ErrorCode>) -> Self {
        match result {
            Ok(()) => AckStatus::Ok,
            Err(e) => AckStatus::Failed(e),
        }
    }
}

/// CRC-32 of a block payload.
pub fn block_crc(data: &[u8]) -> u32 {
    BLOCK_CRC.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_crc_check_value() {
        // CRC-32/ISO-HDLC check value
        assert_eq!(block_crc(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_ack_from_result() {
        assert_eq!(AckStatus::from(Ok(())), AckStatus::Ok);
        assert_eq!(
            AckStatus::from(Err(ErrorCode::NotEnoughData)),
            AckStatus::Failed(ErrorCode::NotEnoughData)
        );
    }

    #[test]
    fn test_payload_only_for_data_blocks() {
        assert!(Command::FlashEnd.payload().is_none());
        assert!(Command::FlashBegin {
            total_size: 1,
            offset: 0
        }
        .payload()
        .is_none());
    }
}
