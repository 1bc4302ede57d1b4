// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash write session engine for the flasher stub.
//!
//! Everything here is pure logic over the [`driver::FlashDriver`] trait, so it
//! runs unchanged on the target and on the host:
//! - Default: `no_std` mode for the stub firmware
//! - `std` feature: enables `alloc` payloads and the [`sim`] flash model for tests
//! - `defmt` feature: enables defmt logging and `defmt::Format` derives

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate alloc;

pub mod dispatch;
pub mod driver;
pub mod erase;
pub mod error;
pub mod flasher;
pub mod inflate;
pub mod layout;
pub mod protocol;
pub mod session;

#[cfg(feature = "std")]
pub mod sim;

// Re-export commonly used types
pub use dispatch::{Dispatcher, Reply};
pub use driver::{EraseUnit, FlashDriver};
pub use error::{ErrorCode, HwError};
pub use flasher::Flasher;
pub use inflate::InflatePhase;
pub use layout::{FLASH_BLOCK_SIZE, FLASH_SECTOR_SIZE, INFLATE_BUFFER_SIZE, SECTORS_PER_BLOCK};
pub use protocol::{AckStatus, Command, DataKind, Response, MAX_DATA_BLOCK_SIZE};
pub use session::WriteSession;
