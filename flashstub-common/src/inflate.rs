// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Streaming decompression in front of the write session.
//!
//! Compressed data blocks are inflated into a fixed 32KB buffer which is
//! flushed to the session when it fills up or the stream ends. The same
//! buffer is the inflate dictionary, so it wraps rather than being copied.
//!
//! Decompression is slow compared to an erase command, so each inflate step
//! first kicks the erase-ahead scheduler: the erase runs in the flash while
//! the CPU decompresses.

use miniz_oxide::inflate::core::{decompress, inflate_flags, DecompressorOxide};
use miniz_oxide::inflate::TINFLStatus;

use crate::driver::FlashDriver;
use crate::error::ErrorCode;
use crate::layout::INFLATE_BUFFER_SIZE;
use crate::session::WriteSession;

/// Progress of the compressed stream in the current session.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InflatePhase {
    /// Nothing consumed yet.
    NeedsInput,
    /// Stream partially consumed.
    Decompressing,
    /// End of the zlib stream reached.
    Done,
    /// The stream was rejected as corrupt.
    Error,
}

fn is_terminal(status: TINFLStatus) -> bool {
    !matches!(
        status,
        TINFLStatus::NeedsMoreInput | TINFLStatus::HasMoreOutput
    )
}

fn is_failure(status: TINFLStatus) -> bool {
    is_terminal(status) && status != TINFLStatus::Done
}

/// Input left to consume, or output the decompressor is still holding.
fn has_work(chunk: &[u8], status: TINFLStatus) -> bool {
    !is_terminal(status) && (!chunk.is_empty() || status == TINFLStatus::HasMoreOutput)
}

/// Decompressor context for one compressed session.
pub struct Inflater {
    decompressor: DecompressorOxide,
    out: [u8; INFLATE_BUFFER_SIZE],
    fill: usize,
    compressed_remaining: u32,
    phase: InflatePhase,
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflater {
    pub fn new() -> Self {
        Self {
            decompressor: DecompressorOxide::new(),
            out: [0u8; INFLATE_BUFFER_SIZE],
            fill: 0,
            compressed_remaining: 0,
            phase: InflatePhase::NeedsInput,
        }
    }

    /// Prepare for a new stream of `compressed_size` bytes.
    pub fn reset(&mut self, compressed_size: u32) {
        self.decompressor.init();
        self.fill = 0;
        self.compressed_remaining = compressed_size;
        self.phase = InflatePhase::NeedsInput;
    }

    pub fn phase(&self) -> InflatePhase {
        self.phase
    }

    /// Compressed bytes the host has yet to send.
    pub fn compressed_remaining(&self) -> u32 {
        self.compressed_remaining
    }

    /// Decompressed bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.fill
    }

    /// One decompression step on `input`, appending to the buffer.
    ///
    /// Returns the status, input bytes consumed and output bytes produced.
    fn step(&mut self, input: &[u8]) -> (TINFLStatus, usize, usize) {
        let mut flags = inflate_flags::TINFL_FLAG_PARSE_ZLIB_HEADER;
        if self.compressed_remaining as usize > input.len() {
            flags |= inflate_flags::TINFL_FLAG_HAS_MORE_INPUT;
        }

        let (status, consumed, produced) =
            decompress(&mut self.decompressor, input, &mut self.out, self.fill, flags);

        self.compressed_remaining = self.compressed_remaining.saturating_sub(consumed as u32);
        self.fill += produced;
        (status, consumed, produced)
    }

    /// Hand the buffered output to the session. Returns true if the session
    /// could not take all of it.
    fn flush<D: FlashDriver>(&mut self, session: &mut WriteSession, flash: &mut D) -> bool {
        let overflow = self.fill > session.bytes_remaining() as usize;
        session.write(flash, &self.out[..self.fill]);
        self.fill = 0;
        overflow
    }

    /// Decompress a block of the compressed stream into flash.
    ///
    /// Errors are latched on the session and reported when it ends.
    pub fn feed<D: FlashDriver>(
        &mut self,
        session: &mut WriteSession,
        flash: &mut D,
        mut chunk: &[u8],
    ) {
        if self.phase == InflatePhase::Done {
            if !chunk.is_empty() {
                session.latch(ErrorCode::TooMuchData);
            }
            return;
        }

        let mut status = TINFLStatus::NeedsMoreInput;
        let mut overflow = false;

        while has_work(chunk, status) && session.bytes_remaining() > 0 {
            session.advance_erase(flash);

            let (s, consumed, _) = self.step(chunk);
            status = s;
            chunk = &chunk[consumed..];
            if consumed > 0 {
                self.phase = InflatePhase::Decompressing;
            }

            if is_terminal(status) || self.fill == self.out.len() {
                overflow |= self.flush(session, flash);
            }
        }

        // Image complete but the stream is not: only the end-of-stream
        // markers and checksum may follow. Any further output is excess.
        while has_work(chunk, status) && session.bytes_remaining() == 0 {
            let (s, consumed, produced) = self.step(chunk);
            status = s;
            chunk = &chunk[consumed..];
            if produced > 0 {
                overflow = true;
                self.fill = 0;
                break;
            }
            if consumed == 0 && status != TINFLStatus::HasMoreOutput {
                break;
            }
        }

        if status == TINFLStatus::Done {
            // Bytes past the end of the stream are excess, however the host split them
            overflow |= !chunk.is_empty();
            self.phase = InflatePhase::Done;
        } else if is_failure(status) {
            self.phase = InflatePhase::Error;
        }

        if is_failure(status) {
            #[cfg(feature = "defmt")]
            defmt::warn!("inflate failed: status {}", status as i8);
            session.latch(ErrorCode::InflateError);
        } else if status == TINFLStatus::Done && session.bytes_remaining() > 0 {
            session.latch(ErrorCode::NotEnoughData);
        } else if overflow
            || (status != TINFLStatus::Done
                && session.bytes_remaining() == 0
                && self.compressed_remaining == 0)
        {
            session.latch(ErrorCode::TooMuchData);
        }
    }
}
