// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host command dispatch onto the flash write engine.
//!
//! Data blocks are acknowledged before they are written: the stub sends the
//! ack, then calls [`Dispatcher::write_block`], so the host is already
//! transmitting block N+1 while block N is erased, inflated and programmed.
//! An ack therefore reports the error latched before its own block.
//!
//! A session is written through one path only. `FlashDeflBegin` takes
//! deflated blocks; `FlashBegin` takes plain or encrypted blocks, whichever
//! arrives first. Blocks of another kind are refused and not applied.

use crate::driver::FlashDriver;
use crate::error::ErrorCode;
use crate::flasher::Flasher;
use crate::protocol::{block_crc, AckStatus, Command, DataKind, Response};

/// Outcome of handling one command.
#[derive(Debug, PartialEq, Eq)]
pub struct Reply {
    /// Send this to the host first.
    pub response: Response,
    /// Then write the command's payload this way, if set.
    pub deferred: Option<DataKind>,
}

impl Reply {
    fn now(response: Response) -> Self {
        Self {
            response,
            deferred: None,
        }
    }

    fn ack(status: impl Into<AckStatus>) -> Self {
        Self::now(Response::Ack(status.into()))
    }
}

/// Block kinds the open session accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionPath {
    /// No session was opened since the last failed begin or reset.
    Closed,
    /// `FlashBegin`; the first block picks plain or encrypted.
    Raw(Option<DataKind>),
    /// `FlashDeflBegin`.
    Deflated,
}

impl SessionPath {
    /// Whether a block of `kind` may be written, fixing the raw path on first use.
    fn admit(&mut self, kind: DataKind) -> bool {
        match (*self, kind) {
            (SessionPath::Deflated, DataKind::Deflated) => true,
            (SessionPath::Raw(None), DataKind::Plain | DataKind::Encrypted) => {
                *self = SessionPath::Raw(Some(kind));
                true
            }
            (SessionPath::Raw(Some(fixed)), _) => fixed == kind,
            _ => false,
        }
    }
}

pub struct Dispatcher<D: FlashDriver> {
    flasher: Flasher<D>,
    next_seq: u32,
    path: SessionPath,
}

impl<D: FlashDriver> Dispatcher<D> {
    pub fn new(flasher: Flasher<D>) -> Self {
        Self {
            flasher,
            next_seq: 0,
            path: SessionPath::Closed,
        }
    }

    /// Handle a command up to the point where the host can be answered.
    pub fn handle(&mut self, cmd: &Command) -> Reply {
        match cmd {
            Command::GetStatus => Reply::now(Response::Status {
                in_flash_mode: self.flasher.is_in_flash_mode(),
                last_error: self.flasher.last_error(),
                bytes_remaining: self.flasher.session().bytes_remaining(),
            }),
            Command::FlashBegin { total_size, offset } => {
                let result = self.flasher.begin(*total_size, *offset);
                self.opened(result, SessionPath::Raw(None));
                Reply::ack(result)
            }
            Command::FlashDeflBegin {
                uncompressed_size,
                compressed_size,
                offset,
            } => {
                let result =
                    self.flasher
                        .deflated_begin(*uncompressed_size, *compressed_size, *offset);
                self.opened(result, SessionPath::Deflated);
                Reply::ack(result)
            }
            Command::FlashData {
                kind,
                seq,
                crc32,
                data,
            } => self.accept_block(*kind, *seq, *crc32, data),
            Command::FlashEnd => Reply::ack(self.flasher.end()),
            Command::Reboot => Reply::ack(AckStatus::Ok),
        }
    }

    fn opened(&mut self, result: Result<(), ErrorCode>, path: SessionPath) {
        self.next_seq = 0;
        self.path = match result {
            Ok(()) => path,
            Err(_) => SessionPath::Closed,
        };
    }

    /// Validate a data block and acknowledge it.
    fn accept_block(&mut self, kind: DataKind, seq: u32, crc32: u32, data: &[u8]) -> Reply {
        if !self.flasher.is_in_flash_mode() {
            return Reply::ack(AckStatus::Failed(ErrorCode::NotInFlashMode));
        }

        if seq != self.next_seq {
            #[cfg(feature = "defmt")]
            defmt::warn!("block out of sequence: got {}, expected {}", seq, self.next_seq);
            return Reply::ack(AckStatus::BadSequence);
        }

        if block_crc(data) != crc32 {
            #[cfg(feature = "defmt")]
            defmt::warn!("block {} checksum mismatch", seq);
            return Reply::ack(AckStatus::BadChecksum);
        }

        if !self.path.admit(kind) {
            #[cfg(feature = "defmt")]
            defmt::warn!("block {} of kind {} refused by this session", seq, kind);
            return Reply::ack(AckStatus::WrongKind);
        }

        self.next_seq += 1;
        let status = match self.flasher.last_error() {
            Some(err) => AckStatus::Failed(err),
            None => AckStatus::Ok,
        };
        Reply {
            response: Response::Ack(status),
            deferred: Some(kind),
        }
    }

    /// Write an acknowledged data block.
    pub fn write_block(&mut self, kind: DataKind, data: &[u8]) {
        match kind {
            DataKind::Plain => self.flasher.write(data),
            DataKind::Deflated => self.flasher.deflated_write(data),
            DataKind::Encrypted => self.flasher.write_encrypted(data),
        }
    }

    /// Handle a command and write its payload straight away.
    pub fn process(&mut self, cmd: &Command) -> Response {
        let reply = self.handle(cmd);
        if let (Some(kind), Some((_, data))) = (reply.deferred, cmd.payload()) {
            self.write_block(kind, data);
        }
        reply.response
    }

    /// Idle-time work between host commands. Returns true if an erase was issued.
    pub fn poll_idle(&mut self) -> bool {
        self.flasher.is_in_flash_mode() && self.flasher.advance_erase()
    }

    /// Blocks accepted since the last begin.
    pub fn blocks_accepted(&self) -> u32 {
        self.next_seq
    }

    pub fn flasher(&self) -> &Flasher<D> {
        &self.flasher
    }

    pub fn flasher_mut(&mut self) -> &mut Flasher<D> {
        &mut self.flasher
    }
}
