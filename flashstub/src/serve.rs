// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host command loop.
//!
//! Each data block is acknowledged before it is written so the host can send
//! the next one while this one is erased and programmed. While no command is
//! pending, erase-ahead keeps running.

use embedded_hal::digital::OutputPin;
use flashstub_common::protocol::{AckStatus, Command, Response};
use flashstub_common::Dispatcher;

use crate::peripherals::LedPin;
use crate::qspi::QspiFlash;
use crate::usb_transport::UsbTransport;

/// Serve host commands until a reboot is requested.
pub fn run(
    transport: &mut UsbTransport,
    dispatcher: &mut Dispatcher<QspiFlash>,
    led: &mut LedPin,
) -> ! {
    loop {
        transport.poll();

        match transport.try_receive() {
            Some(cmd) => handle_command(transport, dispatcher, &cmd),
            None => {
                dispatcher.poll_idle();
            }
        }

        if dispatcher.flasher().is_in_flash_mode() {
            led.set_high().ok();
        } else {
            led.set_low().ok();
        }
    }
}

fn handle_command(
    transport: &mut UsbTransport,
    dispatcher: &mut Dispatcher<QspiFlash>,
    cmd: &Command,
) {
    if let Command::Reboot = cmd {
        handle_reboot(transport);
    }

    let reply = dispatcher.handle(cmd);
    transport.send(&reply.response);

    match cmd {
        Command::FlashBegin { total_size, offset } => {
            defmt::println!("FlashBegin: {} bytes at 0x{:08x}", total_size, offset);
        }
        Command::FlashDeflBegin {
            uncompressed_size,
            compressed_size,
            offset,
        } => {
            defmt::println!(
                "FlashDeflBegin: {} bytes ({} compressed) at 0x{:08x}",
                uncompressed_size,
                compressed_size,
                offset
            );
        }
        Command::FlashEnd => {
            if let Response::Ack(status) = &reply.response {
                defmt::println!("FlashEnd: {}", status);
            }
        }
        _ => {}
    }

    if let (Some(kind), Some((_, data))) = (reply.deferred, cmd.payload()) {
        dispatcher.write_block(kind, data);
    }
}

/// Handle Reboot command: send ACK and reset the system.
fn handle_reboot(transport: &mut UsbTransport) -> ! {
    transport.send(&Response::Ack(AckStatus::Ok));
    // Small delay to let the ACK be sent
    cortex_m::asm::delay(12_000_000);
    cortex_m::peripheral::SCB::sys_reset();
}
