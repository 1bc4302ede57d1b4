// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! RAM-resident flasher stub for RP2040: writes host images to QSPI flash
//! over USB CDC.

#![no_std]
#![no_main]

mod peripherals;
mod qspi;
mod serve;
mod usb_transport;

use defmt_rtt as _;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;
use flashstub_common::{Dispatcher, Flasher};
use rp2040_hal as hal;
use usb_device::class_prelude::UsbBusAllocator;

use crate::qspi::QspiFlash;
use crate::usb_transport::UsbTransport;

#[entry]
fn main() -> ! {
    defmt::println!("Flasher stub init");

    let mut p = peripherals::init();

    // Safety: the stub image lives in SRAM, nothing executes from XIP.
    let flash = unsafe { QspiFlash::take(qspi::FLASH_CAPACITY) };

    // Kept in .bss for the run. The value is still built on the stack and
    // then moved, so the stack must hold one copy of it during init.
    let dispatcher = cortex_m::singleton!(
        : Dispatcher<QspiFlash> = Dispatcher::new(Flasher::new(flash))
    )
    .unwrap();

    let mut usb = p.usb;
    let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
        usb.regs,
        usb.dpram,
        usb.clock,
        true,
        &mut usb.resets,
    ));
    peripherals::store_usb_bus(usb_bus);
    let mut transport = UsbTransport::new(peripherals::usb_bus_ref());

    defmt::println!("USB CDC initialized, waiting for host");
    serve::run(&mut transport, dispatcher, &mut p.led_pin)
}
