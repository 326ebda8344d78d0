#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Boot-sequence detection logic for the glitch controller.
//
// Everything here stays portable across the MCU firmware and the host
// emulator: hardware access goes through the traits in `hardware`, time is a
// generic monotonic instant, and no allocation is required.
pub mod config;
pub mod controller;
pub mod hardware;
pub mod observer;
pub mod protocol;
pub mod telemetry;
pub mod trace;
