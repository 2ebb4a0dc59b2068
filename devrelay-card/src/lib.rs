//! # Device Relay Card
//!
//! Emulated slot card whose firmware hands SmartPort and ProDOS driver calls
//! to the relay. The host emulator routes writes to the card's I/O space to
//! [`RelayCard::io_write`] and passes its memory and registers in through
//! [`GuestMemory`] and [`Registers`]; the card blocks the calling thread
//! until the relayed device answers or the response timeout passes.
//!
//! Results come back the way the firmware expects them: A holds 0 or an
//! error code, carry is set on error, X/Y hold a byte or block count.

mod card;
mod error;
mod memory;
mod prodos;
mod registers;

pub use card::{RelayCard, PRODOS_TRIGGER, SMARTPORT_TRIGGER};
pub use error::CardError;
pub use memory::GuestMemory;
pub use registers::{Registers, FLAG_CARRY, FLAG_ZERO};

/// Unknown SmartPort command
pub const ERR_BAD_COMMAND: u8 = 0x01;
/// Device did not answer or answered garbage
pub const ERR_IO: u8 = 0x27;
/// No device at that unit
pub const ERR_NO_DEVICE: u8 = 0x28;
