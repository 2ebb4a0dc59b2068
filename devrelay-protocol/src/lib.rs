//! # Device Relay Protocol
//!
//! SmartPort commands carried over a TCP byte stream between the emulator and
//! an external device-serving process.
//!
//! ## Wire Format
//!
//! Every packet is SLIP framed (see [`slip`]). Inside a frame:
//! ```text
//! request:  [seq:u8][command:u8][device:u8][fields...]
//! response: [seq:u8][status:u8][fields...]
//! ```
//! Multi-byte fields are little-endian.
//!
//! ## Commands
//!
//! | Code | Name | Request fields | Response fields |
//! |------|------|----------------|-----------------|
//! | 0x00 | STATUS | status code:u8 | status data |
//! | 0x01 | READBLOCK | block:u24 | 512 byte block |
//! | 0x02 | WRITEBLOCK | block:u24, 512 byte block | - |
//! | 0x03 | FORMAT | - | - |
//! | 0x04 | CONTROL | control code:u8, control list | - |
//! | 0x05 | INIT | - | - |
//! | 0x06 | OPEN | - | - |
//! | 0x07 | CLOSE | - | - |
//! | 0x08 | READ | count:u16, address:u24 | data |
//! | 0x09 | WRITE | count:u16, address:u24, data | - |
//! | 0x0A | RESET | - | - |

mod bytes;
mod command;
mod error;
mod request;
mod response;
pub mod slip;

pub use bytes::{fmt_hex, read_u16_le, read_u24_le, write_u16_le, write_u24_le};
pub use command::Command;
pub use error::DecodeError;
pub use request::{Request, RequestKind};
pub use response::{Ack, ReadBlockResponse, ReadResponse, Response, StatusResponse};

/// Size of a SmartPort block in bytes
pub const BLOCK_SIZE: usize = 512;

/// A single SmartPort block
pub type Block = [u8; BLOCK_SIZE];

/// Status byte reporting success
pub const STATUS_OK: u8 = 0;

/// Largest response a peer can send: sequence, status and a READ of the
/// full 16-bit byte count
pub const MAX_RESPONSE_LEN: usize = 2 + u16::MAX as usize;
