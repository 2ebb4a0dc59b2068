//! # Device Relay Bridge
//!
//! Lets an emulated machine address SmartPort devices served by external
//! processes over TCP.
//!
//! ```text
//! emulation thread ──Requestor::send_request──▶ Connection::send_data ──▶ peer
//!        ▲                                                                 │
//!        └── wait_for_response ◀── response table ◀── reader thread ◀──────┘
//! ```
//!
//! A [`Listener`] accepts peers, probes each one with INIT requests to learn
//! how many units it serves and gives those units a contiguous range of
//! global device IDs. The emulation thread resolves a device ID to a
//! [`Connection`] and the start of its range, turns the ID into the peer's
//! own unit number with [`local_unit`], and blocks in [`Requestor::send_request`] until the reply
//! arrives or the response timeout expires.

mod config;
mod connection;
mod counter;
mod devices;
mod error;
mod listener;
pub mod peer;
mod requestor;

pub use config::{RelayConfig, DEFAULT_ADDRESS, DEFAULT_PORT, DEFAULT_RESPONSE_TIMEOUT_SECS};
pub use connection::{Connection, ConnectionState};
pub use counter::{DeviceIdCounter, SequenceCounter, MAX_DEVICE_ID};
pub use devices::{local_unit, DeviceMap, DeviceRange};
pub use error::RelayError;
pub use listener::Listener;
pub use requestor::Requestor;

/// Device ID that addresses the relay itself
pub const RELAY_DEVICE_ID: u8 = 0;
