use thiserror::Error;

use crate::Command;

/// Failure to turn received bytes into a typed packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Packet shorter than the layout of its command requires
    #[error("{command} packet too short: have {actual} bytes, need {expected}")]
    TooShort {
        command: Command,
        expected: usize,
        actual: usize,
    },

    /// Command byte outside the known command set
    #[error("unknown command: 0x{0:02x}")]
    UnknownCommand(u8),

    /// Response variant does not match the command that was asked for
    #[error("expected {expected} response, got {actual}")]
    UnexpectedResponse { expected: Command, actual: Command },

    /// Packet too short to even name its command
    #[error("packet too short for a header: {actual} bytes")]
    MissingHeader { actual: usize },
}
