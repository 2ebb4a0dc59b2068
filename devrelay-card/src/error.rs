use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardError {
    /// Only one relay card may be installed per process
    #[error("a device relay card is already active; only one may be installed")]
    AlreadyActive,

    #[error("invalid slot {0}, expected 1-7")]
    InvalidSlot(u8),
}
