use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use devrelay_protocol::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Writing a request to the peer failed
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// No response with this sequence number arrived in time
    #[error("no response for sequence {sequence} after {waited:?}")]
    Timeout { sequence: u8, waited: Duration },

    #[error("malformed response: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("no device with ID {0}")]
    NoSuchDevice(u8),
}

impl RelayError {
    /// Failures of the round trip itself, as opposed to configuration or
    /// addressing mistakes
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            RelayError::Send(_) | RelayError::Timeout { .. } | RelayError::Decode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_grouping() {
        let timeout = RelayError::Timeout {
            sequence: 3,
            waited: Duration::from_secs(1),
        };
        assert!(timeout.is_transport_failure());
        assert!(RelayError::Decode(DecodeError::UnknownCommand(0x20)).is_transport_failure());
        assert!(RelayError::Send(io::ErrorKind::BrokenPipe.into()).is_transport_failure());
        assert!(!RelayError::NoSuchDevice(9).is_transport_failure());
        assert_eq!(timeout.to_string(), "no response for sequence 3 after 1s");
    }
}
