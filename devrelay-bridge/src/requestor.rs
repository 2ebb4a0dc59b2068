use std::sync::Arc;
use std::time::Duration;

use devrelay_protocol::{Request, Response};
use log::debug;

use crate::{Connection, RelayError, SequenceCounter};

/// Issues requests and blocks until the matching response arrives.
///
/// Clones share one sequence counter, so numbers stay unique across every
/// connection in the process.
#[derive(Debug, Clone)]
pub struct Requestor {
    sequence: Arc<SequenceCounter>,
    response_timeout: Duration,
}

impl Requestor {
    pub fn new(response_timeout: Duration) -> Self {
        Self::with_counter(Arc::new(SequenceCounter::new()), response_timeout)
    }

    pub fn with_counter(sequence: Arc<SequenceCounter>, response_timeout: Duration) -> Self {
        Requestor {
            sequence,
            response_timeout,
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn next_request_number(&self) -> u8 {
        self.sequence.next()
    }

    /// Send `request` over `connection` and decode the reply.
    ///
    /// A nonzero peer status is not an error here; it comes back inside the
    /// [`Response`].
    pub fn send_request(
        &self,
        request: &Request,
        connection: &Connection,
    ) -> Result<Response, RelayError> {
        connection.discard_response(request.sequence);
        connection.send_data(&request.serialize())?;

        let raw = connection.wait_for_response(request.sequence, self.response_timeout)?;
        let response = request.deserialize(&raw)?;
        debug!(
            "{} device {} seq {} -> status {:#04x}",
            request.command(),
            request.device_id,
            request.sequence,
            response.status()
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counter() {
        let requestor = Requestor::new(Duration::from_secs(1));
        let other = requestor.clone();
        assert_eq!(requestor.next_request_number(), 0);
        assert_eq!(other.next_request_number(), 1);
        assert_eq!(requestor.next_request_number(), 2);
    }

    #[test]
    fn test_counter_wraps() {
        let counter = Arc::new(SequenceCounter::new());
        let requestor = Requestor::with_counter(Arc::clone(&counter), Duration::from_secs(1));
        for _ in 0..256 {
            requestor.next_request_number();
        }
        assert_eq!(counter.peek(), 0);
        assert_eq!(requestor.next_request_number(), 0);
    }
}
