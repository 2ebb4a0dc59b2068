//! Relay settings: listen address, port and timeouts.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use log::warn;

/// Default listen address
pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Default TCP port peers connect to
pub const DEFAULT_PORT: u16 = 1985;

/// Default bound on a single request round trip
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 5;

/// Socket read timeout used by reader threads to notice a stop request
const DEFAULT_READ_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a fresh connection may take to start its reader
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    pub response_timeout: Duration,
    pub read_poll_interval: Duration,
    pub connect_timeout: Duration,
    /// Start listening as soon as the relay is created
    pub start_on_init: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            address: DEFAULT_ADDRESS,
            port: DEFAULT_PORT,
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
            read_poll_interval: DEFAULT_READ_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            start_on_init: false,
        }
    }
}

impl RelayConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }

    /// Set the listen address from text, keeping the default when it does
    /// not parse as an IPv4 address. Returns the address in use.
    pub fn set_address_str(&mut self, text: &str) -> Ipv4Addr {
        self.address = match text.trim().parse::<Ipv4Addr>() {
            Ok(addr) => addr,
            Err(_) => {
                warn!("Invalid listen address '{}', using {}", text, DEFAULT_ADDRESS);
                DEFAULT_ADDRESS
            }
        };
        self.address
    }

    /// Port 0 is rejected and leaves the current port in place
    pub fn set_port(&mut self, port: u16) -> bool {
        if port == 0 {
            warn!("Port 0 is not allowed, keeping {}", self.port);
            return false;
        }
        self.port = port;
        true
    }

    /// A zero timeout is rejected and leaves the current one in place
    pub fn set_response_timeout_secs(&mut self, secs: u64) -> bool {
        if secs == 0 {
            warn!(
                "Response timeout must be at least one second, keeping {:?}",
                self.response_timeout
            );
            return false;
        }
        self.response_timeout = Duration::from_secs(secs);
        true
    }
}
