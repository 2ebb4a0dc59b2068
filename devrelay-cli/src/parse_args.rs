use devrelay_bridge::RelayConfig;

const HELP: &str = "\
devrelay - SmartPort device relay

Accepts TCP connections from device-serving peers, discovers their devices
and gives them global device IDs. A console on stdin lets you inspect and
poke the relayed devices.

USAGE:
  devrelay [OPTIONS]

OPTIONS:
  -h, --help            Prints help information
  --address <ip>        IPv4 address to listen on (default: 0.0.0.0)
  -p, --port <port>     TCP port to listen on (default: 1985)
  -t, --timeout <secs>  Response timeout in seconds (default: 5)
  -v, --verbose         Show connection and discovery events
  -vv, --trace          Show every request and response
  -vvv, --trace-wire    Show raw frames as hex (very verbose)
  --log <file>          Write log output to file instead of stderr
";

/// Verbosity level for debug output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Warnings and errors only
    #[default]
    Quiet = 0,
    /// Connection events
    Verbose = 1,
    /// Requests, responses and discovery
    Trace = 2,
    /// Raw frames
    TraceWire = 3,
}

#[derive(Debug)]
pub struct AppArgs {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub timeout_secs: Option<u64>,
    pub verbosity: Verbosity,
    pub log_file: Option<String>,
}

impl AppArgs {
    /// Relay settings with the command line applied over the defaults
    pub fn relay_config(&self) -> RelayConfig {
        let mut config = RelayConfig::default();
        if let Some(address) = &self.address {
            config.set_address_str(address);
        }
        if let Some(port) = self.port {
            config.set_port(port);
        }
        if let Some(secs) = self.timeout_secs {
            config.set_response_timeout_secs(secs);
        }
        config
    }
}

pub fn parse_args() -> Result<AppArgs, pico_args::Error> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        std::process::exit(0);
    }

    // Count -v flags for verbosity level
    let verbosity = if pargs.contains("--trace-wire") || pargs.contains("-vvv") {
        Verbosity::TraceWire
    } else if pargs.contains("--trace") || pargs.contains("-vv") {
        Verbosity::Trace
    } else if pargs.contains(["-v", "--verbose"]) {
        Verbosity::Verbose
    } else {
        Verbosity::Quiet
    };

    let args = AppArgs {
        address: pargs.opt_value_from_str("--address")?,
        port: pargs.opt_value_from_str(["-p", "--port"])?,
        timeout_secs: pargs.opt_value_from_str(["-t", "--timeout"])?,
        verbosity,
        log_file: pargs.opt_value_from_str("--log")?,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        eprintln!("Warning: unused arguments left: {:?}.", remaining);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use devrelay_bridge::{DEFAULT_PORT, DEFAULT_RESPONSE_TIMEOUT_SECS};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn args() -> AppArgs {
        AppArgs {
            address: None,
            port: None,
            timeout_secs: None,
            verbosity: Verbosity::Quiet,
            log_file: None,
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config = args().relay_config();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(
            config.response_timeout,
            Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = AppArgs {
            address: Some("localhost".to_string()),
            port: Some(0),
            timeout_secs: Some(0),
            ..args()
        }
        .relay_config();
        assert_eq!(config.address, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(
            config.response_timeout,
            Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_values_applied() {
        let config = AppArgs {
            address: Some("127.0.0.1".to_string()),
            port: Some(6502),
            timeout_secs: Some(2),
            ..args()
        }
        .relay_config();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:6502");
        assert_eq!(config.response_timeout, Duration::from_secs(2));
    }
}
