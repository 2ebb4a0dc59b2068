//! Line commands for inspecting the relay from a terminal.

use std::fmt::Write;

use devrelay_bridge::{local_unit, Listener, RelayError, RELAY_DEVICE_ID};
use devrelay_protocol::{fmt_hex, Request, Response};

pub const CONSOLE_HELP: &str = "\
Commands:
  devices              List connected peers and their device IDs
  status <id> [code]   Send STATUS (default code 0) to a device
  init <id>            Send INIT to a device
  reset                Send RESET to every device
  help                 Show this text
  quit                 Stop the relay and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Devices,
    Status { device_id: u8, status_code: u8 },
    Init { device_id: u8 },
    Reset,
    Help,
    Quit,
}

/// Numbers may be decimal or `0x` hex
fn parse_u8(text: &str) -> Result<u8, String> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| format!("not a number 0-255: '{}'", text))
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines give `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (word.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("devices" | "ls", []) => ConsoleCommand::Devices,
            ("status", [id]) => ConsoleCommand::Status {
                device_id: parse_u8(id)?,
                status_code: 0,
            },
            ("status", [id, code]) => ConsoleCommand::Status {
                device_id: parse_u8(id)?,
                status_code: parse_u8(code)?,
            },
            ("init", [id]) => ConsoleCommand::Init {
                device_id: parse_u8(id)?,
            },
            ("reset", []) => ConsoleCommand::Reset,
            ("help" | "?", []) => ConsoleCommand::Help,
            ("quit" | "exit", []) => ConsoleCommand::Quit,
            _ => return Err(format!("unknown command '{}', try 'help'", line.trim())),
        };
        Ok(Some(command))
    }
}

fn send_to_device(
    listener: &Listener,
    device_id: u8,
    make: impl FnOnce(u8, u8) -> Request,
) -> Result<Response, RelayError> {
    let (range_start, connection) = listener
        .find_connection_with_device(device_id)
        .ok_or(RelayError::NoSuchDevice(device_id))?;
    let unit = local_unit(range_start, device_id)
        .ok_or(RelayError::NoSuchDevice(device_id))?;
    let requestor = listener.requestor();
    let request = make(requestor.next_request_number(), unit);
    requestor.send_request(&request, &connection)
}

fn describe(response: &Response) -> String {
    let mut out = format!("{} status {:#04x}", response.command(), response.status());
    let data: &[u8] = match response {
        Response::Status(r) => &r.data[..],
        Response::Read(r) => &r.data[..],
        _ => &[],
    };
    if !data.is_empty() {
        let _ = write!(out, ", {} bytes: {}", data.len(), fmt_hex(data));
    }
    out
}

/// Run a command and return the text to show
pub fn execute(listener: &Listener, command: &ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Devices => {
            let ranges = listener.ranges();
            let mut out = format!("{} device(s)", listener.get_total_device_count());
            if let Some(addr) = listener.local_addr() {
                let _ = write!(out, ", listening on {}", addr);
            }
            for range in ranges {
                let peer = listener
                    .find_connection_with_device(range.start)
                    .map(|(_, c)| {
                        let addr = c
                            .peer_addr()
                            .map(|a| a.to_string())
                            .unwrap_or_else(|| "?".to_string());
                        format!("{} ({:?})", addr, c.state())
                    })
                    .unwrap_or_default();
                let _ = write!(out, "\n  IDs {:<8} {}", range.to_string(), peer);
            }
            out
        }
        ConsoleCommand::Status {
            device_id: RELAY_DEVICE_ID,
            status_code: 0,
        } => format!("relay: {} device(s)", listener.get_total_device_count()),
        ConsoleCommand::Status {
            device_id,
            status_code,
        } => match send_to_device(listener, *device_id, |seq, unit| {
            Request::status(seq, unit, *status_code)
        }) {
            Ok(response) => describe(&response),
            Err(e) => format!("error: {}", e),
        },
        ConsoleCommand::Init { device_id } => {
            match send_to_device(listener, *device_id, Request::init) {
                Ok(response) => describe(&response),
                Err(e) => format!("error: {}", e),
            }
        }
        ConsoleCommand::Reset => {
            let all = listener.get_all_connections();
            let mut failed = Vec::new();
            for (device_id, _) in &all {
                match send_to_device(listener, *device_id, Request::reset) {
                    Ok(response) if response.is_ok() => {}
                    _ => failed.push(device_id.to_string()),
                }
            }
            if failed.is_empty() {
                format!("reset {} device(s)", all.len())
            } else {
                format!(
                    "reset {} device(s), failed: {}",
                    all.len(),
                    failed.join(", ")
                )
            }
        }
        ConsoleCommand::Help => CONSOLE_HELP.to_string(),
        ConsoleCommand::Quit => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devrelay_bridge::{RelayConfig, Requestor};
    use std::time::Duration;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("  "), Ok(None));
        assert_eq!(
            ConsoleCommand::parse("devices"),
            Ok(Some(ConsoleCommand::Devices))
        );
        assert_eq!(
            ConsoleCommand::parse("status 3"),
            Ok(Some(ConsoleCommand::Status {
                device_id: 3,
                status_code: 0
            }))
        );
        assert_eq!(
            ConsoleCommand::parse("STATUS 0x10 3"),
            Ok(Some(ConsoleCommand::Status {
                device_id: 16,
                status_code: 3
            }))
        );
        assert_eq!(
            ConsoleCommand::parse("init 2"),
            Ok(Some(ConsoleCommand::Init { device_id: 2 }))
        );
        assert_eq!(ConsoleCommand::parse("quit"), Ok(Some(ConsoleCommand::Quit)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConsoleCommand::parse("status").is_err());
        assert!(ConsoleCommand::parse("status 300").is_err());
        assert!(ConsoleCommand::parse("init x").is_err());
        assert!(ConsoleCommand::parse("format 1").is_err());
    }

    #[test]
    fn test_execute_without_peers() {
        let requestor = Requestor::new(Duration::from_millis(100));
        let listener = Listener::new(RelayConfig::default(), requestor);
        let relay_status = ConsoleCommand::Status {
            device_id: 0,
            status_code: 0,
        };
        assert_eq!(execute(&listener, &relay_status), "relay: 0 device(s)");
        assert_eq!(
            execute(&listener, &ConsoleCommand::Init { device_id: 4 }),
            "error: no device with ID 4"
        );
        assert_eq!(
            execute(&listener, &ConsoleCommand::Reset),
            "reset 0 device(s)"
        );
        assert!(execute(&listener, &ConsoleCommand::Devices).starts_with("0 device(s)"));
    }
}
