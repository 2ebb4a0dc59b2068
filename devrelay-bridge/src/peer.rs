//! Device-serving side of the protocol.
//!
//! A peer connects to the relay, receives framed requests and answers them.
//! [`PeerSession`] does the framing and parsing and hands each request to a
//! handler closure, which returns the reply or `None` to stay silent.
//!
//! ```no_run
//! use devrelay_bridge::peer::PeerSession;
//! use devrelay_protocol::{RequestKind, Response};
//!
//! let peer = PeerSession::connect("127.0.0.1:1985".parse().unwrap()).unwrap();
//! peer.serve(|request| {
//!     let status = match request.kind {
//!         RequestKind::Init if request.device_id == 1 => 0,
//!         _ => 0x28,
//!     };
//!     Some(Response::empty(request.command(), request.sequence, status))
//! })
//! .unwrap();
//! ```

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use devrelay_protocol::{fmt_hex, slip, Request, Response};
use log::{debug, trace, warn};

/// Read timeout used to notice a shutdown request
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct PeerSession {
    stream: TcpStream,
    shutdown: Arc<AtomicBool>,
}

impl PeerSession {
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        Ok(PeerSession {
            stream,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that ends [`serve`](Self::serve) when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Answer requests until the relay disconnects or the shutdown flag is set
    pub fn serve<F>(mut self, mut handler: F) -> io::Result<()>
    where
        F: FnMut(Request) -> Option<Response>,
    {
        let mut buffer = vec![0u8; 4096];
        let mut pending = Vec::new();

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.stream.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buffer[..n]);
                    let (packets, rest) = slip::decode_stream(&pending);
                    pending = rest;

                    for packet in packets {
                        let request = match Request::parse(&packet) {
                            Ok(request) => request,
                            Err(e) => {
                                warn!(
                                    "Peer: ignoring request {}: {}",
                                    fmt_hex(&packet),
                                    e
                                );
                                continue;
                            }
                        };
                        trace!("Peer: <- {:?}", request);
                        if let Some(response) = handler(request) {
                            self.stream.write_all(&slip::encode(&response.serialize()))?;
                        }
                    }
                }
                Err(ref e)
                    if e.kind() == ErrorKind::WouldBlock
                        || e.kind() == ErrorKind::TimedOut
                        || e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::ConnectionReset => break,
                Err(e) => return Err(e),
            }
        }

        debug!("Peer: session ended");
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotConnected => {}
            Err(e) => debug!("Peer: shutdown failed: {}", e),
        }
        Ok(())
    }

    /// Connect and serve on a background thread
    pub fn spawn<F>(addr: SocketAddr, handler: F) -> io::Result<PeerHandle>
    where
        F: FnMut(Request) -> Option<Response> + Send + 'static,
    {
        let session = PeerSession::connect(addr)?;
        let shutdown = session.shutdown_flag();
        let thread = thread::Builder::new()
            .name("relay-peer".to_string())
            .spawn(move || {
                if let Err(e) = session.serve(handler) {
                    warn!("Peer: {}", e);
                }
            })?;
        Ok(PeerHandle {
            shutdown,
            thread: Some(thread),
        })
    }
}

/// Background peer started by [`PeerSession::spawn`]; stopped on drop
pub struct PeerHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PeerHandle {
    /// End the session and wait for its thread. Returns false if the
    /// handler panicked.
    pub fn stop(&mut self) -> bool {
        self.shutdown.store(true, Ordering::Relaxed);
        match self.thread.take().map(JoinHandle::join) {
            Some(Err(_)) => {
                warn!("Peer: session thread panicked");
                false
            }
            _ => true,
        }
    }
}

impl Drop for PeerHandle {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devrelay_protocol::Command;
    use std::net::TcpListener;

    #[test]
    fn test_serves_framed_requests() {
        let relay = TcpListener::bind("127.0.0.1:0").unwrap();
        let _peer = PeerSession::spawn(relay.local_addr().unwrap(), |request| {
            Some(Response::empty(request.command(), request.sequence, 0x2B))
        })
        .unwrap();
        let (mut stream, _) = relay.accept().unwrap();

        // Garbage frame first: skipped without killing the session
        let mut wire = slip::encode(&[1, 0xEE, 1]);
        wire.extend(slip::encode(&Request::init(9, 1).serialize()));
        stream.write_all(&wire).unwrap();

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(reply, [slip::END, 9, 0x2B, slip::END]);
    }

    #[test]
    fn test_silent_handler_sends_nothing() {
        let relay = TcpListener::bind("127.0.0.1:0").unwrap();
        let _peer = PeerSession::spawn(relay.local_addr().unwrap(), |request| {
            match request.command() {
                Command::Reset => Some(Response::empty(
                    Command::Reset,
                    request.sequence,
                    0,
                )),
                _ => None,
            }
        })
        .unwrap();
        let (mut stream, _) = relay.accept().unwrap();

        let mut wire = slip::encode(&Request::init(1, 1).serialize());
        wire.extend(slip::encode(&Request::reset(2, 1).serialize()));
        stream.write_all(&wire).unwrap();

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(reply, [slip::END, 2, 0, slip::END]);
    }

    #[test]
    fn test_stop_reports_panicking_handler() {
        let relay = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut peer = PeerSession::spawn(relay.local_addr().unwrap(), |request| {
            if request.command() == Command::Reset {
                panic!("handler failure");
            }
            None
        })
        .unwrap();
        let (mut stream, _) = relay.accept().unwrap();
        stream
            .write_all(&slip::encode(&Request::reset(1, 1).serialize()))
            .unwrap();

        // Session thread dies and drops its socket
        let mut rest = Vec::new();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let _ = stream.read_to_end(&mut rest);
        assert!(rest.is_empty());

        assert!(!peer.stop());
        assert!(peer.stop());
    }

    #[test]
    fn test_stop_after_relay_closes() {
        let relay = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut peer = PeerSession::spawn(relay.local_addr().unwrap(), |_| None).unwrap();
        let (stream, _) = relay.accept().unwrap();
        drop(stream);
        assert!(peer.stop());
    }
}
