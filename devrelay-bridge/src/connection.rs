//! One TCP peer: framed writes, a background reader and the table of
//! responses waiting to be collected by sequence number.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use devrelay_protocol::{fmt_hex, slip, MAX_RESPONSE_LEN};
use log::{debug, info, trace, warn};

use crate::{RelayConfig, RelayError};

/// Undecoded bytes kept between reads before the stream is declared garbage.
/// Room for the largest legal response with every byte escaped.
const MAX_PENDING_BYTES: usize = slip::max_encoded_len(MAX_RESPONSE_LEN);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

struct Inner {
    state: ConnectionState,
    responses: HashMap<u8, Vec<u8>>,
}

/// State shared with the reader thread
struct Shared {
    inner: Mutex<Inner>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
        self.signal.notify_all();
    }

    fn is_connected(&self) -> bool {
        self.lock().state == ConnectionState::Connected
    }
}

pub struct Connection {
    writer: Mutex<TcpStream>,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    peer_addr: Option<SocketAddr>,
    read_poll_interval: Duration,
}

impl Connection {
    pub fn new(stream: TcpStream, config: &RelayConfig) -> Arc<Connection> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {}", e);
        }
        if let Err(e) = stream.set_write_timeout(Some(config.response_timeout)) {
            debug!("set_write_timeout failed: {}", e);
        }
        let peer_addr = stream.peer_addr().ok();

        Arc::new(Connection {
            writer: Mutex::new(stream),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ConnectionState::Connecting,
                    responses: HashMap::new(),
                }),
                signal: Condvar::new(),
            }),
            reader: Mutex::new(None),
            peer_addr,
            read_poll_interval: config.read_poll_interval,
        })
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn label(&self) -> String {
        match self.peer_addr {
            Some(addr) => addr.to_string(),
            None => "<unknown peer>".to_string(),
        }
    }

    /// Spawn the reader thread. Calling it again while a reader exists does
    /// nothing.
    pub fn create_read_channel(&self) -> Result<(), RelayError> {
        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        if reader.is_some() {
            return Ok(());
        }

        let stream = self
            .writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_clone()?;
        stream.set_read_timeout(Some(self.read_poll_interval))?;

        let shared = Arc::clone(&self.shared);
        let label = self.label();
        let handle = thread::Builder::new()
            .name(format!("relay-reader {}", label))
            .spawn(move || read_loop(stream, shared, label))?;
        *reader = Some(handle);
        Ok(())
    }

    /// Block until the reader has started, the connection dropped or
    /// `timeout` passed. Returns whether the connection is usable.
    pub fn wait_until_connected(&self, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let (guard, _) = self
            .shared
            .signal
            .wait_timeout_while(guard, timeout, |inner| {
                inner.state == ConnectionState::Connecting
            })
            .unwrap_or_else(|e| e.into_inner());
        guard.state == ConnectionState::Connected
    }

    /// Take the response for `sequence`, waiting up to `timeout` for it.
    ///
    /// Returns early once the connection is gone, still as a timeout.
    pub fn wait_for_response(
        &self,
        sequence: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>, RelayError> {
        let started = Instant::now();
        let guard = self.shared.lock();
        let (mut guard, _) = self
            .shared
            .signal
            .wait_timeout_while(guard, timeout, |inner| {
                !inner.responses.contains_key(&sequence)
                    && inner.state != ConnectionState::Disconnected
            })
            .unwrap_or_else(|e| e.into_inner());

        guard.responses.remove(&sequence).ok_or(RelayError::Timeout {
            sequence,
            waited: started.elapsed(),
        })
    }

    /// Drop a late reply still stored under `sequence`
    pub fn discard_response(&self, sequence: u8) -> bool {
        let stale = self.shared.lock().responses.remove(&sequence);
        if let Some(packet) = &stale {
            debug!(
                "{}: discarding stale response for sequence {} ({} bytes)",
                self.label(),
                sequence,
                packet.len()
            );
        }
        stale.is_some()
    }

    /// Frame `payload` and write it to the peer
    pub fn send_data(&self, payload: &[u8]) -> Result<(), RelayError> {
        if payload.is_empty() {
            return Err(RelayError::Send(std::io::Error::new(
                ErrorKind::InvalidInput,
                "empty payload",
            )));
        }
        trace!("{} -> {}", self.label(), fmt_hex(payload));

        let frame = slip::encode(payload);
        let mut stream = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        stream
            .write_all(&frame)
            .and_then(|_| stream.flush())
            .map_err(RelayError::Send)
    }

    pub fn set_is_connected(&self, connected: bool) {
        self.shared.set_state(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Mark the connection dead and shut the socket down so the reader wakes
    pub fn close(&self) {
        self.set_is_connected(false);
        let stream = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotConnected => {}
            Err(e) => debug!("{}: shutdown failed: {}", self.label(), e),
        }
    }

    /// Wait for the reader thread to finish
    pub fn join(&self) {
        let handle = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("{}: reader thread panicked", self.label());
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

fn read_loop(mut stream: TcpStream, shared: Arc<Shared>, label: String) {
    {
        let mut inner = shared.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Connected;
        }
    }
    shared.signal.notify_all();
    debug!("{}: reader started", label);

    let mut buffer = vec![0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    while shared.is_connected() {
        match stream.read(&mut buffer) {
            Ok(0) => {
                info!("{}: connection closed by peer", label);
                break;
            }
            Ok(n) => {
                pending.extend_from_slice(&buffer[..n]);
                let (packets, rest) = slip::decode_stream(&pending);
                pending = rest;

                if pending.len() > MAX_PENDING_BYTES {
                    warn!(
                        "{}: {} bytes without a frame end, dropping them",
                        label,
                        pending.len()
                    );
                    pending.clear();
                }

                if !packets.is_empty() {
                    let mut inner = shared.lock();
                    for packet in packets {
                        trace!("{} <- {}", label, fmt_hex(&packet));
                        inner.responses.insert(packet[0], packet);
                    }
                    drop(inner);
                    shared.signal.notify_all();
                }
            }
            Err(ref e)
                if e.kind() == ErrorKind::WouldBlock
                    || e.kind() == ErrorKind::TimedOut
                    || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                if shared.is_connected() {
                    warn!("{}: read failed: {}", label, e);
                }
                break;
            }
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    debug!("{}: reader stopped", label);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn test_config() -> RelayConfig {
        RelayConfig {
            read_poll_interval: Duration::from_millis(20),
            ..RelayConfig::default()
        }
    }

    /// Connected pair: relay-side connection plus the raw peer socket
    fn pair() -> (Arc<Connection>, TcpStream) {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        let (stream, _) = server.accept().unwrap();
        (Connection::new(stream, &test_config()), peer)
    }

    #[test]
    fn test_reader_marks_connected() {
        let (conn, _peer) = pair();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        conn.create_read_channel().unwrap();
        assert!(conn.wait_until_connected(Duration::from_secs(2)));
        assert!(conn.is_connected());
        conn.close();
        conn.join();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_out_of_order_responses_correlate() {
        let (conn, mut peer) = pair();
        conn.create_read_channel().unwrap();
        assert!(conn.wait_until_connected(Duration::from_secs(2)));

        let mut wire = slip::encode(&[2, 0, 0xBB]);
        wire.extend(slip::encode(&[1, 0, 0xAA]));
        peer.write_all(&wire).unwrap();

        let timeout = Duration::from_secs(2);
        assert_eq!(conn.wait_for_response(1, timeout).unwrap(), vec![1, 0, 0xAA]);
        assert_eq!(conn.wait_for_response(2, timeout).unwrap(), vec![2, 0, 0xBB]);
        conn.close();
        conn.join();
    }

    #[test]
    fn test_frame_split_across_reads() {
        let (conn, mut peer) = pair();
        conn.create_read_channel().unwrap();
        assert!(conn.wait_until_connected(Duration::from_secs(2)));

        let wire = slip::encode(&[7, 0, slip::END, 0x42]);
        let (head, tail) = wire.split_at(3);
        peer.write_all(head).unwrap();
        peer.flush().unwrap();
        thread::sleep(Duration::from_millis(50));
        peer.write_all(tail).unwrap();

        let packet = conn.wait_for_response(7, Duration::from_secs(2)).unwrap();
        assert_eq!(packet, vec![7, 0, slip::END, 0x42]);
        conn.close();
        conn.join();
    }

    #[test]
    fn test_large_escaped_response_is_kept() {
        let (conn, mut peer) = pair();
        conn.create_read_channel().unwrap();
        assert!(conn.wait_until_connected(Duration::from_secs(2)));

        // Full 16-bit READ of delimiter bytes: every data byte is escaped
        let mut packet = vec![7, 0];
        packet.resize(MAX_RESPONSE_LEN, slip::END);
        let wire = slip::encode(&packet);
        assert!(wire.len() > 128 * 1024);

        let writer = thread::spawn(move || {
            peer.write_all(&wire).unwrap();
            peer
        });
        let received = conn.wait_for_response(7, Duration::from_secs(5)).unwrap();
        assert_eq!(received.len(), MAX_RESPONSE_LEN);
        assert!(received[2..].iter().all(|&b| b == slip::END));

        let _peer = writer.join().unwrap();
        conn.close();
        conn.join();
    }

    #[test]
    fn test_wait_times_out() {
        let (conn, _peer) = pair();
        conn.create_read_channel().unwrap();
        assert!(conn.wait_until_connected(Duration::from_secs(2)));

        let started = Instant::now();
        let err = conn
            .wait_for_response(9, Duration::from_millis(150))
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout { sequence: 9, .. }));
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(2));
        conn.close();
        conn.join();
    }

    #[test]
    fn test_peer_close_disconnects_and_wakes_waiter() {
        let (conn, peer) = pair();
        conn.create_read_channel().unwrap();
        assert!(conn.wait_until_connected(Duration::from_secs(2)));
        drop(peer);

        let started = Instant::now();
        assert!(conn.wait_for_response(3, Duration::from_secs(5)).is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        conn.join();
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_discard_stale_response() {
        let (conn, mut peer) = pair();
        conn.create_read_channel().unwrap();
        assert!(conn.wait_until_connected(Duration::from_secs(2)));

        peer.write_all(&slip::encode(&[5, 0])).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(conn.discard_response(5));
        assert!(!conn.discard_response(5));
        conn.close();
        conn.join();
    }

    #[test]
    fn test_send_frames_payload() {
        let (conn, mut peer) = pair();
        conn.send_data(&[1, 5, 2]).unwrap();

        let mut received = [0u8; 5];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(received, [slip::END, 1, 5, 2, slip::END]);
    }

    #[test]
    fn test_send_empty_payload_fails() {
        let (conn, _peer) = pair();
        assert!(matches!(conn.send_data(&[]), Err(RelayError::Send(_))));
    }

    #[test]
    fn test_join_is_idempotent() {
        let (conn, _peer) = pair();
        conn.join();
        conn.create_read_channel().unwrap();
        conn.close();
        conn.join();
        conn.join();
    }
}
