//! Accepts peers, discovers their devices and assigns global device IDs.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use devrelay_protocol::Request;
use log::{debug, info, warn};

use crate::{
    Connection, DeviceIdCounter, DeviceMap, DeviceRange, RelayConfig, RelayError, Requestor,
};

/// Sleep between accept attempts when no peer is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Shared {
    config: RelayConfig,
    requestor: Requestor,
    device_ids: DeviceIdCounter,
    running: AtomicBool,
    devices: Mutex<DeviceMap>,
    /// Connection currently being probed, so stop() can cut discovery short
    probing: Mutex<Option<Arc<Connection>>>,
}

impl Shared {
    fn devices(&self) -> MutexGuard<'_, DeviceMap> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_probing(&self, connection: Option<Arc<Connection>>) {
        *self.probing.lock().unwrap_or_else(|e| e.into_inner()) = connection;
    }

    fn accept_loop(&self, listener: TcpListener) {
        while self.running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!("Relay: connection from {}", addr);
                    self.register(stream, addr);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("Relay: accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        debug!("Relay: accept loop stopped");
    }

    fn register(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("Relay: {}: cannot make socket blocking: {}", addr, e);
            return;
        }

        let connection = Connection::new(stream, &self.config);
        if let Err(e) = connection.create_read_channel() {
            warn!("Relay: {}: cannot start reader: {}", addr, e);
            connection.close();
            return;
        }
        if !connection.wait_until_connected(self.config.connect_timeout) {
            warn!("Relay: {}: connection did not come up", addr);
            connection.close();
            connection.join();
            return;
        }

        self.set_probing(Some(Arc::clone(&connection)));
        let width = self.discover(&connection);
        self.set_probing(None);

        let range = if self.running.load(Ordering::Relaxed) {
            self.device_ids.reserve(width)
        } else {
            None
        };
        match range {
            Some(range) => {
                info!(
                    "Relay: {} serves {} device(s), assigned IDs {}",
                    addr,
                    range.width(),
                    range
                );
                self.devices().insert(range, connection);
            }
            None => {
                info!("Relay: {} has no usable devices, closing", addr);
                connection.close();
                connection.join();
            }
        }
    }

    /// Probe INIT on units 1, 2, ... until one fails or the ID space is full
    fn discover(&self, connection: &Connection) -> usize {
        let capacity = self.device_ids.remaining();
        let mut width = 0;

        while width < capacity && self.running.load(Ordering::Relaxed) {
            let unit = (width + 1) as u8;
            let request = Request::init(self.requestor.next_request_number(), unit);
            match self.requestor.send_request(&request, connection) {
                Ok(response) if response.is_ok() => {
                    debug!("Relay: unit {} answered INIT", unit);
                    width += 1;
                }
                Ok(response) => {
                    debug!(
                        "Relay: unit {} INIT status {:#04x}, end of devices",
                        unit,
                        response.status()
                    );
                    break;
                }
                Err(e) => {
                    debug!("Relay: unit {} INIT failed: {}", unit, e);
                    break;
                }
            }
        }
        width
    }
}

/// TCP listener owning the device ID space.
///
/// All methods take `&self` so one listener can be shared between the
/// emulation thread and a console.
pub struct Listener {
    shared: Arc<Shared>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Listener {
    pub fn new(config: RelayConfig, requestor: Requestor) -> Self {
        Listener {
            shared: Arc::new(Shared {
                config,
                requestor,
                device_ids: DeviceIdCounter::new(),
                running: AtomicBool::new(false),
                devices: Mutex::new(DeviceMap::new()),
                probing: Mutex::new(None),
            }),
            accept_thread: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    pub fn requestor(&self) -> &Requestor {
        &self.shared.requestor
    }

    /// Bind and start accepting peers. Returns the bound address; a second
    /// call returns the same address without rebinding.
    pub fn start(&self) -> Result<SocketAddr, RelayError> {
        let mut thread_slot = self.accept_thread.lock().unwrap_or_else(|e| e.into_inner());
        let mut local_addr = self.local_addr.lock().unwrap_or_else(|e| e.into_inner());
        if let (Some(_), Some(addr)) = (thread_slot.as_ref(), *local_addr) {
            return Ok(addr);
        }

        let addr = self.shared.config.socket_addr();
        let listener =
            TcpListener::bind(addr).map_err(|source| RelayError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let bound = listener.local_addr()?;

        self.shared.running.store(true, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("relay-accept".to_string())
            .spawn(move || shared.accept_loop(listener));
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.running.store(false, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        info!("Relay: listening on {}", bound);
        *thread_slot = Some(handle);
        *local_addr = Some(bound);
        Ok(bound)
    }

    /// Stop accepting, close every connection and join all threads.
    /// Safe to call repeatedly or without a prior `start`.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Relaxed);

        let probing = self
            .shared
            .probing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(connection) = probing {
            connection.set_is_connected(false);
        }

        let handle = self
            .accept_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Relay: accept thread panicked");
            }
            info!("Relay: stopped");
        }
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = None;

        let entries = self.shared.devices().drain();
        for (_, connection) in &entries {
            connection.set_is_connected(false);
        }
        for (range, connection) in entries {
            connection.close();
            connection.join();
            debug!("Relay: closed connection for IDs {}", range);
        }
    }

    pub fn is_listening(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connection serving `device_id` and the first ID of its range. Pass
    /// both IDs to [`local_unit`](crate::local_unit) for the peer's unit.
    pub fn find_connection_with_device(&self, device_id: u8) -> Option<(u8, Arc<Connection>)> {
        self.shared
            .devices()
            .find(device_id)
            .map(|(range, connection)| (range.start, connection))
    }

    /// Number of device IDs handed out so far
    pub fn get_total_device_count(&self) -> u8 {
        self.shared.device_ids.allocated()
    }

    /// `(device ID, connection)` for every assigned device ID
    pub fn get_all_connections(&self) -> Vec<(u8, Arc<Connection>)> {
        self.shared.devices().expand()
    }

    pub fn ranges(&self) -> Vec<DeviceRange> {
        self.shared.devices().ranges()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr())
            .field("devices", &self.get_total_device_count())
            .finish()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}
