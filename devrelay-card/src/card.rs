//! SmartPort firmware entry point and command dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use devrelay_bridge::{local_unit, Connection, Listener, RelayError, Requestor, RELAY_DEVICE_ID};
use devrelay_protocol::{Command, Request, RequestKind, Response, BLOCK_SIZE};
use log::{debug, info, trace, warn};

use crate::prodos::DriveCache;
use crate::{CardError, GuestMemory, Registers, ERR_BAD_COMMAND, ERR_IO, ERR_NO_DEVICE};

/// Value the firmware writes to the card register to make a SmartPort call
pub const SMARTPORT_TRIGGER: u8 = 0x65;
/// Value the firmware writes to the card register to make a ProDOS driver call
pub const PRODOS_TRIGGER: u8 = 0x66;

/// Relay self-status returned for STATUS on unit 0: no interrupts, vendor
/// "MF", version $100A. The device count is prepended.
const RELAY_STATUS_TAIL: [u8; 5] = [0x40, 0x4D, 0x46, 0x0A, 0x10];

static CARD_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Held by the one live card; releases the slot on drop
#[derive(Debug)]
struct ActiveGuard;

impl ActiveGuard {
    fn acquire() -> Result<Self, CardError> {
        CARD_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ActiveGuard)
            .map_err(|_| CardError::AlreadyActive)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        CARD_ACTIVE.store(false, Ordering::Release);
    }
}

/// Register and command-list layout of one SmartPort call
#[derive(Debug, Clone, Copy)]
struct SmartPortCall {
    command: u8,
    unit: u8,
    buffer: u16,
    params: u16,
}

/// Registers to report after a successful call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done { x: u8, y: u8 },
    PeerStatus(u8),
}

impl Outcome {
    pub(crate) fn from_status(status: u8, x: u8, y: u8) -> Self {
        if status == 0 {
            Outcome::Done { x, y }
        } else {
            Outcome::PeerStatus(status)
        }
    }

    fn with_len(status: u8, len: usize) -> Self {
        Outcome::from_status(status, len as u8, (len >> 8) as u8)
    }
}

#[derive(Debug)]
pub struct RelayCard {
    slot: u8,
    listener: Arc<Listener>,
    requestor: Requestor,
    pub(crate) drives: DriveCache,
    _guard: ActiveGuard,
}

impl RelayCard {
    /// Install the card in `slot`. Starts the listener when its config asks
    /// for it.
    pub fn new(
        slot: u8,
        listener: Arc<Listener>,
        requestor: Requestor,
    ) -> Result<Self, CardError> {
        if !(1..=7).contains(&slot) {
            return Err(CardError::InvalidSlot(slot));
        }
        let guard = ActiveGuard::acquire()?;

        if listener.config().start_on_init {
            if let Err(e) = listener.start() {
                warn!("Relay card: listener did not start: {}", e);
            }
        }
        info!("Relay card: installed in slot {}", slot);

        Ok(RelayCard {
            slot,
            listener,
            requestor,
            drives: DriveCache::default(),
            _guard: guard,
        })
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn listener(&self) -> &Arc<Listener> {
        &self.listener
    }

    /// I/O address of the card's command register, $C0n2 with n = slot + 8
    pub fn register_address(&self) -> u16 {
        0xC082 + ((self.slot as u16) << 4)
    }

    /// Handle a guest write to the card's I/O space
    pub fn io_write<M: GuestMemory + ?Sized>(
        &mut self,
        address: u16,
        value: u8,
        mem: &mut M,
        regs: &mut Registers,
    ) {
        if address != self.register_address() {
            return;
        }
        match value {
            SMARTPORT_TRIGGER => self.smartport_call(mem, regs),
            PRODOS_TRIGGER => self.prodos_call(mem, regs),
            _ => {}
        }
    }

    /// On power cycle every relayed device gets a RESET
    pub fn reset(&mut self, power_cycle: bool) {
        self.drives = DriveCache::default();
        if !power_cycle {
            return;
        }
        for (device_id, _) in self.listener.get_all_connections() {
            let result = self.find_device(device_id).and_then(|(unit, connection)| {
                self.exchange(&connection, unit, RequestKind::Reset)
            });
            match result {
                Ok(response) if response.is_ok() => {}
                Ok(response) => debug!(
                    "Relay card: RESET device {} returned {:#04x}",
                    device_id,
                    response.status()
                ),
                Err(e) => warn!("Relay card: RESET device {} failed: {}", device_id, e),
            }
        }
    }

    /// Send one request to a local unit and wait for the reply
    pub(crate) fn exchange(
        &self,
        connection: &Connection,
        unit: u8,
        kind: RequestKind,
    ) -> Result<Response, RelayError> {
        let request = Request::new(self.requestor.next_request_number(), unit, kind);
        self.requestor.send_request(&request, connection)
    }

    /// Peer unit number and connection for a global device ID
    pub(crate) fn find_device(&self, device_id: u8) -> Result<(u8, Arc<Connection>), RelayError> {
        let (range_start, connection) = self
            .listener
            .find_connection_with_device(device_id)
            .ok_or(RelayError::NoSuchDevice(device_id))?;
        let unit = local_unit(range_start, device_id)
            .ok_or(RelayError::NoSuchDevice(device_id))?;
        Ok((unit, connection))
    }

    fn smartport_call<M: GuestMemory + ?Sized>(&mut self, mem: &mut M, regs: &mut Registers) {
        let call = read_call(mem, regs);
        trace!("Relay card: SmartPort {:?}", call);

        let command = match Command::try_from(call.command) {
            Ok(command) => command,
            Err(e) => {
                warn!("Relay card: {}", e);
                regs.complete_err(ERR_BAD_COMMAND);
                return;
            }
        };

        let relay_status_call = call.unit == RELAY_DEVICE_ID
            && command == Command::Status
            && mem.peek(call.params) == 0;
        if relay_status_call {
            self.relay_status(call.buffer, mem, regs);
            return;
        }

        let result = self.find_device(call.unit).and_then(|(unit, connection)| {
            self.dispatch(command, unit, &connection, call, mem)
        });
        finish(regs, command, call.unit, result);
    }

    fn relay_status<M: GuestMemory + ?Sized>(
        &self,
        buffer: u16,
        mem: &mut M,
        regs: &mut Registers,
    ) {
        mem.poke(buffer, self.listener.get_total_device_count());
        mem.poke_bytes(buffer.wrapping_add(1), &RELAY_STATUS_TAIL);
        regs.complete_ok(1 + RELAY_STATUS_TAIL.len() as u8, 0);
    }

    fn dispatch<M: GuestMemory + ?Sized>(
        &self,
        command: Command,
        unit: u8,
        connection: &Connection,
        call: SmartPortCall,
        mem: &mut M,
    ) -> Result<Outcome, RelayError> {
        let SmartPortCall { buffer, params, .. } = call;
        let simple = |kind: RequestKind| -> Result<Outcome, RelayError> {
            let response = self.exchange(connection, unit, kind)?;
            Ok(Outcome::from_status(response.status(), 0, 0))
        };

        match command {
            Command::Status => {
                let status_code = mem.peek(params);
                let response = self
                    .exchange(connection, unit, RequestKind::Status { status_code })?
                    .into_status()?;
                if response.status == 0 {
                    mem.poke_bytes(buffer, &response.data);
                }
                Ok(Outcome::with_len(response.status, response.data.len()))
            }
            Command::ReadBlock => {
                let block_number = mem.peek_u24(params);
                let response = self
                    .exchange(connection, unit, RequestKind::ReadBlock { block_number })?
                    .into_read_block()?;
                if let Some(block) = &response.block {
                    mem.poke_bytes(buffer, &block[..]);
                }
                Ok(Outcome::with_len(response.status, BLOCK_SIZE))
            }
            Command::WriteBlock => {
                let block_number = mem.peek_u24(params);
                let mut block = Box::new([0u8; BLOCK_SIZE]);
                block.copy_from_slice(&mem.peek_bytes(buffer, BLOCK_SIZE));
                simple(RequestKind::WriteBlock {
                    block_number,
                    block,
                })
            }
            Command::Control => {
                let control_code = mem.peek(params);
                let len = mem.peek_word(buffer) as usize + 2;
                simple(RequestKind::Control {
                    control_code,
                    payload: mem.peek_bytes(buffer, len),
                })
            }
            Command::Read => {
                let byte_count = mem.peek_word(params);
                let address = mem.peek_u24(params.wrapping_add(2));
                let response = self
                    .exchange(
                        connection,
                        unit,
                        RequestKind::Read {
                            byte_count,
                            address,
                        },
                    )?
                    .into_read()?;
                if response.status == 0 {
                    mem.poke_bytes(buffer, &response.data);
                }
                Ok(Outcome::with_len(response.status, response.data.len()))
            }
            Command::Write => {
                let byte_count = mem.peek_word(params);
                let address = mem.peek_u24(params.wrapping_add(2));
                simple(RequestKind::Write {
                    byte_count,
                    address,
                    data: mem.peek_bytes(buffer, byte_count as usize),
                })
            }
            Command::Format => simple(RequestKind::Format),
            Command::Init => simple(RequestKind::Init),
            Command::Open => simple(RequestKind::Open),
            Command::Close => simple(RequestKind::Close),
            Command::Reset => simple(RequestKind::Reset),
        }
    }
}

/// Decode the call from the stack and step the return address past the
/// inline command byte and list pointer
fn read_call<M: GuestMemory + ?Sized>(mem: &mut M, regs: &Registers) -> SmartPortCall {
    let lo = regs.stack_addr(1);
    let hi = regs.stack_addr(2);
    let rts = mem.peek(lo) as u16 | (mem.peek(hi) as u16) << 8;

    let command = mem.peek(rts.wrapping_add(1));
    let list = mem.peek_word(rts.wrapping_add(2));

    let rts = rts.wrapping_add(3);
    mem.poke(lo, rts as u8);
    mem.poke(hi, (rts >> 8) as u8);

    SmartPortCall {
        command,
        unit: mem.peek(list.wrapping_add(1)),
        buffer: mem.peek_word(list.wrapping_add(2)),
        params: list.wrapping_add(4),
    }
}

fn finish(
    regs: &mut Registers,
    command: Command,
    device_id: u8,
    result: Result<Outcome, RelayError>,
) {
    match result {
        Ok(Outcome::Done { x, y }) => regs.complete_ok(x, y),
        Ok(Outcome::PeerStatus(status)) => {
            debug!(
                "Relay card: {} device {} returned {:#04x}",
                command, device_id, status
            );
            regs.complete_err(status);
        }
        Err(RelayError::NoSuchDevice(_)) => {
            debug!("Relay card: {} for unknown device {}", command, device_id);
            regs.complete_err(ERR_NO_DEVICE);
        }
        Err(e) => {
            warn!("Relay card: {} device {} failed: {}", command, device_id, e);
            regs.complete_err(ERR_IO);
        }
    }
}
