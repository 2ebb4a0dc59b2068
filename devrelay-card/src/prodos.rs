//! ProDOS block driver entry point.
//!
//! ProDOS passes its parameters in zero page:
//!
//! | Address   | Contents                                          |
//! |-----------|---------------------------------------------------|
//! | `$42`     | command: 0 status, 1 read, 2 write, 3 format      |
//! | `$43`     | unit: bits 4-6 slot, bit 7 clear for drive 1      |
//! | `$44-$45` | buffer pointer                                    |
//! | `$46-$47` | block number                                      |
//!
//! The two drives map to the first two relayed block devices.

use devrelay_bridge::RelayError;
use devrelay_protocol::{RequestKind, BLOCK_SIZE};
use log::{debug, warn};

use crate::card::Outcome;
use crate::{GuestMemory, Registers, RelayCard, ERR_IO, ERR_NO_DEVICE};

const ZP_COMMAND: u16 = 0x42;
const ZP_UNIT: u16 = 0x43;
const ZP_BUFFER: u16 = 0x44;
const ZP_BLOCK: u16 = 0x46;

const PRODOS_STATUS: u8 = 0;
const PRODOS_READ: u8 = 1;
const PRODOS_WRITE: u8 = 2;
const PRODOS_FORMAT: u8 = 3;

/// SmartPort STATUS code returning the device information block
const STATUS_CODE_DIB: u8 = 3;
/// DIB status byte: block device
const DIB_BLOCK_DEVICE: u8 = 0x80;
/// Status byte bits that must all be set for I/O: write allowed, read
/// allowed, online
const READY_BITS: u8 = 0x70;

/// Device IDs acting as drive 1 and 2, valid while the relay's device count
/// stays the same
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DriveCache {
    device_count: Option<u8>,
    drives: [Option<u8>; 2],
}

impl RelayCard {
    pub(crate) fn prodos_call<M: GuestMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        regs: &mut Registers,
    ) {
        let command = mem.peek(ZP_COMMAND);
        let unit = mem.peek(ZP_UNIT);
        let drive = if unit & 0x80 == 0 { 0 } else { 1 };
        let slot = (unit & 0x70) >> 4;
        debug!(
            "Relay card: ProDOS command {} slot {} drive {}",
            command,
            slot,
            drive + 1
        );

        if slot != self.slot() {
            regs.complete_err(ERR_NO_DEVICE);
            return;
        }
        let Some(device_id) = self.block_drives()[drive] else {
            regs.complete_err(ERR_NO_DEVICE);
            return;
        };

        match self.prodos_dispatch(command, device_id, mem) {
            Ok(Outcome::Done { x, y }) => regs.complete_ok(x, y),
            Ok(Outcome::PeerStatus(status)) => {
                debug!(
                    "Relay card: ProDOS device {} status {:#04x}",
                    device_id, status
                );
                regs.complete_err(ERR_IO);
            }
            Err(e) => {
                warn!("Relay card: ProDOS device {} failed: {}", device_id, e);
                regs.complete_err(ERR_IO);
            }
        }
    }

    fn prodos_dispatch<M: GuestMemory + ?Sized>(
        &self,
        command: u8,
        device_id: u8,
        mem: &mut M,
    ) -> Result<Outcome, RelayError> {
        let (unit, connection) = self.find_device(device_id)?;
        let buffer = mem.peek_word(ZP_BUFFER);
        let block_number = mem.peek_word(ZP_BLOCK) as u32;

        match command {
            PRODOS_STATUS => {
                let response = self
                    .exchange(&connection, unit, RequestKind::Status { status_code: 0 })?
                    .into_status()?;
                match response.data.as_slice() {
                    _ if response.status != 0 => Ok(Outcome::PeerStatus(response.status)),
                    [flags, lo, hi, ..] if flags & READY_BITS == READY_BITS => {
                        Ok(Outcome::Done { x: *lo, y: *hi })
                    }
                    [flags, ..] => {
                        debug!(
                            "Relay card: device {} not ready, status {:#04x}",
                            device_id, flags
                        );
                        Ok(Outcome::PeerStatus(ERR_IO))
                    }
                    [] => Ok(Outcome::PeerStatus(ERR_IO)),
                }
            }
            PRODOS_READ => {
                let response = self
                    .exchange(&connection, unit, RequestKind::ReadBlock { block_number })?
                    .into_read_block()?;
                match response.block {
                    Some(block) => {
                        mem.poke_bytes(buffer, &block[..]);
                        Ok(Outcome::Done { x: 0, y: 2 })
                    }
                    None => Ok(Outcome::PeerStatus(response.status)),
                }
            }
            PRODOS_WRITE => {
                let mut block = Box::new([0u8; BLOCK_SIZE]);
                block.copy_from_slice(&mem.peek_bytes(buffer, BLOCK_SIZE));
                let response = self.exchange(
                    &connection,
                    unit,
                    RequestKind::WriteBlock {
                        block_number,
                        block,
                    },
                )?;
                Ok(Outcome::from_status(response.status(), 0, 0))
            }
            PRODOS_FORMAT => {
                let response = self.exchange(&connection, unit, RequestKind::Format)?;
                Ok(Outcome::from_status(response.status(), 0, 0))
            }
            other => {
                debug!("Relay card: unknown ProDOS command {}", other);
                Ok(Outcome::PeerStatus(ERR_IO))
            }
        }
    }

    /// First two block devices, rescanned when the device count changes
    fn block_drives(&mut self) -> [Option<u8>; 2] {
        let count = self.listener().get_total_device_count();
        if self.drives.device_count == Some(count) {
            return self.drives.drives;
        }

        let mut drives = [None; 2];
        let mut found = 0;
        for device_id in 1..=count {
            if found == drives.len() {
                break;
            }
            if self.is_block_device(device_id) {
                drives[found] = Some(device_id);
                found += 1;
            }
        }
        debug!("Relay card: ProDOS drives {:?} of {} devices", drives, count);

        self.drives = DriveCache {
            device_count: Some(count),
            drives,
        };
        drives
    }

    fn is_block_device(&self, device_id: u8) -> bool {
        let dib = self.find_device(device_id).and_then(|(unit, connection)| {
            Ok(self
                .exchange(
                    &connection,
                    unit,
                    RequestKind::Status {
                        status_code: STATUS_CODE_DIB,
                    },
                )?
                .into_status()?)
        });
        match dib {
            Ok(dib) if dib.status == 0 => dib
                .data
                .first()
                .is_some_and(|b| b & DIB_BLOCK_DEVICE != 0),
            Ok(_) => false,
            Err(e) => {
                debug!("Relay card: DIB for device {} failed: {}", device_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::tests::card_lock;
    use devrelay_bridge::{Listener, RelayConfig, Requestor};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_wrong_slot_is_no_device() {
        let _lock = card_lock();
        let requestor = Requestor::new(Duration::from_millis(100));
        let listener = Arc::new(Listener::new(RelayConfig::default(), requestor.clone()));
        let mut card = RelayCard::new(5, listener, requestor).unwrap();

        let mut mem = vec![0u8; 0x10000];
        mem.poke(ZP_COMMAND, PRODOS_READ);
        mem.poke(ZP_UNIT, 0x60);
        let mut regs = Registers::default();
        card.io_write(0xC0D2, crate::PRODOS_TRIGGER, &mut mem, &mut regs);
        assert_eq!(regs.a, ERR_NO_DEVICE);
        assert!(regs.flag(crate::FLAG_CARRY));
    }

    #[test]
    fn test_no_drives_without_devices() {
        let _lock = card_lock();
        let requestor = Requestor::new(Duration::from_millis(100));
        let listener = Arc::new(Listener::new(RelayConfig::default(), requestor.clone()));
        let mut card = RelayCard::new(5, listener, requestor).unwrap();

        let mut mem = vec![0u8; 0x10000];
        mem.poke(ZP_COMMAND, PRODOS_STATUS);
        mem.poke(ZP_UNIT, 0x50);
        let mut regs = Registers::default();
        card.io_write(0xC0D2, crate::PRODOS_TRIGGER, &mut mem, &mut regs);
        assert_eq!(regs.a, ERR_NO_DEVICE);
        assert_eq!(card.drives.drives, [None, None]);
        assert_eq!(card.drives.device_count, Some(0));
    }
}
