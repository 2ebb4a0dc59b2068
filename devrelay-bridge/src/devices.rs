//! Global device ID ranges and the connections that serve them.

use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::Connection;

/// 1-based unit a peer knows `device_id` by, given the first ID of the
/// peer's range
pub fn local_unit(range_start: u8, device_id: u8) -> Option<u8> {
    device_id.checked_sub(range_start)?.checked_add(1)
}

/// Inclusive span of global device IDs served by one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRange {
    pub start: u8,
    pub end: u8,
}

impl DeviceRange {
    pub fn new(start: u8, end: u8) -> Self {
        debug_assert!(start <= end);
        DeviceRange { start, end }
    }

    pub fn width(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn contains(&self, device_id: u8) -> bool {
        (self.start..=self.end).contains(&device_id)
    }

    /// 1-based unit number the peer knows this device by
    pub fn local_unit(&self, device_id: u8) -> Option<u8> {
        if self.contains(device_id) {
            local_unit(self.start, device_id)
        } else {
            None
        }
    }

    pub fn ids(&self) -> RangeInclusive<u8> {
        self.start..=self.end
    }
}

impl std::fmt::Display for DeviceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Ranges in the order they were registered
#[derive(Default)]
pub struct DeviceMap {
    entries: Vec<(DeviceRange, Arc<Connection>)>,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, range: DeviceRange, connection: Arc<Connection>) {
        debug_assert!(
            self.entries
                .iter()
                .all(|(r, _)| r.end < range.start || range.end < r.start),
            "overlapping device range {range}"
        );
        self.entries.push((range, connection));
    }

    /// Range holding `device_id` and the connection serving it
    pub fn find(&self, device_id: u8) -> Option<(DeviceRange, Arc<Connection>)> {
        self.entries
            .iter()
            .find(|(range, _)| range.contains(device_id))
            .map(|(range, connection)| (*range, Arc::clone(connection)))
    }

    /// One `(device ID, connection)` entry per assigned ID, in ID order
    pub fn expand(&self) -> Vec<(u8, Arc<Connection>)> {
        self.entries
            .iter()
            .flat_map(|(range, connection)| {
                range.ids().map(move |id| (id, Arc::clone(connection)))
            })
            .collect()
    }

    /// Each connection once
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.entries.iter().map(|(_, c)| Arc::clone(c)).collect()
    }

    pub fn ranges(&self) -> Vec<DeviceRange> {
        self.entries.iter().map(|(r, _)| *r).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<(DeviceRange, Arc<Connection>)> {
        std::mem::take(&mut self.entries)
    }
}
