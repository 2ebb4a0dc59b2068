//! Process-lifetime counters for sequence numbers and device IDs.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use crate::DeviceRange;

/// Highest assignable global device ID
pub const MAX_DEVICE_ID: u8 = 255;

/// Wrapping 8-bit request sequence counter, shared by every requestor
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current number and advance, wrapping at 256
    pub fn next(&self) -> u8 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn peek(&self) -> u8 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Allocator of global device IDs, starting at 1 and never reused
#[derive(Debug)]
pub struct DeviceIdCounter {
    // u16 so that "all 255 IDs used" is representable
    next: Mutex<u16>,
}

impl Default for DeviceIdCounter {
    fn default() -> Self {
        DeviceIdCounter { next: Mutex::new(1) }
    }
}

impl DeviceIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// IDs handed out so far
    pub fn allocated(&self) -> u8 {
        let next = *self.next.lock().unwrap_or_else(|e| e.into_inner());
        (next - 1) as u8
    }

    /// IDs still available
    pub fn remaining(&self) -> usize {
        let next = *self.next.lock().unwrap_or_else(|e| e.into_inner());
        MAX_DEVICE_ID as usize + 1 - next as usize
    }

    /// Reserve up to `width` consecutive IDs.
    ///
    /// The range is cut short at [`MAX_DEVICE_ID`]. Returns `None` for a zero
    /// width or when no IDs are left.
    pub fn reserve(&self, width: usize) -> Option<DeviceRange> {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        let available = MAX_DEVICE_ID as usize + 1 - *next as usize;
        let width = width.min(available);
        if width == 0 {
            return None;
        }
        let start = *next as u8;
        let end = (*next as usize + width - 1) as u8;
        *next += width as u16;
        Some(DeviceRange::new(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sequence_wraps() {
        let seq = SequenceCounter::new();
        for expected in 0..=255u8 {
            assert_eq!(seq.next(), expected);
        }
        assert_eq!(seq.next(), 0);
    }

    #[test]
    fn test_reserve_is_monotonic() {
        let ids = DeviceIdCounter::new();
        assert_eq!(ids.reserve(2), Some(DeviceRange::new(1, 2)));
        assert_eq!(ids.reserve(3), Some(DeviceRange::new(3, 5)));
        assert_eq!(ids.allocated(), 5);
        assert_eq!(ids.remaining(), 250);
    }

    #[test]
    fn test_reserve_zero_width() {
        let ids = DeviceIdCounter::new();
        assert_eq!(ids.reserve(0), None);
        assert_eq!(ids.allocated(), 0);
    }

    #[test]
    fn test_reserve_stops_at_ceiling() {
        let ids = DeviceIdCounter::new();
        assert_eq!(ids.reserve(250), Some(DeviceRange::new(1, 250)));
        assert_eq!(ids.reserve(10), Some(DeviceRange::new(251, 255)));
        assert_eq!(ids.reserve(1), None);
        assert_eq!(ids.allocated(), 255);
        assert_eq!(ids.remaining(), 0);
    }

    proptest! {
        #[test]
        fn prop_ranges_partition_allocated_ids(
            widths in proptest::collection::vec(0usize..40, 0..20),
        ) {
            let ids = DeviceIdCounter::new();
            let ranges: Vec<DeviceRange> =
                widths.iter().filter_map(|w| ids.reserve(*w)).collect();
            let total = ids.allocated() as usize;
            let mut owners = vec![0usize; total + 1];
            for range in &ranges {
                for id in range.ids() {
                    owners[id as usize] += 1;
                }
            }
            prop_assert_eq!(owners[0], 0);
            prop_assert!(owners[1..].iter().all(|&n| n == 1));
        }
    }
}
