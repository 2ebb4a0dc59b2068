/// Guest address space as seen by the card.
///
/// Only `peek` and `poke` are required. Addresses are 16-bit and wrap at the
/// top of memory.
pub trait GuestMemory {
    fn peek(&self, addr: u16) -> u8;
    fn poke(&mut self, addr: u16, value: u8);

    /// Little-endian word at `addr`
    fn peek_word(&self, addr: u16) -> u16 {
        self.peek(addr) as u16 | (self.peek(addr.wrapping_add(1)) as u16) << 8
    }

    /// Little-endian 24-bit value at `addr` (block numbers, peer addresses)
    fn peek_u24(&self, addr: u16) -> u32 {
        self.peek_word(addr) as u32 | (self.peek(addr.wrapping_add(2)) as u32) << 16
    }

    fn peek_bytes(&self, addr: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.peek(addr.wrapping_add(i as u16)))
            .collect()
    }

    fn poke_bytes(&mut self, addr: u16, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.poke(addr.wrapping_add(i as u16), byte);
        }
    }
}

/// Flat memory. Reads past the end return 0xFF, writes there are ignored.
impl GuestMemory for [u8] {
    fn peek(&self, addr: u16) -> u8 {
        self.get(addr as usize).copied().unwrap_or(0xFF)
    }

    fn poke(&mut self, addr: u16, value: u8) {
        if let Some(byte) = self.get_mut(addr as usize) {
            *byte = value;
        }
    }
}

impl GuestMemory for Vec<u8> {
    fn peek(&self, addr: u16) -> u8 {
        self.as_slice().peek(addr)
    }

    fn poke(&mut self, addr: u16, value: u8) {
        self.as_mut_slice().poke(addr, value)
    }
}
