/// Processor status carry flag
pub const FLAG_CARRY: u8 = 0x01;
/// Processor status zero flag
pub const FLAG_ZERO: u8 = 0x02;

/// The 6502 registers a firmware call reads and returns results in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer into page $01
    pub sp: u8,
    pub status: u8,
}

impl Registers {
    pub fn flag(&self, flag: u8) -> bool {
        self.status & flag != 0
    }

    pub fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    /// Address of the stack slot `offset` bytes above the stack pointer
    pub fn stack_addr(&self, offset: u8) -> u16 {
        0x0100 | self.sp.wrapping_add(offset) as u16
    }

    /// Successful call: A = 0, zero set, carry clear
    pub fn complete_ok(&mut self, x: u8, y: u8) {
        self.a = 0;
        self.x = x;
        self.y = y;
        self.set_flag(FLAG_ZERO, true);
        self.set_flag(FLAG_CARRY, false);
    }

    /// Failed call: A = error code, zero clear, carry set
    pub fn complete_err(&mut self, code: u8) {
        self.a = code;
        self.x = 0;
        self.y = 0;
        self.set_flag(FLAG_ZERO, false);
        self.set_flag(FLAG_CARRY, true);
    }
}
