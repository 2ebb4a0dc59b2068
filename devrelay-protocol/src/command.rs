//! SmartPort command numbers.

use std::fmt;

use crate::DecodeError;

/// Command number carried in the second byte of every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Status = 0x00,
    ReadBlock = 0x01,
    WriteBlock = 0x02,
    Format = 0x03,
    Control = 0x04,
    Init = 0x05,
    Open = 0x06,
    Close = 0x07,
    Read = 0x08,
    Write = 0x09,
    Reset = 0x0A,
}

impl Command {
    pub const ALL: [Command; 11] = [
        Command::Status,
        Command::ReadBlock,
        Command::WriteBlock,
        Command::Format,
        Command::Control,
        Command::Init,
        Command::Open,
        Command::Close,
        Command::Read,
        Command::Write,
        Command::Reset,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Status => "STATUS",
            Command::ReadBlock => "READBLOCK",
            Command::WriteBlock => "WRITEBLOCK",
            Command::Format => "FORMAT",
            Command::Control => "CONTROL",
            Command::Init => "INIT",
            Command::Open => "OPEN",
            Command::Close => "CLOSE",
            Command::Read => "READ",
            Command::Write => "WRITE",
            Command::Reset => "RESET",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(DecodeError::UnknownCommand(code))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
