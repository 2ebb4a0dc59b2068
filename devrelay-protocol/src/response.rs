//! Responses returned by a device-serving peer.

use crate::{Block, Command, DecodeError, STATUS_OK};

/// Response carrying only the sequence number and status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub sequence: u8,
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub sequence: u8,
    pub status: u8,
    pub data: Vec<u8>,
}

/// `block` is present only when `status` is zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlockResponse {
    pub sequence: u8,
    pub status: u8,
    pub block: Option<Box<Block>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub sequence: u8,
    pub status: u8,
    pub data: Vec<u8>,
}

/// A decoded response, one variant per command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Status(StatusResponse),
    ReadBlock(ReadBlockResponse),
    WriteBlock(Ack),
    Format(Ack),
    Control(Ack),
    Init(Ack),
    Open(Ack),
    Close(Ack),
    Read(ReadResponse),
    Write(Ack),
    Reset(Ack),
}

impl Response {
    /// Build a response with no payload, e.g. an error reply from a peer
    pub fn empty(command: Command, sequence: u8, status: u8) -> Self {
        let ack = Ack { sequence, status };
        match command {
            Command::Status => Response::Status(StatusResponse {
                sequence,
                status,
                data: Vec::new(),
            }),
            Command::ReadBlock => Response::ReadBlock(ReadBlockResponse {
                sequence,
                status,
                block: None,
            }),
            Command::Read => Response::Read(ReadResponse {
                sequence,
                status,
                data: Vec::new(),
            }),
            Command::WriteBlock => Response::WriteBlock(ack),
            Command::Format => Response::Format(ack),
            Command::Control => Response::Control(ack),
            Command::Init => Response::Init(ack),
            Command::Open => Response::Open(ack),
            Command::Close => Response::Close(ack),
            Command::Write => Response::Write(ack),
            Command::Reset => Response::Reset(ack),
        }
    }

    pub fn command(&self) -> Command {
        match self {
            Response::Status(_) => Command::Status,
            Response::ReadBlock(_) => Command::ReadBlock,
            Response::WriteBlock(_) => Command::WriteBlock,
            Response::Format(_) => Command::Format,
            Response::Control(_) => Command::Control,
            Response::Init(_) => Command::Init,
            Response::Open(_) => Command::Open,
            Response::Close(_) => Command::Close,
            Response::Read(_) => Command::Read,
            Response::Write(_) => Command::Write,
            Response::Reset(_) => Command::Reset,
        }
    }

    pub fn sequence(&self) -> u8 {
        self.header().0
    }

    /// Peer reported status, zero on success
    pub fn status(&self) -> u8 {
        self.header().1
    }

    pub fn is_ok(&self) -> bool {
        self.status() == STATUS_OK
    }

    fn header(&self) -> (u8, u8) {
        match self {
            Response::Status(r) => (r.sequence, r.status),
            Response::ReadBlock(r) => (r.sequence, r.status),
            Response::Read(r) => (r.sequence, r.status),
            Response::WriteBlock(a)
            | Response::Format(a)
            | Response::Control(a)
            | Response::Init(a)
            | Response::Open(a)
            | Response::Close(a)
            | Response::Write(a)
            | Response::Reset(a) => (a.sequence, a.status),
        }
    }

    /// Encode to wire format: `[seq][status][fields...]`
    pub fn serialize(&self) -> Vec<u8> {
        let (sequence, status) = self.header();
        let mut out = vec![sequence, status];
        match self {
            Response::Status(r) => out.extend_from_slice(&r.data),
            Response::Read(r) => out.extend_from_slice(&r.data),
            Response::ReadBlock(r) => {
                if let Some(block) = &r.block {
                    out.extend_from_slice(&block[..]);
                }
            }
            _ => {}
        }
        out
    }

    fn unexpected(&self, expected: Command) -> DecodeError {
        DecodeError::UnexpectedResponse {
            expected,
            actual: self.command(),
        }
    }

    pub fn into_status(self) -> Result<StatusResponse, DecodeError> {
        match self {
            Response::Status(r) => Ok(r),
            other => Err(other.unexpected(Command::Status)),
        }
    }

    pub fn into_read_block(self) -> Result<ReadBlockResponse, DecodeError> {
        match self {
            Response::ReadBlock(r) => Ok(r),
            other => Err(other.unexpected(Command::ReadBlock)),
        }
    }

    pub fn into_read(self) -> Result<ReadResponse, DecodeError> {
        match self {
            Response::Read(r) => Ok(r),
            other => Err(other.unexpected(Command::Read)),
        }
    }
}
