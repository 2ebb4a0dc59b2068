//! Requests sent from the relay to a device-serving peer.

use crate::bytes::{read_u16_le, read_u24_le, write_u16_le, write_u24_le};
use crate::response::{Ack, ReadBlockResponse, ReadResponse, Response, StatusResponse};
use crate::{Block, Command, DecodeError, BLOCK_SIZE, STATUS_OK};

/// Bytes in every request before the command fields
const HEADER_LEN: usize = 3;

/// Bytes every response must carry: sequence number and status
const RESPONSE_HEADER_LEN: usize = 2;

/// Command specific request fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Status {
        status_code: u8,
    },
    ReadBlock {
        block_number: u32,
    },
    WriteBlock {
        block_number: u32,
        block: Box<Block>,
    },
    Format,
    /// `payload` is the guest's control list, including its two byte length prefix
    Control {
        control_code: u8,
        payload: Vec<u8>,
    },
    Init,
    Open,
    Close,
    Read {
        byte_count: u16,
        address: u32,
    },
    Write {
        byte_count: u16,
        address: u32,
        data: Vec<u8>,
    },
    Reset,
}

/// A request addressed to one unit of a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub sequence: u8,
    pub device_id: u8,
    pub kind: RequestKind,
}

impl Request {
    pub fn new(sequence: u8, device_id: u8, kind: RequestKind) -> Self {
        Request {
            sequence,
            device_id,
            kind,
        }
    }

    pub fn status(sequence: u8, device_id: u8, status_code: u8) -> Self {
        Self::new(sequence, device_id, RequestKind::Status { status_code })
    }

    pub fn read_block(sequence: u8, device_id: u8, block_number: u32) -> Self {
        Self::new(sequence, device_id, RequestKind::ReadBlock { block_number })
    }

    pub fn write_block(sequence: u8, device_id: u8, block_number: u32, block: Box<Block>) -> Self {
        Self::new(
            sequence,
            device_id,
            RequestKind::WriteBlock {
                block_number,
                block,
            },
        )
    }

    pub fn init(sequence: u8, device_id: u8) -> Self {
        Self::new(sequence, device_id, RequestKind::Init)
    }

    pub fn reset(sequence: u8, device_id: u8) -> Self {
        Self::new(sequence, device_id, RequestKind::Reset)
    }

    pub fn command(&self) -> Command {
        match &self.kind {
            RequestKind::Status { .. } => Command::Status,
            RequestKind::ReadBlock { .. } => Command::ReadBlock,
            RequestKind::WriteBlock { .. } => Command::WriteBlock,
            RequestKind::Format => Command::Format,
            RequestKind::Control { .. } => Command::Control,
            RequestKind::Init => Command::Init,
            RequestKind::Open => Command::Open,
            RequestKind::Close => Command::Close,
            RequestKind::Read { .. } => Command::Read,
            RequestKind::Write { .. } => Command::Write,
            RequestKind::Reset => Command::Reset,
        }
    }

    /// Encode to wire format: `[seq][command][device][fields...]`
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 4);
        out.push(self.sequence);
        out.push(self.command().code());
        out.push(self.device_id);

        match &self.kind {
            RequestKind::Status { status_code } => out.push(*status_code),
            RequestKind::ReadBlock { block_number } => write_u24_le(&mut out, *block_number),
            RequestKind::WriteBlock {
                block_number,
                block,
            } => {
                write_u24_le(&mut out, *block_number);
                out.extend_from_slice(&block[..]);
            }
            RequestKind::Control {
                control_code,
                payload,
            } => {
                out.push(*control_code);
                out.extend_from_slice(payload);
            }
            RequestKind::Read {
                byte_count,
                address,
            } => {
                write_u16_le(&mut out, *byte_count);
                write_u24_le(&mut out, *address);
            }
            RequestKind::Write {
                byte_count,
                address,
                data,
            } => {
                write_u16_le(&mut out, *byte_count);
                write_u24_le(&mut out, *address);
                out.extend_from_slice(data);
            }
            RequestKind::Format
            | RequestKind::Init
            | RequestKind::Open
            | RequestKind::Close
            | RequestKind::Reset => {}
        }
        out
    }

    /// Decode the response packet answering this request.
    ///
    /// Every response needs at least a sequence number and a status byte.
    /// STATUS and READ responses keep everything after the status byte.
    pub fn deserialize(&self, data: &[u8]) -> Result<Response, DecodeError> {
        let command = self.command();
        if data.len() < RESPONSE_HEADER_LEN {
            return Err(DecodeError::TooShort {
                command,
                expected: RESPONSE_HEADER_LEN,
                actual: data.len(),
            });
        }

        let sequence = data[0];
        let status = data[1];
        let body = &data[RESPONSE_HEADER_LEN..];
        let ack = Ack { sequence, status };

        let response = match command {
            Command::Status => Response::Status(StatusResponse {
                sequence,
                status,
                data: body.to_vec(),
            }),
            Command::ReadBlock => {
                let block = if status == STATUS_OK {
                    if body.len() < BLOCK_SIZE {
                        return Err(DecodeError::TooShort {
                            command,
                            expected: RESPONSE_HEADER_LEN + BLOCK_SIZE,
                            actual: data.len(),
                        });
                    }
                    let mut block = Box::new([0u8; BLOCK_SIZE]);
                    block.copy_from_slice(&body[..BLOCK_SIZE]);
                    Some(block)
                } else {
                    None
                };
                Response::ReadBlock(ReadBlockResponse {
                    sequence,
                    status,
                    block,
                })
            }
            Command::Read => Response::Read(ReadResponse {
                sequence,
                status,
                data: body.to_vec(),
            }),
            Command::WriteBlock => Response::WriteBlock(ack),
            Command::Format => Response::Format(ack),
            Command::Control => Response::Control(ack),
            Command::Init => Response::Init(ack),
            Command::Open => Response::Open(ack),
            Command::Close => Response::Close(ack),
            Command::Write => Response::Write(ack),
            Command::Reset => Response::Reset(ack),
        };
        Ok(response)
    }

    /// Parse a request from wire format, as a device-serving peer sees it
    pub fn parse(data: &[u8]) -> Result<Request, DecodeError> {
        if data.len() < 2 {
            return Err(DecodeError::MissingHeader { actual: data.len() });
        }
        let command = Command::try_from(data[1])?;
        let short = |expected: usize| DecodeError::TooShort {
            command,
            expected,
            actual: data.len(),
        };
        if data.len() < HEADER_LEN {
            return Err(short(HEADER_LEN));
        }

        let sequence = data[0];
        let device_id = data[2];
        let fields = &data[HEADER_LEN..];
        // Offsets below are relative to the command fields
        let u8_at = |offset: usize| {
            fields
                .get(offset)
                .copied()
                .ok_or_else(|| short(HEADER_LEN + offset + 1))
        };
        let u16_at = |offset: usize| {
            read_u16_le(fields, offset)
                .ok_or_else(|| short(HEADER_LEN + offset + 2))
        };
        let u24_at = |offset: usize| {
            read_u24_le(fields, offset)
                .ok_or_else(|| short(HEADER_LEN + offset + 3))
        };

        let kind = match command {
            Command::Status => RequestKind::Status {
                status_code: u8_at(0)?,
            },
            Command::ReadBlock => RequestKind::ReadBlock {
                block_number: u24_at(0)?,
            },
            Command::WriteBlock => {
                let block_number = u24_at(0)?;
                let contents = fields
                    .get(3..3 + BLOCK_SIZE)
                    .ok_or_else(|| short(HEADER_LEN + 3 + BLOCK_SIZE))?;
                let mut block = Box::new([0u8; BLOCK_SIZE]);
                block.copy_from_slice(contents);
                RequestKind::WriteBlock {
                    block_number,
                    block,
                }
            }
            Command::Control => RequestKind::Control {
                control_code: u8_at(0)?,
                payload: fields[1..].to_vec(),
            },
            Command::Read => RequestKind::Read {
                byte_count: u16_at(0)?,
                address: u24_at(2)?,
            },
            Command::Write => RequestKind::Write {
                byte_count: u16_at(0)?,
                address: u24_at(2)?,
                data: fields[5..].to_vec(),
            },
            Command::Format => RequestKind::Format,
            Command::Init => RequestKind::Init,
            Command::Open => RequestKind::Open,
            Command::Close => RequestKind::Close,
            Command::Reset => RequestKind::Reset,
        };

        Ok(Request {
            sequence,
            device_id,
            kind,
        })
    }
}
