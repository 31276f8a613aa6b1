//! MDFU packet data model: the command/response pair exchanged over every
//! transport.
//!
//! Wire encoding of the two-byte header: bit 7 holds `sync` on
//! a command packet, bit 6 holds `resend` on a response packet (the two
//! flags occupy distinct bits; a command packet's bit 6 and a response
//! packet's bit 7 are unused/reserved), bit 5 is reserved zero, bits 4..0
//! are the sequence number, byte 1 is the command or status code, followed
//! by zero or more payload bytes.

use crate::error::MdfuError;

const HEADER_SYNC: u8 = 0x80;
const HEADER_RESEND: u8 = 0x40;
const HEADER_SEQUENCE_MASK: u8 = 0x1F;

/// Commands the host may issue, in their wire-encoded form.
///
/// `MAX_MDFU_CMD` (6) bounds the command-timeout lookup table; command code
/// 0 is reserved (never issued, used only as the "default timeout" key in
/// client info).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    GetClientInfo = 0x01,
    StartTransfer = 0x02,
    WriteChunk = 0x03,
    GetImageState = 0x04,
    EndTransfer = 0x05,
}

/// One past the highest valid command code; sizes the command-timeout
/// table (slot 0 is unused/default, slots 1..=5 are the commands above).
pub const MAX_MDFU_CMD: usize = 6;

impl Command {
    pub fn from_wire(code: u8) -> Result<Self, MdfuError> {
        match code {
            0x01 => Ok(Command::GetClientInfo),
            0x02 => Ok(Command::StartTransfer),
            0x03 => Ok(Command::WriteChunk),
            0x04 => Ok(Command::GetImageState),
            0x05 => Ok(Command::EndTransfer),
            _ => Err(MdfuError::InvalidFrame("unknown command code")),
        }
    }
}

/// Status codes the client may report, in their wire-encoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Success = 0x01,
    CommandNotSupported = 0x02,
    NotAuthorized = 0x03,
    CommandNotExecuted = 0x04,
    AbortFileTransfer = 0x05,
}

pub const MAX_MDFU_STATUS: u8 = 0x06;

impl Status {
    pub fn from_wire(code: u8) -> Result<Self, MdfuError> {
        match code {
            0x01 => Ok(Status::Success),
            0x02 => Ok(Status::CommandNotSupported),
            0x03 => Ok(Status::NotAuthorized),
            0x04 => Ok(Status::CommandNotExecuted),
            0x05 => Ok(Status::AbortFileTransfer),
            _ => Err(MdfuError::InvalidFrame("unknown status code")),
        }
    }
}

/// Cause byte carried by a `CommandNotExecuted` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdNotExecutedCause {
    TransportIntegrityCheckError = 0,
    CommandTooLong = 1,
    CommandTooShort = 2,
    SequenceNumberInvalid = 3,
}

impl CmdNotExecutedCause {
    pub fn from_wire(code: u8) -> Result<Self, u8> {
        match code {
            0 => Ok(Self::TransportIntegrityCheckError),
            1 => Ok(Self::CommandTooLong),
            2 => Ok(Self::CommandTooShort),
            3 => Ok(Self::SequenceNumberInvalid),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for CmdNotExecutedCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::TransportIntegrityCheckError => {
                "command failed the transport integrity check, it was corrupted in transit"
            }
            Self::CommandTooLong => "received command exceeded the client's buffer size",
            Self::CommandTooShort => "received command was too short",
            Self::SequenceNumberInvalid => "sequence number of the received command is invalid",
        };
        f.write_str(text)
    }
}

/// Cause byte carried by an `AbortFileTransfer` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCause {
    Generic = 0,
    InvalidFile = 1,
    InvalidClientDeviceId = 2,
    AddressError = 3,
    EraseError = 4,
    WriteError = 5,
    ReadError = 6,
    ApplicationVersionError = 7,
}

impl AbortCause {
    pub fn from_wire(code: u8) -> Result<Self, u8> {
        match code {
            0 => Ok(Self::Generic),
            1 => Ok(Self::InvalidFile),
            2 => Ok(Self::InvalidClientDeviceId),
            3 => Ok(Self::AddressError),
            4 => Ok(Self::EraseError),
            5 => Ok(Self::WriteError),
            6 => Ok(Self::ReadError),
            7 => Ok(Self::ApplicationVersionError),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for AbortCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Generic => "generic problem encountered by the client",
            Self::InvalidFile => "generic problem with the update file",
            Self::InvalidClientDeviceId => {
                "the update file is not compatible with the client device ID"
            }
            Self::AddressError => "an invalid address is present in the update file",
            Self::EraseError => "client memory did not properly erase",
            Self::WriteError => "client memory did not properly write",
            Self::ReadError => "client memory did not properly read",
            Self::ApplicationVersionError => {
                "client did not allow changing to the application version in the update file"
            }
        };
        f.write_str(text)
    }
}

/// A command packet (host -> client).
#[derive(Debug, Clone)]
pub struct CommandPacket {
    pub sequence_number: u8,
    pub sync: bool,
    pub command: Command,
    pub data: Vec<u8>,
}

impl CommandPacket {
    pub fn new(command: Command, sync: bool, data: Vec<u8>) -> Self {
        Self {
            sequence_number: 0,
            sync,
            command,
            data,
        }
    }

    /// Encode the two-byte header plus payload.
    pub fn encode(&self) -> Vec<u8> {
        assert!(self.sequence_number < 32, "sequence number must be 5 bits");
        let mut header = self.sequence_number & HEADER_SEQUENCE_MASK;
        if self.sync {
            header |= HEADER_SYNC;
        }
        let mut buf = Vec::with_capacity(2 + self.data.len());
        buf.push(header);
        buf.push(self.command as u8);
        buf.extend_from_slice(&self.data);
        buf
    }
}

/// A status/response packet (client -> host).
#[derive(Debug, Clone)]
pub struct ResponsePacket {
    pub sequence_number: u8,
    pub resend: bool,
    pub status: Status,
    pub data: Vec<u8>,
}

impl ResponsePacket {
    /// Decode a received response frame's payload (post frame-check, the
    /// transport layer has already stripped the FCS).
    pub fn decode(packet: &[u8]) -> Result<Self, MdfuError> {
        if packet.len() < 2 {
            return Err(MdfuError::InvalidFrame("response packet shorter than header"));
        }
        let resend = packet[0] & HEADER_RESEND != 0;
        let sequence_number = packet[0] & HEADER_SEQUENCE_MASK;
        let status = Status::from_wire(packet[1])?;
        let data = packet[2..].to_vec();
        Ok(Self {
            sequence_number,
            resend,
            status,
            data,
        })
    }
}
