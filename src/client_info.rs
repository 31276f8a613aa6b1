//! Client info: the TLV-encoded identity and negotiation data the client
//! returns from `GetClientInfo`.

use std::fmt;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::MdfuError;
use crate::packet::MAX_MDFU_CMD;

const PARAM_PROTOCOL_VERSION: u8 = 1;
const PARAM_BUFFER_INFO: u8 = 2;
const PARAM_COMMAND_TIMEOUT: u8 = 3;
const PARAM_INTER_TRANSACTION_DELAY: u8 = 4;

const BUFFER_INFO_SIZE: usize = 3;
const COMMAND_TIMEOUT_SIZE: usize = 3;
const INTER_TRANSACTION_DELAY_SIZE: usize = 4;

/// A.B.C[-internal] protocol version triple reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub internal: Option<u8>,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(internal) = self.internal {
            write!(f, "-{internal}")?;
        }
        Ok(())
    }
}

/// Client identity and negotiation parameters decoded from `GetClientInfo`.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub version: ProtocolVersion,
    /// Maximum payload per packet the client will accept.
    pub buffer_size: u16,
    /// Informational; not used by the host for flow control.
    pub buffer_count: u8,
    /// Default command timeout, before any per-command override.
    pub default_timeout: Duration,
    /// Per-command timeout table, indexed by the `Command` enum's raw wire
    /// value (1..=5); slot 0 is unused, seeded with `default_timeout` like
    /// every other slot, indexed by the raw command code rather than
    /// `cmd - 1` to avoid an off-by-one between this table and the wire
    /// command codes.
    pub command_timeouts: [Duration; MAX_MDFU_CMD],
    /// Minimum pause the client requires between transport transactions.
    pub inter_transaction_delay: Duration,
}

impl ClientInfo {
    pub fn timeout_for(&self, command: crate::packet::Command) -> Duration {
        self.command_timeouts[command as usize]
    }

    /// Decode the TLV-encoded client info payload returned by
    /// `GetClientInfo`.
    pub fn decode(data: &[u8]) -> Result<Self, MdfuError> {
        let mut version = None;
        let mut buffer_size = None;
        let mut buffer_count = None;
        let mut default_timeout = Duration::from_secs(1);
        let mut command_timeouts = [Duration::from_secs(1); MAX_MDFU_CMD];
        let mut inter_transaction_delay = Duration::ZERO;

        let mut i = 0usize;
        while i < data.len() {
            if i + 2 > data.len() {
                return Err(MdfuError::Parse("truncated client info TLV header"));
            }
            let param_type = data[i];
            let param_len = data[i + 1] as usize;
            i += 2;
            if i + param_len > data.len() {
                return Err(MdfuError::Parse(
                    "client info parameter length exceeds available data",
                ));
            }
            let body = &data[i..i + param_len];

            match param_type {
                PARAM_PROTOCOL_VERSION => {
                    version = Some(decode_protocol_version(body)?);
                }
                PARAM_BUFFER_INFO => {
                    if param_len != BUFFER_INFO_SIZE {
                        return Err(MdfuError::Parse("invalid buffer info length"));
                    }
                    buffer_size = Some(LittleEndian::read_u16(&body[0..2]));
                    buffer_count = Some(body[2]);
                }
                PARAM_COMMAND_TIMEOUT => {
                    if param_len % COMMAND_TIMEOUT_SIZE != 0 {
                        return Err(MdfuError::Parse(
                            "command timeout parameter length is not a multiple of 3",
                        ));
                    }
                    let count = param_len / COMMAND_TIMEOUT_SIZE;
                    for entry in 0..count {
                        let base = entry * COMMAND_TIMEOUT_SIZE;
                        let cmd = body[base];
                        let timeout_01s = LittleEndian::read_u16(&body[base + 1..base + 3]);
                        let timeout = Duration::from_secs_f32(timeout_01s as f32 * 0.1);

                        if cmd == 0 {
                            if entry != 0 {
                                return Err(MdfuError::Parse(
                                    "default command timeout must be first in the parameter list",
                                ));
                            }
                            default_timeout = timeout;
                            command_timeouts = [timeout; MAX_MDFU_CMD];
                        } else if (cmd as usize) >= MAX_MDFU_CMD {
                            return Err(MdfuError::Parse(
                                "invalid command code in command timeout parameter",
                            ));
                        } else {
                            if entry == 0 {
                                return Err(MdfuError::Parse(
                                    "default command timeout must be first in the parameter list",
                                ));
                            }
                            command_timeouts[cmd as usize] = timeout;
                        }
                    }
                }
                PARAM_INTER_TRANSACTION_DELAY => {
                    if param_len != INTER_TRANSACTION_DELAY_SIZE {
                        return Err(MdfuError::Parse(
                            "invalid inter transaction delay parameter length",
                        ));
                    }
                    let nanos = LittleEndian::read_u32(body);
                    inter_transaction_delay = Duration::from_nanos(nanos as u64);
                }
                _ => return Err(MdfuError::Parse("unknown client info parameter type")),
            }
            i += param_len;
        }

        Ok(ClientInfo {
            version: version.ok_or(MdfuError::Parse("client info missing protocol version"))?,
            buffer_size: buffer_size.ok_or(MdfuError::Parse("client info missing buffer info"))?,
            buffer_count: buffer_count
                .ok_or(MdfuError::Parse("client info missing buffer info"))?,
            default_timeout,
            command_timeouts,
            inter_transaction_delay,
        })
    }
}

fn decode_protocol_version(body: &[u8]) -> Result<ProtocolVersion, MdfuError> {
    match body.len() {
        3 => Ok(ProtocolVersion {
            major: body[0],
            minor: body[1],
            patch: body[2],
            internal: None,
        }),
        4 => Ok(ProtocolVersion {
            major: body[0],
            minor: body[1],
            patch: body[2],
            internal: Some(body[3]),
        }),
        _ => Err(MdfuError::Parse(
            "protocol version parameter must be 3 or 4 bytes",
        )),
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MDFU client information")?;
        writeln!(f, "--------------------------------")?;
        writeln!(f, "- MDFU protocol version: {}", self.version)?;
        writeln!(f, "- Number of command buffers: {}", self.buffer_count)?;
        writeln!(f, "- Maximum packet data length: {} bytes", self.buffer_size)?;
        writeln!(
            f,
            "- Inter transaction delay: {:.9} seconds",
            self.inter_transaction_delay.as_secs_f64()
        )?;
        writeln!(f, "Command timeouts")?;
        writeln!(
            f,
            "- Default timeout: {:.1} seconds",
            self.default_timeout.as_secs_f64()
        )?;
        for (command, name) in [
            (crate::packet::Command::GetClientInfo, "Get Client Info"),
            (crate::packet::Command::StartTransfer, "Start Transfer"),
            (crate::packet::Command::WriteChunk, "Write Chunk"),
            (crate::packet::Command::GetImageState, "Get Image State"),
            (crate::packet::Command::EndTransfer, "End Transfer"),
        ] {
            writeln!(
                f,
                "- {}: {:.1} seconds",
                name,
                self.timeout_for(command).as_secs_f64()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_wire_capture() {
        // A known-good `GetClientInfo` response capture.
        let data = [
            0x02, 0x03, 0x80, 0x00, 0x02, 0x01, 0x03, 0x01, 0x02, 0x03, 0x03, 0x09, 0x00, 0x0A,
            0x00, 0x03, 0x0A, 0x00, 0x04, 0xF4, 0x01,
        ];
        let info = ClientInfo::decode(&data).unwrap();
        assert_eq!(info.buffer_size, 128);
        assert_eq!(info.buffer_count, 2);
        assert_eq!(info.version, ProtocolVersion { major: 1, minor: 2, patch: 3, internal: None });
        assert_eq!(info.default_timeout, Duration::from_secs_f32(1.0));
        assert_eq!(
            info.timeout_for(crate::packet::Command::WriteChunk),
            Duration::from_secs_f32(1.0)
        );
        assert_eq!(
            info.timeout_for(crate::packet::Command::GetImageState),
            Duration::from_secs_f32(50.0)
        );
    }

    #[test]
    fn default_timeout_must_come_first() {
        // Command timeout sub-record for WriteChunk (cmd=3) appears before
        // any default (cmd=0) entry -- invalid.
        let mut data = vec![1, 3, 1, 2, 3]; // protocol version
        data.extend_from_slice(&[2, 3, 0x80, 0x00, 0x02]); // buffer info
        data.extend_from_slice(&[3, 3, 0x03, 0x0A, 0x00]); // command timeout, cmd=3, no default first
        assert!(ClientInfo::decode(&data).is_err());
    }

    #[test]
    fn rejects_command_code_at_or_above_max() {
        let mut data = vec![1, 3, 1, 2, 3];
        data.extend_from_slice(&[2, 3, 0x80, 0x00, 0x02]);
        data.extend_from_slice(&[3, 6, 0x00, 0x0A, 0x00, 0x06, 0x0A, 0x00]);
        assert!(ClientInfo::decode(&data).is_err());
    }

    #[test]
    fn rejects_truncated_parameter() {
        let data = [1, 3, 1, 2]; // claims 3 bytes, only 2 present
        assert!(ClientInfo::decode(&data).is_err());
    }

    #[test]
    fn four_byte_protocol_version_carries_internal_build() {
        let mut data = vec![1, 4, 1, 2, 3, 7];
        data.extend_from_slice(&[2, 3, 0x80, 0x00, 0x02]);
        data.extend_from_slice(&[3, 3, 0x00, 0x0A, 0x00]);
        let info = ClientInfo::decode(&data).unwrap();
        assert_eq!(info.version.internal, Some(7));
    }
}
