//! The MDFU protocol engine: packet encode/decode, the sequence/retry
//! transaction loop, and the update/dump/change-mode state machines.

use std::time::Duration;

use crate::client_info::ClientInfo;
use crate::error::{MdfuError, ProtocolErrorCause};
use crate::image_reader::ImageReader;
use crate::image_writer::ImageWriter;
use crate::packet::{AbortCause, CmdNotExecutedCause, Command, CommandPacket, ResponsePacket, Status};
use crate::transport::Transport;
use crate::{MDFU_MAX_COMMAND_DATA_LENGTH, MDFU_PROTOCOL_VERSION_MAJOR, MDFU_PROTOCOL_VERSION_MINOR, MDFU_PROTOCOL_VERSION_PATCH};

/// Fixed timeout for the very first transaction of a session, before any
/// client-advertised timeout is known.
const INITIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// A single host/client update session. Owns its transport exclusively for
/// the session's lifetime.
pub struct Session {
    transport: Box<dyn Transport>,
    sequence: u8,
    retries: u32,
    client: Option<ClientInfo>,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>, retries: u32) -> Self {
        Self {
            transport,
            sequence: 0,
            retries,
            client: None,
        }
    }

    pub fn open(&mut self) -> Result<(), MdfuError> {
        self.transport.open()
    }

    pub fn close(&mut self) -> Result<(), MdfuError> {
        self.transport.close()
    }

    /// Cached client info, if `get_client_info` has already run successfully.
    pub fn client_info(&self) -> Option<&ClientInfo> {
        self.client.as_ref()
    }

    /// Negotiate (or return the cached) client identity and timing/buffer
    /// parameters.
    pub fn get_client_info(&mut self) -> Result<&ClientInfo, MdfuError> {
        if self.client.is_none() {
            let packet = CommandPacket::new(Command::GetClientInfo, true, Vec::new());
            let response = self.send_cmd(packet, INITIAL_TIMEOUT)?;
            let info = ClientInfo::decode(&response.data)?;
            log::info!("client reports MDFU protocol version {}", info.version);
            self.client = Some(info);
        }
        Ok(self.client.as_ref().expect("just populated"))
    }

    /// Drive a full firmware update: negotiate client info, validate
    /// compatibility, stream the image in client-sized chunks, and confirm
    /// the client accepted it.
    pub fn run_update(&mut self, image_reader: &mut dyn ImageReader) -> Result<(), MdfuError> {
        let info = self.get_client_info()?.clone();

        let host_version = (
            MDFU_PROTOCOL_VERSION_MAJOR,
            MDFU_PROTOCOL_VERSION_MINOR,
            MDFU_PROTOCOL_VERSION_PATCH,
        );
        let client_version = (info.version.major, info.version.minor, info.version.patch);
        if client_version > host_version {
            return Err(MdfuError::Parse(
                "client protocol version is newer than this host supports",
            ));
        }
        if info.buffer_size as usize > MDFU_MAX_COMMAND_DATA_LENGTH {
            return Err(MdfuError::Parse(
                "client buffer size exceeds the host's configured maximum",
            ));
        }

        if let Some(result) = self
            .transport
            .set_inter_transaction_delay(info.inter_transaction_delay.as_secs_f32())
        {
            result?;
        }

        self.send_cmd(
            CommandPacket::new(Command::StartTransfer, false, Vec::new()),
            info.timeout_for(Command::StartTransfer),
        )?;

        let chunk_size = info.buffer_size as usize;
        let mut chunk = vec![0u8; chunk_size];
        loop {
            let read = image_reader.read(&mut chunk)?;
            if read > 0 {
                self.send_cmd(
                    CommandPacket::new(Command::WriteChunk, false, chunk[..read].to_vec()),
                    info.timeout_for(Command::WriteChunk),
                )?;
            }
            if read < chunk_size {
                break;
            }
        }

        let state = self.send_cmd(
            CommandPacket::new(Command::GetImageState, false, Vec::new()),
            info.timeout_for(Command::GetImageState),
        )?;
        if state.data.first() != Some(&1) {
            log::warn!("client reported the transferred image as invalid, aborting before end-transfer");
            return Err(MdfuError::ImageInvalid);
        }

        self.send_cmd(
            CommandPacket::new(Command::EndTransfer, false, Vec::new()),
            info.timeout_for(Command::EndTransfer),
        )?;
        Ok(())
    }

    /// Report the negotiated client parameters through an image writer,
    /// since the wire protocol exposes no bulk image-readback command.
    pub fn run_dump(&mut self, image_writer: &mut dyn ImageWriter) -> Result<(), MdfuError> {
        let info = self.get_client_info()?.clone();
        image_writer.write(info.to_string().as_bytes())?;
        Ok(())
    }

    /// Ask the client to change mode (typically application <-> bootloader)
    /// via a bare `EndTransfer`, with no preceding transfer.
    pub fn run_change_mode(&mut self) -> Result<(), MdfuError> {
        let info = self.get_client_info()?.clone();
        self.send_cmd(
            CommandPacket::new(Command::EndTransfer, false, Vec::new()),
            info.timeout_for(Command::EndTransfer),
        )?;
        Ok(())
    }

    /// The retry/transaction loop shared by every command.
    fn send_cmd(
        &mut self,
        mut packet: CommandPacket,
        timeout: Duration,
    ) -> Result<ResponsePacket, MdfuError> {
        if packet.sync {
            self.sequence = 0;
        }
        packet.sequence_number = self.sequence;
        let timeout_seconds = timeout.as_secs_f32();

        let mut last_err = None;
        for attempt in 0..self.retries {
            let encoded = packet.encode();

            if let Err(err) = self.transport.write(&encoded) {
                log::debug!("send_cmd attempt {attempt}: write failed: {err}");
                if !err.is_retriable() {
                    return Err(err);
                }
                last_err = Some(err);
                continue;
            }

            let raw = match self.transport.read(timeout_seconds) {
                Ok(raw) => raw,
                Err(err) => {
                    log::debug!("send_cmd attempt {attempt}: read failed: {err}");
                    if !err.is_retriable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                    continue;
                }
            };

            let response = match ResponsePacket::decode(&raw) {
                Ok(response) => response,
                Err(err) => {
                    log::debug!("send_cmd attempt {attempt}: malformed response: {err}");
                    if !err.is_retriable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                    continue;
                }
            };

            if response.sequence_number != packet.sequence_number {
                let err = MdfuError::UnexpectedSequence {
                    expected: packet.sequence_number,
                    got: response.sequence_number,
                };
                log::debug!("send_cmd attempt {attempt}: {err}");
                last_err = Some(err);
                continue;
            }

            if response.resend {
                log::debug!(
                    "client requested a resend of sequence {}",
                    packet.sequence_number
                );
                continue;
            }

            self.sequence = (self.sequence + 1) % 32;

            if response.status != Status::Success {
                let cause = diagnose(&response);
                log_cause(response.status, &cause);
                return Err(MdfuError::Protocol {
                    status: response.status,
                    cause,
                });
            }
            return Ok(response);
        }

        log::debug!(
            "retry budget of {} exhausted, last error: {:?}",
            self.retries,
            last_err
        );
        Err(MdfuError::RetriesExhausted)
    }
}

fn diagnose(response: &ResponsePacket) -> ProtocolErrorCause {
    match response.status {
        Status::CommandNotExecuted => ProtocolErrorCause::CommandNotExecuted(
            response
                .data
                .first()
                .map(|&b| CmdNotExecutedCause::from_wire(b))
                .unwrap_or(Err(0)),
        ),
        Status::AbortFileTransfer => ProtocolErrorCause::AbortFileTransfer(
            response
                .data
                .first()
                .map(|&b| AbortCause::from_wire(b))
                .unwrap_or(Err(0)),
        ),
        _ => ProtocolErrorCause::None,
    }
}

fn log_cause(status: Status, cause: &ProtocolErrorCause) {
    match cause {
        ProtocolErrorCause::None => log::warn!("client reported {status:?}"),
        other => log::warn!("client reported {status:?}{other}"),
    }
}
