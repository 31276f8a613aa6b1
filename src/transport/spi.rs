//! SPI transport: full-duplex, frame-type-prefixed polling protocol.
//!
//! Every exchange on the bus is a same-size write-then-read pair (the
//! client's reply rides the clock edges generated by the host's own
//! write), so a "poll" here is a whole extra bus transaction rather than
//! a cheap check. Three frame shapes:
//!
//! - Command frame (host -> client): `0x11 | payload | fcs_lo | fcs_hi`.
//! - Length-retrieval poll (host -> client, all-zero besides the type
//!   byte): `0x55 | 0x00 x (N-1)`, sized to fit the client's reply.
//! - Client reply, read back in the same transaction: either a "busy"
//!   frame (anything not matching the expected prefix) or `.. | 'L' 'E'
//!   'N' | len_lo len_hi | fcs_lo fcs_hi` for the length poll, and
//!   `.. | 'R' 'S' 'P' | payload.. | fcs_lo fcs_hi` once the response
//!   itself is polled at the now-known length.

use crate::checksum::crc16;
use crate::error::MdfuError;
use crate::mac::Mac;
use crate::timeout::Timeout;
use crate::transport::{Result, Transport};

const FRAME_TYPE_CMD: u8 = 0x11;
const FRAME_TYPE_RSP_RETRIEVAL: u8 = 0x55;
const FRAME_TYPE_SIZE: usize = 1;
const FRAME_CHECKSUM_SIZE: usize = 2;
/// Bytes occupied by the frame type plus the 3-byte ASCII prefix the client
/// echoes ("LEN" or "RSP") ahead of its payload.
const CLIENT_RSP_PREFIX_SIZE: usize = 4;
const LENGTH_FIELD_SIZE: usize = 2;

fn encode_command_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_TYPE_SIZE + payload.len() + FRAME_CHECKSUM_SIZE);
    frame.push(FRAME_TYPE_CMD);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc16(payload).to_le_bytes());
    frame
}

/// Build an all-zero (besides the type byte) retrieval poll frame sized so
/// the client's reply of `payload_size` bytes fits in the same transaction.
fn encode_retrieval_frame(payload_size: usize) -> Vec<u8> {
    vec![0u8; payload_size + CLIENT_RSP_PREFIX_SIZE]
        .into_iter()
        .enumerate()
        .map(|(i, b)| if i == 0 { FRAME_TYPE_RSP_RETRIEVAL } else { b })
        .collect()
}

pub struct SpiTransport<M> {
    mac: M,
    itd_timer: Timeout,
    itd_delay_seconds: f32,
}

impl<M: Mac> SpiTransport<M> {
    pub fn new(mac: M) -> Self {
        Self {
            mac,
            itd_timer: Timeout::expired(),
            itd_delay_seconds: 0.0,
        }
    }

    fn wait_for_itd(&self) {
        while !self.itd_timer.is_expired() {}
    }

    /// A single write-then-read SPI transaction: wait out the inter
    /// transaction delay, send `frame`, then read back exactly as many
    /// bytes as were sent.
    fn transfer(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.wait_for_itd();
        let write_result = self.mac.write(frame);
        self.itd_timer = Timeout::armed(self.itd_delay_seconds);
        write_result?;

        let mut response = vec![0u8; frame.len()];
        let read = self.mac.read(&mut response)?;
        if read != frame.len() {
            return Err(MdfuError::InvalidFrame(
                "SPI MAC layer read size did not match write size",
            ));
        }
        log::trace!("SPI transport transaction: sent {:02x?}, got {:02x?}", frame, response);
        Ok(response)
    }

    fn poll_for_response_length(&mut self, timer: &Timeout) -> Result<usize> {
        let frame = encode_retrieval_frame(LENGTH_FIELD_SIZE + FRAME_CHECKSUM_SIZE);
        loop {
            let response = self.transfer(&frame)?;
            if &response[1..4] == b"LEN" {
                let length_field = &response[4..4 + LENGTH_FIELD_SIZE];
                let data_size = u16::from_le_bytes([length_field[0], length_field[1]]) as usize;
                let received_fcs = u16::from_le_bytes([response[6], response[7]]);
                if crc16(length_field) != received_fcs {
                    return Err(MdfuError::Checksum);
                }
                if data_size < 2 {
                    return Err(MdfuError::InvalidFrame(
                        "SPI response length frame reports fewer than 2 bytes",
                    ));
                }
                if data_size - FRAME_CHECKSUM_SIZE > crate::MDFU_MAX_RESPONSE_DATA_LENGTH {
                    return Err(MdfuError::BufferOverflow);
                }
                return Ok(data_size);
            }
            log::debug!("SPI transport received a busy frame while polling for length");
            if timer.is_expired() {
                return Err(MdfuError::Timeout);
            }
        }
    }

    fn poll_for_response(&mut self, timer: &Timeout, response_length: usize) -> Result<Vec<u8>> {
        if response_length < FRAME_CHECKSUM_SIZE {
            return Err(MdfuError::InvalidFrame(
                "SPI response length frame reports fewer than 2 bytes",
            ));
        }
        let frame = encode_retrieval_frame(response_length);
        loop {
            let response = self.transfer(&frame)?;
            if &response[1..4] == b"RSP" {
                let frame_size = response.len();
                let received_fcs =
                    u16::from_le_bytes([response[frame_size - 2], response[frame_size - 1]]);
                let payload = &response[CLIENT_RSP_PREFIX_SIZE..frame_size - FRAME_CHECKSUM_SIZE];
                if crc16(payload) != received_fcs {
                    return Err(MdfuError::Checksum);
                }
                return Ok(payload.to_vec());
            }
            log::debug!("SPI transport received a busy frame while polling for response");
            if timer.is_expired() {
                return Err(MdfuError::Timeout);
            }
        }
    }
}

impl<M: Mac> Transport for SpiTransport<M> {
    fn open(&mut self) -> Result<()> {
        self.mac.open()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.mac.close()?;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let frame = encode_command_frame(data);
        log::trace!("SPI transport sending command frame: {:02x?}", data);
        self.transfer(&frame)?;
        Ok(())
    }

    fn read(&mut self, timeout_seconds: f32) -> Result<Vec<u8>> {
        let timer = Timeout::armed(timeout_seconds);
        let response_length = self.poll_for_response_length(&timer)?;
        self.poll_for_response(&timer, response_length)
    }

    fn set_inter_transaction_delay(&mut self, seconds: f32) -> Option<Result<()>> {
        self.itd_delay_seconds = seconds;
        Some(Ok(()))
    }
}
