//! Serial transport: byte-stuffed streaming framing over a byte-oriented
//! MAC.
//!
//! Frame: `START | esc(payload) | esc(fcs_lo) | esc(fcs_hi) | END`, where
//! `fcs = crc16(payload)` and `payload` is the raw MDFU packet bytes. Any
//! payload byte equal to a reserved code is replaced by `ESC` followed by
//! the byte's bitwise complement.
//!
//! `write` encodes the whole frame into an owned scratch buffer and issues
//! a single `Mac::write` call, rather than one MAC write per encoded byte
//! -- a partial write failure then fails the whole frame instead of
//! leaving a frame half-sent.

use crate::checksum::crc16;
use crate::error::MdfuError;
use crate::mac::Mac;
use crate::timeout::Timeout;
use crate::transport::{Result, Transport};
use crate::{MDFU_MAX_COMMAND_DATA_LENGTH, MDFU_MAX_RESPONSE_DATA_LENGTH};

const FRAME_START_CODE: u8 = 0x56;
const FRAME_END_CODE: u8 = 0x9E;
const ESCAPE_SEQ_CODE: u8 = 0xCC;

/// Worst-case decoded frame size: a 2-byte MDFU header/status, the larger
/// of the two configured max payload lengths, and a 2-byte FCS.
const MAX_DECODED_FRAME: usize =
    2 + if MDFU_MAX_COMMAND_DATA_LENGTH > MDFU_MAX_RESPONSE_DATA_LENGTH {
        MDFU_MAX_COMMAND_DATA_LENGTH
    } else {
        MDFU_MAX_RESPONSE_DATA_LENGTH
    } + 2;

fn escape_byte(byte: u8, out: &mut Vec<u8>) {
    match byte {
        FRAME_START_CODE => {
            out.push(ESCAPE_SEQ_CODE);
            out.push(!FRAME_START_CODE);
        }
        FRAME_END_CODE => {
            out.push(ESCAPE_SEQ_CODE);
            out.push(!FRAME_END_CODE);
        }
        ESCAPE_SEQ_CODE => {
            out.push(ESCAPE_SEQ_CODE);
            out.push(!ESCAPE_SEQ_CODE);
        }
        other => out.push(other),
    }
}

fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let fcs = crc16(payload);
    let mut frame = Vec::with_capacity(1 + payload.len() * 2 + 5);
    frame.push(FRAME_START_CODE);
    for &byte in payload {
        escape_byte(byte, &mut frame);
    }
    for &byte in &fcs.to_le_bytes() {
        escape_byte(byte, &mut frame);
    }
    frame.push(FRAME_END_CODE);
    frame
}

/// Byte-stuffed streaming transport: a `START`/`END`-delimited frame with
/// an escape code, over a byte-oriented MAC (UART or a socket standing in
/// for one).
pub struct SerialTransport<M> {
    mac: M,
}

impl<M: Mac> SerialTransport<M> {
    pub fn new(mac: M) -> Self {
        Self { mac }
    }

    /// Consume and discard bytes until `FRAME_START_CODE` is seen or
    /// `timer` expires. A MAC read error does not abort the resync -- it
    /// keeps consuming until the deadline so the next call starts clean.
    fn resync(&mut self, timer: &Timeout) -> Result<()> {
        let mut byte = [0u8; 1];
        loop {
            if let Ok(1) = self.mac.read(&mut byte) {
                if byte[0] == FRAME_START_CODE {
                    return Ok(());
                }
            }
            if timer.is_expired() {
                return Err(MdfuError::Timeout);
            }
        }
    }

    /// Read and inverse-escape bytes into `out` until `FRAME_END_CODE` is
    /// seen, or fail on an invalid escape sequence, buffer overflow, or
    /// timeout.
    fn accumulate(&mut self, timer: &Timeout, out: &mut Vec<u8>) -> Result<()> {
        let mut escape_pending = false;
        let mut byte = [0u8; 1];
        loop {
            if out.len() >= MAX_DECODED_FRAME {
                return Err(MdfuError::BufferOverflow);
            }
            let read = self.mac.read(&mut byte)?;
            if read == 1 {
                let b = byte[0];
                if b == FRAME_END_CODE {
                    return Ok(());
                }
                if escape_pending {
                    escape_pending = false;
                    let decoded = if b == !FRAME_START_CODE {
                        FRAME_START_CODE
                    } else if b == !FRAME_END_CODE {
                        FRAME_END_CODE
                    } else if b == !ESCAPE_SEQ_CODE {
                        ESCAPE_SEQ_CODE
                    } else {
                        return Err(MdfuError::InvalidFrame(
                            "invalid code after escape code",
                        ));
                    };
                    out.push(decoded);
                } else if b == ESCAPE_SEQ_CODE {
                    escape_pending = true;
                } else {
                    out.push(b);
                }
            }
            if timer.is_expired() {
                return Err(MdfuError::Timeout);
            }
        }
    }
}

impl<M: Mac> Transport for SerialTransport<M> {
    fn open(&mut self) -> Result<()> {
        self.mac.open()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.mac.close()?;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let frame = encode_frame(data);
        log::trace!("serial transport sending frame: {:02x?}", data);
        self.mac.write(&frame)?;
        Ok(())
    }

    fn read(&mut self, timeout_seconds: f32) -> Result<Vec<u8>> {
        let timer = Timeout::armed(timeout_seconds);
        self.resync(&timer)?;
        let mut decoded = Vec::new();
        self.accumulate(&timer, &mut decoded)?;

        if decoded.len() < 3 {
            return Err(MdfuError::InvalidFrame(
                "frame shorter than header plus checksum",
            ));
        }
        let split = decoded.len() - 2;
        let (payload, fcs_bytes) = decoded.split_at(split);
        let received_fcs = u16::from_le_bytes([fcs_bytes[0], fcs_bytes[1]]);
        let computed_fcs = crc16(payload);
        if computed_fcs != received_fcs {
            log::debug!(
                "serial transport FCS mismatch: calculated {:#06x} but got {:#06x}",
                computed_fcs,
                received_fcs
            );
            return Err(MdfuError::Checksum);
        }
        log::trace!("serial transport received frame: {:02x?}", payload);
        Ok(payload.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::tests::LoopbackMac;

    #[test]
    fn escape_round_trip_for_each_special_byte() {
        // Escaping [0x56], [0x9E], [0xCC] each over serial framing.
        for &special in &[FRAME_START_CODE, FRAME_END_CODE, ESCAPE_SEQ_CODE] {
            let payload = [special];
            let frame = encode_frame(&payload);
            assert_eq!(frame[0], FRAME_START_CODE);
            assert_eq!(frame[1], ESCAPE_SEQ_CODE);
            assert_eq!(frame[2], !special);
            assert_eq!(*frame.last().unwrap(), FRAME_END_CODE);
        }
    }

    #[test]
    fn escape_round_trip_matches_literal_wire_bytes() {
        // Literal expected frames (fcs omitted, checked separately).
        assert_eq!(
            &encode_frame(&[0x56])[0..3],
            &[0x56, 0xCC, 0xA9]
        );
        assert_eq!(
            &encode_frame(&[0x9E])[0..3],
            &[0x56, 0xCC, 0x61]
        );
        assert_eq!(
            &encode_frame(&[0xCC])[0..3],
            &[0x56, 0xCC, 0x33]
        );
    }

    #[test]
    fn get_client_info_frame_matches_known_capture() {
        // A known-good get-client-info frame capture.
        let frame = encode_frame(&[0x80, 0x01]);
        assert_eq!(frame, vec![0x56, 0x80, 0x01, 0x7F, 0xFE, 0x9E]);
    }

    #[test]
    fn write_then_read_round_trips_arbitrary_payload() {
        let mac = LoopbackMac::new();
        let mut transport = SerialTransport::new(mac);
        for payload in [
            vec![0x80, 0x01],
            vec![0x01, 0x02, 0x03, 0x04, 0x05],
            (0..=255u16).map(|b| (b % 256) as u8).collect::<Vec<_>>(),
        ] {
            transport.write(&payload).unwrap();
            let received = transport.read(1.0).unwrap();
            assert_eq!(received, payload);
        }
    }

    #[test]
    fn corrupted_frame_fails_checksum() {
        let mac = LoopbackMac::new();
        let mut transport = SerialTransport::new(mac);
        transport.write(&[0x01, 0x02, 0x03]).unwrap();
        // Flip a bit in the buffered frame before the "client" "sends" it.
        transport.mac.corrupt_first_payload_byte();
        assert!(matches!(transport.read(1.0), Err(MdfuError::Checksum)));
    }

    #[test]
    fn read_times_out_when_no_start_code_arrives() {
        let mac = LoopbackMac::new();
        let mut transport = SerialTransport::new(mac);
        assert!(matches!(transport.read(0.02), Err(MdfuError::Timeout)));
    }
}
