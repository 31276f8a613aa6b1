//! MAC interface: the byte-level I/O contract a transport drives.
//!
//! Concrete MAC drivers (serial port configuration, socket connect,
//! spidev/i2cdev ioctl handling) are external collaborators -- this module
//! defines the contract only. `src/bin/main.rs` wires up one illustrative
//! serial adapter on top of `serialport::SerialPort` to make the crate
//! runnable end to end; production integrations supply their own.

/// Byte-level I/O driver for a physical link.
///
/// Implementations are expected to enforce their own short read timeout
/// (roughly 100 ms for serial, 5 s for a socket) so that `read` always
/// returns promptly; the transport layer above builds its framing-level
/// timeout out of repeated bounded reads.
pub trait Mac {
    /// Open the underlying link. Idempotent on success.
    fn open(&mut self) -> std::io::Result<()>;

    /// Close the underlying link. Idempotent on success.
    fn close(&mut self) -> std::io::Result<()>;

    /// Read up to `out.len()` bytes, returning the number of bytes actually
    /// read (`0` is a valid, non-error result: no data was available within
    /// the driver's own internal timeout).
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize>;

    /// Write `buf` in full, returning the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
}

/// In-memory `Mac` test doubles shared across the transport test suites,
/// so framing logic can be exercised without a real link.
#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    /// A single-ended FIFO loopback: everything written is later read back
    /// byte for byte, standing in for "the bytes that would appear on the
    /// wire" in transport codec tests that only need to check that framing
    /// round-trips and that corruption is detected.
    pub struct LoopbackMac {
        wire: VecDeque<u8>,
    }

    impl LoopbackMac {
        pub fn new() -> Self {
            Self {
                wire: VecDeque::new(),
            }
        }

        /// Flip the first payload byte already queued on the wire (index 1,
        /// just past the frame start code), simulating transit corruption
        /// after a `write` and before the matching `read`.
        pub fn corrupt_first_payload_byte(&mut self) {
            if let Some(byte) = self.wire.get_mut(1) {
                *byte ^= 0xFF;
            }
        }
    }

    impl super::Mac for LoopbackMac {
        fn open(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            match self.wire.pop_front() {
                Some(byte) => {
                    out[0] = byte;
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.wire.extend(buf.iter().copied());
            Ok(buf.len())
        }
    }
}
