//! Transport framing layer: produces/consumes MDFU packets over a MAC.
//!
//! Three variants share this module's [`Transport`] interface but differ
//! significantly in wire framing -- see the `serial`, `spi`, and `i2c`
//! submodules. Each owns its MAC exclusively for the transport's lifetime.

pub mod i2c;
pub mod serial;
pub mod spi;

use crate::error::MdfuError;
use crate::mac::Mac;

pub use i2c::I2cTransport;
pub use serial::SerialTransport;
pub use spi::SpiTransport;

type Result<T> = std::result::Result<T, MdfuError>;

/// Framing layer consumed by the protocol engine.
///
/// A transport owns an MDFU *packet* abstraction: `write` takes an encoded
/// MDFU command packet and frames/sends it; `read` blocks (bounded by
/// `timeout_seconds`) until a framed MDFU response packet arrives, unframes
/// it, and returns its payload.
pub trait Transport {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn write(&mut self, data: &[u8]) -> Result<()>;
    fn read(&mut self, timeout_seconds: f32) -> Result<Vec<u8>>;

    /// Adopt a client-advertised inter-transaction delay (ITD). `None`
    /// means the transport does not support this -- transports that don't
    /// need an ITD return "not implemented", and the engine treats that as
    /// benign.
    fn set_inter_transaction_delay(&mut self, _seconds: f32) -> Option<Result<()>> {
        None
    }
}

/// Selects which framing variant to construct: a thin map of transport kind
/// to transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    Spi,
    I2c,
}

/// Build a boxed transport of the requested kind over `mac`.
///
/// This is a thin factory over each variant's own constructor
/// (`SerialTransport::new`, `SpiTransport::new`, `I2cTransport::new`); use
/// those directly when the concrete type is known statically.
pub fn make_transport<M>(kind: TransportKind, mac: M) -> Box<dyn Transport>
where
    M: Mac + 'static,
{
    match kind {
        TransportKind::Serial => Box::new(SerialTransport::new(mac)),
        TransportKind::Spi => Box::new(SpiTransport::new(mac)),
        TransportKind::I2c => Box::new(I2cTransport::new(mac)),
    }
}
