//! A host-side implementation of the Microchip Device Firmware Update
//! (MDFU) client/host protocol.
//!
//! A host application drives a firmware update session against an
//! embedded client device over one of several physical links (UART
//! serial, SPI, I²C, or a TCP-tunneled equivalent).
//!
//! The core pieces, from the bottom up:
//! - [`checksum`]: the CRC-16 frame check sequence shared by every framed
//!   transport.
//! - [`timeout`]: the monotonic deadline primitive.
//! - [`mac`], [`image_reader`], [`image_writer`]: the external-collaborator
//!   contracts (byte-level link driver, image source/sink).
//! - [`packet`], [`client_info`]: the MDFU wire data model.
//! - [`transport`]: the three framing variants (serial, SPI, I²C).
//! - [`session`]: the protocol engine's state machine, retry loop, and the
//!   host orchestrator entry points (`update`, `client-info`, `dump`,
//!   `change-mode`).

pub mod checksum;
pub mod client_info;
pub mod error;
pub mod image_reader;
pub mod image_writer;
pub mod mac;
pub mod packet;
pub mod session;
pub mod timeout;
pub mod transport;

pub use client_info::ClientInfo;
pub use error::MdfuError;
pub use image_reader::ImageReader;
pub use image_writer::ImageWriter;
pub use mac::Mac;
pub use session::Session;
pub use transport::{Transport, TransportKind};

/// Crate-local result alias; every fallible operation returns a typed
/// [`MdfuError`] rather than a boxed trait object, since the engine's retry
/// loop dispatches on error category (see [`MdfuError::is_retriable`]).
pub type Result<T> = std::result::Result<T, MdfuError>;

/// Host-supported MDFU protocol version. `Session::run_update` rejects any
/// client whose advertised version is newer (major, then minor, then
/// patch) than this.
pub const MDFU_PROTOCOL_VERSION_MAJOR: u8 = 1;
pub const MDFU_PROTOCOL_VERSION_MINOR: u8 = 0;
pub const MDFU_PROTOCOL_VERSION_PATCH: u8 = 0;

/// Largest command payload this host will construct or accept, bounding
/// the scratch buffers the transport layer allocates. The effective chunk
/// size during an update is `min(MDFU_MAX_COMMAND_DATA_LENGTH,
/// client_info.buffer_size)`.
pub const MDFU_MAX_COMMAND_DATA_LENGTH: usize = 1024;

/// Largest response payload this host will accept.
pub const MDFU_MAX_RESPONSE_DATA_LENGTH: usize = 1024;

/// Default per-command retry budget used by the orchestrator binary; the
/// library itself takes this as a `Session::new` argument rather than a
/// global.
pub const DEFAULT_RETRIES: u32 = 3;
