//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate -- MAC, transport, and protocol
//! engine alike -- returns [`MdfuError`]. The protocol engine's retry loop
//! dispatches on [`MdfuError::is_retriable`] rather than matching individual
//! variants, so new retriable failure modes only need to be added in one
//! place.

use std::fmt;

use crate::packet::{AbortCause, CmdNotExecutedCause, Status};

/// Errors surfaced by the MDFU host stack.
#[derive(thiserror::Error, Debug)]
pub enum MdfuError {
    /// A MAC or image reader/writer I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A per-command or framing-level deadline elapsed before completion.
    #[error("operation timed out")]
    Timeout,

    /// A received frame was malformed (bad escape sequence, too short, or an
    /// unrecognized prefix).
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),

    /// The frame check sequence did not match the recomputed checksum.
    #[error("frame checksum mismatch")]
    Checksum,

    /// The client responded with a non-`Success` status.
    #[error("client reported {status:?}{cause}")]
    Protocol {
        status: Status,
        cause: ProtocolErrorCause,
    },

    /// Client info TLV data, or a protocol-version/buffer-size check, failed
    /// to parse or was out of bounds.
    #[error("failed to parse client info: {0}")]
    Parse(&'static str),

    /// `GetImageState` reported the image as invalid after the chunk loop
    /// completed.
    #[error("client reported the transferred image as invalid")]
    ImageInvalid,

    /// An incoming frame exceeded the configured receive buffer.
    #[error("frame exceeds configured buffer")]
    BufferOverflow,

    /// A response's sequence number did not match the outgoing command's.
    ///
    /// Some client firmwares historically did not check this; this
    /// implementation tightens that and treats a mismatch as a distinct,
    /// retriable category instead of silently accepting it.
    #[error("response sequence number {got} did not match expected {expected}")]
    UnexpectedSequence { expected: u8, got: u8 },

    /// The retry budget for a transaction was exhausted without success.
    #[error("exhausted retry budget without a successful transaction")]
    RetriesExhausted,
}

/// Detail attached to [`MdfuError::Protocol`] describing *why* the client
/// rejected a command, when the client provided a cause byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorCause {
    None,
    CommandNotExecuted(Result<CmdNotExecutedCause, u8>),
    AbortFileTransfer(Result<AbortCause, u8>),
}

impl fmt::Display for ProtocolErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolErrorCause::None => Ok(()),
            ProtocolErrorCause::CommandNotExecuted(Ok(cause)) => write!(f, " ({cause})"),
            ProtocolErrorCause::CommandNotExecuted(Err(raw)) => {
                write!(f, " (invalid cause code {raw})")
            }
            ProtocolErrorCause::AbortFileTransfer(Ok(cause)) => write!(f, " ({cause})"),
            ProtocolErrorCause::AbortFileTransfer(Err(raw)) => {
                write!(f, " (invalid cause code {raw})")
            }
        }
    }
}

impl MdfuError {
    /// Whether the protocol engine's retry loop should attempt this
    /// transaction again within its budget.
    ///
    /// Transport-level timeouts, transient I/O errors, malformed frames, and
    /// checksum mismatches are retriable. A non-`Success` client status and
    /// everything else (parse failures, invalid image state, buffer
    /// overflow) is fatal.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            MdfuError::Io(_)
                | MdfuError::Timeout
                | MdfuError::InvalidFrame(_)
                | MdfuError::Checksum
                | MdfuError::UnexpectedSequence { .. }
        )
    }
}
