//! Image reader interface consumed by the protocol engine.
//!
//! The concrete file-descriptor-backed implementation is an external
//! collaborator; this module defines the contract only.

/// A restartable, finite lazy sequence of bytes: the firmware image being
/// streamed to the client.
///
/// Once `open` succeeds, repeated `read` calls return the next up-to-`n`
/// bytes of the image. A `read` returning fewer bytes than requested
/// signals end-of-stream on that call or the next; a subsequent `read`
/// after end-of-stream returns `0`.
pub trait ImageReader {
    fn open(&mut self, path: &str) -> std::io::Result<()>;
    fn close(&mut self) -> std::io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}
