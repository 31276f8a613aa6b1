//! Image writer interface consumed by `Session::run_dump`, the mirror image
//! of [`crate::image_reader::ImageReader`].
//!
//! As with the reader side, a concrete file-backed implementation is an
//! external collaborator; this module defines the contract only.

pub trait ImageWriter {
    fn open(&mut self, path: &str) -> std::io::Result<()>;
    fn close(&mut self) -> std::io::Result<()>;
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
}
