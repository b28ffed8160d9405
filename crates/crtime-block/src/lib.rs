#![forbid(unsafe_code)]

//! Byte-device backends.
//!
//! The on-disk parsers never touch files directly; they read through the
//! [`ByteDevice`] seam. Production code uses [`FileByteDevice`] (a
//! read-only file or raw block device); tests substitute
//! [`MemByteDevice`] and never hit the filesystem.

use crtime_types::ByteOffset;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("read out of bounds: offset {offset}, len {len}, device length {device_len}")]
    OutOfBounds {
        offset: u64,
        len: usize,
        device_len: u64,
    },
}

/// Random-access read-only byte source with pread semantics.
///
/// Reads take `&self`; there is no cursor to share or race.
pub trait ByteDevice {
    /// Total device length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` from `offset`. Short reads are errors.
    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<(), DeviceError>;
}

fn check_bounds(offset: ByteOffset, len: usize, device_len: u64) -> Result<(), DeviceError> {
    match offset.checked_add(len as u64) {
        Some(end) if end.0 <= device_len => Ok(()),
        _ => Err(DeviceError::OutOfBounds {
            offset: offset.0,
            len,
            device_len,
        }),
    }
}

/// Read-only file-backed device (regular image file or raw block device).
#[derive(Debug)]
pub struct FileByteDevice {
    file: File,
    len: u64,
}

impl FileByteDevice {
    /// Open `path` read-only and capture its length.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ByteDevice for FileByteDevice {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_bounds(offset, buf.len(), self.len)?;
        self.file.read_exact_at(buf, offset.0)?;
        Ok(())
    }
}

/// In-memory device for tests and synthetic images.
#[derive(Debug, Clone)]
pub struct MemByteDevice {
    bytes: Vec<u8>,
}

impl MemByteDevice {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl ByteDevice for MemByteDevice {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_bounds(offset, buf.len(), self.len())?;
        let start = usize::try_from(offset.0).map_err(|_| DeviceError::OutOfBounds {
            offset: offset.0,
            len: buf.len(),
            device_len: self.len(),
        })?;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }
}
