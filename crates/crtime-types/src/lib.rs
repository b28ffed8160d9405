#![forbid(unsafe_code)]

//! Shared vocabulary for the crtime tool: on-disk constants, unit-carrying
//! newtypes, and the fixed-offset little-endian read helpers every parser
//! in the workspace is built on.
//!
//! Nothing here overlays a native struct onto raw bytes. Every field read
//! is "take N bytes at offset K, interpret little-endian", which keeps the
//! layout independent of host padding and alignment rules and lets tests
//! pin the literal offsets.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Byte offset of the superblock from the start of the device.
pub const EXT4_SUPERBLOCK_OFFSET: u64 = 1024;
/// Size of the on-disk superblock region in bytes.
pub const EXT4_SUPERBLOCK_SIZE: usize = 1024;
/// `s_magic` value identifying an ext-family superblock.
pub const EXT4_SUPER_MAGIC: u16 = 0xEF53;

/// `s_rev_level` for original-format superblocks (fixed 128-byte inodes,
/// no `s_inode_size` field at all).
pub const EXT4_GOOD_OLD_REV: u32 = 0;
/// `s_rev_level` for dynamic-revision superblocks, the first revision in
/// which byte offset 88 (`s_inode_size`) is meaningful.
pub const EXT4_DYNAMIC_REV: u32 = 1;

/// The inode record size this tool requires. The extended timestamp words
/// it decodes do not exist in the good-old 128-byte layout.
pub const EXT4_LARGE_INODE_SIZE: u16 = 256;

/// ext4 inode number (1-based; inode 0 is never allocated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u32);

/// Block group index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupNumber(pub u32);

/// Byte offset on a byte device (pread semantics).
///
/// Unit-carrying wrapper to prevent mixing byte and block offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

impl ByteOffset {
    /// Add a byte count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

/// Block group containing `ino`.
#[must_use]
pub fn inode_to_group(ino: InodeNumber, inodes_per_group: u32) -> GroupNumber {
    GroupNumber(ino.0.saturating_sub(1) / inodes_per_group)
}

/// Zero-based index of `ino` within its block group's inode table.
#[must_use]
pub fn inode_index_in_group(ino: InodeNumber, inodes_per_group: u32) -> u32 {
    ino.0.saturating_sub(1) % inodes_per_group
}

/// Block size encoded as `1024 << s_log_block_size`, or `None` when the
/// shift is nonsense.
#[must_use]
pub fn ext4_block_size_from_log(log_block_size: u32) -> Option<u32> {
    let shift = 10_u32.checked_add(log_block_size)?;
    1_u32.checked_shl(shift)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u64, actual: u64 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Decode a NUL-padded fixed-width label field (e.g. `s_volume_name`).
#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_owned()
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
