#![forbid(unsafe_code)]

//! The opened-filesystem handle.
//!
//! [`Ext4Volume::open`] reads and validates the superblock once;
//! [`Ext4Volume::read_inode`] walks group descriptor → inode table →
//! full-size record read for each request. The backing device is a
//! constructor parameter so tests can run against in-memory images.

use crate::ext4::{Ext4GroupDesc, Ext4Inode, Ext4Superblock};
use crtime_block::{ByteDevice, DeviceError, FileByteDevice};
use crtime_types::{
    ByteOffset, EXT4_DYNAMIC_REV, EXT4_LARGE_INODE_SIZE, EXT4_SUPERBLOCK_OFFSET,
    EXT4_SUPERBLOCK_SIZE, GroupNumber, InodeNumber, ParseError,
};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("failed to open backing device")]
    Open(#[source] DeviceError),
    #[error("failed to read superblock region")]
    SuperblockRead(#[source] DeviceError),
    #[error("invalid superblock")]
    Superblock(#[source] ParseError),
    #[error("unsupported superblock revision {found} (inode size is only recorded in dynamic-revision superblocks)")]
    UnsupportedRevision { found: u32 },
    #[error("unsupported inode size {found} (creation time needs 256-byte inodes)")]
    UnsupportedInodeSize { found: u16 },
    #[error("inode {ino} out of range (filesystem has {inodes_count} inodes)")]
    InvalidInode { ino: u32, inodes_count: u32 },
    #[error("failed to read group descriptor {group}")]
    GroupDescRead {
        group: u32,
        #[source]
        source: DeviceError,
    },
    #[error("invalid group descriptor {group}")]
    GroupDescParse {
        group: u32,
        #[source]
        source: ParseError,
    },
    #[error("failed to read inode {ino}")]
    InodeRead {
        ino: u32,
        #[source]
        source: DeviceError,
    },
    #[error("invalid inode record {ino}")]
    InodeParse {
        ino: u32,
        #[source]
        source: ParseError,
    },
    #[error("device offset overflow locating {what}")]
    OffsetOverflow { what: &'static str },
}

/// An opened ext4 volume: the byte device plus the validated superblock.
///
/// Read-only; nothing is written back. Dropping the volume releases the
/// device on every exit path.
#[derive(Debug)]
pub struct Ext4Volume<D: ByteDevice> {
    device: D,
    raw_superblock: Vec<u8>,
    superblock: Ext4Superblock,
}

impl Ext4Volume<FileByteDevice> {
    /// Open `path` (image file or raw block device) read-only with the
    /// default file backend.
    pub fn open_path(path: &Path) -> Result<Self, VolumeError> {
        let device = FileByteDevice::open(path).map_err(VolumeError::Open)?;
        Self::open(device)
    }
}

impl<D: ByteDevice> Ext4Volume<D> {
    /// Read the superblock region, parse it, and validate magic, geometry,
    /// and (when the filesystem carries metadata checksums) the
    /// superblock CRC32C.
    ///
    /// Feature flags the tool does not understand are tolerated; an
    /// unfamiliar incompat bit must not prevent reading an inode record.
    pub fn open(device: D) -> Result<Self, VolumeError> {
        let mut raw = vec![0_u8; EXT4_SUPERBLOCK_SIZE];
        device
            .read_exact_at(ByteOffset(EXT4_SUPERBLOCK_OFFSET), &mut raw)
            .map_err(VolumeError::SuperblockRead)?;

        let superblock =
            Ext4Superblock::parse_superblock_region(&raw).map_err(VolumeError::Superblock)?;
        superblock
            .validate_geometry()
            .map_err(VolumeError::Superblock)?;
        superblock
            .validate_checksum(&raw)
            .map_err(VolumeError::Superblock)?;

        Ok(Self {
            device,
            raw_superblock: raw,
            superblock,
        })
    }

    #[must_use]
    pub fn superblock(&self) -> &Ext4Superblock {
        &self.superblock
    }

    /// Raw bytes of the superblock region as read from the device.
    #[must_use]
    pub fn raw_superblock(&self) -> &[u8] {
        &self.raw_superblock
    }

    /// Enforce the large-inode precondition before any inode read: the
    /// superblock must be dynamic-revision (revision 0 has no
    /// `s_inode_size` field, so byte 88 would be garbage) and the
    /// recorded inode size must be exactly 256.
    pub fn require_large_inodes(&self) -> Result<u16, VolumeError> {
        if self.superblock.rev_level < EXT4_DYNAMIC_REV {
            return Err(VolumeError::UnsupportedRevision {
                found: self.superblock.rev_level,
            });
        }
        let found = self.superblock.inode_size;
        if found != EXT4_LARGE_INODE_SIZE {
            return Err(VolumeError::UnsupportedInodeSize { found });
        }
        Ok(found)
    }

    fn read_group_desc(&self, group: GroupNumber) -> Result<Ext4GroupDesc, VolumeError> {
        let desc_size = self.superblock.group_desc_size();
        let offset = self
            .superblock
            .group_desc_offset(group)
            .ok_or(VolumeError::OffsetOverflow {
                what: "group descriptor",
            })?;

        let mut raw = vec![0_u8; usize::from(desc_size)];
        self.device
            .read_exact_at(ByteOffset(offset), &mut raw)
            .map_err(|source| VolumeError::GroupDescRead {
                group: group.0,
                source,
            })?;

        Ext4GroupDesc::parse_from_bytes(&raw, desc_size).map_err(|source| {
            VolumeError::GroupDescParse {
                group: group.0,
                source,
            }
        })
    }

    /// Read and decode one inode record.
    ///
    /// Issues a full `inode_size` read (not the good-old 128-byte short
    /// read) and returns both the decoded record and the raw bytes.
    pub fn read_inode(&self, ino: InodeNumber) -> Result<(Ext4Inode, Vec<u8>), VolumeError> {
        let sb = &self.superblock;
        if ino.0 == 0 || ino.0 > sb.inodes_count {
            return Err(VolumeError::InvalidInode {
                ino: ino.0,
                inodes_count: sb.inodes_count,
            });
        }

        let (group, _index, table_offset) = sb.inode_table_offset(ino);
        let desc = self.read_group_desc(group)?;

        let offset = desc
            .inode_table
            .checked_mul(u64::from(sb.block_size))
            .and_then(|table_base| table_base.checked_add(table_offset))
            .ok_or(VolumeError::OffsetOverflow { what: "inode table" })?;

        let mut raw = vec![0_u8; usize::from(sb.inode_size)];
        self.device
            .read_exact_at(ByteOffset(offset), &mut raw)
            .map_err(|source| VolumeError::InodeRead {
                ino: ino.0,
                source,
            })?;

        let inode = Ext4Inode::parse_from_bytes(&raw).map_err(|source| VolumeError::InodeParse {
            ino: ino.0,
            source,
        })?;
        Ok((inode, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crtime_block::MemByteDevice;

    #[test]
    fn open_fails_on_truncated_device() {
        // Superblock region would end at byte 2048.
        let dev = MemByteDevice::new(vec![0_u8; 1024]);
        let err = Ext4Volume::open(dev).expect_err("truncated");
        assert!(matches!(err, VolumeError::SuperblockRead(_)));
    }

    #[test]
    fn open_fails_on_zeroed_superblock() {
        let dev = MemByteDevice::new(vec![0_u8; 4096]);
        let err = Ext4Volume::open(dev).expect_err("no magic");
        assert!(matches!(
            err,
            VolumeError::Superblock(ParseError::InvalidMagic { .. })
        ));
    }
}
