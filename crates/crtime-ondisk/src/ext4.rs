#![forbid(unsafe_code)]

//! Byte-layout decoders for the ext4 structures the crtime tool consumes.
//!
//! All fields are extracted at fixed byte offsets, little-endian. The
//! offsets follow the ext4 disk format: the superblock's `s_inode_size`
//! lives at byte 88 of the superblock region (dynamic revision only), and
//! the large-inode creation time lives at bytes 144..152 of the inode
//! record (`i_crtime` then `i_crtime_extra`).

use crtime_types::{
    EXT4_DYNAMIC_REV, EXT4_SUPER_MAGIC, EXT4_SUPERBLOCK_SIZE, GroupNumber, InodeNumber,
    ParseError, ensure_slice, ext4_block_size_from_log, inode_index_in_group, inode_to_group,
    read_fixed, read_le_u16, read_le_u32, trim_nul_padded,
};
use serde::{Deserialize, Serialize};

const EXT4_FEATURE_INCOMPAT_64BIT: u32 = 0x0080;
const EXT4_FEATURE_RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

/// Byte offset of `s_checksum` within the superblock region. The
/// superblock CRC32C covers everything before it.
const EXT4_SUPERBLOCK_CSUM_OFFSET: usize = 0x3FC;

/// Offsets of the creation-time words within a large inode record.
pub const INODE_CRTIME_OFFSET: usize = 0x90; // byte 144
pub const INODE_CRTIME_EXTRA_OFFSET: usize = 0x94; // byte 148

/// Partial view of the ext4 superblock: the geometry and identity fields
/// needed to validate the volume and locate inodes, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext4Superblock {
    pub inodes_count: u32,
    pub blocks_count: u64,
    pub first_data_block: u32,
    pub block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub inode_size: u16,
    pub first_ino: u32,
    pub desc_size: u16,

    pub magic: u16,
    pub uuid: [u8; 16],
    pub volume_name: String,

    pub rev_level: u32,
    pub minor_rev_level: u16,
    pub state: u16,

    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,

    pub checksum: u32,
}

impl Ext4Superblock {
    /// Parse an ext4 superblock from the 1024-byte superblock region.
    pub fn parse_superblock_region(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < EXT4_SUPERBLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: EXT4_SUPERBLOCK_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_le_u16(region, 0x38)?;
        if magic != EXT4_SUPER_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(EXT4_SUPER_MAGIC),
                actual: u64::from(magic),
            });
        }

        // log_block_size > 6 would mean blocks past the 64K format limit.
        let log_block_size = read_le_u32(region, 0x18)?;
        let block_size = match ext4_block_size_from_log(log_block_size) {
            Some(size) if log_block_size <= 6 => size,
            _ => {
                return Err(ParseError::InvalidField {
                    field: "s_log_block_size",
                    reason: "invalid shift",
                });
            }
        };

        let blocks_lo = u64::from(read_le_u32(region, 0x04)?);
        let blocks_hi = u64::from(read_le_u32(region, 0x150)?);

        Ok(Self {
            inodes_count: read_le_u32(region, 0x00)?,
            blocks_count: blocks_lo | (blocks_hi << 32),
            first_data_block: read_le_u32(region, 0x14)?,
            block_size,
            blocks_per_group: read_le_u32(region, 0x20)?,
            inodes_per_group: read_le_u32(region, 0x28)?,
            inode_size: read_le_u16(region, 0x58)?,
            first_ino: read_le_u32(region, 0x54)?,
            desc_size: read_le_u16(region, 0xFE)?,

            magic,
            uuid: read_fixed::<16>(region, 0x68)?,
            volume_name: trim_nul_padded(&read_fixed::<16>(region, 0x78)?),

            rev_level: read_le_u32(region, 0x4C)?,
            minor_rev_level: read_le_u16(region, 0x3E)?,
            state: read_le_u16(region, 0x3A)?,

            feature_compat: read_le_u32(region, 0x5C)?,
            feature_incompat: read_le_u32(region, 0x60)?,
            feature_ro_compat: read_le_u32(region, 0x64)?,

            checksum: read_le_u32(region, 0x3FC)?,
        })
    }

    #[must_use]
    pub fn has_incompat(&self, mask: u32) -> bool {
        (self.feature_incompat & mask) != 0
    }

    #[must_use]
    pub fn has_ro_compat(&self, mask: u32) -> bool {
        (self.feature_ro_compat & mask) != 0
    }

    #[must_use]
    pub fn is_64bit(&self) -> bool {
        self.has_incompat(EXT4_FEATURE_INCOMPAT_64BIT)
    }

    /// Whether the superblock is dynamic-revision. Revision 0 predates
    /// `s_inode_size`; byte 88 carries no meaning there.
    #[must_use]
    pub fn is_dynamic_rev(&self) -> bool {
        self.rev_level >= EXT4_DYNAMIC_REV
    }

    #[must_use]
    pub fn group_desc_size(&self) -> u16 {
        if self.is_64bit() {
            self.desc_size.max(64)
        } else {
            32
        }
    }

    /// Whether this filesystem carries metadata checksums (crc32c).
    #[must_use]
    pub fn has_metadata_csum(&self) -> bool {
        self.has_ro_compat(EXT4_FEATURE_RO_COMPAT_METADATA_CSUM)
    }

    /// Validate the superblock's own CRC32C when the filesystem carries
    /// metadata checksums. The stored value is the un-inverted CRC32C of
    /// the region up to (not including) `s_checksum`.
    pub fn validate_checksum(&self, raw_region: &[u8]) -> Result<(), ParseError> {
        if !self.has_metadata_csum() {
            return Ok(());
        }
        let covered = ensure_slice(raw_region, 0, EXT4_SUPERBLOCK_CSUM_OFFSET)?;
        let computed = !crc32c::crc32c(covered);
        if computed != self.checksum {
            return Err(ParseError::InvalidField {
                field: "s_checksum",
                reason: "superblock CRC32C mismatch",
            });
        }
        Ok(())
    }

    /// Validate the geometry this tool depends on for inode location.
    pub fn validate_geometry(&self) -> Result<(), ParseError> {
        if self.blocks_per_group == 0 {
            return Err(ParseError::InvalidField {
                field: "s_blocks_per_group",
                reason: "cannot be zero",
            });
        }
        if self.inodes_per_group == 0 {
            return Err(ParseError::InvalidField {
                field: "s_inodes_per_group",
                reason: "cannot be zero",
            });
        }
        if self.inode_size < 128 {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "must be >= 128",
            });
        }
        if !self.inode_size.is_power_of_two() {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "must be a power of two",
            });
        }
        if u64::from(self.first_data_block) >= self.blocks_count {
            return Err(ParseError::InvalidField {
                field: "s_first_data_block",
                reason: "first_data_block >= blocks_count",
            });
        }
        Ok(())
    }

    /// Byte offset of a group descriptor within the descriptor table.
    ///
    /// The table starts in the block after the superblock: block 2 for 1K
    /// block size, block 1 otherwise.
    #[must_use]
    pub fn group_desc_offset(&self, group: GroupNumber) -> Option<u64> {
        let gdt_start_block = if self.block_size == 1024 { 2_u64 } else { 1_u64 };
        let gdt_start_byte = gdt_start_block.checked_mul(u64::from(self.block_size))?;
        let desc_offset = u64::from(group.0).checked_mul(u64::from(self.group_desc_size()))?;
        gdt_start_byte.checked_add(desc_offset)
    }

    /// Locate an inode: `(group, index_in_group, byte_offset_in_table)`.
    ///
    /// The caller still needs the group descriptor to find where the
    /// group's inode table starts on the device.
    #[must_use]
    pub fn inode_table_offset(&self, ino: InodeNumber) -> (GroupNumber, u32, u64) {
        let group = inode_to_group(ino, self.inodes_per_group);
        let index = inode_index_in_group(ino, self.inodes_per_group);
        let byte_offset = u64::from(index) * u64::from(self.inode_size);
        (group, index, byte_offset)
    }
}

/// ext4 block group descriptor (32-byte classic or 64-byte 64BIT form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext4GroupDesc {
    pub block_bitmap: u64,
    pub inode_bitmap: u64,
    pub inode_table: u64,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub flags: u16,
    pub checksum: u16,
}

impl Ext4GroupDesc {
    pub fn parse_from_bytes(bytes: &[u8], desc_size: u16) -> Result<Self, ParseError> {
        let desc_size = usize::from(desc_size);
        if desc_size < 32 {
            return Err(ParseError::InvalidField {
                field: "s_desc_size",
                reason: "descriptor size must be >= 32",
            });
        }
        if bytes.len() < desc_size {
            return Err(ParseError::InsufficientData {
                needed: desc_size,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let block_bitmap_lo = u64::from(read_le_u32(bytes, 0x00)?);
        let inode_bitmap_lo = u64::from(read_le_u32(bytes, 0x04)?);
        let inode_table_lo = u64::from(read_le_u32(bytes, 0x08)?);
        let free_blocks_lo = u32::from(read_le_u16(bytes, 0x0C)?);
        let free_inodes_lo = u32::from(read_le_u16(bytes, 0x0E)?);
        let flags = read_le_u16(bytes, 0x12)?;
        let checksum = read_le_u16(bytes, 0x1E)?;

        // High halves exist only in the 64-byte descriptor form.
        let (block_bitmap_hi, inode_bitmap_hi, inode_table_hi, free_blocks_hi, free_inodes_hi) =
            if desc_size >= 64 {
                (
                    u64::from(read_le_u32(bytes, 0x20)?),
                    u64::from(read_le_u32(bytes, 0x24)?),
                    u64::from(read_le_u32(bytes, 0x28)?),
                    u32::from(read_le_u16(bytes, 0x2C)?),
                    u32::from(read_le_u16(bytes, 0x2E)?),
                )
            } else {
                (0, 0, 0, 0, 0)
            };

        Ok(Self {
            block_bitmap: block_bitmap_lo | (block_bitmap_hi << 32),
            inode_bitmap: inode_bitmap_lo | (inode_bitmap_hi << 32),
            inode_table: inode_table_lo | (inode_table_hi << 32),
            free_blocks_count: free_blocks_lo | (free_blocks_hi << 16),
            free_inodes_count: free_inodes_lo | (free_inodes_hi << 16),
            flags,
            checksum,
        })
    }
}

/// Reconstructed extended timestamp: the ext4 `_extra` word packs 2 bits
/// of epoch extension (seconds past 2038) and 30 bits of nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext4Timestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl Ext4Timestamp {
    /// Combine a base seconds word with its `_extra` companion:
    /// `seconds = base | ((extra & 0b11) << 32)`, `nanoseconds = extra >> 2`.
    #[must_use]
    pub fn from_raw(base: u32, extra: u32) -> Self {
        Self {
            seconds: (i64::from(extra & 0x3) << 32) | i64::from(base),
            nanoseconds: extra >> 2,
        }
    }
}

/// Decoded large inode record.
///
/// The tool only needs the creation-time words, but the whole fixed
/// layout is decoded so each field can be pinned by tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext4Inode {
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub links_count: u16,
    pub blocks: u64,
    pub flags: u32,
    pub generation: u32,

    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,

    pub atime_extra: u32,
    pub ctime_extra: u32,
    pub mtime_extra: u32,
    pub crtime: u32,
    pub crtime_extra: u32,

    pub extra_isize: u16,
    pub checksum: u32,
    pub projid: u32,
}

impl Ext4Inode {
    /// Decode an inode record from raw bytes.
    ///
    /// The base 128-byte area must be present; the extended fields are
    /// decoded when the record extends far enough to hold them (a full
    /// 256-byte record holds them all). Each field is read at its fixed
    /// offset regardless of what the surrounding bytes contain.
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 128 {
            return Err(ParseError::InsufficientData {
                needed: 128,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let uid_lo = u32::from(read_le_u16(bytes, 0x02)?);
        let gid_lo = u32::from(read_le_u16(bytes, 0x18)?);
        let size_lo = u64::from(read_le_u32(bytes, 0x04)?);
        let size_hi = u64::from(read_le_u32(bytes, 0x6C)?);
        let blocks_lo = u64::from(read_le_u32(bytes, 0x1C)?);

        // Linux osd2 area at 0x74..0x80
        let blocks_hi = u64::from(read_le_u16(bytes, 0x74)?);
        let uid_hi = u32::from(read_le_u16(bytes, 0x78)?);
        let gid_hi = u32::from(read_le_u16(bytes, 0x7A)?);
        let checksum_lo = u32::from(read_le_u16(bytes, 0x7C)?);

        // Extended area past the good-old 128 bytes.
        let len = bytes.len();
        let extra_isize = if len >= 0x82 { read_le_u16(bytes, 0x80)? } else { 0 };
        let checksum_hi = if len >= 0x84 {
            u32::from(read_le_u16(bytes, 0x82)?)
        } else {
            0
        };
        let ctime_extra = if len >= 0x88 { read_le_u32(bytes, 0x84)? } else { 0 };
        let mtime_extra = if len >= 0x8C { read_le_u32(bytes, 0x88)? } else { 0 };
        let atime_extra = if len >= 0x90 { read_le_u32(bytes, 0x8C)? } else { 0 };
        let crtime = if len >= INODE_CRTIME_OFFSET + 4 {
            read_le_u32(bytes, INODE_CRTIME_OFFSET)?
        } else {
            0
        };
        let crtime_extra = if len >= INODE_CRTIME_EXTRA_OFFSET + 4 {
            read_le_u32(bytes, INODE_CRTIME_EXTRA_OFFSET)?
        } else {
            0
        };
        let projid = if len >= 0xA0 { read_le_u32(bytes, 0x9C)? } else { 0 };

        Ok(Self {
            mode: read_le_u16(bytes, 0x00)?,
            uid: uid_lo | (uid_hi << 16),
            gid: gid_lo | (gid_hi << 16),
            size: size_lo | (size_hi << 32),
            links_count: read_le_u16(bytes, 0x1A)?,
            blocks: blocks_lo | (blocks_hi << 32),
            flags: read_le_u32(bytes, 0x20)?,
            generation: read_le_u32(bytes, 0x64)?,

            atime: read_le_u32(bytes, 0x08)?,
            ctime: read_le_u32(bytes, 0x0C)?,
            mtime: read_le_u32(bytes, 0x10)?,
            dtime: read_le_u32(bytes, 0x14)?,

            atime_extra,
            ctime_extra,
            mtime_extra,
            crtime,
            crtime_extra,

            extra_isize,
            checksum: checksum_lo | (checksum_hi << 16),
            projid,
        })
    }

    /// Full access time.
    #[must_use]
    pub fn atime_full(&self) -> Ext4Timestamp {
        Ext4Timestamp::from_raw(self.atime, self.atime_extra)
    }

    /// Full inode change time.
    #[must_use]
    pub fn ctime_full(&self) -> Ext4Timestamp {
        Ext4Timestamp::from_raw(self.ctime, self.ctime_extra)
    }

    /// Full modification time.
    #[must_use]
    pub fn mtime_full(&self) -> Ext4Timestamp {
        Ext4Timestamp::from_raw(self.mtime, self.mtime_extra)
    }

    /// Full creation time.
    #[must_use]
    pub fn crtime_full(&self) -> Ext4Timestamp {
        Ext4Timestamp::from_raw(self.crtime, self.crtime_extra)
    }
}
