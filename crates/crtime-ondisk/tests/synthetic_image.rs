#![forbid(unsafe_code)]

//! End-to-end decoding against a synthetic in-memory ext4 image:
//! superblock at byte 1024, group descriptor table in the following
//! block, inode table a few blocks in.

use crtime_block::MemByteDevice;
use crtime_ondisk::{Ext4Volume, VolumeError};
use crtime_types::{EXT4_SUPER_MAGIC, InodeNumber};

const BLOCK_SIZE: usize = 1024;
const IMAGE_BLOCKS: usize = 64;
const INODE_TABLE_BLOCK: u32 = 5;

struct ImageLayout {
    rev_level: u32,
    inode_size: u16,
    inode_table_block: u32,
}

impl Default for ImageLayout {
    fn default() -> Self {
        Self {
            rev_level: 1,
            inode_size: 256,
            inode_table_block: INODE_TABLE_BLOCK,
        }
    }
}

/// Build a one-group ext4 image with inode 2 carrying the given
/// creation-time words.
fn build_image(layout: &ImageLayout, crtime: u32, crtime_extra: u32) -> Vec<u8> {
    let mut image = vec![0_u8; IMAGE_BLOCKS * BLOCK_SIZE];

    // Superblock region at byte 1024.
    let sb = &mut image[1024..2048];
    sb[0x00..0x04].copy_from_slice(&32_u32.to_le_bytes()); // inodes_count
    sb[0x04..0x08].copy_from_slice(&(IMAGE_BLOCKS as u32).to_le_bytes()); // blocks_count
    sb[0x14..0x18].copy_from_slice(&1_u32.to_le_bytes()); // first_data_block
    sb[0x18..0x1C].copy_from_slice(&0_u32.to_le_bytes()); // log_block_size -> 1K
    sb[0x20..0x24].copy_from_slice(&8192_u32.to_le_bytes()); // blocks_per_group
    sb[0x28..0x2C].copy_from_slice(&16_u32.to_le_bytes()); // inodes_per_group
    sb[0x38..0x3A].copy_from_slice(&EXT4_SUPER_MAGIC.to_le_bytes());
    sb[0x4C..0x50].copy_from_slice(&layout.rev_level.to_le_bytes());
    sb[0x58..0x5A].copy_from_slice(&layout.inode_size.to_le_bytes());

    // Group 0 descriptor: GDT lives in block 2 for 1K blocks.
    let gdt = &mut image[2 * BLOCK_SIZE..2 * BLOCK_SIZE + 32];
    gdt[0x08..0x0C].copy_from_slice(&layout.inode_table_block.to_le_bytes()); // inode_table

    // Inode 2 is the second record in the table.
    let table = layout.inode_table_block as usize * BLOCK_SIZE;
    let record = table + usize::from(layout.inode_size);
    if record + usize::from(layout.inode_size) <= image.len() {
        let inode = &mut image[record..record + usize::from(layout.inode_size)];
        inode[0x00..0x02].copy_from_slice(&0o040_755_u16.to_le_bytes()); // directory
        inode[0x1A..0x1C].copy_from_slice(&3_u16.to_le_bytes()); // links_count
        if usize::from(layout.inode_size) >= 152 {
            inode[144..148].copy_from_slice(&crtime.to_le_bytes());
            inode[148..152].copy_from_slice(&crtime_extra.to_le_bytes());
        }
    }

    image
}

#[test]
fn planted_crtime_reads_back_end_to_end() {
    let image = build_image(&ImageLayout::default(), 0x5F00_0000, 0x0000_0005);
    let volume = Ext4Volume::open(MemByteDevice::new(image)).expect("open");

    // The raw region is kept exactly as read from the device.
    assert_eq!(
        &volume.raw_superblock()[0x38..0x3A],
        &EXT4_SUPER_MAGIC.to_le_bytes()
    );
    assert_eq!(volume.require_large_inodes().expect("large inodes"), 256);

    let (inode, raw) = volume.read_inode(InodeNumber(2)).expect("read inode 2");
    assert_eq!(inode.mode, 0o040_755);
    assert_eq!(inode.links_count, 3);
    assert_eq!(inode.crtime, 0x5F00_0000);
    assert_eq!(inode.crtime_extra, 0x0000_0005);

    // The raw record is the full 256 bytes, with the words at 144/148.
    assert_eq!(raw.len(), 256);
    assert_eq!(&raw[144..148], &0x5F00_0000_u32.to_le_bytes());
    assert_eq!(&raw[148..152], &0x0000_0005_u32.to_le_bytes());

    let ts = inode.crtime_full();
    assert_eq!(ts.seconds, 0x5F00_0000_i64 | (1_i64 << 32));
    assert_eq!(ts.nanoseconds, 1);
}

#[test]
fn small_inode_filesystem_fails_the_precondition() {
    let image = build_image(
        &ImageLayout {
            inode_size: 128,
            ..ImageLayout::default()
        },
        0,
        0,
    );
    let volume = Ext4Volume::open(MemByteDevice::new(image)).expect("open");

    let err = volume.require_large_inodes().expect_err("128-byte inodes");
    match err {
        VolumeError::UnsupportedInodeSize { found } => assert_eq!(found, 128),
        other => panic!("expected UnsupportedInodeSize, got {other:?}"),
    }
}

#[test]
fn revision_zero_fails_before_the_inode_size_check() {
    // Revision 0 has no s_inode_size field at all; the recorded 128 here
    // stands in for whatever bytes happen to sit at offset 88.
    let image = build_image(
        &ImageLayout {
            rev_level: 0,
            inode_size: 128,
            ..ImageLayout::default()
        },
        0,
        0,
    );
    let volume = Ext4Volume::open(MemByteDevice::new(image)).expect("open");

    let err = volume.require_large_inodes().expect_err("revision 0");
    match err {
        VolumeError::UnsupportedRevision { found } => assert_eq!(found, 0),
        other => panic!("expected UnsupportedRevision, got {other:?}"),
    }
}

#[test]
fn failed_open_surfaces_the_parse_error() {
    let mut image = build_image(&ImageLayout::default(), 0, 0);
    image[1024 + 0x38] = 0; // break the magic
    let err = Ext4Volume::open(MemByteDevice::new(image)).expect_err("bad magic");
    assert!(matches!(err, VolumeError::Superblock(_)));
}

#[test]
fn out_of_range_inode_numbers_are_rejected() {
    let image = build_image(&ImageLayout::default(), 0, 0);
    let volume = Ext4Volume::open(MemByteDevice::new(image)).expect("open");

    assert!(matches!(
        volume.read_inode(InodeNumber(0)),
        Err(VolumeError::InvalidInode { ino: 0, .. })
    ));
    assert!(matches!(
        volume.read_inode(InodeNumber(33)),
        Err(VolumeError::InvalidInode { ino: 33, .. })
    ));
}

#[test]
fn inode_read_past_device_end_propagates_the_device_error() {
    // Point the inode table at the last block: inode 2's record would
    // start past the end of the device.
    let image = build_image(
        &ImageLayout {
            inode_table_block: IMAGE_BLOCKS as u32,
            ..ImageLayout::default()
        },
        0,
        0,
    );
    let volume = Ext4Volume::open(MemByteDevice::new(image)).expect("open");

    let err = volume.read_inode(InodeNumber(2)).expect_err("read past end");
    assert!(matches!(err, VolumeError::InodeRead { ino: 2, .. }));
}
