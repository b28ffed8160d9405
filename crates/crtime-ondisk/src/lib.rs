#![forbid(unsafe_code)]

//! ext4 on-disk format knowledge for the crtime tool.
//!
//! [`ext4`] holds the byte-layout decoders (superblock, group descriptor,
//! 256-byte inode record, extended timestamps). [`volume`] wraps a byte
//! device and the parsed superblock into an [`Ext4Volume`] handle that can
//! locate and decode individual inodes.

pub mod ext4;
pub mod volume;

pub use ext4::{Ext4GroupDesc, Ext4Inode, Ext4Superblock, Ext4Timestamp};
pub use volume::{Ext4Volume, VolumeError};
