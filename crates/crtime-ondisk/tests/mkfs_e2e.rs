#![forbid(unsafe_code)]

//! E2E against a real mkfs.ext4 image.
//!
//! Requires `mkfs.ext4` on `$PATH`, so the test is gated with
//! `#[ignore]`; run it explicitly via `cargo test -- --ignored`. If the
//! tool is missing the test skips gracefully rather than panicking.

use crtime_ondisk::Ext4Volume;
use crtime_types::InodeNumber;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn mkfs_available() -> bool {
    Command::new("which")
        .arg("mkfs.ext4")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn create_ext4_image(dir: &TempDir) -> PathBuf {
    let image = dir.path().join("crtime-e2e.ext4");

    // 4 MiB sparse image; force 256-byte inodes (the small-filesystem
    // mkfs profiles default to 128).
    let f = fs::File::create(&image).expect("create image");
    f.set_len(4 * 1024 * 1024).expect("set image size");
    drop(f);

    let out = Command::new("mkfs.ext4")
        .args(["-F", "-q", "-b", "1024", "-I", "256"])
        .arg(&image)
        .output()
        .expect("run mkfs.ext4");
    assert!(
        out.status.success(),
        "mkfs.ext4 failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    image
}

#[test]
#[ignore = "requires mkfs.ext4"]
fn root_inode_of_a_real_image_has_a_creation_time() {
    if !mkfs_available() {
        eprintln!("skipping: mkfs.ext4 not found on $PATH");
        return;
    }

    let dir = TempDir::new().expect("tempdir");
    let image = create_ext4_image(&dir);

    let volume = Ext4Volume::open_path(&image).expect("open image");
    assert_eq!(volume.superblock().block_size, 1024);
    assert_eq!(volume.require_large_inodes().expect("large inodes"), 256);

    // Inode 2 is the root directory; mkfs stamps its creation time.
    let (root, raw) = volume.read_inode(InodeNumber(2)).expect("read root inode");
    assert_eq!(raw.len(), 256);
    assert_eq!(root.mode & 0o17_0000, 0o4_0000, "root should be a directory");
    assert!(root.links_count >= 2);

    let ts = root.crtime_full();
    assert!(
        ts.seconds > 1_000_000_000,
        "creation time should be a modern epoch, got {}",
        ts.seconds
    );
    assert!(ts.nanoseconds < 1_000_000_000);
}
