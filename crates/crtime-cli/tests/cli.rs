#![forbid(unsafe_code)]

//! Black-box tests for the `crtime` binary's exit behavior.

use std::io::Write;
use std::process::Command;

fn crtime_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_crtime"))
}

#[test]
fn unreadable_arguments_print_usage_and_exit_zero() {
    let out = crtime_cmd()
        .args(["/nonexistent/device", "/nonexistent/file"])
        .output()
        .expect("run crtime");

    assert!(out.status.success(), "readability failures are not errors");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("USAGE"), "stdout: {stdout}");
    assert!(stdout.contains("readable"), "stdout: {stdout}");
}

#[test]
fn missing_arguments_are_a_usage_error() {
    let out = crtime_cmd().output().expect("run crtime");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Usage") || stderr.contains("usage"), "stderr: {stderr}");
}

#[test]
fn non_ext4_device_fails_with_an_error_line() {
    // A readable file that is not an ext4 image: open must fail, nothing
    // is printed on stdout, and the exit code is nonzero.
    let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
    tmp.write_all(&[0_u8; 4096]).expect("write");
    tmp.flush().expect("flush");
    let path = tmp.path().to_str().expect("utf-8 path");

    let out = crtime_cmd().args([path, path]).output().expect("run crtime");

    assert!(!out.status.success());
    assert!(out.stdout.is_empty(), "no partial output on failure");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
}
