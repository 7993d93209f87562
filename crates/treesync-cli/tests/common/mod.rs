#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub fn cli_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_treesync"))
}

/// Real rsync on PATH; tests needing it return early when this is false.
pub fn rsync_available() -> bool {
    Command::new("rsync")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Executable `/bin/sh` script standing in for rsync.
pub fn fake_rsync(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-rsync");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake rsync");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake rsync");
    path
}

/// Small tree with a nested directory, a symlink, and an empty file.
pub fn populate_tree(root: &Path) {
    fs::create_dir_all(root.join("etc/conf.d")).expect("nested dirs");
    fs::write(root.join("etc/hostname"), b"c1\n").expect("hostname");
    fs::write(root.join("etc/conf.d/net"), b"dhcp\n").expect("net");
    fs::write(root.join("empty"), b"").expect("empty");
    std::os::unix::fs::symlink("etc/hostname", root.join("hostname-link")).expect("symlink");
}

pub fn assert_tree_copied(dest: &Path) {
    assert_eq!(fs::read(dest.join("etc/hostname")).expect("hostname"), b"c1\n");
    assert_eq!(fs::read(dest.join("etc/conf.d/net")).expect("net"), b"dhcp\n");
    assert!(dest.join("empty").is_file());
    let link = fs::read_link(dest.join("hostname-link")).expect("symlink preserved");
    assert_eq!(link, PathBuf::from("etc/hostname"));
}

pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::process::Output {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("spawn command");

    match child.wait_timeout(timeout).expect("wait for process") {
        Some(_status) => child
            .wait_with_output()
            .expect("collect command output after completion"),
        None => {
            let _ = child.kill();
            let output = child
                .wait_with_output()
                .expect("collect output after killing command");
            panic!(
                "command timed out after {:?}\nstdout:\n{}\nstderr:\n{}",
                timeout,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }
}

pub struct ChildGuard {
    pub child: Option<std::process::Child>,
}

impl ChildGuard {
    pub fn new(child: std::process::Child) -> Self {
        Self { child: Some(child) }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
