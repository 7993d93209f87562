use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable shell script standing in for rsync.
pub(crate) fn fake_rsync(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-rsync");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake rsync");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake rsync");
    path
}

/// Write a fake rsync that appends its arguments, one per line, to
/// `args.log` next to it and then runs `body`.
pub(crate) fn recording_rsync(dir: &Path, body: &str) -> (PathBuf, PathBuf) {
    let log = dir.join("args.log");
    let script = format!(
        "for arg in \"$@\"; do printf '%s\\n' \"$arg\" >> '{}'; done\n{body}",
        log.display()
    );
    (fake_rsync(dir, &script), log)
}

pub(crate) fn recorded_args(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Like [`recorded_args`] but byte exact, for paths that are not UTF-8.
pub(crate) fn recorded_raw_args(log: &Path) -> Vec<Vec<u8>> {
    fs::read(log)
        .unwrap_or_default()
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}

/// A path component containing a byte that is not valid UTF-8.
pub(crate) fn non_utf8_name(prefix: &str) -> std::ffi::OsString {
    use std::os::unix::ffi::OsStringExt;

    let mut raw = prefix.as_bytes().to_vec();
    raw.push(0xff);
    raw.extend_from_slice(b"fs");
    std::ffi::OsString::from_vec(raw)
}
