#![cfg(unix)]

mod common;

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use common::{assert_tree_copied, cli_bin, fake_rsync, populate_tree, rsync_available};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use treesync_core::progress::{ProgressEvent, TransferProgress};
use treesync_core::{
    recv, send, FeatureSet, RecvRequest, Result, SendRequest, TransferConfig, TransferStats,
};

async fn bridge(
    src: &Path,
    dest: &Path,
    features: FeatureSet,
    progress: Option<TransferProgress>,
) -> (Result<TransferStats>, Result<TransferStats>) {
    let config = TransferConfig::default();
    let (sender_side, receiver_side) = tokio::io::duplex(64 * 1024);

    let mut send_request =
        SendRequest::new("c1", src, cli_bin()).with_features(features.clone());
    if let Some(progress) = progress {
        send_request = send_request.with_progress(progress);
    }
    let recv_request = RecvRequest::new(dest).with_features(features);

    tokio::time::timeout(Duration::from_secs(60), async {
        tokio::join!(
            send(&config, send_request, sender_side),
            recv(&config, recv_request, receiver_side)
        )
    })
    .await
    .expect("bridged transfer finished in time")
}

#[tokio::test(flavor = "multi_thread")]
async fn send_and_recv_mirror_a_tree() {
    if !rsync_available() {
        eprintln!("skipping: rsync not installed");
        return;
    }
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    populate_tree(&src);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (sent, received) = bridge(
        &src,
        &dest,
        FeatureSet::new(),
        Some(TransferProgress::new(tx)),
    )
    .await;
    let sent = sent.expect("send succeeded");
    let received = received.expect("recv succeeded");

    assert_tree_copied(&dest);
    assert!(sent.bytes_sent > 0);
    assert_eq!(sent.bytes_sent, received.bytes_received);
    assert_eq!(sent.bytes_received, received.bytes_sent);

    let mut finished = None;
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::Finished { total } = event {
            finished = Some(total);
        }
    }
    assert_eq!(finished, Some(sent.bytes_sent));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_feature_removes_extraneous_files() {
    if !rsync_available() {
        eprintln!("skipping: rsync not installed");
        return;
    }
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    populate_tree(&src);
    fs::create_dir_all(&dest).expect("dest");
    fs::write(dest.join("stale"), b"old").expect("stale file");

    let (sent, received) = bridge(&src, &dest, FeatureSet::new(), None).await;
    sent.expect("send");
    received.expect("recv");
    assert!(dest.join("stale").exists(), "no deletion without the feature");

    let features = FeatureSet::from_names(["delete"]);
    let (sent, received) = bridge(&src, &dest, features, None).await;
    sent.expect("send with delete");
    received.expect("recv with delete");
    assert!(!dest.join("stale").exists());
    assert_tree_copied(&dest);
}

#[tokio::test(flavor = "multi_thread")]
async fn xattrs_feature_carries_user_attributes() {
    if !rsync_available() {
        eprintln!("skipping: rsync not installed");
        return;
    }
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    populate_tree(&src);
    if xattr::set(src.join("etc/hostname"), "user.treesync", b"labelled").is_err() {
        eprintln!("skipping: filesystem lacks user xattrs");
        return;
    }

    let (sent, received) = bridge(&src, &dest, FeatureSet::from_names(["xattrs"]), None).await;
    sent.expect("send with xattrs");
    received.expect("recv with xattrs");

    let value = xattr::get(dest.join("etc/hostname"), "user.treesync").expect("read xattr");
    assert_eq!(value.as_deref(), Some(&b"labelled"[..]));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_source_fails_both_sides() {
    if !rsync_available() {
        eprintln!("skipping: rsync not installed");
        return;
    }
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("does-not-exist");
    let dest = tmp.path().join("dest");

    let (sent, _received) = bridge(&src, &dest, FeatureSet::new(), None).await;
    let err = sent.expect_err("rsync cannot read a missing source");
    assert!(err.exit_code().is_some(), "{err}");
    assert!(err.diagnostics().is_some(), "{err}");
}

/// Client rsync stand-in: runs the `-e` remote shell (the last argument) the
/// way rsync would and streams zeros into it.
const STREAMING_CLIENT: &str = r#"for last; do :; done
head -c 50000000 /dev/zero | sh -c "$last localhost rsync --server""#;

#[tokio::test(flavor = "multi_thread")]
async fn send_unblocks_when_peer_hangs_up() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let rsync = fake_rsync(tmp.path(), STREAMING_CLIENT);
    let config = TransferConfig::default().with_rsync(rsync);
    let (sender_side, mut peer) = tokio::io::duplex(64 * 1024);
    let request = SendRequest::new("c1", tmp.path(), cli_bin());

    let transfer = tokio::spawn(async move { send(&config, request, sender_side).await });

    let mut first = vec![0u8; 4096];
    tokio::time::timeout(Duration::from_secs(20), peer.read_exact(&mut first))
        .await
        .expect("data reaches the peer")
        .expect("read from sender");
    drop(peer);

    let started = Instant::now();
    let err = tokio::time::timeout(Duration::from_secs(20), transfer)
        .await
        .expect("send returns once the peer is gone")
        .expect("join send")
        .expect_err("peer hung up mid-transfer");
    assert!(err.is_forwarding(), "{err}");
    assert!(started.elapsed() < Duration::from_secs(15));
}
