use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};

use super::forward::forward;
use super::session::{Session, TransferStats};
use crate::config::TransferConfig;
use crate::errors::{Direction, Result, TransferError};
use crate::features::{self, FeatureSet};
use crate::process::{apply_wrapper, kill_and_reap, DiagnosticCapture, Invocation};
use crate::progress::{ProgressReader, TransferProgress};

/// Server-side option string matching the client flags used by
/// [`send`](super::send).
const SERVER_FLAGS: &str = "-vlogDtpre.iLsfx";

/// Parameters for the receiving half of a bridged transfer.
#[derive(Clone)]
pub struct RecvRequest {
    /// Local directory the tree is written into.
    pub path: PathBuf,
    pub features: FeatureSet,
    /// Observes bytes arriving from the peer.
    pub progress: Option<TransferProgress>,
}

impl RecvRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            features: FeatureSet::new(),
            progress: None,
        }
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn with_progress(mut self, progress: TransferProgress) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Receive a tree sent by [`send`](super::send) on the other end of
/// `stream`, writing it under `request.path`.
///
/// rsync runs in server mode with its stdin and stdout spliced directly onto
/// the stream; no rendezvous socket is needed on this side.
pub async fn recv<S>(config: &TransferConfig, request: RecvRequest, stream: S) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let path = request.path.to_string_lossy().into_owned();
    let context = format!("rsync receive failed: {path}");

    let mut invocation = Invocation::new(&config.rsync);
    invocation.args([
        "--server",
        SERVER_FLAGS,
        "--numeric-ids",
        "--devices",
        "--partial",
        "--sparse",
    ]);
    if !request.features.is_empty() {
        invocation.args(features::negotiate(config, &request.features).await);
    }
    invocation.arg(".").arg(&request.path);

    let _guard = apply_wrapper(config, &mut invocation, "", &path)?;
    let mut cmd = invocation.command();
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = invocation.spawn(cmd)?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        kill_and_reap(&mut child).await;
        return Err(TransferError::io(
            "capturing rsync stdio",
            io::Error::new(io::ErrorKind::BrokenPipe, "rsync pipes unavailable"),
        ));
    };
    let diagnostics = DiagnosticCapture::spawn(child.stderr.take(), context.clone());

    let (stream_read, stream_write) = tokio::io::split(stream);

    let outbound = tokio::spawn(forward(stdout, stream_write, Direction::Outbound));
    let inbound = tokio::spawn(forward(
        ProgressReader::new(stream_read, request.progress.clone()),
        stdin,
        Direction::Inbound,
    ));

    Session {
        context,
        program: invocation.program_name(),
        child,
        diagnostics,
        outbound,
        inbound,
    }
    .finish()
    .await
}
