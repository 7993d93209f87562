use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;

use super::forward::forward;
use super::session::{Session, TransferStats};
use crate::config::TransferConfig;
use crate::errors::{Direction, Result, TransferError};
use crate::features::{self, FeatureSet};
use crate::local::add_slash;
use crate::process::{apply_wrapper, kill_and_reap, DiagnosticCapture, Invocation, DIAGNOSTIC_DRAIN_TIMEOUT};
use crate::progress::{ProgressReader, TransferProgress};
use crate::rendezvous::RendezvousListener;

/// Remote path handed to the client rsync. The receiving side is started
/// with its own destination, which takes precedence.
const PLACEHOLDER_REMOTE: &str = "localhost:/tmp/foo";

/// Parameters for the sending half of a bridged transfer.
#[derive(Clone)]
pub struct SendRequest {
    /// Logical name of what is being sent, passed to the helper.
    pub name: String,
    /// Local directory whose contents are sent.
    pub path: PathBuf,
    pub features: FeatureSet,
    /// rsync `--bwlimit` value; empty for no cap.
    pub bwlimit: String,
    /// Executable providing the `netcat` subcommand.
    pub helper: PathBuf,
    pub extra_args: Vec<String>,
    /// Observes bytes leaving this side.
    pub progress: Option<TransferProgress>,
}

impl SendRequest {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, helper: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            features: FeatureSet::new(),
            bwlimit: String::new(),
            helper: helper.into(),
            extra_args: Vec::new(),
            progress: None,
        }
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn with_bwlimit(mut self, bwlimit: impl Into<String>) -> Self {
        self.bwlimit = bwlimit.into();
        self
    }

    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn with_progress(mut self, progress: TransferProgress) -> Self {
        self.progress = Some(progress);
        self
    }
}

enum Rendezvous {
    Connected(io::Result<UnixStream>),
    TimedOut,
    Exited(io::Result<ExitStatus>),
}

/// Send `request.path` over `stream` to a peer running [`recv`](super::recv).
///
/// rsync runs in client mode with a remote shell of
/// `<helper> netcat <endpoint> <name> --`; the helper dials the local
/// rendezvous endpoint, whose single connection is then spliced onto
/// `stream`. The stream's write side is shut down once rsync's output ends.
pub async fn send<S>(config: &TransferConfig, request: SendRequest, stream: S) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let source_arg = add_slash(&request.path);
    let source = source_arg.to_string_lossy().into_owned();
    let context = format!("rsync send failed: {}, {}", request.name, source);

    let listener = RendezvousListener::bind()?;
    let remote_shell = format!(
        "{} netcat {} {} --",
        request.helper.display(),
        listener.name(),
        request.name
    );

    let mut invocation = Invocation::new(&config.rsync);
    invocation.args(["-ar", "--devices", "--numeric-ids", "--partial", "--sparse"]);
    if !request.bwlimit.is_empty() {
        invocation.args(["--bwlimit", request.bwlimit.as_str()]);
    }
    if !request.features.is_empty() {
        invocation.args(features::negotiate(config, &request.features).await);
    }
    invocation.args(&request.extra_args);
    invocation
        .arg(&source_arg)
        .args([PLACEHOLDER_REMOTE, "-e", remote_shell.as_str()]);

    let _guard = apply_wrapper(config, &mut invocation, &source, "")?;
    let mut cmd = invocation.command();
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());
    let mut child = invocation.spawn(cmd)?;
    let diagnostics = DiagnosticCapture::spawn(child.stderr.take(), context.clone());

    let rendezvous = {
        let accept = tokio::time::timeout(config.connect_timeout, listener.accept());
        tokio::select! {
            accepted = accept => match accepted {
                Ok(conn) => Rendezvous::Connected(conn),
                Err(_) => Rendezvous::TimedOut,
            },
            status = child.wait() => Rendezvous::Exited(status),
        }
    };

    let conn = match rendezvous {
        Rendezvous::Connected(Ok(conn)) => conn,
        Rendezvous::Connected(Err(source)) => {
            kill_and_reap(&mut child).await;
            let diagnostics = diagnostics.collect(DIAGNOSTIC_DRAIN_TIMEOUT).await;
            return Err(TransferError::Accept {
                source,
                diagnostics,
            });
        }
        Rendezvous::TimedOut => {
            log::warn!(
                "{}: no rendezvous connection after {}s, killing rsync",
                request.name,
                config.connect_timeout.as_secs()
            );
            kill_and_reap(&mut child).await;
            let diagnostics = diagnostics.collect(DIAGNOSTIC_DRAIN_TIMEOUT).await;
            return Err(TransferError::ConnectTimeout {
                timeout: config.connect_timeout,
                diagnostics,
            });
        }
        Rendezvous::Exited(status) => {
            let diagnostics = diagnostics.collect(DIAGNOSTIC_DRAIN_TIMEOUT).await;
            return Err(match status {
                Ok(status) if !status.success() => TransferError::ProcessExit {
                    program: invocation.program_name(),
                    code: status.code(),
                    diagnostics,
                },
                Ok(_) => TransferError::Accept {
                    source: io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "rsync exited before connecting",
                    ),
                    diagnostics,
                },
                Err(err) => TransferError::io(format!("waiting for {}", invocation.program_name()), err),
            });
        }
    };

    let (conn_read, conn_write) = conn.into_split();
    let (stream_read, stream_write) = tokio::io::split(stream);

    let outbound = tokio::spawn(forward(
        ProgressReader::new(conn_read, request.progress.clone()),
        stream_write,
        Direction::Outbound,
    ));
    let inbound = tokio::spawn(forward(stream_read, conn_write, Direction::Inbound));

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
