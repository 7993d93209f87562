use std::io;
use std::process::ExitStatus;

use tokio::process::Child;
use tokio::task::{JoinError, JoinHandle};

use crate::errors::{Direction, Result, TransferError};
use crate::process::{DiagnosticCapture, DIAGNOSTIC_DRAIN_TIMEOUT};

/// Byte counts for a finished bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Bytes written to the caller stream.
    pub bytes_sent: u64,
    /// Bytes read from the caller stream.
    pub bytes_received: u64,
}

/// A running rsync plus its two forwarders.
pub(crate) struct Session {
    pub(crate) context: String,
    pub(crate) program: String,
    pub(crate) child: Child,
    pub(crate) diagnostics: DiagnosticCapture,
    pub(crate) outbound: JoinHandle<Result<u64>>,
    pub(crate) inbound: JoinHandle<Result<u64>>,
}

enum Forwarded {
    Pending,
    Done(Result<u64>),
}

impl Forwarded {
    fn is_pending(&self) -> bool {
        matches!(self, Forwarded::Pending)
    }

    fn failed(&self) -> bool {
        matches!(self, Forwarded::Done(Err(_)))
    }
}

fn joined(res: std::result::Result<Result<u64>, JoinError>, direction: Direction) -> Result<u64> {
    match res {
        Ok(outcome) => outcome,
        Err(err) if err.is_cancelled() => {
            log::debug!("{direction} cancelled");
            Ok(0)
        }
        Err(err) => Err(TransferError::Forwarding {
            direction,
            source: io::Error::other(format!("forwarding task failed: {err}")),
        }),
    }
}

fn exit_failed(status: &Option<io::Result<ExitStatus>>) -> bool {
    match status {
        None => false,
        Some(Ok(s)) => !s.success(),
        Some(Err(_)) => true,
    }
}

/// Writes into rsync after it exited cleanly; it already had everything it
/// needed.
fn is_late_write(err: &TransferError) -> bool {
    match err {
        TransferError::Forwarding { source, .. } => matches!(
            source.kind(),
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected
        ),
        _ => false,
    }
}

impl Session {
    /// Supervise until rsync has exited and both forwarders are joined.
    ///
    /// A forwarding failure kills rsync; once rsync is gone after any
    /// failure, forwarders still blocked are aborted. Every task is joined
    /// and the child reaped before this returns.
    pub(crate) async fn finish(self) -> Result<TransferStats> {
        let Session {
            context,
            program,
            mut child,
            diagnostics,
            mut outbound,
            mut inbound,
        } = self;

        let mut status: Option<io::Result<ExitStatus>> = None;
        let mut sent = Forwarded::Pending;
        let mut received = Forwarded::Pending;
        let mut killed = false;
        let mut aborted = false;

        while status.is_none() || sent.is_pending() || received.is_pending() {
            tokio::select! {
                res = child.wait(), if status.is_none() => {
                    status = Some(res);
                }
                res = &mut outbound, if sent.is_pending() => {
                    sent = Forwarded::Done(joined(res, Direction::Outbound));
                }
                res = &mut inbound, if received.is_pending() => {
                    received = Forwarded::Done(joined(res, Direction::Inbound));
                }
            }

            let failed = exit_failed(&status) || sent.failed() || received.failed();
            if !failed {
                continue;
            }
            if status.is_none() && !killed {
                log::debug!("{context}: forwarding failed, killing {program}");
                if let Err(err) = child.start_kill() {
                    log::debug!("kill {program}: {err}");
                }
                killed = true;
            }
            if status.is_some() && !aborted {
                if sent.is_pending() {
                    outbound.abort();
                }
                if received.is_pending() {
                    inbound.abort();
                }
                aborted = true;
            }
        }

        let diagnostics = diagnostics.collect(DIAGNOSTIC_DRAIN_TIMEOUT).await;

        let mut causes = Vec::new();
        let clean_exit = !exit_failed(&status);
        match status {
            Some(Ok(s)) if s.success() => {}
            Some(Ok(s)) => causes.push(TransferError::ProcessExit {
                program: program.clone(),
                code: s.code(),
                diagnostics: String::new(),
            }),
            Some(Err(err)) => causes.push(TransferError::io(format!("waiting for {program}"), err)),
            None => {}
        }

        let mut stats = TransferStats::default();
        if let Forwarded::Done(res) = sent {
            match res {
                Ok(bytes) => stats.bytes_sent = bytes,
                Err(err) => causes.push(err),
            }
        }
        if let Forwarded::Done(res) = received {
            match res {
                Ok(bytes) => stats.bytes_received = bytes,
                Err(err) if clean_exit && causes.is_empty() && is_late_write(&err) => {
                    log::debug!("{context}: ignoring write after {program} exited: {err}");
                }
                Err(err) => causes.push(err),
            }
        }

        if causes.is_empty() {
            log::debug!(
                "{context}: done ({} bytes sent, {} bytes received)",
                stats.bytes_sent,
                stats.bytes_received
            );
            Ok(stats)
        } else {
            Err(TransferError::Session {
                context,
                causes,
                diagnostics,
            })
        }
    }
}
