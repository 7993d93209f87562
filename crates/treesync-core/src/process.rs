//! Subprocess plumbing shared by the local and bridged transfer paths.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use crate::config::TransferConfig;
use crate::errors::{Result, TransferError};

/// Upper bound on waiting for stderr to close once rsync has exited.
///
/// The netcat helper inherits rsync's stderr, so a stray grandchild can keep
/// the pipe open after the process we reaped is gone.
pub(crate) const DIAGNOSTIC_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A program plus its arguments, open to rewriting by a [`RunWrapper`]
/// before anything is spawned.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Wrap the current program: `prefix... <program> <args...>`.
    pub fn prepend(&mut self, program: impl Into<PathBuf>, prefix_args: &[&str]) -> &mut Self {
        let inner = std::mem::replace(&mut self.program, program.into());
        let mut args: Vec<OsString> = prefix_args.iter().map(OsString::from).collect();
        args.push(inner.into_os_string());
        args.append(&mut self.args);
        self.args = args;
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    pub(crate) fn spawn(&self, mut cmd: Command) -> Result<Child> {
        log::debug!("spawning {}", self);
        cmd.spawn().map_err(|source| TransferError::Spawn {
            program: self.program_name(),
            source,
        })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Hook allowed to rewrite an rsync invocation before it runs, for example
/// to launch it under a confinement profile.
///
/// `source` and `destination` are the local paths the transfer reads from
/// and writes to; the side that is not local is passed as an empty string.
pub trait RunWrapper: Send + Sync {
    fn wrap(
        &self,
        invocation: &mut Invocation,
        source: &str,
        destination: &str,
    ) -> io::Result<WrapGuard>;
}

impl<F> RunWrapper for F
where
    F: Fn(&mut Invocation, &str, &str) -> io::Result<WrapGuard> + Send + Sync,
{
    fn wrap(
        &self,
        invocation: &mut Invocation,
        source: &str,
        destination: &str,
    ) -> io::Result<WrapGuard> {
        self(invocation, source, destination)
    }
}

/// Cleanup returned by a [`RunWrapper`], run when the transfer call returns.
#[must_use]
pub struct WrapGuard {
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl WrapGuard {
    pub fn none() -> Self {
        Self { cleanup: None }
    }

    pub fn on_drop(cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }
}

impl Drop for WrapGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

pub(crate) fn apply_wrapper(
    config: &TransferConfig,
    invocation: &mut Invocation,
    source: &str,
    destination: &str,
) -> Result<WrapGuard> {
    match &config.wrapper {
        Some(wrapper) => wrapper
            .wrap(invocation, source, destination)
            .map_err(TransferError::Wrapper),
        None => Ok(WrapGuard::none()),
    }
}

/// Output of a process run to completion.
#[derive(Debug)]
pub(crate) struct CapturedOutput {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}

impl CapturedOutput {
    pub(crate) fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// Run to completion with stdout and stderr drained concurrently.
pub(crate) async fn run_captured(invocation: &Invocation) -> Result<CapturedOutput> {
    log::debug!("running {}", invocation);
    let output = invocation
        .command()
        .output()
        .await
        .map_err(|source| TransferError::Spawn {
            program: invocation.program_name(),
            source,
        })?;
    Ok(CapturedOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Background reader accumulating a child's stderr.
pub(crate) struct DiagnosticCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl DiagnosticCapture {
    pub(crate) fn spawn(stderr: Option<ChildStderr>, label: String) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let handle = tokio::spawn(async move {
            let Some(mut stderr) = stderr else {
                return;
            };
            let mut chunk = [0u8; 4096];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        sink.lock().extend_from_slice(&chunk[..n]);
                    }
                    Err(err) => {
                        log::error!("rsync stderr read failed: {label}: {err}");
                        break;
                    }
                }
            }
        });
        Self { buffer, handle }
    }

    /// Wait for stderr to close (bounded by `deadline`) and return the text
    /// collected so far.
    pub(crate) async fn collect(self, deadline: Duration) -> String {
        let Self { buffer, mut handle } = self;
        if tokio::time::timeout(deadline, &mut handle).await.is_err() {
            log::warn!(
                "rsync stderr still open {}s after exit; returning partial diagnostics",
                deadline.as_secs()
            );
            handle.abort();
            let _ = handle.await;
        }
        let text = String::from_utf8_lossy(&buffer.lock()).into_owned();
        text
    }
}

/// Force-terminate and reap a child. Errors are logged; the child is gone
/// or was already gone afterwards.
pub(crate) async fn kill_and_reap(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        log::debug!("kill rsync: {err}");
    }
    if let Err(err) = child.wait().await {
        log::warn!("waiting for killed rsync: {err}");
    }
}
