//! Error types for directory transfers.
//!
//! Failures are split by origin so callers can tell a tool failure from a
//! stream failure:
//! - Spawn/Wrapper: the invocation never started
//! - ConnectTimeout/Accept: rsync never reached the rendezvous endpoint
//! - ProcessExit: rsync ran and exited unsuccessfully
//! - Forwarding: bytes could not be moved in one direction
//! - Session: the aggregate reported by send/recv

use std::fmt;
use std::io;
use std::time::Duration;

/// Exit status rsync uses for "some source files vanished before they could
/// be transferred".
pub const RSYNC_EXIT_VANISHED: i32 = 24;

/// One half of the full-duplex bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes produced by the local rsync, written to the caller stream.
    Outbound,
    /// Bytes read from the caller stream, fed to the local rsync.
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => write!(f, "rsync -> stream"),
            Direction::Inbound => write!(f, "stream -> rsync"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("run wrapper rejected invocation: {0}")]
    Wrapper(#[source] io::Error),

    #[error("rsync failed to spawn after {}s ({diagnostics})", .timeout.as_secs())]
    ConnectTimeout {
        timeout: Duration,
        diagnostics: String,
    },

    #[error("failed to connect to rsync socket: {source} ({diagnostics})")]
    Accept {
        #[source]
        source: io::Error,
        diagnostics: String,
    },

    #[error("{program} {}", describe_exit(.code))]
    ProcessExit {
        program: String,
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("forwarding {direction} failed: {source}")]
    Forwarding {
        direction: Direction,
        #[source]
        source: io::Error,
    },

    #[error("version probe failed: {0}")]
    VersionProbe(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: [{}] ({diagnostics})", join_causes(.causes))]
    Session {
        context: String,
        causes: Vec<TransferError>,
        diagnostics: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn join_causes(causes: &[TransferError]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TransferError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        TransferError::Io {
            context: context.into(),
            source,
        }
    }

    /// Exit code of the failed process, looking through session aggregates.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TransferError::ProcessExit { code, .. } => *code,
            TransferError::Session { causes, .. } => causes.iter().find_map(Self::exit_code),
            _ => None,
        }
    }

    /// True when rsync only complained about source files disappearing
    /// mid-transfer.
    pub fn is_vanished_source(&self) -> bool {
        matches!(
            self,
            TransferError::ProcessExit {
                code: Some(RSYNC_EXIT_VANISHED),
                ..
            }
        )
    }

    /// True when any cause is a forwarding failure.
    pub fn is_forwarding(&self) -> bool {
        match self {
            TransferError::Forwarding { .. } => true,
            TransferError::Session { causes, .. } => causes.iter().any(Self::is_forwarding),
            _ => false,
        }
    }

    /// Captured rsync stderr (or combined output for local copies), if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            TransferError::ConnectTimeout { diagnostics, .. }
            | TransferError::Accept { diagnostics, .. }
            | TransferError::ProcessExit { diagnostics, .. }
            | TransferError::Session { diagnostics, .. } => Some(diagnostics.as_str()),
            _ => None,
        }
    }

    /// Individual failures making up a session error; a single-element
    /// slice for every other variant.
    pub fn causes(&self) -> &[TransferError] {
        match self {
            TransferError::Session { causes, .. } => causes,
            other => std::slice::from_ref(other),
        }
    }
}

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(code: Option<i32>) -> TransferError {
        TransferError::ProcessExit {
            program: "rsync".into(),
            code,
            diagnostics: String::new(),
        }
    }

    #[test]
    fn vanished_code_is_classified() {
        assert!(exit(Some(RSYNC_EXIT_VANISHED)).is_vanished_source());
        assert!(!exit(Some(23)).is_vanished_source());
        assert!(!exit(None).is_vanished_source());
    }

    #[test]
    fn session_lists_every_cause_and_diagnostics() {
        let err = TransferError::Session {
            context: "rsync send failed: c1, /src/".into(),
            causes: vec![
                exit(Some(12)),
                TransferError::Forwarding {
                    direction: Direction::Inbound,
                    source: io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"),
                },
            ],
            diagnostics: "rsync error: protocol data stream".into(),
        };

        let text = err.to_string();
        assert!(text.contains("exited with status 12"), "{text}");
        assert!(text.contains("stream -> rsync"), "{text}");
        assert!(text.contains("peer gone"), "{text}");
        assert!(text.contains("protocol data stream"), "{text}");
        assert_eq!(err.exit_code(), Some(12));
        assert!(err.is_forwarding());
        assert_eq!(err.causes().len(), 2);
    }

    #[test]
    fn signal_exit_has_no_code() {
        let err = exit(None);
        assert_eq!(err.exit_code(), None);
        assert!(err.to_string().contains("terminated by signal"));
        assert_eq!(err.causes().len(), 1);
    }
}
