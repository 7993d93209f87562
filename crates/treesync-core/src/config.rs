use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::process::RunWrapper;

/// How long the sender waits for rsync to dial the rendezvous endpoint.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by every transfer call.
///
/// Passed explicitly to each operation; nothing in this crate reads
/// process-wide state.
#[derive(Clone)]
pub struct TransferConfig {
    /// rsync executable, resolved through `PATH` when relative.
    pub rsync: PathBuf,
    /// Verbose rsync output (`-vi` instead of `-q` for local copies).
    pub debug: bool,
    /// Deadline for the rendezvous accept on the sending side.
    pub connect_timeout: Duration,
    /// Optional confinement hook applied to every rsync invocation.
    pub wrapper: Option<Arc<dyn RunWrapper>>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            rsync: PathBuf::from("rsync"),
            debug: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            wrapper: None,
        }
    }
}

impl TransferConfig {
    pub fn with_rsync(mut self, rsync: impl Into<PathBuf>) -> Self {
        self.rsync = rsync.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// A zero timeout would fail every send before rsync could dial in, so
    /// it selects [`DEFAULT_CONNECT_TIMEOUT`] instead.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = if timeout.is_zero() {
            log::warn!(
                "connect timeout of zero requested; using {}s",
                DEFAULT_CONNECT_TIMEOUT.as_secs()
            );
            DEFAULT_CONNECT_TIMEOUT
        } else {
            timeout
        };
        self
    }

    pub fn with_wrapper(mut self, wrapper: Arc<dyn RunWrapper>) -> Self {
        self.wrapper = Some(wrapper);
        self
    }
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("rsync", &self.rsync)
            .field("debug", &self.debug)
            .field("connect_timeout", &self.connect_timeout)
            .field("wrapper", &self.wrapper.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_connect_timeout_uses_default() {
        let config = TransferConfig::default().with_connect_timeout(Duration::ZERO);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);

        let config = TransferConfig::default().with_connect_timeout(Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }
}
