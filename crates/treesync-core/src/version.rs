//! Installed rsync version detection.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::config::TransferConfig;
use crate::errors::{Result, TransferError};
use crate::process::{run_captured, Invocation};

/// Numeric dotted version (`3.1.3`). Missing trailing components compare as
/// zero, so `3.1` equals `3.1.0`.
#[derive(Debug, Clone)]
pub struct DottedVersion {
    parts: Vec<u32>,
}

impl DottedVersion {
    pub fn parts(&self) -> &[u32] {
        &self.parts
    }

    fn component(&self, idx: usize) -> u32 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for DottedVersion {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let pieces: Vec<&str> = trimmed.split('.').collect();
        if pieces.len() < 2 {
            return Err(TransferError::VersionProbe(format!(
                "'{s}' is not a dotted version"
            )));
        }

        let last = pieces.len() - 1;
        let mut parts = Vec::with_capacity(pieces.len());
        for (idx, piece) in pieces.iter().enumerate() {
            // Only the final component may carry a suffix ("3.4.0dev").
            let digits = if idx == last {
                let end = piece
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(piece.len());
                &piece[..end]
            } else {
                piece
            };
            let value = digits.parse::<u32>().map_err(|_| {
                TransferError::VersionProbe(format!("'{s}' has a non-numeric component"))
            })?;
            parts.push(value);
        }

        Ok(Self { parts })
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self.parts.iter().map(u32::to_string).collect();
        write!(f, "{}", text.join("."))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|idx| self.component(idx).cmp(&other.component(idx)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

/// Extract the version from `rsync --version` output, whose first line reads
/// `rsync  version 3.2.7  protocol version 31`.
pub fn parse_version_output(output: &str) -> Option<DottedVersion> {
    let first = output.lines().next()?;
    let fields: Vec<&str> = first.split("  ").collect();
    if fields.len() < 3 {
        return None;
    }
    let token = fields[1].trim();
    let token = token.strip_prefix("version ").unwrap_or(token);
    token.parse().ok()
}

/// Query the configured rsync for its version.
pub async fn probe_version(config: &TransferConfig) -> Result<DottedVersion> {
    let mut invocation = Invocation::new(&config.rsync);
    invocation.arg("--version");
    let output = run_captured(&invocation).await?;
    if !output.status.success() {
        return Err(TransferError::VersionProbe(format!(
            "{} --version exited with {}",
            invocation.program_name(),
            output.status
        )));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    parse_version_output(&text).ok_or_else(|| {
        TransferError::VersionProbe(format!(
            "unrecognised version banner: {}",
            text.lines().next().unwrap_or_default()
        ))
    })
}

/// Whether the installed rsync is at least `min`. Any failure to run or
/// parse counts as "no", so callers fall back to omitting the gated flag.
pub async fn at_least(config: &TransferConfig, min: &str) -> bool {
    let min: DottedVersion = match min.parse() {
        Ok(v) => v,
        Err(err) => {
            log::debug!("invalid minimum rsync version: {err}");
            return false;
        }
    };
    match probe_version(config).await {
        Ok(installed) => installed >= min,
        Err(err) => {
            log::debug!("rsync version check against {min}: {err}");
            false
        }
    }
}
