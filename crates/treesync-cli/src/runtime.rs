use eyre::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use treesync_core::config::DEFAULT_CONNECT_TIMEOUT;
use treesync_core::{Feature, FeatureSet, TransferConfig};

use crate::cli::Cli;

/// Effective settings after merging the config file with CLI flags.
#[derive(Debug)]
pub(crate) struct Runtime {
    pub(crate) transfer: TransferConfig,
    pub(crate) bwlimit: Option<String>,
    pub(crate) features: FeatureSet,
    pub(crate) warnings: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    transfer: RawTransferSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawTransferSection {
    rsync: Option<PathBuf>,
    debug: Option<bool>,
    connect_timeout_secs: Option<u64>,
    bwlimit: Option<String>,
    #[serde(default)]
    features: Vec<String>,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/treesync/config.toml")
}

fn read_config(path: &Path) -> Result<RawConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str::<RawConfig>(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

pub(crate) fn load_runtime(args: &Cli) -> Result<Runtime> {
    let config_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => Some(default_config_path()).filter(|candidate| candidate.exists()),
    };

    let raw = match &config_path {
        Some(path) => read_config(path)?,
        None => RawConfig::default(),
    };
    let section = raw.transfer;

    let mut warnings = Vec::new();
    let mut features = FeatureSet::new();
    for name in &section.features {
        match name.parse::<Feature>() {
            Ok(feature) => {
                features.insert(feature);
            }
            Err(()) => warnings.push(format!("ignoring unknown feature '{name}' in config")),
        }
    }

    let connect_timeout = match section.connect_timeout_secs {
        Some(0) => {
            warnings.push("connect_timeout_secs must be positive; using default".to_string());
            DEFAULT_CONNECT_TIMEOUT
        }
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_CONNECT_TIMEOUT,
    };

    let mut transfer = TransferConfig::default()
        .with_debug(args.debug || section.debug.unwrap_or(false))
        .with_connect_timeout(connect_timeout);
    if let Some(rsync) = args.rsync.clone().or(section.rsync) {
        transfer = transfer.with_rsync(rsync);
    }

    Ok(Runtime {
        transfer,
        bwlimit: section.bwlimit.filter(|limit| !limit.trim().is_empty()),
        features,
        warnings,
    })
}

impl Runtime {
    /// Config-file features plus those named on the command line.
    pub(crate) fn features_with(&self, extra: &[String]) -> FeatureSet {
        let mut features = self.features.clone();
        for feature in FeatureSet::from_names(extra).iter() {
            features.insert(feature);
        }
        features
    }

    /// Command-line cap wins over the config file.
    pub(crate) fn bwlimit_with(&self, flag: Option<&String>) -> String {
        flag.cloned()
            .or_else(|| self.bwlimit.clone())
            .unwrap_or_default()
    }
}
