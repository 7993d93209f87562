//! Symbolic transfer features and their rsync flags.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::config::TransferConfig;
use crate::version;

/// First rsync release that understands `--filter=-x`.
pub const XATTR_FILTER_MIN_VERSION: &str = "3.1.3";

/// SELinux labels are host specific and must never travel between hosts.
const XATTR_FILTER_ARG: &str = "--filter=-x security.selinux";

/// Low enough to stay cheap on constrained hosts.
const COMPRESS_LEVEL_ARG: &str = "--compress-level=2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    Xattrs,
    Delete,
    Compress,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Feature::Xattrs => "xattrs",
            Feature::Delete => "delete",
            Feature::Compress => "compress",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xattrs" => Ok(Feature::Xattrs),
            "delete" => Ok(Feature::Delete),
            "compress" => Ok(Feature::Compress),
            _ => Err(()),
        }
    }
}

/// Order-insensitive set of requested features.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    features: BTreeSet<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from names as received from a peer. Unknown names are skipped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in names {
            let name = name.as_ref();
            match name.parse::<Feature>() {
                Ok(feature) => {
                    set.insert(feature);
                }
                Err(()) => log::debug!("ignoring unknown transfer feature '{name}'"),
            }
        }
        set
    }

    pub fn insert(&mut self, feature: Feature) -> bool {
        self.features.insert(feature)
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.features.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(Feature::name).collect()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

/// Map features to rsync flags. `xattr_filter` says whether the installed
/// rsync supports the security-label exclusion filter.
pub fn feature_args(features: &FeatureSet, xattr_filter: bool) -> Vec<String> {
    let mut args = Vec::new();
    if features.contains(Feature::Xattrs) {
        args.extend(xattr_args(xattr_filter));
    }
    if features.contains(Feature::Delete) {
        args.push("--delete".to_string());
    }
    if features.contains(Feature::Compress) {
        args.push("--compress".to_string());
        args.push(COMPRESS_LEVEL_ARG.to_string());
    }
    args
}

pub(crate) fn xattr_args(xattr_filter: bool) -> Vec<String> {
    let mut args = vec!["--xattrs".to_string()];
    if xattr_filter {
        args.push(XATTR_FILTER_ARG.to_string());
    }
    args
}

/// Whether the configured rsync can exclude security labels.
pub(crate) async fn supports_xattr_filter(config: &TransferConfig) -> bool {
    version::at_least(config, XATTR_FILTER_MIN_VERSION).await
}

/// Feature flags for the installed rsync. The version is only probed when
/// the answer matters.
pub async fn negotiate(config: &TransferConfig, features: &FeatureSet) -> Vec<String> {
    let xattr_filter =
        features.contains(Feature::Xattrs) && supports_xattr_filter(config).await;
    let args = feature_args(features, xattr_filter);
    if !args.is_empty() {
        log::debug!("negotiated rsync feature flags: {}", args.join(" "));
    }
    args
}
