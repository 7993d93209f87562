pub mod config;
pub mod errors;
pub mod features;
pub mod local;
pub mod process;
pub mod progress;
pub mod version;

#[cfg(unix)]
pub mod bridge;
#[cfg(unix)]
pub mod helper;
#[cfg(unix)]
pub mod rendezvous;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub use config::TransferConfig;
pub use errors::{Result, TransferError};
pub use features::{Feature, FeatureSet};
pub use local::local_copy;
pub use version::at_least;

#[cfg(unix)]
pub use bridge::{recv, send, RecvRequest, SendRequest, TransferStats};
