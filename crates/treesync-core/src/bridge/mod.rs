//! Bridging rsync's remote-shell protocol onto a caller-supplied stream.
//!
//! [`send`] and [`recv`] are run concurrently on the two ends of one duplex
//! stream. Each reports its own outcome; neither retries.

pub(crate) mod forward;
pub mod recv;
pub mod send;
mod session;

pub use recv::{recv, RecvRequest};
pub use send::{send, SendRequest};
pub use session::TransferStats;
