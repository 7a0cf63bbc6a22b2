//! Signaling RPC client
//!
//! [`SignalClient`] exposes the typed SFU methods on top of a
//! [`SignalTransport`], applying the retry policy to every call.

mod client;
mod transport;
mod twirp;

pub use client::{username_fragment, SignalClient};
#[cfg(test)]
pub use transport::MockSignalTransport;
pub use transport::SignalTransport;
pub use twirp::TwirpTransport;
