//! Call session core for an SFU-backed media call.
//!
//! [`CallSession`] drives the subscriber and publisher peer connections,
//! [`rpc::SignalClient`] talks to the SFU signaling service and
//! [`layers`] plans the simulcast ladder for published video. The
//! peer-connection stack itself is supplied through the traits in [`media`].

pub mod codecs;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod layers;
pub mod logging;
pub mod media;
pub mod retry;
pub mod rpc;
pub mod session;

#[cfg(test)]
pub mod test_helpers;

pub use config::ClientConfig;
pub use dispatcher::{Dispatcher, HandlerId, Subscription};
pub use error::{CancelSource, DeviceError, Error, Result};
pub use retry::{RetryPolicy, RpcInvocationAttempt};
pub use rpc::SignalClient;
pub use session::{CallSession, MuteState, PublishState, SessionState};
