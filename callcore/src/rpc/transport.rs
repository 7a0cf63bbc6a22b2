use async_trait::async_trait;

use crate::error::Result;
use crate::retry::RpcInvocationAttempt;

/// Carries one unary signaling call to the SFU.
///
/// Payloads are the JSON encodings of the request and response messages.
/// Implementations report transport-level cancellation as
/// `Error::Cancelled(CancelSource::Transport)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalTransport: Send + Sync {
    async fn unary(
        &self,
        attempt: RpcInvocationAttempt,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value>;
}
