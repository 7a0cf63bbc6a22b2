//! JSON-over-HTTP transport for the signaling service

use async_trait::async_trait;
use callcore_proto::signal::SIGNAL_SERVICE;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::trace;

use crate::config::SfuConfig;
use crate::error::{CancelSource, Error, Result};
use crate::retry::RpcInvocationAttempt;

use super::transport::SignalTransport;

/// Header tagging each request with its zero-based retry attempt
pub const ATTEMPT_HEADER: &str = "x-rpc-attempt";

/// Error body returned by the signaling server on non-2xx responses
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TwirpErrorBody {
    code: String,
    msg: String,
}

/// Error codes that indicate the same request may succeed later
const RETRYABLE_CODES: [&str; 4] = ["unavailable", "internal", "deadline_exceeded", "resource_exhausted"];

pub struct TwirpTransport {
    client: Client,
    base_url: String,
    authorization: HeaderValue,
}

impl TwirpTransport {
    /// Build a transport bound to the SFU URL and bearer credential in `config`
    pub fn new(config: &SfuConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(Error::transport)?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| Error::Protocol(format!("Invalid SFU token: {e}")))?;
        authorization.set_sensitive(true);

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    fn route(&self, method: &str) -> String {
        format!("{}/twirp/{SIGNAL_SERVICE}/{method}", self.base_url)
    }
}

fn request_error(method: &'static str, err: &reqwest::Error) -> Error {
    Error::Rpc {
        method,
        message: err.to_string(),
        retryable: err.is_timeout() || err.is_connect() || err.is_request(),
    }
}

fn status_error(method: &'static str, status: StatusCode, body: &str) -> Error {
    let twirp: TwirpErrorBody = serde_json::from_str(body).unwrap_or_default();
    if twirp.code == "canceled" {
        return Error::Cancelled(CancelSource::Transport);
    }

    let retryable = status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || RETRYABLE_CODES.contains(&twirp.code.as_str());
    let message = if twirp.msg.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status} ({}): {}", twirp.code, twirp.msg)
    };

    Error::Rpc {
        method,
        message,
        retryable,
    }
}

#[async_trait]
impl SignalTransport for TwirpTransport {
    async fn unary(
        &self,
        attempt: RpcInvocationAttempt,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let method = attempt.method;
        trace!(method, attempt = attempt.attempt, "Sending signaling request");

        let response = self
            .client
            .post(self.route(method))
            .header(AUTHORIZATION, self.authorization.clone())
            .header(ATTEMPT_HEADER, attempt.attempt.to_string())
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_error(method, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(method, status, &body));
        }

        response.json().await.map_err(|e| Error::Rpc {
            method,
            message: format!("Invalid response body: {e}"),
            retryable: false,
        })
    }
}
