use callcore_proto::models::{CodecSettings, PeerType};
use callcore_proto::signal::{
    IceCandidateRequest, IceRestartRequest, JoinRequest, JoinResponse, MuteStateChange,
    RequestVideoQualityRequest, SendAnswerRequest, SendStatsRequest, SetPublisherRequest,
    SetPublisherResponse, SignalMethod, SignalResponse, SubscriptionMap, UpdateMuteStateRequest,
    UpdateSubscriptionsRequest, UserVideoQuality,
};
use callcore_proto::SessionId;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::retry::{RetryHint, RetryPolicy};

use super::transport::SignalTransport;
use super::twirp::TwirpTransport;

/// Methods whose request/response exchange SDP and get logged in detail
const SDP_METHODS: [&str; 3] = ["Join", "SetPublisher", "SendAnswer"];

/// A decoded response together with the raw payload it came from
struct Reply<R> {
    response: R,
    raw: Value,
}

impl<R: SignalResponse> RetryHint for Reply<R> {
    fn retry_error(&self) -> Option<Error> {
        self.response
            .error()
            .filter(|error| error.should_retry)
            .map(|error| Error::Server(error.clone()))
    }
}

fn sdp_len(payload: &Value) -> Option<usize> {
    ["sdp", "subscriberSdpOffer"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_str))
        .map(str::len)
}

/// Extract the `ufrag` attribute from an ICE candidate line
#[must_use]
pub fn username_fragment(candidate: &str) -> Option<String> {
    let mut parts = candidate.split_whitespace();
    parts
        .by_ref()
        .find(|part| *part == "ufrag")
        .and_then(|_| parts.next())
        .map(ToString::to_string)
}

/// Typed client for the SFU signaling service, bound to one session
#[derive(Clone)]
pub struct SignalClient {
    session_id: SessionId,
    transport: Arc<dyn SignalTransport>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl SignalClient {
    pub fn new(
        session_id: SessionId,
        transport: Arc<dyn SignalTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            session_id,
            transport,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Client speaking JSON over HTTP to the configured SFU
    pub fn from_config(config: &ClientConfig, session_id: SessionId) -> Result<Self> {
        let transport = TwirpTransport::new(&config.sfu)?;
        Ok(Self::new(
            session_id,
            Arc::new(transport),
            RetryPolicy::from(&config.retry),
        ))
    }

    /// Abort pending retries when `token` fires
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The same client bound to another session
    #[must_use]
    pub fn with_session_id(&self, session_id: SessionId) -> Self {
        Self {
            session_id,
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn invoke<M: SignalMethod>(&self, request: &M) -> Result<M::Response> {
        let method = M::METHOD;
        let payload = serde_json::to_value(request)?;
        let detailed = SDP_METHODS.contains(&method);

        if detailed {
            debug!(
                session_id = %self.session_id,
                method,
                sdp_bytes = sdp_len(&payload),
                "Sending signaling request"
            );
        }
        trace!(method, request = %payload, "Signaling request payload");

        let reply: Reply<M::Response> = self
            .retry
            .run(method, &self.cancel, |attempt| {
                let transport = Arc::clone(&self.transport);
                let payload = payload.clone();
                async move {
                    let raw = transport.unary(attempt, payload).await?;
                    let response = serde_json::from_value(raw.clone())?;
                    Ok(Reply { response, raw })
                }
            })
            .await?;

        trace!(method, response = %reply.raw, "Signaling response payload");
        if detailed {
            debug!(
                session_id = %self.session_id,
                method,
                sdp_bytes = sdp_len(&reply.raw),
                "Signaling request answered"
            );
        }

        if let Some(error) = reply.response.error() {
            return Err(Error::Server(error.clone()));
        }
        Ok(reply.response)
    }

    pub async fn join(
        &self,
        subscriber_sdp_offer: String,
        codec_settings: CodecSettings,
    ) -> Result<JoinResponse> {
        self.invoke(&JoinRequest {
            session_id: self.session_id.clone(),
            subscriber_sdp_offer,
            codec_settings,
        })
        .await
    }

    pub async fn set_publisher(&self, sdp: String) -> Result<SetPublisherResponse> {
        self.invoke(&SetPublisherRequest {
            session_id: self.session_id.clone(),
            sdp,
        })
        .await
    }

    /// Forward a locally gathered candidate for the given transport
    pub async fn send_ice_candidate(
        &self,
        publisher: bool,
        candidate: &RTCIceCandidateInit,
    ) -> Result<()> {
        let username_fragment = candidate
            .username_fragment
            .clone()
            .filter(|ufrag| !ufrag.is_empty())
            .or_else(|| username_fragment(&candidate.candidate));

        self.invoke(&IceCandidateRequest {
            session_id: self.session_id.clone(),
            publisher,
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment,
        })
        .await
        .map(drop)
    }

    pub async fn send_answer(&self, peer_type: PeerType, sdp: String) -> Result<()> {
        self.invoke(&SendAnswerRequest {
            session_id: self.session_id.clone(),
            peer_type,
            sdp,
        })
        .await
        .map(drop)
    }

    pub async fn update_mute_state(&self, mute: MuteStateChange) -> Result<()> {
        self.invoke(&UpdateMuteStateRequest {
            session_id: self.session_id.clone(),
            mute,
        })
        .await
        .map(drop)
    }

    pub async fn update_subscriptions(&self, subscriptions: SubscriptionMap) -> Result<()> {
        self.invoke(&UpdateSubscriptionsRequest {
            session_id: self.session_id.clone(),
            subscriptions,
        })
        .await
        .map(drop)
    }

    pub async fn request_video_quality(&self, stream_qualities: Vec<UserVideoQuality>) -> Result<()> {
        self.invoke(&RequestVideoQualityRequest {
            session_id: self.session_id.clone(),
            stream_qualities,
        })
        .await
        .map(drop)
    }

    /// Report the JSON encoded stats of both transports
    pub async fn send_stats(&self, subscriber_stats: String, publisher_stats: String) -> Result<()> {
        self.invoke(&SendStatsRequest {
            session_id: self.session_id.clone(),
            subscriber_stats,
            publisher_stats,
            sdk: env!("CARGO_PKG_NAME").to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn ice_restart(&self, peer_type: PeerType) -> Result<()> {
        self.invoke(&IceRestartRequest {
            session_id: self.session_id.clone(),
            peer_type,
        })
        .await
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockSignalTransport;
    use callcore_proto::models::{CallState, Participant, VideoDimension};
    use callcore_proto::UserId;
    use serde_json::json;

    fn client(transport: MockSignalTransport, max_attempts: usize) -> SignalClient {
        SignalClient::new(
            SessionId::from("session-1"),
            Arc::new(transport),
            RetryPolicy::default().with_max_attempts(Some(max_attempts)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_sends_session_and_returns_call_state() {
        let mut transport = MockSignalTransport::new();
        transport
            .expect_unary()
            .withf(|attempt, payload| {
                attempt.method == "Join"
                    && attempt.attempt == 0
                    && payload["sessionId"] == "session-1"
                    && payload["subscriberSdpOffer"] == "offer-sdp"
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "sdp": "answer-sdp",
                    "callState": {"participants": [{"userId": "alice", "sessionId": "s-a"}]}
                }))
            });

        let response = client(transport, 5)
            .join("offer-sdp".to_string(), CodecSettings::default())
            .await
            .unwrap();

        assert_eq!(response.sdp, "answer-sdp");
        assert_eq!(
            response.call_state,
            Some(CallState {
                participants: vec![Participant {
                    user_id: UserId::from("alice"),
                    session_id: SessionId::from("s-a"),
                    ..Default::default()
                }],
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_error_without_retry_flag_fails_once() {
        let mut transport = MockSignalTransport::new();
        transport.expect_unary().times(1).returning(|_, _| {
            Ok(json!({"error": {"code": "PARTICIPANT_NOT_FOUND", "message": "gone", "shouldRetry": false}}))
        });

        let err = client(transport, 5)
            .update_subscriptions(SubscriptionMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Server(ref e) if e.code == "PARTICIPANT_NOT_FOUND"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_error_with_retry_flag_is_retried() {
        let mut transport = MockSignalTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_unary()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(json!({"error": {"code": "UNAVAILABLE", "message": "busy", "shouldRetry": true}}))
            });
        transport
            .expect_unary()
            .withf(|attempt, _| attempt.attempt == 2)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(json!({"sdp": "publisher-answer"})));

        let response = client(transport, 5)
            .set_publisher("publisher-offer".to_string())
            .await
            .unwrap();

        assert_eq!(response.sdp, "publisher-answer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_flag_exhausts_attempts() {
        let mut transport = MockSignalTransport::new();
        transport.expect_unary().times(3).returning(|_, _| {
            Ok(json!({"error": {"code": "UNAVAILABLE", "message": "busy", "shouldRetry": true}}))
        });

        let err = client(transport, 3)
            .update_mute_state(MuteStateChange::AudioMuteChanged(Default::default()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Server(ref e) if e.should_retry));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ice_candidate_carries_parsed_ufrag() {
        let mut transport = MockSignalTransport::new();
        transport
            .expect_unary()
            .withf(|attempt, payload| {
                attempt.method == "SendIceCandidate"
                    && payload["publisher"] == true
                    && payload["usernameFragment"] == "Xk3p"
                    && payload["sdpMid"] == "0"
            })
            .times(1)
            .returning(|_, _| Ok(json!({})));

        let candidate = RTCIceCandidateInit {
            candidate: "candidate:1 1 udp 2122260223 192.0.2.10 54321 typ host generation 0 ufrag Xk3p network-id 1".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };

        client(transport, 5)
            .send_ice_candidate(true, &candidate)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_are_keyed_by_user() {
        let mut transport = MockSignalTransport::new();
        transport
            .expect_unary()
            .withf(|_, payload| payload["subscriptions"]["bob"]["width"] == 640)
            .times(1)
            .returning(|_, _| Ok(json!({})));

        let mut subscriptions = SubscriptionMap::new();
        subscriptions.insert(UserId::from("bob"), VideoDimension::new(640, 480));
        client(transport, 5)
            .update_subscriptions(subscriptions)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebound_client_reports_stats_for_new_session() {
        let mut transport = MockSignalTransport::new();
        transport
            .expect_unary()
            .withf(|attempt, payload| {
                attempt.method == "SendStats"
                    && payload["sessionId"] == "session-2"
                    && payload["subscriberStats"] == "{}"
                    && payload["publisherStats"] == ""
                    && payload["sdk"] == "callcore"
            })
            .times(1)
            .returning(|_, _| Ok(json!({})));

        let original = client(transport, 5);
        let rebound = original.with_session_id(SessionId::from("session-2"));

        rebound
            .send_stats("{}".to_string(), String::new())
            .await
            .unwrap();
        assert_eq!(original.session_id().as_str(), "session-1");
        assert_eq!(rebound.session_id().as_str(), "session-2");
    }

    #[test]
    fn test_username_fragment_parsing() {
        assert_eq!(
            username_fragment("candidate:0 1 UDP 1 10.0.0.1 9 typ host ufrag abcd"),
            Some("abcd".to_string())
        );
        assert_eq!(username_fragment("candidate:0 1 UDP 1 10.0.0.1 9 typ host"), None);
        assert_eq!(username_fragment("candidate:0 ufrag"), None);
    }
}
