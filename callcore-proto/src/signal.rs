//! Unary RPC surface of the SFU signaling server
//!
//! Every request type implements [`SignalMethod`], which binds it to the
//! RPC method name and the response type. Every response may carry an
//! [`SfuError`] even when the call succeeded at the transport level.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{CallState, CodecSettings, PeerType, SfuError, VideoDimension, VideoQuality};
use crate::types::{SessionId, UserId};

/// Fully qualified service name used to build RPC routes
pub const SIGNAL_SERVICE: &str = "stream.video.sfu.signal.SignalServer";

/// Binds a request type to its RPC method and response
pub trait SignalMethod: Serialize + Send + Sync {
    /// RPC method name, as routed by the signaling server
    const METHOD: &'static str;

    type Response: SignalResponse;
}

/// Response types expose the optional server error they may carry
pub trait SignalResponse: DeserializeOwned + Send + 'static {
    fn error(&self) -> Option<&SfuError>;
}

macro_rules! signal_response {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SignalResponse for $ty {
                fn error(&self) -> Option<&SfuError> {
                    self.error.as_ref()
                }
            }
        )+
    };
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JoinRequest {
    pub session_id: SessionId,
    pub subscriber_sdp_offer: String,
    pub codec_settings: CodecSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JoinResponse {
    pub sdp: String,
    pub call_state: Option<CallState>,
    pub error: Option<SfuError>,
}

impl SignalMethod for JoinRequest {
    const METHOD: &'static str = "Join";
    type Response = JoinResponse;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetPublisherRequest {
    pub session_id: SessionId,
    pub sdp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetPublisherResponse {
    pub sdp: String,
    pub session_id: SessionId,
    pub ice_restart: bool,
    pub error: Option<SfuError>,
}

impl SignalMethod for SetPublisherRequest {
    const METHOD: &'static str = "SetPublisher";
    type Response = SetPublisherResponse;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IceCandidateRequest {
    pub session_id: SessionId,
    pub publisher: bool,
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl SignalMethod for IceCandidateRequest {
    const METHOD: &'static str = "SendIceCandidate";
    type Response = Ack;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendAnswerRequest {
    pub session_id: SessionId,
    pub peer_type: PeerType,
    pub sdp: String,
}

impl SignalMethod for SendAnswerRequest {
    const METHOD: &'static str = "SendAnswer";
    type Response = Ack;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MuteChanged {
    pub muted: bool,
}

/// Exactly one media kind changes per mute update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MuteStateChange {
    AudioMuteChanged(MuteChanged),
    VideoMuteChanged(MuteChanged),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMuteStateRequest {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub mute: MuteStateChange,
}

impl SignalMethod for UpdateMuteStateRequest {
    const METHOD: &'static str = "UpdateMuteState";
    type Response = Ack;
}

/// Desired receive resolution per remote participant
pub type SubscriptionMap = BTreeMap<UserId, VideoDimension>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateSubscriptionsRequest {
    pub session_id: SessionId,
    pub subscriptions: SubscriptionMap,
}

impl SignalMethod for UpdateSubscriptionsRequest {
    const METHOD: &'static str = "UpdateSubscriptions";
    type Response = Ack;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserVideoQuality {
    pub for_user_id: UserId,
    pub quality: VideoQuality,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestVideoQualityRequest {
    pub session_id: SessionId,
    pub stream_qualities: Vec<UserVideoQuality>,
}

impl SignalMethod for RequestVideoQualityRequest {
    const METHOD: &'static str = "RequestVideoQuality";
    type Response = Ack;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IceRestartRequest {
    pub session_id: SessionId,
    pub peer_type: PeerType,
}

impl SignalMethod for IceRestartRequest {
    const METHOD: &'static str = "IceRestart";
    type Response = Ack;
}

/// Periodic client stats report; each transport's stats are JSON encoded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendStatsRequest {
    pub session_id: SessionId,
    pub subscriber_stats: String,
    pub publisher_stats: String,
    pub sdk: String,
    pub sdk_version: String,
}

impl SignalMethod for SendStatsRequest {
    const METHOD: &'static str = "SendStats";
    type Response = Ack;
}

/// Empty acknowledgement shared by the fire-and-confirm methods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ack {
    pub error: Option<SfuError>,
}

signal_response!(JoinResponse, SetPublisherResponse, Ack);
