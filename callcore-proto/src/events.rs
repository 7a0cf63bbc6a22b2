//! Inbound signaling events delivered over the receive transport

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{PeerType, SfuError};
use crate::types::SessionId;

/// Events pushed by the SFU. Exactly one payload is present per message and
/// the variant decides which listeners receive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalingMessage {
    /// Offer to renegotiate the receive transport
    SubscriberOffer(SubscriberOffer),
    /// Quality-change request for published video
    ChangePublishQuality(ChangePublishQuality),
    /// Transport error reported by the SFU
    Error(ErrorEvent),
    /// Remote ICE candidate for one of the two transports
    IceTrickle(IceTrickle),
}

impl SignalingMessage {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::SubscriberOffer(_) => EventKind::SubscriberOffer,
            Self::ChangePublishQuality(_) => EventKind::ChangePublishQuality,
            Self::Error(_) => EventKind::Error,
            Self::IceTrickle(_) => EventKind::IceTrickle,
        }
    }
}

/// Routing key of a [`SignalingMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    SubscriberOffer,
    ChangePublishQuality,
    Error,
    IceTrickle,
}

impl EventKind {
    pub const ALL: [Self; 4] = [
        Self::SubscriberOffer,
        Self::ChangePublishQuality,
        Self::Error,
        Self::IceTrickle,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SubscriberOffer => "subscriberOffer",
            Self::ChangePublishQuality => "changePublishQuality",
            Self::Error => "error",
            Self::IceTrickle => "iceTrickle",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriberOffer {
    pub ice_restart: bool,
    pub sdp: String,
}

/// Requested state of one simulcast layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublishLayerSetting {
    pub name: String,
    pub active: bool,
    pub max_bitrate: u32,
    pub scale_resolution_down_by: f64,
}

/// Layer settings for one published video sender
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoSenderSetting {
    pub layers: Vec<PublishLayerSetting>,
}

impl VideoSenderSetting {
    /// Names of the layers the SFU wants enabled, in announced order
    #[must_use]
    pub fn active_rids(&self) -> Vec<String> {
        self.layers
            .iter()
            .filter(|layer| layer.active)
            .map(|layer| layer.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePublishQuality {
    pub video_senders: Vec<VideoSenderSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorEvent {
    pub error: Option<SfuError>,
}

/// Remote candidate; `ice_candidate` holds the JSON-encoded candidate init
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IceTrickle {
    pub peer_type: PeerType,
    pub ice_candidate: String,
    pub session_id: SessionId,
}
