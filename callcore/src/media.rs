//! Peer-connection and capture-device primitives
//!
//! The real-time transport is provided by the embedding platform. These
//! traits describe the subset of it the call session drives: offer/answer
//! exchange, candidate trickling, a signaling data channel, send-side
//! transceivers and capture devices.

use async_trait::async_trait;
use callcore_proto::models::{Codec, PeerType};
use std::fmt;
use std::sync::Arc;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::stats::StatsReport;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture device kinds that can be switched while publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    AudioInput,
    VideoInput,
}

impl DeviceKind {
    #[must_use]
    pub const fn media_kind(&self) -> MediaKind {
        match self {
            Self::AudioInput => MediaKind::Audio,
            Self::VideoInput => MediaKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    /// Empty when the platform produced a description without a body
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.sdp.trim().is_empty()
    }
}

/// Current settings of a capture track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub device_id: Option<String>,
}

pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    fn kind(&self) -> MediaKind;

    fn settings(&self) -> TrackSettings;

    /// Release the underlying capture hardware
    fn stop(&self);
}

/// A set of tracks captured together
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    #[must_use]
    pub fn tracks_of(&self, kind: MediaKind) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .filter(|track| track.kind() == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn video_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks_of(MediaKind::Video)
    }

    #[must_use]
    pub fn audio_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks_of(MediaKind::Audio)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Send-side parameters of one encoding (simulcast layer)
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingParameters {
    pub rid: Option<String>,
    pub active: bool,
    pub max_bitrate: Option<u32>,
    pub scale_resolution_down_by: Option<f64>,
}

impl Default for EncodingParameters {
    fn default() -> Self {
        Self {
            rid: None,
            active: true,
            max_bitrate: None,
            scale_resolution_down_by: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendParameters {
    pub encodings: Vec<EncodingParameters>,
}

#[derive(Debug, Clone)]
pub struct TransceiverInit {
    pub direction: RTCRtpTransceiverDirection,
    pub stream_ids: Vec<String>,
    pub send_encodings: Vec<EncodingParameters>,
}

impl TransceiverInit {
    pub fn send_only(stream_ids: Vec<String>, send_encodings: Vec<EncodingParameters>) -> Self {
        Self {
            direction: RTCRtpTransceiverDirection::Sendonly,
            stream_ids,
            send_encodings,
        }
    }
}

#[async_trait]
pub trait RtpSender: Send + Sync {
    fn track(&self) -> Option<Arc<dyn MediaTrack>>;

    /// Swap the outgoing track without renegotiating the transport
    async fn replace_track(&self, track: Option<Arc<dyn MediaTrack>>) -> Result<()>;

    async fn get_parameters(&self) -> Result<SendParameters>;

    async fn set_parameters(&self, parameters: SendParameters) -> Result<()>;
}

pub trait RtpTransceiver: Send + Sync {
    fn sender(&self) -> Arc<dyn RtpSender>;

    fn supports_codec_preferences(&self) -> bool {
        false
    }

    fn set_codec_preferences(&self, codecs: &[Codec]) -> Result<()>;
}

pub trait DataChannel: Send + Sync {
    fn label(&self) -> String;
}

/// Receives raw data channel messages
pub type MessageHandler = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Receives locally gathered candidates, `None` once gathering completed
pub type IceCandidateHandler = Box<dyn Fn(Option<RTCIceCandidateInit>) + Send + Sync>;

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()>;

    fn on_ice_candidate(&self, handler: IceCandidateHandler);

    async fn create_data_channel(
        &self,
        label: &str,
        on_message: MessageHandler,
    ) -> Result<Arc<dyn DataChannel>>;

    async fn add_transceiver(
        &self,
        track: Arc<dyn MediaTrack>,
        init: TransceiverInit,
    ) -> Result<Arc<dyn RtpTransceiver>>;

    fn senders(&self) -> Vec<Arc<dyn RtpSender>>;

    async fn remove_track(&self, sender: &Arc<dyn RtpSender>) -> Result<()>;

    /// Codecs this connection can decode for the given kind
    fn receiver_codecs(&self, kind: MediaKind) -> Vec<Codec>;

    /// Transport statistics snapshot
    async fn stats(&self) -> Result<StatsReport>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        config: &RTCConfiguration,
        role: PeerType,
    ) -> Result<Arc<dyn PeerConnection>>;

    /// Codecs the platform can encode for the given kind
    fn sender_codecs(&self, kind: MediaKind) -> Vec<Codec>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackConstraints {
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: Option<TrackConstraints>,
    pub video: Option<TrackConstraints>,
}

impl MediaConstraints {
    /// Constraints selecting exactly one capture device
    pub fn for_device(kind: DeviceKind, device_id: impl Into<String>) -> Self {
        let constraints = TrackConstraints {
            device_id: Some(device_id.into()),
        };
        match kind {
            DeviceKind::AudioInput => Self {
                audio: Some(constraints),
                video: None,
            },
            DeviceKind::VideoInput => Self {
                audio: None,
                video: Some(constraints),
            },
        }
    }
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a capture stream; fails with `Error::Device` on permission or lookup errors
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream>;
}
