//! Models shared by requests, responses and events

use serde::{Deserialize, Serialize};

use crate::types::{SessionId, UserId};

/// Width and height of a video frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDimension {
    pub width: u32,
    pub height: u32,
}

impl VideoDimension {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Simulcast quality as understood by the SFU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoQuality {
    #[default]
    LowUnspecified,
    Mid,
    High,
    Off,
}

/// One announced simulcast layer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoLayer {
    pub rid: String,
    pub video_dimension: Option<VideoDimension>,
    pub bitrate: u32,
    pub fps: u32,
    pub quality: VideoQuality,
}

/// Role of a peer connection from the SFU's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerType {
    #[default]
    PublisherUnspecified,
    Subscriber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackType {
    #[default]
    Unspecified,
    Audio,
    Video,
    ScreenShare,
}

/// A codec capability advertised to the SFU
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Codec {
    pub mime_type: String,
    pub clock_rate: u32,
    pub fmtp_line: String,
}

impl Codec {
    pub fn new(mime_type: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            mime_type: mime_type.into(),
            clock_rate,
            fmtp_line: String::new(),
        }
    }
}

/// Encode and decode capabilities for one media kind
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecCapabilities {
    pub encode: Vec<Codec>,
    pub decode: Vec<Codec>,
}

/// Codec and layer settings announced in the join request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    pub audio: CodecCapabilities,
    pub video: CodecCapabilities,
    pub layers: Vec<VideoLayer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub name: String,
    pub published_tracks: Vec<TrackType>,
}

/// Call state snapshot returned by the SFU on join
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallState {
    pub participants: Vec<Participant>,
}

/// Error payload carried inside otherwise successful SFU responses
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SfuError {
    pub code: String,
    pub message: String,
    pub should_retry: bool,
}

impl std::fmt::Display for SfuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&PeerType::Subscriber).unwrap(),
            "\"SUBSCRIBER\""
        );
        assert_eq!(
            serde_json::to_string(&VideoQuality::LowUnspecified).unwrap(),
            "\"LOW_UNSPECIFIED\""
        );
    }

    #[test]
    fn test_sfu_error_defaults_missing_fields() {
        let error: SfuError = serde_json::from_str(r#"{"message":"busy"}"#).unwrap();
        assert_eq!(error.message, "busy");
        assert!(!error.should_retry);
        assert!(error.code.is_empty());
    }

    #[test]
    fn test_video_layer_camel_case() {
        let layer = VideoLayer {
            rid: "f".to_string(),
            video_dimension: Some(VideoDimension::new(1280, 720)),
            bitrate: 1_250_000,
            fps: 30,
            quality: VideoQuality::High,
        };
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["videoDimension"]["width"], 1280);
        assert_eq!(json["quality"], "HIGH");
    }
}
