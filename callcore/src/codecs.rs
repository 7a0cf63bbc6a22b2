//! Codec capabilities and send-side defaults

use callcore_proto::models::{Codec, CodecCapabilities, CodecSettings};

use crate::layers::{self, EncodingLayer};
use crate::media::{EncodingParameters, MediaKind, PeerConnection, PeerConnectionFactory};

/// Video codec moved to the front of the transceiver preferences
pub const PREFERRED_VIDEO_CODEC: &str = "video/VP8";

const DEFAULT_AUDIO_BITRATE: u32 = 64_000;

/// Capabilities and layers announced in the join request.
///
/// Encode capabilities come from the platform, decode capabilities from the
/// receive transport that will consume remote media.
pub fn codec_settings(
    factory: &dyn PeerConnectionFactory,
    subscriber: &dyn PeerConnection,
    planned_layers: &[EncodingLayer],
) -> CodecSettings {
    CodecSettings {
        audio: CodecCapabilities {
            encode: factory.sender_codecs(MediaKind::Audio),
            decode: subscriber.receiver_codecs(MediaKind::Audio),
        },
        video: CodecCapabilities {
            encode: factory.sender_codecs(MediaKind::Video),
            decode: subscriber.receiver_codecs(MediaKind::Video),
        },
        layers: layers::to_video_layers(planned_layers),
    }
}

/// Encodings used when publishing video without a planned ladder
#[must_use]
pub fn default_video_publish_encodings() -> Vec<EncodingParameters> {
    layers::default_video_layers()
        .iter()
        .map(EncodingLayer::to_encoding)
        .collect()
}

#[must_use]
pub fn default_audio_encodings() -> Vec<EncodingParameters> {
    vec![EncodingParameters {
        max_bitrate: Some(DEFAULT_AUDIO_BITRATE),
        ..Default::default()
    }]
}

/// Reorder `available` so codecs matching `mime_type` come first.
///
/// Returns an empty list when nothing matches, leaving platform defaults in
/// place.
#[must_use]
pub fn preferred_codecs(available: &[Codec], mime_type: &str) -> Vec<Codec> {
    let (mut preferred, rest): (Vec<Codec>, Vec<Codec>) = available
        .iter()
        .cloned()
        .partition(|codec| codec.mime_type.eq_ignore_ascii_case(mime_type));

    if preferred.is_empty() {
        return Vec::new();
    }
    preferred.extend(rest);
    preferred
}
