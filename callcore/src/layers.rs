//! Simulcast layer planning for published video
//!
//! A capture resolution that matches a rung of the ladder exactly yields a
//! full/half/quarter cascade derived from that rung. Anything else falls back
//! to a fixed 720p/480p/360p ladder.

use callcore_proto::models::{VideoDimension, VideoLayer, VideoQuality};

use crate::media::{EncodingParameters, MediaStream};

/// Layer identifiers from highest to lowest resolution
pub const RIDS: [&str; 3] = ["f", "h", "q"];

/// Frame rate announced for every planned layer
const LAYER_FPS: u32 = 30;

#[derive(Debug, Clone, Copy)]
struct Rung {
    width: u32,
    height: u32,
    max_bitrate_bps: u32,
}

const fn rung(width: u32, height: u32, max_bitrate_bps: u32) -> Rung {
    Rung {
        width,
        height,
        max_bitrate_bps,
    }
}

/// Supported capture resolutions, highest first
const LADDER: [Rung; 7] = [
    rung(3840, 2160, 8_000_000),
    rung(1920, 1080, 3_000_000),
    rung(1280, 720, 1_250_000),
    rung(960, 540, 1_000_000),
    rung(640, 480, 750_000),
    rung(640, 360, 500_000),
    rung(320, 240, 250_000),
];

/// One planned simulcast encoding
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingLayer {
    pub rid: String,
    pub width: u32,
    pub height: u32,
    pub max_bitrate_bps: u32,
    pub scale_resolution_down_by: f64,
    pub active: bool,
}

impl EncodingLayer {
    fn new(rid: &str, width: u32, height: u32, max_bitrate_bps: u32, scale: f64) -> Self {
        Self {
            rid: rid.to_string(),
            width,
            height,
            max_bitrate_bps,
            scale_resolution_down_by: scale,
            active: true,
        }
    }

    /// Send-side encoding parameters for a transceiver
    #[must_use]
    pub fn to_encoding(&self) -> EncodingParameters {
        EncodingParameters {
            rid: Some(self.rid.clone()),
            active: self.active,
            max_bitrate: Some(self.max_bitrate_bps),
            scale_resolution_down_by: Some(self.scale_resolution_down_by),
        }
    }

    /// Layer description announced to the SFU on join
    #[must_use]
    pub fn to_video_layer(&self) -> VideoLayer {
        VideoLayer {
            rid: self.rid.clone(),
            video_dimension: Some(VideoDimension::new(self.width, self.height)),
            bitrate: self.max_bitrate_bps,
            fps: LAYER_FPS,
            quality: rid_to_video_quality(&self.rid),
        }
    }
}

/// The ladder used when the capture resolution is unknown or unsupported
#[must_use]
pub fn default_video_layers() -> Vec<EncodingLayer> {
    vec![
        EncodingLayer::new("f", 1280, 720, 1_250_000, 1.0),
        EncodingLayer::new("h", 640, 480, 500_000, 2.0),
        EncodingLayer::new("q", 480, 360, 300_000, 4.0),
    ]
}

/// Plan layers for a known capture resolution
#[must_use]
pub fn plan_video_layers(capture: VideoDimension) -> Vec<EncodingLayer> {
    let Some(matched) = LADDER
        .iter()
        .find(|r| r.width == capture.width && r.height == capture.height)
    else {
        return default_video_layers();
    };

    let mut scale = 1u32;
    RIDS.iter()
        .map(|rid| {
            let layer = EncodingLayer::new(
                rid,
                matched.width / scale,
                matched.height / scale,
                matched.max_bitrate_bps / scale,
                f64::from(scale),
            );
            scale *= 2;
            layer
        })
        .collect()
}

/// Plan layers from the first video track of `stream`.
///
/// Returns no layers for a stream without video.
#[must_use]
pub fn find_optimal_video_layers(stream: &MediaStream) -> Vec<EncodingLayer> {
    let Some(track) = stream.video_tracks().into_iter().next() else {
        return Vec::new();
    };

    let settings = track.settings();
    match (settings.width, settings.height) {
        (Some(width), Some(height)) => plan_video_layers(VideoDimension::new(width, height)),
        _ => default_video_layers(),
    }
}

#[must_use]
pub fn to_video_layers(layers: &[EncodingLayer]) -> Vec<VideoLayer> {
    layers.iter().map(EncodingLayer::to_video_layer).collect()
}

#[must_use]
pub fn rid_to_video_quality(rid: &str) -> VideoQuality {
    match rid {
        "f" => VideoQuality::High,
        "h" => VideoQuality::Mid,
        _ => VideoQuality::LowUnspecified,
    }
}
