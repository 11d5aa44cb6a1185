//! The media data model: [`StreamFrame`], codec info and sink configuration.

use serde::{Deserialize, Serialize};

/// Discriminates the payload carried by a [`StreamFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Audio,
    Video,
    Data,
}

/// Audio codec, closed enum per the data model (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    None,
    Pcm,
    G711A,
    G711U,
    Opus,
    Aac,
}

/// Video codec, closed enum per the data model (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    None,
    Mjpeg,
    H264,
    Rgb565,
    Yuv420p,
    Yuv422p,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
}

impl AudioInfo {
    pub const fn disabled() -> Self {
        Self {
            codec: AudioCodec::None,
            sample_rate: 0,
            channels: 0,
            bits_per_sample: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.codec, AudioCodec::None)
    }

    /// Bytes per PCM sample frame across all channels (used to pace capture).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub codec: VideoCodec,
    pub width: u16,
    pub height: u16,
    pub fps: u8,
}

impl VideoInfo {
    pub const fn disabled() -> Self {
        Self {
            codec: VideoCodec::None,
            width: 0,
            height: 0,
            fps: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.codec, VideoCodec::None)
    }

    pub fn raw_size_bytes(&self) -> usize {
        let bytes_per_pixel = match self.codec {
            VideoCodec::Rgb565 => 2,
            VideoCodec::Yuv420p => 3, // approx (I420 is 1.5x, rounded up here for headroom)
            VideoCodec::Yuv422p => 2,
            _ => 4,
        };
        self.width as usize * self.height as usize * bytes_per_pixel
    }
}

/// Decoded-form descriptor handed to an audio renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFrameInfo {
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub samples: usize,
}

/// Decoded-form descriptor handed to a video renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFrameInfo {
    pub codec: VideoCodec,
    pub width: u16,
    pub height: u16,
}

/// The terminal consumer configuration for a capture path. Either stream may
/// carry codec `None` to disable it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SinkConfig {
    pub audio: OptionalAudio,
    pub video: OptionalVideo,
}

/// Wrapper so `SinkConfig` can `#[derive(Default)]` without `AudioInfo`
/// needing a meaningless zero-codec `Default` impl of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalAudio(pub AudioInfo);
impl Default for OptionalAudio {
    fn default() -> Self {
        Self(AudioInfo::disabled())
    }
}
impl From<AudioInfo> for OptionalAudio {
    fn from(v: AudioInfo) -> Self {
        Self(v)
    }
}
impl std::ops::Deref for OptionalAudio {
    type Target = AudioInfo;
    fn deref(&self) -> &AudioInfo {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalVideo(pub VideoInfo);
impl Default for OptionalVideo {
    fn default() -> Self {
        Self(VideoInfo::disabled())
    }
}
impl From<VideoInfo> for OptionalVideo {
    fn from(v: VideoInfo) -> Self {
        Self(v)
    }
}
impl std::ops::Deref for OptionalVideo {
    type Target = VideoInfo;
    fn deref(&self) -> &VideoInfo {
        &self.0
    }
}

/// A presented unit of media. `size == 0 && data.is_none()` with
/// `eos == true` is the end-of-stream marker (§3 invariant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub kind: FrameKind,
    pub pts: u32,
    pub data: Option<Vec<u8>>,
    pub eos: bool,
}

impl StreamFrame {
    pub fn new(kind: FrameKind, pts: u32, data: Vec<u8>) -> Self {
        Self {
            kind,
            pts,
            data: Some(data),
            eos: false,
        }
    }

    pub fn eos(kind: FrameKind) -> Self {
        Self {
            kind,
            pts: 0,
            data: None,
            eos: true,
        }
    }

    pub fn size(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    pub fn is_eos_marker(&self) -> bool {
        self.eos && self.size() == 0 && self.data.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eos_marker_invariant_holds() {
        let f = StreamFrame::eos(FrameKind::Audio);
        assert!(f.is_eos_marker());
        assert_eq!(f.size(), 0);
    }

    #[test]
    fn data_frame_is_not_eos_marker() {
        let f = StreamFrame::new(FrameKind::Video, 33, vec![1, 2, 3]);
        assert!(!f.is_eos_marker());
        assert_eq!(f.size(), 3);
    }

    #[test]
    fn sink_config_defaults_to_disabled_streams() {
        let cfg = SinkConfig::default();
        assert!(!cfg.audio.is_enabled());
        assert!(!cfg.video.is_enabled());
    }

    #[test]
    fn audio_bytes_per_frame_stereo_16bit() {
        let info = AudioInfo {
            codec: AudioCodec::Opus,
            sample_rate: 16000,
            channels: 2,
            bits_per_sample: 16,
        };
        assert_eq!(info.bytes_per_frame(), 4);
    }
}
