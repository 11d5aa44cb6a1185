//! Serde-backed configuration structs, loaded from TOML at startup and
//! overridden by CLI flags (`device-core`'s config loader wires both
//! together). Every field carries a `default_*` function so a partial file
//! produces a complete, sane configuration.

use serde::{Deserialize, Serialize};

use crate::frame::{AudioCodec, VideoCodec};

/// How frames move from raw FIFO to render FIFO to sink (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// No pacing: render as fast as frames arrive.
    None,
    /// Video pts is paced against the audio clock.
    FollowAudio,
    /// Both streams are paced against wall-clock time.
    FollowTime,
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::FollowAudio
    }
}

/// Selects which capture backends a run wires up; only meaningful to the
/// binary entry point, kept here so it round-trips through the same TOML.
/// Distinct from the capture path's per-call `PathRunType` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Synthetic sources/sinks and an in-memory loopback peer.
    Loopback,
    /// Real orchestration against a remote signaling endpoint.
    Remote,
}

impl Default for AgentMode {
    fn default() -> Self {
        AgentMode::Loopback
    }
}

fn default_audio_codec() -> AudioCodec {
    AudioCodec::Opus
}

fn default_video_codec() -> VideoCodec {
    VideoCodec::H264
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u8 {
    1
}

fn default_bits_per_sample() -> u8 {
    16
}

fn default_width() -> u16 {
    1280
}

fn default_height() -> u16 {
    720
}

fn default_fps() -> u8 {
    25
}

fn default_ring_bytes() -> usize {
    1 << 20
}

fn default_disable_timeout_audio_ms() -> u64 {
    100_000
}

fn default_disable_timeout_video_ms() -> u64 {
    10_000
}

/// Capture path configuration (§4.5/§4.6): codecs, dimensions and the ring
/// buffer sizing each enabled path gets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_audio_codec")]
    pub audio_codec: AudioCodec,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u8,
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u8,

    #[serde(default = "default_video_codec")]
    pub video_codec: VideoCodec,
    #[serde(default = "default_width")]
    pub width: u16,
    #[serde(default = "default_height")]
    pub height: u16,
    #[serde(default = "default_fps")]
    pub fps: u8,

    #[serde(default = "default_ring_bytes")]
    pub audio_ring_bytes: usize,
    #[serde(default = "default_ring_bytes")]
    pub video_ring_bytes: usize,

    /// How long a path waits for its disable request to drain in-flight
    /// frames before forcing a stop (audio and video differ, §4.5 edge
    /// cases: audio frames are small and frequent, video frames are large
    /// and infrequent).
    #[serde(default = "default_disable_timeout_audio_ms")]
    pub disable_timeout_audio_ms: u64,
    #[serde(default = "default_disable_timeout_video_ms")]
    pub disable_timeout_video_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            audio_codec: default_audio_codec(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bits_per_sample: default_bits_per_sample(),
            video_codec: default_video_codec(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            audio_ring_bytes: default_ring_bytes(),
            video_ring_bytes: default_ring_bytes(),
            disable_timeout_audio_ms: default_disable_timeout_audio_ms(),
            disable_timeout_video_ms: default_disable_timeout_video_ms(),
        }
    }
}

fn default_sync_mode() -> SyncMode {
    SyncMode::FollowAudio
}

fn default_raw_fifo_len() -> usize {
    32
}

fn default_render_fifo_len() -> usize {
    8
}

/// AV render pipeline configuration (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvRenderConfig {
    #[serde(default = "default_sync_mode")]
    pub sync_mode: SyncMode,
    #[serde(default = "default_raw_fifo_len")]
    pub raw_fifo_len: usize,
    #[serde(default = "default_render_fifo_len")]
    pub render_fifo_len: usize,
    #[serde(default)]
    pub quit_when_eos: bool,
    #[serde(default)]
    pub allow_drop_data: bool,
    #[serde(default)]
    pub pause_render_only: bool,
    #[serde(default)]
    pub pause_on_first_frame: bool,
}

impl Default for AvRenderConfig {
    fn default() -> Self {
        Self {
            sync_mode: default_sync_mode(),
            raw_fifo_len: default_raw_fifo_len(),
            render_fifo_len: default_render_fifo_len(),
            quit_when_eos: false,
            allow_drop_data: false,
            pause_render_only: false,
            pause_on_first_frame: false,
        }
    }
}

impl AvRenderConfig {
    /// `speed` isn't stored on the config: it's runtime state the render
    /// pipeline owns and mutates via `set_speed` (§6). This constant is the
    /// value a freshly configured pipeline starts at.
    pub const DEFAULT_SPEED: f32 = 1.0;
}

fn default_reconnect_backoff_ms() -> u64 {
    1_000
}

fn default_reconnect_backoff_max_ms() -> u64 {
    30_000
}

fn default_send_interval_ms() -> u64 {
    20
}

/// WebRTC orchestration policy (§4.8): reconnect backoff and the send-loop
/// pump interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebRtcConfig {
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_reconnect_backoff_max_ms")]
    pub reconnect_backoff_max_ms: u64,
    #[serde(default)]
    pub reconnect_on_bye: bool,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: default_send_interval_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reconnect_backoff_max_ms: default_reconnect_backoff_max_ms(),
            reconnect_on_bye: true,
        }
    }
}

/// ICE server list, shared between the config file and [`crate::IceServerInfo`]
/// pushed down the signaling channel at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IceConfig {
    #[serde(default)]
    pub stun_urls: Vec<String>,
    #[serde(default)]
    pub turn_urls: Vec<String>,
    #[serde(default)]
    pub turn_username: Option<String>,
    #[serde(default)]
    pub turn_credential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_config_defaults_match_spec_baseline() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.audio_codec, AudioCodec::Opus);
        assert_eq!(cfg.video_codec, VideoCodec::H264);
        assert_eq!(cfg.disable_timeout_audio_ms, 100_000);
        assert_eq!(cfg.disable_timeout_video_ms, 10_000);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let parsed: CaptureConfig = toml::from_str("audio_codec = \"pcm\"").unwrap();
        assert_eq!(parsed.audio_codec, AudioCodec::Pcm);
        assert_eq!(parsed.sample_rate, default_sample_rate());
    }

    #[test]
    fn avrender_config_defaults_to_follow_audio() {
        let cfg = AvRenderConfig::default();
        assert_eq!(cfg.sync_mode, SyncMode::FollowAudio);
        assert!(!cfg.quit_when_eos);
    }
}
