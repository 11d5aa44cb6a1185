//! Shared data model for the embedded audio/video pipeline: frame and codec
//! types, the error taxonomy, signaling message shapes and serde-backed
//! configuration structs. Nothing in this crate touches threads, I/O or a
//! specific peer/signaling backend — those live in `device-core`.

mod config;
mod error;
mod frame;
mod signaling;

pub use config::{
    AgentMode, AvRenderConfig, CaptureConfig, IceConfig, SyncMode, WebRtcConfig,
};
pub use error::{CoreError, CoreResult, ErrorCode};
pub use frame::{
    AudioCodec, AudioFrameInfo, AudioInfo, FrameKind, SinkConfig, StreamFrame, VideoCodec,
    VideoFrameInfo, VideoInfo,
};
pub use signaling::{IceServerInfo, PeerState, SignalingMessage};
