//! The peer connection contract (§6): opaque to this core beyond the
//! capabilities it consumes and produces. A real backend (e.g. an embedded
//! WebRTC stack) implements [`PeerConnection`]; [`crate::webrtc::loopback`]
//! is the in-memory stand-in used by tests and the demo binary.

use std::sync::Arc;

use async_trait::async_trait;
use device_protocol::{CoreResult, IceServerInfo, PeerState, SignalingMessage, StreamFrame};

/// Data-channel sub-state, parallel to the peer's own state machine (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Opened,
    Closed,
}

/// Callbacks a [`PeerConnection`] drives as events arrive from the remote
/// side. Held behind `Arc` so the orchestrator can clone them into whatever
/// task context the concrete backend calls back on.
#[derive(Clone, Default)]
pub struct PeerCallbacks {
    pub on_state: Option<Arc<dyn Fn(PeerState) + Send + Sync>>,
    pub on_data_channel: Option<Arc<dyn Fn(DataChannelState) + Send + Sync>>,
    pub on_msg: Option<Arc<dyn Fn(SignalingMessage) + Send + Sync>>,
    pub on_video_info: Option<Arc<dyn Fn(u16, u16) + Send + Sync>>,
    pub on_audio_info: Option<Arc<dyn Fn(u32, u8, u8) + Send + Sync>>,
    pub on_video_data: Option<Arc<dyn Fn(StreamFrame) + Send + Sync>>,
    pub on_audio_data: Option<Arc<dyn Fn(StreamFrame) + Send + Sync>>,
    pub on_data: Option<Arc<dyn Fn(Vec<u8>) + Send + Sync>>,
}

impl std::fmt::Debug for PeerCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerCallbacks").finish_non_exhaustive()
    }
}

/// The peer protocol surface the orchestrator drives (§6, §4.8). Every
/// method that can fail returns the shared [`CoreResult`] taxonomy; `query`
/// is infallible since it only reads cached state.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn set_callbacks(&mut self, callbacks: PeerCallbacks);

    async fn open(&mut self) -> CoreResult<()>;

    /// Tears down any existing session state and begins pairing again
    /// (§4.8 reconnect policy).
    async fn new_connection(&mut self) -> CoreResult<()>;

    async fn update_ice_info(&mut self, servers: Vec<IceServerInfo>) -> CoreResult<()>;

    async fn send_msg(&mut self, msg: SignalingMessage) -> CoreResult<()>;

    async fn send_video(&mut self, frame: StreamFrame) -> CoreResult<()>;

    async fn send_audio(&mut self, frame: StreamFrame) -> CoreResult<()>;

    /// Sends raw bytes over the data channel; used for the video-in-data-
    /// channel routing policy as well as application custom data.
    async fn send_data(&mut self, bytes: Vec<u8>) -> CoreResult<()>;

    /// Advances the peer's internal protocol state by one non-blocking
    /// tick. Called in a loop by the orchestrator's PC loop thread.
    async fn main_loop(&mut self) -> CoreResult<()>;

    async fn disconnect(&mut self) -> CoreResult<()>;

    fn query(&self) -> PeerState;

    async fn close(&mut self) -> CoreResult<()>;
}
