//! Capture, AV render and WebRTC orchestration for the embedded media
//! pipeline: the runtime library behind the `device-agent` binary.
//!
//! Module map: [`queue`] (ring/message buffers), [`media`] (source/encoder/
//! decoder/render contracts), [`capture`] (source → encoder → queue),
//! [`avrender`] (decode/render pipeline), [`webrtc`] (peer/signaling glue)
//! and [`scheduler`] (thread sizing hook).

pub mod avrender;
pub mod capture;
pub mod media;
pub mod queue;
pub mod scheduler;
pub mod webrtc;

pub use avrender::{AVRender, AvEvent, EventCb, PoolFreeCb, StreamState};
pub use capture::{Capture, CaptureOpenConfig, PathRunType};
pub use queue::{DataQueue, MsgQueue, ReadGuard, Reservation};
pub use scheduler::{DefaultThreadSizing, ThreadHint, ThreadSizing};
pub use webrtc::{OrchestratorConfig, PeerConnection, Signaling, WebRTCOrchestrator};
