//! In-memory `PeerConnection`/`Signaling` pair used by the demo binary's
//! loopback run mode and by orchestrator tests. Mirrors what
//! [`crate::media::testdouble`] does for capture/render: a stand-in that
//! satisfies the trait contract without a real transport.

use std::sync::Mutex;

use async_trait::async_trait;
use device_protocol::{CoreResult, IceServerInfo, PeerState, SignalingMessage, StreamFrame};
use tracing::debug;

use super::peer::{DataChannelState, PeerCallbacks, PeerConnection};
use super::signaling::{Signaling, SignalingCallbacks, SignalingConfig};

/// A peer that loops every sent frame straight back into its own
/// `on_*_data` callbacks, advancing through the full connect state machine
/// over a handful of `main_loop` ticks.
pub struct LoopbackPeer {
    state: Mutex<PeerState>,
    callbacks: Mutex<PeerCallbacks>,
    ticks_since_connect_request: Mutex<Option<u32>>,
}

impl Default for LoopbackPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackPeer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PeerState::Closed),
            callbacks: Mutex::new(PeerCallbacks::default()),
            ticks_since_connect_request: Mutex::new(None),
        }
    }

    fn set_state(&self, state: PeerState) {
        *self.state.lock().unwrap() = state;
        if let Some(cb) = self.callbacks.lock().unwrap().on_state.as_ref() {
            cb(state);
        }
    }
}

#[async_trait]
impl PeerConnection for LoopbackPeer {
    fn set_callbacks(&mut self, callbacks: PeerCallbacks) {
        *self.callbacks.lock().unwrap() = callbacks;
    }

    async fn open(&mut self) -> CoreResult<()> {
        self.set_state(PeerState::Disconnected);
        Ok(())
    }

    async fn new_connection(&mut self) -> CoreResult<()> {
        self.set_state(PeerState::NewConnection);
        *self.ticks_since_connect_request.lock().unwrap() = Some(0);
        if let Some(cb) = self.callbacks.lock().unwrap().on_data_channel.as_ref() {
            cb(DataChannelState::Opened);
        }
        Ok(())
    }

    async fn update_ice_info(&mut self, _servers: Vec<IceServerInfo>) -> CoreResult<()> {
        Ok(())
    }

    async fn send_msg(&mut self, _msg: SignalingMessage) -> CoreResult<()> {
        Ok(())
    }

    async fn send_video(&mut self, frame: StreamFrame) -> CoreResult<()> {
        if let Some(cb) = self.callbacks.lock().unwrap().on_video_data.as_ref() {
            cb(frame);
        }
        Ok(())
    }

    async fn send_audio(&mut self, frame: StreamFrame) -> CoreResult<()> {
        if let Some(cb) = self.callbacks.lock().unwrap().on_audio_data.as_ref() {
            cb(frame);
        }
        Ok(())
    }

    async fn send_data(&mut self, bytes: Vec<u8>) -> CoreResult<()> {
        if let Some(cb) = self.callbacks.lock().unwrap().on_data.as_ref() {
            cb(bytes);
        }
        Ok(())
    }

    /// Advances the state machine a step per tick once a connection has
    /// been requested, reaching `Connected` after four ticks.
    async fn main_loop(&mut self) -> CoreResult<()> {
        let mut ticks = self.ticks_since_connect_request.lock().unwrap();
        let Some(n) = ticks.as_mut() else {
            return Ok(());
        };
        *n += 1;
        let next = match *n {
            1 => Some(PeerState::Pairing),
            2 => Some(PeerState::Paired),
            3 => Some(PeerState::Connecting),
            4 => {
                *ticks = None;
                Some(PeerState::Connected)
            }
            _ => None,
        };
        drop(ticks);
        if let Some(state) = next {
            self.set_state(state);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> CoreResult<()> {
        debug!("loopback peer disconnect");
        self.set_state(PeerState::Disconnected);
        Ok(())
    }

    fn query(&self) -> PeerState {
        *self.state.lock().unwrap()
    }

    async fn close(&mut self) -> CoreResult<()> {
        self.set_state(PeerState::Closed);
        Ok(())
    }
}

/// Signaling that echoes every sent message straight back to its own
/// `on_message` callback, standing in for a real transport in tests.
pub struct LoopbackSignaling {
    callbacks: Mutex<Option<SignalingCallbacks>>,
}

impl Default for LoopbackSignaling {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackSignaling {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(None),
        }
    }

    /// Test/demo hook: delivers ICE server info as if the transport had
    /// just received it asynchronously.
    pub fn deliver_ice_info(&self, servers: Vec<IceServerInfo>) {
        if let Some(cb) = self.callbacks.lock().unwrap().as_ref().and_then(|c| c.on_ice_info.clone()) {
            cb(servers);
        }
    }

    /// Test/demo hook: injects an inbound message (e.g. a `Bye`) as if it
    /// arrived from the remote side.
    pub fn deliver_message(&self, msg: SignalingMessage) {
        if let Some(cb) = self.callbacks.lock().unwrap().as_ref().and_then(|c| c.on_message.clone()) {
            cb(msg);
        }
    }
}

#[async_trait]
impl Signaling for LoopbackSignaling {
    async fn start(&mut self, _cfg: SignalingConfig, callbacks: SignalingCallbacks) -> CoreResult<()> {
        *self.callbacks.lock().unwrap() = Some(callbacks);
        Ok(())
    }

    async fn send_msg(&mut self, msg: SignalingMessage) -> CoreResult<()> {
        self.deliver_message(msg);
        Ok(())
    }

    async fn stop(&mut self) -> CoreResult<()> {
        *self.callbacks.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_reaches_connected_after_new_connection_ticks() {
        let mut peer = LoopbackPeer::new();
        peer.open().await.unwrap();
        assert_eq!(peer.query(), PeerState::Disconnected);
        peer.new_connection().await.unwrap();
        assert_eq!(peer.query(), PeerState::NewConnection);
        for _ in 0..4 {
            peer.main_loop().await.unwrap();
        }
        assert_eq!(peer.query(), PeerState::Connected);
    }

    #[tokio::test]
    async fn signaling_echoes_sent_message_to_on_message() {
        let mut sig = LoopbackSignaling::new();
        let received = std::sync::Arc::new(std::sync::Mutex::new(None));
        let r = received.clone();
        let callbacks = SignalingCallbacks {
            on_message: Some(std::sync::Arc::new(move |msg| {
                *r.lock().unwrap() = Some(msg);
            })),
            on_ice_info: None,
        };
        sig.start(SignalingConfig::default(), callbacks).await.unwrap();
        sig.send_msg(SignalingMessage::Bye).await.unwrap();
        assert_eq!(*received.lock().unwrap(), Some(SignalingMessage::Bye));
    }
}
