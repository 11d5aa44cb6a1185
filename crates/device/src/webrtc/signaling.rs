//! The signaling contract (§6): `start`/`send_msg`/`stop`, opaque to this
//! core beyond the message kinds it carries.

use async_trait::async_trait;
use device_protocol::{CoreResult, IceServerInfo, SignalingMessage};
use std::sync::Arc;

/// Callbacks a [`Signaling`] implementation drives as messages arrive.
#[derive(Clone, Default)]
pub struct SignalingCallbacks {
    pub on_message: Option<Arc<dyn Fn(SignalingMessage) + Send + Sync>>,
    pub on_ice_info: Option<Arc<dyn Fn(Vec<IceServerInfo>) + Send + Sync>>,
}

impl std::fmt::Debug for SignalingCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingCallbacks").finish_non_exhaustive()
    }
}

/// Configuration handed to [`Signaling::start`]; the endpoint address is
/// left to the concrete backend (opaque per §6), so only the policy knobs
/// this core cares about live here.
#[derive(Debug, Clone, Default)]
pub struct SignalingConfig {
    pub session_id: String,
}

#[async_trait]
pub trait Signaling: Send + Sync {
    async fn start(&mut self, cfg: SignalingConfig, callbacks: SignalingCallbacks) -> CoreResult<()>;

    async fn send_msg(&mut self, msg: SignalingMessage) -> CoreResult<()>;

    async fn stop(&mut self) -> CoreResult<()>;
}
