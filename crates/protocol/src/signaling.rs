//! Signaling message shapes exchanged with a remote endpoint (§6). The
//! concrete transport (HTTPS/WebSocket) is external; only the message kinds
//! carried over it are modeled here.

use serde::{Deserialize, Serialize};

/// Messages the orchestrator exchanges with the signaling interface.
/// Custom payloads are opaque byte strings, carried without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    Sdp { is_offer: bool, sdp: String },
    Candidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    },
    Bye,
    Customized { payload: Vec<u8> },
}

/// ICE server descriptor delivered asynchronously by the signaling layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerInfo {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Peer connection state machine (§4.8): `Closed -> Disconnected ->
/// NewConnection -> Pairing -> Paired -> Connecting -> Connected ->
/// Disconnected | ConnectFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    Closed,
    Disconnected,
    NewConnection,
    Pairing,
    Paired,
    Connecting,
    Connected,
    ConnectFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdp_roundtrips_through_json() {
        let msg = SignalingMessage::Sdp {
            is_offer: true,
            sdp: "v=0\r\n...".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"sdp""#));
        let back: SignalingMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn bye_has_no_payload_fields() {
        let msg = SignalingMessage::Bye;
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"bye"}"#);
    }
}
