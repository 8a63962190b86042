use serde::{Deserialize, Serialize};

/// Control messages exchanged with the rendezvous service.
///
/// Text frames that do not parse as one of these are peer traffic and get
/// forwarded verbatim to the paired endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RendezvousMessage {
    // server -> client
    /// Identifier assigned to this endpoint. Sent exactly once.
    Assigned { id: String },
    /// A remote peer asked to be paired with this endpoint.
    Incoming { from: String },
    /// The pairing requested by this endpoint is live.
    Opened { with: String },
    /// The current pairing ended (peer hung up or vanished).
    Closed,
    /// The requested operation failed.
    Error { message: String },

    // client -> server
    /// Pair this endpoint with the named peer.
    Connect { to: String },
    /// End the current pairing.
    Hangup,

    /// Keepalive.
    Ping,
    Pong,
}

impl RendezvousMessage {
    /// Serialize to JSON string
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
