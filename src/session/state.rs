use std::fmt;

use crate::transfer::ReceivedFile;

/// Human-readable session status, rendered for display via [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Waiting for the rendezvous service to assign an identifier.
    Initializing,
    /// The rendezvous handshake failed; the session stays unready.
    InitFailed(String),
    /// Identifier assigned, no connection.
    Ready,
    /// Outbound dial in flight.
    Connecting(String),
    Connected,
    /// A dial or an established connection failed.
    ConnectFailed(String),
    /// Incoming transfer in progress, by file name.
    Receiving(String),
    /// Last incoming transfer completed, by file name.
    Received(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Initializing => write!(f, "Initializing session..."),
            Status::InitFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Status::Ready => write!(f, "Ready. Share your identifier with a peer."),
            Status::Connecting(id) => write!(f, "Connecting to {}...", id),
            Status::Connected => write!(f, "Connected."),
            Status::ConnectFailed(msg) => write!(f, "Connection failed: {}", msg),
            Status::Receiving(name) => write!(f, "Receiving \"{}\"...", name),
            Status::Received(name) => write!(f, "File \"{}\" received.", name),
        }
    }
}

/// The observable session surface.
///
/// Mutated only by [`super::Session`]; consumers read it through a shared
/// reference and write back solely via the remote-input and artifact-taking
/// operations on the session.
#[derive(Debug)]
pub struct SessionState {
    pub local_id: Option<String>,
    pub remote_input: String,
    pub status: Status,
    pub connected: bool,
    /// Receive progress, 0–100.
    pub progress: u8,
    pub received_file: Option<ReceivedFile>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            local_id: None,
            remote_input: String::new(),
            status: Status::Initializing,
            connected: false,
            progress: 0,
            received_file: None,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
