mod state;

pub use state::{SessionState, Status};

use thiserror::Error;
use tracing::{debug, warn};

use crate::connection::{
    ConnectionError, ConnectionHandle, GenerationCounter, Outbound, OutboundSender,
};
use crate::protocol::{FileMetadata, Frame, MAX_FILE_SIZE};
use crate::transfer::{OutgoingFile, ReceivedFile, TransferState};

/// Everything the transport driver can tell the session.
///
/// Events are processed one at a time by [`Session::handle_event`];
/// generation-tagged events from a superseded connection are dropped there.
#[derive(Debug)]
pub enum SessionEvent {
    /// The rendezvous service assigned this endpoint its identifier.
    IdentityReady { id: String },
    /// A remote peer opened a connection to us.
    IncomingConnection { remote_id: String },
    ConnectionOpened { generation: u64 },
    ConnectionClosed { generation: u64 },
    MetadataReceived {
        generation: u64,
        metadata: FileMetadata,
    },
    ChunkReceived { generation: u64, chunk: Vec<u8> },
    /// A transport-level failure; untagged when no connection is involved.
    TransportError {
        generation: Option<u64>,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("no open connection to a peer")]
    NotConnected,
    #[error("file is {size} bytes, transfers are capped at {MAX_FILE_SIZE} bytes")]
    TooLarge { size: u64 },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// The peer session: identity, the single current connection, and the
/// in-flight receive state, behind one sequential event dispatcher.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    conn: Option<ConnectionHandle>,
    transfer: Option<TransferState>,
    generations: GenerationCounter,
    outbound: OutboundSender,
}

impl Session {
    pub fn new(outbound: OutboundSender) -> Self {
        Self {
            state: SessionState::new(),
            conn: None,
            transfer: None,
            generations: GenerationCounter::default(),
            outbound,
        }
    }

    /// The observable state surface. Read-only for consumers.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Update the remote-identifier input buffer.
    pub fn set_remote_input(&mut self, id: impl Into<String>) {
        self.state.remote_input = id.into();
    }

    /// Take the completed artifact, acknowledging it was consumed.
    pub fn take_received_file(&mut self) -> Option<ReceivedFile> {
        self.state.received_file.take()
    }

    /// Dial the peer named by the remote-input buffer.
    ///
    /// Silent no-op when the buffer is empty or no identity has been assigned
    /// yet; both are precondition checks, not reported errors.
    pub fn connect(&mut self) {
        if self.state.local_id.is_none() {
            debug!("connect ignored: no local identity yet");
            return;
        }
        let remote = self.state.remote_input.trim();
        if remote.is_empty() {
            debug!("connect ignored: empty remote identifier");
            return;
        }
        let remote = remote.to_string();

        self.supersede();
        let generation = self.generations.next();
        // Adopt the handle before the dial goes out, so the new generation is
        // current by the time any of its events can be dispatched.
        self.conn = Some(ConnectionHandle::new(
            remote.clone(),
            generation,
            self.outbound.clone(),
        ));
        let _ = self.outbound.send(Outbound::Dial {
            to: remote.clone(),
            generation,
        });
        self.state.status = Status::Connecting(remote);
    }

    /// Close the current connection, if any. The close event drives the state
    /// reset, so calling this with nothing to close changes nothing.
    pub fn disconnect(&mut self) {
        if let Some(conn) = &self.conn {
            conn.close();
        }
    }

    /// Emit the metadata frame and the single whole-file payload frame,
    /// back to back. Fire-and-forget: no acknowledgment is awaited.
    pub fn send_file(&mut self, file: &OutgoingFile) -> Result<(), SendError> {
        let conn = self.conn.as_ref().ok_or(SendError::NotConnected)?;
        if !conn.is_open() {
            return Err(SendError::NotConnected);
        }
        if file.size() > MAX_FILE_SIZE {
            return Err(SendError::TooLarge { size: file.size() });
        }
        conn.send(Frame::Metadata(file.metadata()))?;
        conn.send(Frame::Payload(file.bytes().to_vec()))?;
        Ok(())
    }

    /// Process one inbound event, in arrival order.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::IdentityReady { id } => {
                self.state.local_id = Some(id);
                self.state.status = Status::Ready;
            }
            SessionEvent::IncomingConnection { remote_id } => self.accept_incoming(remote_id),
            SessionEvent::ConnectionOpened { generation } => {
                if !self.is_current(generation) {
                    return;
                }
                if let Some(conn) = self.conn.as_mut() {
                    conn.mark_open();
                }
                self.state.connected = true;
                self.state.status = Status::Connected;
            }
            SessionEvent::ConnectionClosed { generation } => {
                if !self.is_current(generation) {
                    return;
                }
                self.conn = None;
                self.transfer = None;
                self.state.connected = false;
                self.state.progress = 0;
                self.state.status = Status::Ready;
            }
            SessionEvent::MetadataReceived {
                generation,
                metadata,
            } => {
                if !self.is_current(generation) {
                    return;
                }
                // A fresh metadata record abandons any in-progress reassembly.
                self.state.status = Status::Receiving(metadata.name.clone());
                self.state.progress = 0;
                self.transfer = Some(TransferState::new(metadata));
            }
            SessionEvent::ChunkReceived { generation, chunk } => {
                if !self.is_current(generation) {
                    return;
                }
                self.on_chunk(chunk);
            }
            SessionEvent::TransportError {
                generation,
                message,
            } => self.on_transport_error(generation, message),
        }
    }

    /// Adopt an inbound connection, superseding whatever is current.
    /// Last inbound wins; there is no reconnection negotiation.
    fn accept_incoming(&mut self, remote_id: String) {
        self.supersede();
        let generation = self.generations.next();
        self.conn = Some(ConnectionHandle::new(
            remote_id,
            generation,
            self.outbound.clone(),
        ));
        let _ = self.outbound.send(Outbound::Accept { generation });
    }

    fn on_chunk(&mut self, chunk: Vec<u8>) {
        let Some(mut transfer) = self.transfer.take() else {
            warn!(
                len = chunk.len(),
                "payload chunk with no preceding metadata, dropping"
            );
            return;
        };
        transfer.push_chunk(chunk);
        self.state.progress = transfer.progress();
        if transfer.is_complete() {
            let file = transfer.into_file();
            self.state.status = Status::Received(file.name.clone());
            self.state.progress = 0;
            self.state.received_file = Some(file);
        } else {
            self.transfer = Some(transfer);
        }
    }

    fn on_transport_error(&mut self, generation: Option<u64>, message: String) {
        if let Some(generation) = generation {
            if !self.is_current(generation) {
                debug!(generation, "dropping error from superseded connection");
                return;
            }
            // The failed connection is unusable; discard it along with any
            // partial transfer. Identity and readiness are unaffected.
            if let Some(conn) = self.conn.take() {
                conn.close();
            }
            self.transfer = None;
            self.state.connected = false;
            self.state.progress = 0;
        }
        self.state.status = if self.state.local_id.is_none() {
            Status::InitFailed(message)
        } else {
            Status::ConnectFailed(message)
        };
    }

    /// Close and drop the current connection without waiting for its close
    /// event, which is stale the moment a new generation exists.
    fn supersede(&mut self) {
        if let Some(old) = self.conn.take() {
            old.close();
        }
        self.transfer = None;
        self.state.connected = false;
        self.state.progress = 0;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|c| c.generation() == generation)
    }
}
