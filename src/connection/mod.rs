use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::Frame;

/// Commands the session hands to whatever owns the wire.
///
/// Every command carries the generation of the connection it belongs to, so
/// the transport driver can discard traffic for a connection that has been
/// superseded in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Open an outbound connection to the given remote identifier.
    Dial { to: String, generation: u64 },
    /// Start delivering events for an inbound connection the session adopted.
    Accept { generation: u64 },
    /// Send one frame over the connection.
    Frame { generation: u64, frame: Frame },
    /// Tear the connection down.
    Close { generation: u64 },
}

/// Sender half of the command channel consumed by the transport driver.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection is not open")]
    NotOpen,
    #[error("transport is gone")]
    TransportGone,
}

/// Where a connection is in its handshake.
///
/// There is no `Closed` variant: a closed connection is represented by the
/// absence of a handle, which is dropped the moment its close event lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Open,
}

/// Monotonic source of connection generations.
#[derive(Debug, Default)]
pub struct GenerationCounter(u64);

impl GenerationCounter {
    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// Owned handle to the single current connection.
///
/// The session holds at most one of these at a time; replacing it closes the
/// old connection first, and the retired generation keeps any late events from
/// being delivered through the new one.
#[derive(Debug)]
pub struct ConnectionHandle {
    remote_id: String,
    generation: u64,
    phase: Phase,
    outbound: OutboundSender,
}

impl ConnectionHandle {
    pub fn new(remote_id: String, generation: u64, outbound: OutboundSender) -> Self {
        Self {
            remote_id,
            generation,
            phase: Phase::Pending,
            outbound,
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    pub(crate) fn mark_open(&mut self) {
        self.phase = Phase::Open;
    }

    /// Send one frame. Fails until the open event has been processed.
    pub fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        if self.phase != Phase::Open {
            return Err(ConnectionError::NotOpen);
        }
        self.outbound
            .send(Outbound::Frame {
                generation: self.generation,
                frame,
            })
            .map_err(|_| ConnectionError::TransportGone)
    }

    /// Ask the transport to tear this connection down. A handle whose
    /// transport is already gone has nothing left to close.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close {
            generation: self.generation,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;

    #[test]
    fn test_send_requires_open() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = ConnectionHandle::new("peer-1".to_string(), 1, tx);

        assert!(matches!(
            handle.send(Frame::Payload(vec![1, 2, 3])),
            Err(ConnectionError::NotOpen)
        ));
        assert!(rx.try_recv().is_err());

        handle.mark_open();
        handle.send(Frame::Payload(vec![1, 2, 3])).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Frame {
                generation: 1,
                frame: Frame::Payload(vec![1, 2, 3]),
            }
        );
    }

    #[test]
    fn test_close_carries_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new("peer-1".to_string(), 7, tx);

        handle.close();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close { generation: 7 });
    }

    #[test]
    fn test_generations_are_distinct() {
        let mut counter = GenerationCounter::default();
        let a = counter.next();
        let b = counter.next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
