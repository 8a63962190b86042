use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{
    connect_async_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use super::protocol::RendezvousMessage;
use super::ws_config;
use crate::connection::Outbound;
use crate::protocol::{Frame, PeerMessage};
use crate::session::SessionEvent;

/// The transport driver: one WebSocket to the rendezvous service, translated
/// into session events on the way in and fed by session commands on the way
/// out.
pub struct RendezvousClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RendezvousClient {
    /// Open the rendezvous link. The identifier assignment arrives through
    /// the event stream once [`run`](Self::run) is driving the socket.
    pub async fn connect(addr: &str) -> Result<Self> {
        let url = if addr.starts_with("ws://") || addr.starts_with("wss://") {
            addr.to_string()
        } else {
            format!("ws://{}", addr)
        };

        let (ws, _) = connect_async_with_config(&url, Some(ws_config()), false)
            .await
            .map_err(|e| anyhow!("failed to reach rendezvous at {}: {}", url, e))?;

        Ok(Self { ws })
    }

    /// Pump the socket until it ends or the session goes away.
    ///
    /// Tracks the current connection generation so frames for a superseded
    /// connection are dropped on the floor instead of delivered.
    pub async fn run(
        self,
        events: UnboundedSender<SessionEvent>,
        mut commands: UnboundedReceiver<Outbound>,
    ) -> Result<()> {
        let (mut sink, mut stream) = self.ws.split();
        let mut current: Option<u64> = None;

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            let _ = events.send(SessionEvent::TransportError {
                                generation: current,
                                message: e.to_string(),
                            });
                            return Err(e.into());
                        }
                        None => {
                            if let Some(generation) = current.take() {
                                let _ = events.send(SessionEvent::ConnectionClosed { generation });
                            }
                            let _ = events.send(SessionEvent::TransportError {
                                generation: None,
                                message: "rendezvous connection closed".to_string(),
                            });
                            return Ok(());
                        }
                    };
                    match msg {
                        Message::Text(text) => {
                            Self::on_text(text, &events, &mut sink, &mut current).await?;
                        }
                        Message::Binary(data) => {
                            if let Some(generation) = current {
                                let _ = events.send(SessionEvent::ChunkReceived {
                                    generation,
                                    chunk: data,
                                });
                            } else {
                                warn!(len = data.len(), "binary frame with no connection, dropping");
                            }
                        }
                        Message::Close(_) => {
                            if let Some(generation) = current.take() {
                                let _ = events.send(SessionEvent::ConnectionClosed { generation });
                            }
                            let _ = events.send(SessionEvent::TransportError {
                                generation: None,
                                message: "rendezvous connection closed".to_string(),
                            });
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else {
                        // Session dropped its end; nothing left to drive.
                        return Ok(());
                    };
                    match cmd {
                        Outbound::Dial { to, generation } => {
                            current = Some(generation);
                            let msg = RendezvousMessage::Connect { to }.to_json()?;
                            sink.send(Message::Text(msg)).await?;
                        }
                        Outbound::Accept { generation } => {
                            // The pairing is already live on the server side;
                            // adopting it completes the handshake locally.
                            current = Some(generation);
                            let _ = events.send(SessionEvent::ConnectionOpened { generation });
                        }
                        Outbound::Frame { generation, frame } => {
                            if current != Some(generation) {
                                debug!(generation, "dropping frame for retired connection");
                                continue;
                            }
                            match frame {
                                Frame::Metadata(meta) => {
                                    let msg = PeerMessage::Metadata(meta).to_json()?;
                                    sink.send(Message::Text(msg)).await?;
                                }
                                Frame::Payload(bytes) => {
                                    sink.send(Message::Binary(bytes)).await?;
                                }
                            }
                        }
                        Outbound::Close { generation } => {
                            if current != Some(generation) {
                                continue;
                            }
                            current = None;
                            let msg = RendezvousMessage::Hangup.to_json()?;
                            sink.send(Message::Text(msg)).await?;
                            let _ = events.send(SessionEvent::ConnectionClosed { generation });
                        }
                    }
                }
            }
        }
    }

    /// Handle one text frame: rendezvous control first, peer records second.
    async fn on_text<S>(
        text: String,
        events: &UnboundedSender<SessionEvent>,
        sink: &mut S,
        current: &mut Option<u64>,
    ) -> Result<()>
    where
        S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        if let Ok(control) = RendezvousMessage::from_json(&text) {
            match control {
                RendezvousMessage::Assigned { id } => {
                    let _ = events.send(SessionEvent::IdentityReady { id });
                }
                RendezvousMessage::Incoming { from } => {
                    // The server has already re-paired this endpoint, so the
                    // previous circuit is gone; retiring its generation here
                    // keeps the session's stale close command from hanging up
                    // the fresh pairing.
                    *current = None;
                    let _ = events.send(SessionEvent::IncomingConnection { remote_id: from });
                }
                RendezvousMessage::Opened { .. } => {
                    if let Some(generation) = *current {
                        let _ = events.send(SessionEvent::ConnectionOpened { generation });
                    }
                }
                RendezvousMessage::Closed => {
                    if let Some(generation) = current.take() {
                        let _ = events.send(SessionEvent::ConnectionClosed { generation });
                    }
                }
                RendezvousMessage::Error { message } => {
                    let _ = events.send(SessionEvent::TransportError {
                        generation: *current,
                        message,
                    });
                }
                RendezvousMessage::Ping => {
                    sink.send(Message::Text(RendezvousMessage::Pong.to_json()?))
                        .await?;
                }
                other => {
                    debug!(?other, "ignoring unexpected control message");
                }
            }
            return Ok(());
        }

        match PeerMessage::from_json(&text) {
            Ok(PeerMessage::Metadata(metadata)) => {
                if let Some(generation) = *current {
                    let _ = events.send(SessionEvent::MetadataReceived {
                        generation,
                        metadata,
                    });
                } else {
                    warn!("metadata frame with no connection, dropping");
                }
            }
            Err(_) => {
                warn!("unparseable text frame, dropping");
            }
        }
        Ok(())
    }
}
