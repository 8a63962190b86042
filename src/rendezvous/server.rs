use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async_with_config, tungstenite::Message};
use tracing::{debug, info, warn};

use super::protocol::RendezvousMessage;
use super::ws_config;

type Tx = mpsc::UnboundedSender<Message>;
type PeerMap = Arc<Mutex<HashMap<String, Peer>>>;

/// One connected endpoint.
#[derive(Debug)]
struct Peer {
    tx: Tx,
    paired_with: Option<String>,
}

/// Run the rendezvous server.
///
/// Assigns every endpoint an identifier, pairs endpoints on request, and
/// forwards peer frames between paired endpoints without inspecting them.
/// Content is never stored.
pub async fn run_server(port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "rendezvous server listening");

    let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));

    loop {
        let (stream, addr) = listener.accept().await?;
        let peers = peers.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, peers).await {
                warn!(%addr, error = %e, "connection ended with error");
            }
        });
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

fn send_control(tx: &Tx, msg: &RendezvousMessage) {
    if let Ok(json) = msg.to_json() {
        let _ = tx.send(Message::Text(json));
    }
}

/// Break `id`'s pairing, if any, and tell the other side.
fn unpair(peers: &mut HashMap<String, Peer>, id: &str) {
    let Some(partner_id) = peers.get_mut(id).and_then(|p| p.paired_with.take()) else {
        return;
    };
    if let Some(partner) = peers.get_mut(&partner_id) {
        partner.paired_with = None;
        send_control(&partner.tx, &RendezvousMessage::Closed);
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, peers: PeerMap) -> Result<()> {
    let ws_stream = accept_async_with_config(stream, Some(ws_config())).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel();

    // Forward queued messages to the websocket.
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let my_id = generate_id();
    info!(%addr, id = %my_id, "peer registered");
    {
        let mut peers_lock = peers.lock().await;
        peers_lock.insert(
            my_id.clone(),
            Peer {
                tx: tx.clone(),
                paired_with: None,
            },
        );
    }
    send_control(&tx, &RendezvousMessage::Assigned { id: my_id.clone() });

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            // A dead socket still needs the cleanup below.
            Err(e) => {
                debug!(id = %my_id, error = %e, "read failed");
                break;
            }
        };
        match msg {
            Message::Text(text) => match RendezvousMessage::from_json(&text) {
                Ok(RendezvousMessage::Connect { to }) => {
                    let mut peers_lock = peers.lock().await;
                    if to == my_id {
                        send_control(
                            &tx,
                            &RendezvousMessage::Error {
                                message: "cannot connect to yourself".to_string(),
                            },
                        );
                    } else if !peers_lock.contains_key(&to) {
                        send_control(
                            &tx,
                            &RendezvousMessage::Error {
                                message: format!("peer {} not found", to),
                            },
                        );
                    } else {
                        // Last pairing wins on both sides.
                        unpair(&mut peers_lock, &my_id);
                        unpair(&mut peers_lock, &to);
                        if let Some(me) = peers_lock.get_mut(&my_id) {
                            me.paired_with = Some(to.clone());
                        }
                        if let Some(target) = peers_lock.get_mut(&to) {
                            target.paired_with = Some(my_id.clone());
                            send_control(
                                &target.tx,
                                &RendezvousMessage::Incoming {
                                    from: my_id.clone(),
                                },
                            );
                        }
                        send_control(&tx, &RendezvousMessage::Opened { with: to.clone() });
                        info!(from = %my_id, %to, "paired");
                    }
                }
                Ok(RendezvousMessage::Hangup) => {
                    let mut peers_lock = peers.lock().await;
                    unpair(&mut peers_lock, &my_id);
                }
                Ok(RendezvousMessage::Ping) => {
                    send_control(&tx, &RendezvousMessage::Pong);
                }
                Ok(RendezvousMessage::Pong) => {}
                Ok(other) => {
                    debug!(id = %my_id, ?other, "ignoring unexpected control message");
                }
                // Not a control message: peer traffic, forwarded verbatim.
                Err(_) => {
                    let peers_lock = peers.lock().await;
                    match partner_tx(&peers_lock, &my_id) {
                        Some(partner) => {
                            let _ = partner.send(Message::Text(text));
                        }
                        None => debug!(id = %my_id, "text frame from unpaired peer, dropping"),
                    }
                }
            },
            Message::Binary(data) => {
                let peers_lock = peers.lock().await;
                match partner_tx(&peers_lock, &my_id) {
                    Some(partner) => {
                        let _ = partner.send(Message::Binary(data));
                    }
                    None => debug!(id = %my_id, "binary frame from unpaired peer, dropping"),
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Cleanup: break the pairing and forget the endpoint.
    {
        let mut peers_lock = peers.lock().await;
        unpair(&mut peers_lock, &my_id);
        peers_lock.remove(&my_id);
    }
    info!(%addr, id = %my_id, "peer disconnected");

    forward_task.abort();
    Ok(())
}

fn partner_tx<'a>(peers: &'a HashMap<String, Peer>, id: &str) -> Option<&'a Tx> {
    let partner_id = peers.get(id)?.paired_with.as_ref()?;
    peers.get(partner_id).map(|p| &p.tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn next_control(ws: &mut Ws) -> RendezvousMessage {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return RendezvousMessage::from_json(&text).unwrap(),
                _ => continue,
            }
        }
    }

    async fn join(port: u16) -> (Ws, String) {
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}", port))
            .await
            .unwrap();
        match next_control(&mut ws).await {
            RendezvousMessage::Assigned { id } => (ws, id),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pairing_and_forwarding() {
        let port = 19941;
        tokio::spawn(run_server(port));
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let (mut alice, _alice_id) = join(port).await;
        let (mut bob, bob_id) = join(port).await;

        // Pair.
        alice
            .send(Message::Text(
                RendezvousMessage::Connect { to: bob_id }.to_json().unwrap(),
            ))
            .await
            .unwrap();
        assert!(matches!(
            next_control(&mut alice).await,
            RendezvousMessage::Opened { .. }
        ));
        assert!(matches!(
            next_control(&mut bob).await,
            RendezvousMessage::Incoming { .. }
        ));

        // Peer text frames pass through untouched.
        let metadata = r#"{"kind":"metadata","name":"a.txt","size":3,"contentType":"text/plain"}"#;
        alice
            .send(Message::Text(metadata.to_string()))
            .await
            .unwrap();
        match bob.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text, metadata),
            other => panic!("expected text frame, got {:?}", other),
        }

        // Binary frames too, in both directions.
        alice.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        match bob.next().await.unwrap().unwrap() {
            Message::Binary(data) => assert_eq!(data, vec![1, 2, 3]),
            other => panic!("expected binary frame, got {:?}", other),
        }
        bob.send(Message::Binary(vec![9])).await.unwrap();
        match alice.next().await.unwrap().unwrap() {
            Message::Binary(data) => assert_eq!(data, vec![9]),
            other => panic!("expected binary frame, got {:?}", other),
        }

        // Hangup notifies the other side.
        alice
            .send(Message::Text(RendezvousMessage::Hangup.to_json().unwrap()))
            .await
            .unwrap();
        assert!(matches!(
            next_control(&mut bob).await,
            RendezvousMessage::Closed
        ));
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_errors() {
        let port = 19942;
        tokio::spawn(run_server(port));
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let (mut alice, _) = join(port).await;
        alice
            .send(Message::Text(
                RendezvousMessage::Connect {
                    to: "nobody".to_string(),
                }
                .to_json()
                .unwrap(),
            ))
            .await
            .unwrap();

        match next_control(&mut alice).await {
            RendezvousMessage::Error { message } => {
                assert_eq!(message, "peer nobody not found");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_notifies_partner() {
        let port = 19943;
        tokio::spawn(run_server(port));
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let (mut alice, _) = join(port).await;
        let (mut bob, bob_id) = join(port).await;

        alice
            .send(Message::Text(
                RendezvousMessage::Connect { to: bob_id }.to_json().unwrap(),
            ))
            .await
            .unwrap();
        assert!(matches!(
            next_control(&mut alice).await,
            RendezvousMessage::Opened { .. }
        ));
        assert!(matches!(
            next_control(&mut bob).await,
            RendezvousMessage::Incoming { .. }
        ));

        drop(alice);
        assert!(matches!(
            next_control(&mut bob).await,
            RendezvousMessage::Closed
        ));
    }
}
