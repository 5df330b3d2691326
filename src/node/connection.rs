use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::warn;

use super::{NodeEvent, WireCommand};
use crate::wire::{Handshake, Message, PeerCodec, HANDSHAKE_LEN};

/// A single TCP connection's lifecycle: handshake, then a read loop feeding
/// `NodeEvent`s to the actor and a writer task draining a per-connection
/// `WireCommand` queue. Grounded in `original_source/net/peer_connection.py`'s
/// `PeerConnection`, which pairs an async read loop with a serialized write
/// path the same way.
pub struct PeerConnection;

impl PeerConnection {
    /// Runs the full connection lifecycle to completion. Always emits a
    /// final `NodeEvent::Disconnected` once it has sent a successful
    /// `NodeEvent::Handshake` — never otherwise, since the actor never
    /// learned the peer id.
    pub async fn run(
        mut stream: TcpStream,
        local_peer_id: u32,
        outbound: bool,
        handshake_timeout: Duration,
        node_tx: mpsc::Sender<NodeEvent>,
    ) {
        let handshake = Handshake::new(local_peer_id).encode();
        if let Err(e) = stream.write_all(&handshake).await {
            warn!("failed to send handshake: {e}");
            return;
        }

        let mut buf = [0u8; HANDSHAKE_LEN];
        let read = timeout(handshake_timeout, stream.read_exact(&mut buf)).await;
        let peer_id = match read {
            Err(_) => {
                warn!("handshake timed out");
                return;
            }
            Ok(Err(e)) => {
                warn!("failed to read handshake: {e}");
                return;
            }
            Ok(Ok(_)) => match Handshake::decode(&buf) {
                Ok(hs) => hs.peer_id,
                Err(e) => {
                    warn!("malformed handshake: {e}");
                    return;
                }
            },
        };

        let framed = Framed::new(stream, PeerCodec);
        let (mut sink, mut reader) = framed.split();

        let (wire_tx, mut wire_rx) = mpsc::unbounded_channel::<WireCommand>();
        if node_tx
            .send(NodeEvent::Handshake {
                peer_id,
                outbound,
                wire: wire_tx,
            })
            .await
            .is_err()
        {
            return;
        }

        let writer = tokio::spawn(async move {
            while let Some(cmd) = wire_rx.recv().await {
                let msg = match cmd {
                    WireCommand::Close => break,
                    WireCommand::Choke => Message::Choke,
                    WireCommand::Unchoke => Message::Unchoke,
                    WireCommand::Interested => Message::Interested,
                    WireCommand::NotInterested => Message::NotInterested,
                    WireCommand::Have(index) => Message::Have(index),
                    WireCommand::Bitfield(bits) => Message::Bitfield(bits),
                    WireCommand::Request(index) => Message::Request(index),
                    WireCommand::Piece(index, data) => Message::Piece(index, data),
                };
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        while let Some(frame) = reader.next().await {
            let event = match frame {
                Ok(Message::Choke) => NodeEvent::Choke { peer_id },
                Ok(Message::Unchoke) => NodeEvent::Unchoke { peer_id },
                Ok(Message::Interested) => NodeEvent::Interested { peer_id },
                Ok(Message::NotInterested) => NodeEvent::NotInterested { peer_id },
                Ok(Message::Have(index)) => NodeEvent::Have { peer_id, index },
                Ok(Message::Bitfield(bits)) => NodeEvent::Bitfield { peer_id, bits },
                Ok(Message::Request(index)) => NodeEvent::Request { peer_id, index },
                Ok(Message::Piece(index, data)) => NodeEvent::Piece { peer_id, index, data },
                Err(e) => {
                    warn!(peer_id, "closing connection after framing error: {e}");
                    break;
                }
            };
            if node_tx.send(event).await.is_err() {
                break;
            }
        }

        writer.abort();
        let _ = node_tx.send(NodeEvent::Disconnected { peer_id }).await;
    }
}
