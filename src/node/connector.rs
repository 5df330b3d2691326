use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

use super::{connection::PeerConnection, NodeEvent};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts inbound connections and dials outbound ones, handing each
/// resulting socket to `PeerConnection::run`. Grounded in
/// `original_source/net/connector.py`'s `Connector`, which pairs a listening
/// accept loop with a backoff-retrying dialer the same way.
pub struct Connector {
    local_peer_id: u32,
    node_tx: mpsc::Sender<NodeEvent>,
    handshake_timeout: Duration,
}

impl Connector {
    pub fn new(local_peer_id: u32, node_tx: mpsc::Sender<NodeEvent>, handshake_timeout: Duration) -> Self {
        Connector {
            local_peer_id,
            node_tx,
            handshake_timeout,
        }
    }

    /// Binds `addr` and spawns the accept loop as a background task. The
    /// returned handle can be aborted to stop accepting new connections;
    /// already-spawned `PeerConnection` tasks are unaffected.
    pub async fn serve(&self, addr: impl ToSocketAddrs) -> std::io::Result<JoinHandle<()>> {
        let listener = TcpListener::bind(addr).await?;
        let local_peer_id = self.local_peer_id;
        let handshake_timeout = self.handshake_timeout;
        let node_tx = self.node_tx.clone();

        Ok(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        tokio::spawn(PeerConnection::run(stream, local_peer_id, false, handshake_timeout, node_tx.clone()));
                    }
                    Err(e) => {
                        warn!("accept loop stopping after error: {e}");
                        break;
                    }
                }
            }
        }))
    }

    /// Dials `host:port` with exponential backoff, giving up after
    /// `attempts` failures. On success, spawns the connection task and
    /// returns immediately without waiting for it to finish — a later
    /// disconnect is a normal lifecycle event, not a retry trigger.
    pub async fn connect_with_retry(
        &self,
        host: &str,
        port: u16,
        attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) {
        let mut backoff = initial_backoff;
        for attempt in 0..attempts.max(1) {
            match timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
                Ok(Ok(stream)) => {
                    tokio::spawn(PeerConnection::run(
                        stream,
                        self.local_peer_id,
                        true,
                        self.handshake_timeout,
                        self.node_tx.clone(),
                    ));
                    return;
                }
                Ok(Err(e)) => warn!(host, port, attempt, "connect failed: {e}"),
                Err(_) => warn!(host, port, attempt, "connect timed out"),
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
        }
        warn!(host, port, attempts, "giving up dialing peer after exhausting retries");
    }
}
