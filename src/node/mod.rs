mod connection;
mod connector;

pub use connection::PeerConnection;
pub use connector::Connector;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::CoreError;
use crate::event_log;
use crate::piece::{Bitfield, PieceStore};
use crate::policy::{ChokingManager, RequestManager};

/// Events delivered to the single `PeerNode` actor. Every variant but the
/// two ticks carries the neighbor it concerns; the actor processes one at a
/// time, which is what keeps the registry/request/choking/bitfield state
/// free of locks (spec §5).
#[derive(Debug)]
pub enum NodeEvent {
    Handshake {
        peer_id: u32,
        outbound: bool,
        wire: mpsc::UnboundedSender<WireCommand>,
    },
    Disconnected {
        peer_id: u32,
    },
    Choke {
        peer_id: u32,
    },
    Unchoke {
        peer_id: u32,
    },
    Interested {
        peer_id: u32,
    },
    NotInterested {
        peer_id: u32,
    },
    Have {
        peer_id: u32,
        index: u32,
    },
    Bitfield {
        peer_id: u32,
        bits: Bytes,
    },
    Request {
        peer_id: u32,
        index: u32,
    },
    Piece {
        peer_id: u32,
        index: u32,
        data: Bytes,
    },
    PreferredTick,
    OptimisticTick,
}

/// Outbound commands, one per wire message type plus a connection-close
/// signal. A connection's writer task is the sole consumer of its
/// `UnboundedReceiver<WireCommand>`, which is what gives "writes to a
/// single connection are serialised" for free.
#[derive(Debug, Clone)]
pub enum WireCommand {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Bytes),
    Request(u32),
    Piece(u32, Bytes),
    Close,
}

#[derive(Debug)]
struct NeighborState {
    peer_id: u32,
    wire: mpsc::UnboundedSender<WireCommand>,
    we_choke_them: bool,
    they_choke_us: bool,
    they_interested_in_us: bool,
    their_bits: Bitfield,
}

/// Parameters a `PeerNode` needs beyond what can be derived from
/// `Common.cfg`/`PeerInfo.cfg` directly; kept as a struct so `PeerNode::new`
/// doesn't grow an unreadable positional parameter list.
pub struct NodeConfig {
    pub total_pieces: usize,
    pub piece_size: usize,
    pub last_piece_size: usize,
    pub data_dir: PathBuf,
    pub start_with_full_file: bool,
    pub k_preferred: usize,
    pub preferred_interval: Duration,
    pub optimistic_interval: Duration,
    pub self_id: u32,
    pub all_peer_ids: HashSet<u32>,
    pub file_name: String,
}

/// The policy core: neighbor registry, request/choking managers, piece
/// store, and global-completion bookkeeping, all owned by one task.
pub struct PeerNode {
    self_id: u32,
    total_pieces: usize,
    file_name: String,
    store: PieceStore,
    requests: RequestManager,
    choking: ChokingManager,
    registry: HashMap<u32, NeighborState>,
    all_peer_ids: HashSet<u32>,
    complete_peers: HashSet<u32>,
    rng: StdRng,
    preferred_interval: Duration,
    optimistic_interval: Duration,
}

impl PeerNode {
    pub fn new(cfg: NodeConfig, rng: StdRng) -> std::io::Result<Self> {
        let store = PieceStore::new(
            cfg.data_dir,
            cfg.total_pieces,
            cfg.piece_size,
            cfg.last_piece_size,
            cfg.start_with_full_file,
        )?;
        let mut complete_peers = HashSet::new();
        if store.bitfield().is_full() {
            complete_peers.insert(cfg.self_id);
        }
        Ok(PeerNode {
            self_id: cfg.self_id,
            total_pieces: cfg.total_pieces,
            file_name: cfg.file_name,
            store,
            requests: RequestManager::new(cfg.total_pieces),
            choking: ChokingManager::new(cfg.k_preferred),
            registry: HashMap::new(),
            all_peer_ids: cfg.all_peer_ids,
            complete_peers,
            rng,
            preferred_interval: cfg.preferred_interval,
            optimistic_interval: cfg.optimistic_interval,
        })
    }

    pub fn store(&self) -> &PieceStore {
        &self.store
    }

    pub fn is_globally_complete(&self) -> bool {
        self.complete_peers == self.all_peer_ids
    }

    /// Fires `WireCommand::Close` at every connected neighbor. Used during
    /// teardown after global completion.
    pub fn close_all_connections(&self) {
        for ns in self.registry.values() {
            let _ = ns.wire.send(WireCommand::Close);
        }
    }

    /// Drives the actor loop until every known peer (including this one) is
    /// recorded complete. Owns the two periodic choking timers (spec §4.6:
    /// "two periodic timers inside PeerNode") alongside the inbound event
    /// channel; a caller can still inject `NodeEvent::PreferredTick`/
    /// `OptimisticTick` through `events` directly (tests do this to drive
    /// ticks deterministically instead of waiting on wall-clock timers).
    /// Returns `self` so the caller can inspect the final store state and
    /// tear down.
    pub async fn run(mut self, mut events: mpsc::Receiver<NodeEvent>) -> Self {
        if self.is_globally_complete() {
            return self;
        }

        let mut preferred_ticker = tokio::time::interval(self.preferred_interval);
        preferred_ticker.tick().await; // interval's first tick fires immediately; skip it
        let mut optimistic_ticker = tokio::time::interval(self.optimistic_interval);
        optimistic_ticker.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.dispatch(event),
                        None => break,
                    }
                }
                _ = preferred_ticker.tick() => self.dispatch(NodeEvent::PreferredTick),
                _ = optimistic_ticker.tick() => self.dispatch(NodeEvent::OptimisticTick),
            }
            if self.is_globally_complete() {
                tracing::info!(self_id = self.self_id, "believes all peers are complete");
                break;
            }
        }
        self
    }

    fn dispatch(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Handshake { peer_id, outbound, wire } => self.on_handshake(peer_id, outbound, wire),
            NodeEvent::Disconnected { peer_id } => self.on_disconnect(peer_id),
            NodeEvent::Choke { peer_id } => self.on_choke(peer_id),
            NodeEvent::Unchoke { peer_id } => self.on_unchoke(peer_id),
            NodeEvent::Interested { peer_id } => self.on_interested(peer_id),
            NodeEvent::NotInterested { peer_id } => self.on_not_interested(peer_id),
            NodeEvent::Have { peer_id, index } => self.on_have(peer_id, index),
            NodeEvent::Bitfield { peer_id, bits } => self.on_bitfield(peer_id, bits),
            NodeEvent::Request { peer_id, index } => self.on_request(peer_id, index),
            NodeEvent::Piece { peer_id, index, data } => self.on_piece(peer_id, index, data),
            NodeEvent::PreferredTick => self.on_preferred_tick(),
            NodeEvent::OptimisticTick => self.on_optimistic_tick(),
        }
    }

    fn on_handshake(&mut self, peer_id: u32, outbound: bool, wire: mpsc::UnboundedSender<WireCommand>) {
        if outbound {
            event_log::makes_connection_to(self.self_id, peer_id);
        } else {
            event_log::connected_from(self.self_id, peer_id);
        }

        if self.store.bitfield().count() > 0 {
            let _ = wire.send(WireCommand::Bitfield(self.store.bitfield().to_bytes()));
        }

        self.registry.insert(
            peer_id,
            NeighborState {
                peer_id,
                wire,
                we_choke_them: true,
                they_choke_us: true,
                they_interested_in_us: false,
                their_bits: Bitfield::empty(self.total_pieces),
            },
        );
        self.recompute_interest(peer_id);
    }

    fn on_disconnect(&mut self, peer_id: u32) {
        self.requests.clear_inflight_for_peer(peer_id);
        self.registry.remove(&peer_id);
    }

    fn on_choke(&mut self, peer_id: u32) {
        if let Some(ns) = self.registry.get_mut(&peer_id) {
            ns.they_choke_us = true;
        }
        event_log::is_choked_by(self.self_id, peer_id);
        self.requests.clear_inflight_for_peer(peer_id);
    }

    fn on_unchoke(&mut self, peer_id: u32) {
        if let Some(ns) = self.registry.get_mut(&peer_id) {
            ns.they_choke_us = false;
        }
        event_log::is_unchoked_by(self.self_id, peer_id);
        self.maybe_request_next(peer_id);
    }

    fn on_interested(&mut self, peer_id: u32) {
        if let Some(ns) = self.registry.get_mut(&peer_id) {
            ns.they_interested_in_us = true;
        }
        event_log::received_interested(self.self_id, peer_id);
    }

    fn on_not_interested(&mut self, peer_id: u32) {
        if let Some(ns) = self.registry.get_mut(&peer_id) {
            ns.they_interested_in_us = false;
        }
        event_log::received_not_interested(self.self_id, peer_id);
    }

    fn on_have(&mut self, peer_id: u32, index: u32) {
        let mut became_full = false;
        if let Some(ns) = self.registry.get_mut(&peer_id) {
            ns.their_bits.set(index as usize, true);
            became_full = ns.their_bits.is_full();
        }
        event_log::received_have(self.self_id, peer_id, index);
        if became_full {
            self.mark_peer_complete(peer_id);
        }
        self.recompute_interest(peer_id);
    }

    fn on_bitfield(&mut self, peer_id: u32, bits: Bytes) {
        let mut became_full = false;
        if let Some(ns) = self.registry.get_mut(&peer_id) {
            ns.their_bits = Bitfield::from_wire_bytes(self.total_pieces, &bits);
            became_full = ns.their_bits.is_full();
        }
        if became_full {
            self.mark_peer_complete(peer_id);
        }
        self.recompute_interest(peer_id);
    }

    fn on_request(&mut self, peer_id: u32, index: u32) {
        let we_choke_them = self.registry.get(&peer_id).map(|ns| ns.we_choke_them).unwrap_or(true);
        if we_choke_them || !self.store.have(index) {
            return;
        }
        let data = match self.store.read_piece(index) {
            Ok(d) => d,
            Err(e) => {
                warn!(index, "failed to read piece for request: {e}");
                return;
            }
        };
        if let Some(ns) = self.registry.get(&peer_id) {
            let _ = ns.wire.send(WireCommand::Piece(index, data));
        }
    }

    fn on_piece(&mut self, peer_id: u32, index: u32, data: Bytes) {
        self.choking.rates.add_download(peer_id, data.len() as u64);
        if !self.store.write_piece(index, &data) {
            return;
        }
        self.requests.complete(index);

        let have_count = self.store.bitfield().count();
        event_log::downloaded_piece_from(self.self_id, peer_id, index, have_count);

        let neighbor_ids: Vec<u32> = self.registry.keys().copied().collect();
        for id in &neighbor_ids {
            if let Some(ns) = self.registry.get(id) {
                let _ = ns.wire.send(WireCommand::Have(index));
            }
        }
        for id in &neighbor_ids {
            self.recompute_interest(*id);
        }
        self.maybe_request_next(peer_id);

        if have_count == self.total_pieces {
            event_log::downloaded_complete_file(self.self_id);
            self.mark_peer_complete(self.self_id);
            match self.store.reconstruct_full_file(&self.file_name) {
                Ok(_) => {}
                Err(e) => warn!("failed to reconstruct {}: {e}", self.file_name),
            }
        }
    }

    fn recompute_interest(&mut self, peer_id: u32) {
        let Some(ns) = self.registry.get(&peer_id) else {
            return;
        };
        let missing = self.store.bitfield().missing_from(&ns.their_bits);
        let cmd = if missing.is_empty() {
            WireCommand::NotInterested
        } else {
            WireCommand::Interested
        };
        let _ = ns.wire.send(cmd);
    }

    fn maybe_request_next(&mut self, peer_id: u32) {
        let Some(ns) = self.registry.get(&peer_id) else {
            return;
        };
        if ns.they_choke_us {
            return;
        }
        let their_bits = ns.their_bits.clone();
        let wire = ns.wire.clone();
        let Some(index) = self
            .requests
            .choose_for_neighbor(peer_id, &their_bits, self.store.bitfield(), &mut self.rng)
        else {
            return;
        };
        let _ = wire.send(WireCommand::Request(index));
        self.requests.mark_inflight(peer_id, index);
    }

    fn mark_peer_complete(&mut self, peer_id: u32) {
        self.complete_peers.insert(peer_id);
    }

    fn on_preferred_tick(&mut self) {
        let interested: Vec<u32> = self
            .registry
            .values()
            .filter(|ns| ns.they_interested_in_us)
            .map(|ns| ns.peer_id)
            .collect();
        let have_full = self.store.bitfield().is_full();
        let selected = self.choking.select_preferred(interested, have_full, &mut self.rng);
        event_log::preferred_neighbors(self.self_id, &selected);
        let selected_set: HashSet<u32> = selected.into_iter().collect();

        let ids: Vec<u32> = self.registry.keys().copied().collect();
        for id in ids {
            let in_selected = selected_set.contains(&id);
            if let Some(ns) = self.registry.get_mut(&id) {
                if in_selected && ns.we_choke_them {
                    let _ = ns.wire.send(WireCommand::Unchoke);
                    ns.we_choke_them = false;
                } else if !in_selected && !ns.we_choke_them {
                    let _ = ns.wire.send(WireCommand::Choke);
                    ns.we_choke_them = true;
                }
            }
        }
    }

    fn on_optimistic_tick(&mut self) {
        let choked_interested: Vec<u32> = self
            .registry
            .values()
            .filter(|ns| ns.they_interested_in_us && ns.we_choke_them)
            .map(|ns| ns.peer_id)
            .collect();
        let Some(pick) = self.choking.pick_optimistic(&choked_interested, &mut self.rng) else {
            return;
        };
        event_log::optimistic_unchoked_neighbor(self.self_id, pick);
        if let Some(ns) = self.registry.get_mut(&pick) {
            if ns.we_choke_them {
                let _ = ns.wire.send(WireCommand::Unchoke);
                ns.we_choke_them = false;
            }
        }
    }
}

/// Errors surfaced by the driver when process-level teardown fails.
pub fn fatal_reconstruction_error(err: &CoreError) -> bool {
    matches!(err, CoreError::IncompleteData)
}
