use std::collections::HashMap;

use rand::Rng;

use crate::piece::Bitfield;

/// Enforces "at most one outstanding request per neighbor" and "no
/// duplicate in-flight piece across neighbors" by holding the bijection
/// between the two as a pair of maps.
#[derive(Debug)]
pub struct RequestManager {
    total: usize,
    piece_by_peer: HashMap<u32, u32>,
    peer_by_piece: HashMap<u32, u32>,
    completed: std::collections::HashSet<u32>,
}

impl RequestManager {
    pub fn new(total: usize) -> Self {
        RequestManager {
            total,
            piece_by_peer: HashMap::new(),
            peer_by_piece: HashMap::new(),
            completed: std::collections::HashSet::new(),
        }
    }

    /// Picks a piece to request from `peer_id`, or `None` if that peer
    /// already has an outstanding request or no eligible piece exists.
    /// Selection is uniform at random among eligible candidates.
    pub fn choose_for_neighbor(
        &self,
        peer_id: u32,
        their_bits: &Bitfield,
        local_bits: &Bitfield,
        rng: &mut impl Rng,
    ) -> Option<u32> {
        if self.piece_by_peer.contains_key(&peer_id) {
            return None;
        }
        let candidates: Vec<u32> = (0..self.total as u32)
            .filter(|&i| {
                !local_bits.get(i as usize)
                    && their_bits.get(i as usize)
                    && !self.peer_by_piece.contains_key(&i)
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..candidates.len());
        Some(candidates[idx])
    }

    /// Precondition: neither `peer_id` nor `index` is already tracked.
    pub fn mark_inflight(&mut self, peer_id: u32, index: u32) {
        debug_assert!(!self.piece_by_peer.contains_key(&peer_id));
        debug_assert!(!self.peer_by_piece.contains_key(&index));
        self.piece_by_peer.insert(peer_id, index);
        self.peer_by_piece.insert(index, peer_id);
    }

    pub fn clear_inflight_for_peer(&mut self, peer_id: u32) {
        if let Some(index) = self.piece_by_peer.remove(&peer_id) {
            self.peer_by_piece.remove(&index);
        }
    }

    pub fn complete(&mut self, index: u32) {
        if let Some(peer) = self.peer_by_piece.remove(&index) {
            self.piece_by_peer.remove(&peer);
        }
        self.completed.insert(index);
    }

    #[cfg(test)]
    pub fn is_inflight_for_peer(&self, peer_id: u32) -> Option<u32> {
        self.piece_by_peer.get(&peer_id).copied()
    }
}
