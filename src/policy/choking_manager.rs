use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

/// Accumulates bytes downloaded per neighbor since the last preferred-
/// selection tick. Reset atomically (`snapshot_and_reset`) each tick.
#[derive(Debug, Default)]
pub struct RateTracker {
    bytes: HashMap<u32, u64>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_download(&mut self, peer_id: u32, n: u64) {
        *self.bytes.entry(peer_id).or_insert(0) += n;
    }

    pub fn snapshot_and_reset(&mut self) -> HashMap<u32, u64> {
        std::mem::take(&mut self.bytes)
    }
}

/// Download-rate tracking plus preferred/optimistic neighbor selection.
#[derive(Debug)]
pub struct ChokingManager {
    k: usize,
    pub rates: RateTracker,
}

impl ChokingManager {
    pub fn new(k_preferred: usize) -> Self {
        ChokingManager {
            k: k_preferred,
            rates: RateTracker::new(),
        }
    }

    /// Selects up to `k` preferred neighbors. When this node already holds
    /// the complete file, selection is a uniform random subset (no rate
    /// signal to use); otherwise it's by descending download rate, with
    /// uniform-random tie-breaking within each equal-rate run.
    pub fn select_preferred(
        &mut self,
        mut interested_ids: Vec<u32>,
        have_full_file: bool,
        rng: &mut impl Rng,
    ) -> Vec<u32> {
        if interested_ids.is_empty() {
            return Vec::new();
        }
        if have_full_file {
            interested_ids.shuffle(rng);
            interested_ids.truncate(self.k);
            return interested_ids;
        }

        let snap = self.rates.snapshot_and_reset();
        let rate_of = |id: &u32| snap.get(id).copied().unwrap_or(0);
        interested_ids.sort_by(|a, b| rate_of(b).cmp(&rate_of(a)));

        let mut i = 0;
        while i < interested_ids.len() {
            let mut j = i + 1;
            while j < interested_ids.len() && rate_of(&interested_ids[j]) == rate_of(&interested_ids[i]) {
                j += 1;
            }
            interested_ids[i..j].shuffle(rng);
            i = j;
        }

        interested_ids.truncate(self.k);
        interested_ids
    }

    /// Uniform random choice among choked-but-interested neighbors.
    pub fn pick_optimistic(&self, choked_interested_ids: &[u32], rng: &mut impl Rng) -> Option<u32> {
        choked_interested_ids.choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn empty_interested_yields_empty_selection() {
        let mut mgr = ChokingManager::new(2);
        assert!(mgr.select_preferred(vec![], false, &mut rng()).is_empty());
    }

    #[test]
    fn seed_selection_is_bounded_by_k_and_subset_of_interested() {
        let mut mgr = ChokingManager::new(2);
        let interested = vec![1, 2, 3, 4];
        let selected = mgr.select_preferred(interested.clone(), true, &mut rng());
        assert_eq!(selected.len(), 2);
        for id in &selected {
            assert!(interested.contains(id));
        }
    }

    #[test]
    fn s6_higher_rate_neighbor_is_preferred_over_lower() {
        let mut mgr = ChokingManager::new(1);
        mgr.rates.add_download(10, 100);
        mgr.rates.add_download(20, 5);
        let selected = mgr.select_preferred(vec![10, 20], false, &mut rng());
        assert_eq!(selected, vec![10]);
    }

    #[test]
    fn equal_rates_still_return_k_items_from_the_tied_group() {
        let mut mgr = ChokingManager::new(1);
        mgr.rates.add_download(10, 50);
        mgr.rates.add_download(20, 50);
        let selected = mgr.select_preferred(vec![10, 20], false, &mut rng());
        assert_eq!(selected.len(), 1);
        assert!(selected[0] == 10 || selected[0] == 20);
    }

    #[test]
    fn snapshot_and_reset_clears_the_tracker() {
        let mut tracker = RateTracker::new();
        tracker.add_download(1, 10);
        let snap = tracker.snapshot_and_reset();
        assert_eq!(snap.get(&1), Some(&10));
        assert!(tracker.snapshot_and_reset().is_empty());
    }

    #[test]
    fn pick_optimistic_is_none_for_empty_set() {
        let mgr = ChokingManager::new(1);
        assert!(mgr.pick_optimistic(&[], &mut rng()).is_none());
    }
}
