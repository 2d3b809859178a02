//! Shuffle without repeats: every track of the current view plays once before
//! any track plays again.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::TrackIndex;

#[derive(Debug)]
pub struct ShuffleSequencer {
    history: HashSet<TrackIndex>,
    rng: StdRng,
}

impl Default for ShuffleSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShuffleSequencer {
    pub fn new() -> Self {
        Self {
            history: HashSet::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            history: HashSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn history(&self) -> &HashSet<TrackIndex> {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Record `track` as played. Once every track of `view` has played the
    /// round is over and the history starts afresh.
    pub fn mark_played(&mut self, track: TrackIndex, view: &[TrackIndex]) {
        self.history.insert(track);
        if !view.is_empty() && view.iter().all(|t| self.history.contains(t)) {
            self.history.clear();
        }
    }

    /// Pick uniformly among the view's tracks not yet played this round.
    /// Does not record the pick; call `mark_played` once it starts.
    pub fn next(&mut self, view: &[TrackIndex]) -> Option<TrackIndex> {
        if view.is_empty() {
            return None;
        }
        let mut pool: Vec<TrackIndex> = view
            .iter()
            .copied()
            .filter(|t| !self.history.contains(t))
            .collect();
        if pool.is_empty() {
            self.history.clear();
            pool = view.to_vec();
        }
        let pick = self.rng.gen_range(0..pool.len());
        Some(pool[pick])
    }
}
