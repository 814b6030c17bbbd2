// Ethash Farm - Free and Open Source Software Statement
//
// File: src/miner/sequencer.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// Orders dataset loading across miners. Every epoch change published by the
// farm opens a new load round; in sequential mode miner i starts its upload
// for a round only after every miner below i has finished (or failed) its own
// load in that round.

use crate::core::config::DagLoadMode;
use log::debug;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const LOG_TARGET: &str = "ethash_farm::sequencer";
const TURN_POLL: Duration = Duration::from_millis(100);
const ROUNDS_KEPT: usize = 4;

struct LoadRound {
    id: u64,
    completed: BTreeSet<usize>,
}

pub struct DagLoadSequencer {
    mode: DagLoadMode,
    rounds: Mutex<VecDeque<LoadRound>>,
    turn_cv: Condvar,
    load_index: AtomicU64,
}

impl DagLoadSequencer {
    pub fn new(mode: DagLoadMode) -> Self {
        Self {
            mode,
            rounds: Mutex::new(VecDeque::with_capacity(ROUNDS_KEPT)),
            turn_cv: Condvar::new(),
            load_index: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> DagLoadMode {
        self.mode
    }

    /// Total dataset loads finished across all miners
    pub fn load_index(&self) -> u64 {
        self.load_index.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LoadRound>> {
        self.rounds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn round(rounds: &mut VecDeque<LoadRound>, id: u64) -> &mut LoadRound {
        let pos = match rounds.iter().position(|r| r.id == id) {
            Some(pos) => pos,
            None => {
                rounds.push_back(LoadRound {
                    id,
                    completed: BTreeSet::new(),
                });
                while rounds.len() > ROUNDS_KEPT {
                    rounds.pop_front();
                }
                rounds.len() - 1
            }
        };
        &mut rounds[pos]
    }

    /// Blocks until miner `index` may load its dataset in round `round`.
    ///
    /// Returns false when `should_abort` fired while waiting.
    pub fn wait_turn<F>(&self, index: usize, round: u64, should_abort: F) -> bool
    where
        F: Fn() -> bool,
    {
        if self.mode == DagLoadMode::Parallel {
            return true;
        }
        let mut rounds = self.lock();
        loop {
            let current = Self::round(&mut rounds, round);
            let waiting_on = (0..index).find(|i| !current.completed.contains(i));
            let Some(waiting_on) = waiting_on else {
                return true;
            };
            if should_abort() {
                return false;
            }
            debug!(target: LOG_TARGET,
                "Miner {} waiting for miner {} to load DAG (round {})",
                index, waiting_on, round
            );
            rounds = self
                .turn_cv
                .wait_timeout(rounds, TURN_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Marks miner `index` done loading in `round`, successful or not
    pub fn complete(&self, index: usize, round: u64) {
        self.mark(index, round);
        self.load_index.fetch_add(1, Ordering::SeqCst);
    }

    /// Marks miner `index` done in `round` without a load, because its device
    /// already holds the round's epoch
    pub fn skip(&self, index: usize, round: u64) {
        if self.mode == DagLoadMode::Sequential {
            self.mark(index, round);
        }
    }

    fn mark(&self, index: usize, round: u64) {
        let mut rounds = self.lock();
        Self::round(&mut rounds, round).completed.insert(index);
        self.turn_cv.notify_all();
    }
}
