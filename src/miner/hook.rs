// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/hook.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the per-miner search hook, located in the miner
// subdirectory. The hook bridges a device's blocking search call and the
// farm: the device polls it from inside its search loop, and the controller
// uses it to request an abort and wait until the device thread confirms
// that the search has stopped.
//
// Tree Location:
// - src/miner/hook.rs (search cancellation protocol)
// - Depends on: std, log

use crate::core::types::H256;
use log::trace;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

const LOG_TARGET: &str = "ethash_farm::hook";

/// Callbacks a device invokes from inside its search loop
pub trait SearchCallbacks: Send + Sync {
    /// Candidate nonces found; returns true when the search must stop
    fn found(&self, nonces: &[u64]) -> bool;

    /// Progress report after a batch; returns true when the search must stop
    fn searched(&self, count: u32, hash_sample: u64, best_hash: u64) -> bool;

    /// The single authoritative stop decision
    fn should_stop(&self) -> bool;

    /// Mid-search cross-check of a sampled device hash (upper 64 bits)
    fn check_hash(&self, hash: u64, nonce: u64, header_hash: &H256);
}

/// The miner side of a hook
pub trait HookOwner: Send + Sync {
    fn index(&self) -> usize;

    /// Verifies a candidate; true when it was a genuine, submitted solution
    fn report(&self, nonce: u64) -> bool;

    /// Farm-wide stop signal (shutdown)
    fn stop_requested(&self) -> bool;

    fn record_progress(&self, count: u32, hash_sample: u64, best_hash: u64);

    fn check_hash(&self, hash: u64, nonce: u64, header_hash: &H256);
}

#[derive(Debug)]
struct HookFlags {
    abort_requested: bool,
    aborted: bool,
}

/// Cancellation protocol between the controller and one device search
pub struct SearchHook<O: ?Sized + HookOwner> {
    flags: Mutex<HookFlags>,
    aborted_cv: Condvar,
    owner: Arc<O>,
}

impl<O: ?Sized + HookOwner> SearchHook<O> {
    /// A fresh hook counts as aborted: no search is in flight
    pub fn new(owner: Arc<O>) -> Self {
        Self {
            flags: Mutex::new(HookFlags {
                abort_requested: false,
                aborted: true,
            }),
            aborted_cv: Condvar::new(),
            owner,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HookFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests an abort and blocks until the device thread confirms it.
    pub fn abort(&self) {
        let mut flags = self.lock();
        if flags.aborted {
            return;
        }
        trace!(target: LOG_TARGET, "Attempting to abort miner {}", self.owner.index());
        flags.abort_requested = true;
        while !flags.aborted {
            flags = self
                .aborted_cv
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
        trace!(target: LOG_TARGET, "Abort confirmed for miner {}", self.owner.index());
    }

    /// Clears both flags. Only valid while no search is in flight.
    pub fn reset(&self) {
        let mut flags = self.lock();
        flags.abort_requested = false;
        flags.aborted = false;
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    pub fn is_abort_requested(&self) -> bool {
        self.lock().abort_requested
    }

    /// Marks the search as stopped and wakes every waiting abort()
    pub fn confirm_aborted(&self) {
        let mut flags = self.lock();
        flags.aborted = true;
        self.aborted_cv.notify_all();
    }
}

impl<O: ?Sized + HookOwner> SearchCallbacks for SearchHook<O> {
    fn found(&self, nonces: &[u64]) -> bool {
        for &nonce in nonces {
            trace!(target: LOG_TARGET, "Miner {} found nonce {:#018x}", self.owner.index(), nonce);
            if self.owner.report(nonce) {
                self.confirm_aborted();
                return true;
            }
        }
        self.should_stop()
    }

    fn searched(&self, count: u32, hash_sample: u64, best_hash: u64) -> bool {
        self.owner.record_progress(count, hash_sample, best_hash);
        self.should_stop()
    }

    fn should_stop(&self) -> bool {
        let farm_stopping = self.owner.stop_requested();
        let mut flags = self.lock();
        if flags.abort_requested || farm_stopping {
            flags.aborted = true;
            self.aborted_cv.notify_all();
            return true;
        }
        false
    }

    fn check_hash(&self, hash: u64, nonce: u64, header_hash: &H256) {
        self.owner.check_hash(hash, nonce, header_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct TestOwner {
        accept: AtomicBool,
        stopping: AtomicBool,
        reports: AtomicU64,
        progress: AtomicU64,
    }

    impl HookOwner for TestOwner {
        fn index(&self) -> usize {
            0
        }
        fn report(&self, _nonce: u64) -> bool {
            self.reports.fetch_add(1, Ordering::SeqCst);
            self.accept.load(Ordering::SeqCst)
        }
        fn stop_requested(&self) -> bool {
            self.stopping.load(Ordering::SeqCst)
        }
        fn record_progress(&self, count: u32, _hash_sample: u64, _best_hash: u64) {
            self.progress.fetch_add(count as u64, Ordering::SeqCst);
        }
        fn check_hash(&self, _hash: u64, _nonce: u64, _header_hash: &H256) {}
    }

    fn hook() -> (Arc<TestOwner>, Arc<SearchHook<TestOwner>>) {
        let owner = Arc::new(TestOwner::default());
        let hook = Arc::new(SearchHook::new(owner.clone()));
        (owner, hook)
    }

    #[test]
    fn abort_on_idle_hook_returns_immediately() {
        let (_, hook) = hook();
        hook.abort();
        assert!(hook.is_aborted());
        assert!(!hook.is_abort_requested());
    }

    #[test]
    fn abort_waits_for_device_confirmation() {
        let (_, hook) = hook();
        hook.reset();

        let device = {
            let hook = hook.clone();
            thread::spawn(move || {
                while !hook.searched(1, 0, u64::MAX) {
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        hook.abort();
        assert!(hook.is_aborted());
        device.join().unwrap();
    }

    #[test]
    fn concurrent_aborts_both_wait() {
        let (_, hook) = hook();
        hook.reset();

        let aborters: Vec<_> = (0..2)
            .map(|_| {
                let hook = hook.clone();
                thread::spawn(move || {
                    hook.abort();
                    hook.is_aborted()
                })
            })
            .collect();

        // Confirm from the "device" side once an abort is pending
        while !hook.should_stop() {
            thread::sleep(Duration::from_millis(1));
        }
        for aborter in aborters {
            assert!(aborter.join().unwrap());
        }
    }

    #[test]
    fn reset_clears_stale_abort_request() {
        let (_, hook) = hook();
        hook.reset();
        let confirmer = {
            let hook = hook.clone();
            thread::spawn(move || while !hook.should_stop() {})
        };
        hook.abort();
        confirmer.join().unwrap();

        hook.reset();
        assert!(!hook.should_stop());
        assert!(!hook.searched(8, 1, 1));
        assert!(!hook.is_aborted());
    }

    #[test]
    fn accepted_solution_confirms_and_stops() {
        let (owner, hook) = hook();
        hook.reset();
        owner.accept.store(true, Ordering::SeqCst);
        assert!(hook.found(&[1, 2, 3]));
        assert!(hook.is_aborted());
        // Stops at the first accepted nonce
        assert_eq!(owner.reports.load(Ordering::SeqCst), 1);
        hook.abort();
    }

    #[test]
    fn rejected_candidates_defer_to_should_stop() {
        let (owner, hook) = hook();
        hook.reset();
        assert!(!hook.found(&[1, 2]));
        assert_eq!(owner.reports.load(Ordering::SeqCst), 2);
        assert!(!hook.is_aborted());

        owner.stopping.store(true, Ordering::SeqCst);
        assert!(hook.found(&[3]));
        assert!(hook.is_aborted());
    }

    #[test]
    fn searched_forwards_progress() {
        let (owner, hook) = hook();
        hook.reset();
        assert!(!hook.searched(64, 10, 5));
        assert_eq!(owner.progress.load(Ordering::SeqCst), 64);
    }
}

// Changelog:
// - v1.0.0 (2026-10-12): Search hook with confirmed cancellation.
//   - Mutex + Condvar over the abort-requested / aborted pair.
//   - found/searched defer the stop decision to should_stop.
