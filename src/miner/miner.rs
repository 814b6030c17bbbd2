// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/miner.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements one miner: a dedicated worker thread bound to one
// device. The worker snapshots the farm's current work package, (re)loads the
// epoch dataset onto its device when the seed changes, and runs the blocking
// device search until the search hook tells it to stop. Candidates coming
// back from the device are verified independently before anything is
// submitted.
//
// Tree Location:
// - src/miner/miner.rs (per-device worker and result verification)
// - Depends on: log, anyhow

use crate::core::boundary::{is_below, upper64};
use crate::core::types::{H256, Solution, WorkPackage};
use crate::miner::backend::{DevicePlatform, SearchDevice};
use crate::miner::farm::FarmShared;
use crate::miner::hook::{HookOwner, SearchCallbacks, SearchHook};
use crate::miner::stats::DeviceStats;
use crate::utils::format::FormatUtils;
use anyhow::Result;
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const LOG_TARGET: &str = "ethash_farm::miner";
const IDLE_POLL: Duration = Duration::from_millis(100);
const RETRY_DELAY: Duration = Duration::from_secs(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    Working,
    Paused,
}

/// State shared between a miner's handle and its worker thread
pub(crate) struct MinerCore {
    index: usize,
    device_index: usize,
    farm: Arc<FarmShared>,
    /// Private copy of the package being searched
    work: Mutex<WorkPackage>,
    last_close_hit: Mutex<Instant>,
    throttle: AtomicU8,
    stats: Arc<DeviceStats>,
    /// Header of the last accepted solution; not searched again
    solved_header: Mutex<Option<H256>>,
    control: WorkerControl,
}

impl MinerCore {
    pub(crate) fn new(
        index: usize,
        device_index: usize,
        farm: Arc<FarmShared>,
        stats: Arc<DeviceStats>,
    ) -> Self {
        let throttle = farm.settings.throttle;
        Self {
            index,
            device_index,
            farm,
            work: Mutex::new(WorkPackage::default()),
            last_close_hit: Mutex::new(Instant::now()),
            throttle: AtomicU8::new(throttle),
            stats,
            solved_header: Mutex::new(None),
            control: WorkerControl::new(),
        }
    }

    pub(crate) fn work(&self) -> WorkPackage {
        lock(&self.work).clone()
    }

    pub(crate) fn set_work(&self, work: WorkPackage) {
        *lock(&self.work) = work;
    }

    fn is_solved(&self, header_hash: &H256) -> bool {
        lock(&self.solved_header).as_ref() == Some(header_hash)
    }

    fn record_close_hit(&self, hash: u64) {
        let elapsed = {
            let mut last = lock(&self.last_close_hit);
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };
        self.farm.report_close_hit(hash, elapsed, self.index);
    }
}

impl HookOwner for MinerCore {
    fn index(&self) -> usize {
        self.index
    }

    /// Recomputes the hash for `nonce` and classifies the candidate.
    ///
    /// Order: solution, then close hit, then hash fault.
    fn report(&self, nonce: u64) -> bool {
        let work = self.work();
        let result = self
            .farm
            .evaluator
            .eval(&work.seed_hash, &work.header_hash, nonce);

        if is_below(&result.value, &work.boundary) {
            info!(target: LOG_TARGET,
                "💎 Miner {} found solution: nonce = {:#018x}, header = {}",
                self.index,
                nonce,
                FormatUtils::short_hex(&work.header_hash)
            );
            *lock(&self.solved_header) = Some(work.header_hash);
            let delivered = self.farm.submit_proof(Solution {
                nonce,
                mix_hash: result.mix_hash,
                header_hash: work.header_hash,
                seed_hash: work.seed_hash,
                device_index: self.index,
                found_at: Instant::now(),
            });
            if !delivered {
                warn!(target: LOG_TARGET, "Solution from miner {} had no receiver", self.index);
            }
            return true;
        }

        let hash = upper64(&result.value);
        let close_hit = self.farm.settings.close_hit_threshold;
        if close_hit > 0 && hash < close_hit {
            self.record_close_hit(hash);
            return false;
        }

        error!(target: LOG_TARGET,
            "Hash fault : nonce = {:#x}, headerHash = {}, [device:{}]",
            nonce,
            FormatUtils::short_hex(&work.header_hash),
            self.index
        );
        self.farm.report_hash_fault(self.index);
        false
    }

    /// Farm shutdown, or this miner's worker being stopped
    fn stop_requested(&self) -> bool {
        self.farm.is_stopping() || !self.control.is_running()
    }

    fn record_progress(&self, count: u32, hash_sample: u64, best_hash: u64) {
        self.farm
            .stats
            .record_searched(self.index, count, hash_sample, best_hash);
    }

    fn check_hash(&self, hash: u64, nonce: u64, header_hash: &H256) {
        let work = self.work();
        if &work.header_hash != header_hash {
            trace!(target: LOG_TARGET, "Miner {} skipped stale hash check", self.index);
            return;
        }
        let expected = upper64(
            &self
                .farm
                .evaluator
                .eval(&work.seed_hash, header_hash, nonce)
                .value,
        );
        if expected != hash {
            error!(target: LOG_TARGET,
                "Hash fault : nonce = {:#x}, headerHash = {}, [device:{}] (device {:#018x}, host {:#018x})",
                nonce,
                FormatUtils::short_hex(header_hash),
                self.index,
                hash,
                expected
            );
            self.farm.report_hash_fault(self.index);
        }
    }
}

/// Run flag for the worker thread with an interruptible idle
struct WorkerControl {
    running: Mutex<bool>,
    wake: Condvar,
}

impl WorkerControl {
    fn new() -> Self {
        Self {
            running: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    fn start(&self) {
        *lock(&self.running) = true;
    }

    fn stop(&self) {
        *lock(&self.running) = false;
        self.wake.notify_all();
    }

    fn is_running(&self) -> bool {
        *lock(&self.running)
    }

    /// Sleeps up to `timeout` or until stopped
    fn idle(&self, timeout: Duration) {
        let running = lock(&self.running);
        if !*running {
            return;
        }
        let _ = self
            .wake
            .wait_timeout(running, timeout)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Device handle and the epoch loaded on it; survives pause/kick_off
#[derive(Default)]
struct DeviceSlot {
    device: Option<Box<dyn SearchDevice>>,
    seed_hash: Option<H256>,
    /// Last load round this miner took its turn in
    load_round: Option<u64>,
}

impl DeviceSlot {
    fn discard(&mut self) {
        self.device = None;
        self.seed_hash = None;
    }
}

struct Lifecycle {
    state: MinerState,
    worker: Option<JoinHandle<DeviceSlot>>,
    parked: Option<DeviceSlot>,
}

/// Confirms the abort when the worker exits, including by panic
struct AbortGuard(Arc<SearchHook<MinerCore>>);

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.0.confirm_aborted();
    }
}

/// One worker thread bound to one device
pub struct Miner {
    core: Arc<MinerCore>,
    hook: Arc<SearchHook<MinerCore>>,
    platform: Arc<dyn DevicePlatform>,
    lifecycle: Mutex<Lifecycle>,
}

impl Miner {
    pub(crate) fn new(
        index: usize,
        device_index: usize,
        farm: Arc<FarmShared>,
        platform: Arc<dyn DevicePlatform>,
        stats: Arc<DeviceStats>,
    ) -> Self {
        let core = Arc::new(MinerCore::new(index, device_index, farm, stats));
        let hook = Arc::new(SearchHook::new(core.clone()));
        Self {
            core,
            hook,
            platform,
            lifecycle: Mutex::new(Lifecycle {
                state: MinerState::Idle,
                worker: None,
                parked: Some(DeviceSlot::default()),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.core.index
    }

    pub fn device_index(&self) -> usize {
        self.core.device_index
    }

    pub fn state(&self) -> MinerState {
        lock(&self.lifecycle).state
    }

    /// The package this miner last picked up
    pub fn work(&self) -> WorkPackage {
        self.core.work()
    }

    pub fn stats(&self) -> Arc<DeviceStats> {
        self.core.stats.clone()
    }

    /// Starts the worker thread. No-op while already working.
    pub fn kick_off(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state == MinerState::Working {
            return;
        }

        // No search is in flight here, so the hook may be reset
        self.hook.reset();
        self.core.control.start();

        let slot = lifecycle.parked.take().unwrap_or_default();
        let core = self.core.clone();
        let hook = self.hook.clone();
        let platform = self.platform.clone();
        let spawned = thread::Builder::new()
            .name(format!("miner-{}", self.core.index))
            .spawn(move || Self::worker_loop(core, hook, platform, slot));

        match spawned {
            Ok(handle) => {
                debug!(target: LOG_TARGET, "Miner {} kicked off", self.core.index);
                lifecycle.worker = Some(handle);
                lifecycle.state = MinerState::Working;
            }
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to spawn miner {} thread: {}", self.core.index, e);
                self.core.control.stop();
                self.hook.confirm_aborted();
            }
        }
    }

    /// Aborts the running search and joins the worker thread
    pub fn pause(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state != MinerState::Working {
            return;
        }
        self.hook.abort();
        self.core.control.stop();
        if let Some(worker) = lifecycle.worker.take() {
            match worker.join() {
                Ok(slot) => lifecycle.parked = Some(slot),
                Err(_) => {
                    error!(target: LOG_TARGET, "Miner {} worker panicked", self.core.index);
                    lifecycle.parked = None;
                }
            }
        }
        lifecycle.state = MinerState::Paused;
        debug!(target: LOG_TARGET, "Miner {} paused", self.core.index);
    }

    /// Verifies `nonce` against the current package; true for a genuine solution
    pub fn report(&self, nonce: u64) -> bool {
        self.core.report(nonce)
    }

    pub fn check_hash(&self, hash: u64, nonce: u64, header_hash: &H256) {
        self.core.check_hash(hash, nonce, header_hash);
    }

    /// Takes effect at the next search, and only while the farm is mining
    pub fn set_throttle(&self, percent: u8) {
        if self.core.farm.is_mining() {
            self.core.throttle.store(percent.min(99), Ordering::Relaxed);
        }
    }

    pub fn throttle(&self) -> u8 {
        self.core.throttle.load(Ordering::Relaxed)
    }

    pub fn reset_best_hash(&self) {
        self.core.stats.reset_best_hash();
    }

    fn worker_loop(
        core: Arc<MinerCore>,
        hook: Arc<SearchHook<MinerCore>>,
        platform: Arc<dyn DevicePlatform>,
        mut slot: DeviceSlot,
    ) -> DeviceSlot {
        let _guard = AbortGuard(hook.clone());
        let control = &core.control;
        while control.is_running() {
            if hook.should_stop() {
                control.idle(IDLE_POLL);
                continue;
            }
            if let Err(e) = Self::work_iteration(&core, &hook, platform.as_ref(), &mut slot) {
                slot.discard();
                error!(target: LOG_TARGET, "Miner {} device failure: {:#}", core.index, e);
                core.stats.record_device_error();
                control.idle(RETRY_DELAY);
            }
        }
        slot
    }

    fn work_iteration(
        core: &MinerCore,
        hook: &Arc<SearchHook<MinerCore>>,
        platform: &dyn DevicePlatform,
        slot: &mut DeviceSlot,
    ) -> Result<()> {
        let published = core.farm.published();
        let work = &published.work;
        if work.is_empty() || core.is_solved(&work.header_hash) {
            core.control.idle(IDLE_POLL);
            return Ok(());
        }
        core.set_work(work.as_ref().clone());

        let round = published.load_round;
        if slot.device.is_none() || slot.seed_hash != Some(work.seed_hash) {
            if !Self::load_dataset(core, hook, platform, slot, &work.seed_hash, round)? {
                return Ok(());
            }
        } else if slot.load_round != Some(round) {
            // Already holds this epoch; let later miners go
            core.farm.sequencer.skip(core.index, round);
            slot.load_round = Some(round);
        }
        let Some(device) = slot.device.as_mut() else {
            return Ok(());
        };

        core.farm.set_is_mining(true);
        device.set_throttle(core.throttle.load(Ordering::Relaxed));
        let target = core
            .farm
            .settings
            .close_hit_threshold
            .max(work.upper_boundary());
        device.search(
            &work.header_hash,
            target,
            hook.as_ref(),
            work.is_partitioned(),
            work.start_nonce_for(core.index),
        )
    }

    /// Returns false when aborted while waiting for the load turn
    fn load_dataset(
        core: &MinerCore,
        hook: &Arc<SearchHook<MinerCore>>,
        platform: &dyn DevicePlatform,
        slot: &mut DeviceSlot,
        seed_hash: &H256,
        round: u64,
    ) -> Result<bool> {
        let sequencer = &core.farm.sequencer;
        if !sequencer.wait_turn(core.index, round, || hook.should_stop()) {
            return Ok(false);
        }

        info!(target: LOG_TARGET,
            "Initialising miner {} for {}",
            core.index,
            FormatUtils::short_hex(seed_hash)
        );
        slot.discard();
        let loaded = (|| -> Result<Box<dyn SearchDevice>> {
            let mut device = platform.open(core.device_index)?;
            let dataset = core.farm.datasets.full(seed_hash);
            device.init(dataset)?;
            Ok(device)
        })();
        // A failed load still ends this miner's turn
        sequencer.complete(core.index, round);
        slot.load_round = Some(round);

        slot.device = Some(loaded?);
        slot.seed_hash = Some(*seed_hash);
        core.stats.record_dag_load();
        Ok(true)
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        self.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::FarmSettings;
    use crate::core::ethash::PowEvaluator;
    use crate::core::types::PowResult;
    use crossbeam::channel::Receiver;
    use std::collections::HashMap;

    struct ScriptedEvaluator(HashMap<u64, H256>);

    impl PowEvaluator for ScriptedEvaluator {
        fn eval(&self, _seed_hash: &H256, _header_hash: &H256, nonce: u64) -> PowResult {
            PowResult {
                value: self.0.get(&nonce).copied().unwrap_or([0xFF; 32]),
                mix_hash: [nonce as u8; 32],
            }
        }
    }

    fn hash_with_prefix(prefix: &[u8]) -> H256 {
        let mut hash = [0u8; 32];
        hash[..prefix.len()].copy_from_slice(prefix);
        hash
    }

    fn core(close_hit: u64, values: &[(u64, H256)]) -> (MinerCore, Receiver<Solution>) {
        let settings = FarmSettings {
            close_hit_threshold: close_hit,
            ..FarmSettings::default()
        };
        let evaluator = Arc::new(ScriptedEvaluator(values.iter().copied().collect()));
        let (farm, solutions) = FarmShared::new(settings, Some(evaluator));
        let stats = farm.stats.configure_devices(1).remove(0);
        let core = MinerCore::new(0, 0, farm, stats);
        core.set_work(WorkPackage::new(
            [7u8; 32],
            [1u8; 32],
            hash_with_prefix(&[0x00, 0x00, 0xFF, 0xFF]),
        ));
        (core, solutions)
    }

    #[test]
    fn value_below_boundary_is_submitted() {
        let (core, solutions) = core(0, &[(42, hash_with_prefix(&[0x00, 0x00, 0xEE, 0xEE]))]);

        assert!(core.report(42));
        let solution = solutions.try_recv().unwrap();
        assert_eq!(solution.nonce, 42);
        assert_eq!(solution.mix_hash, [42u8; 32]);
        assert_eq!(solution.header_hash, [7u8; 32]);
        assert!(solutions.try_recv().is_err());
        assert_eq!(core.farm.stats.totals().solutions, 1);
        assert!(core.is_solved(&[7u8; 32]));
    }

    #[test]
    fn value_above_boundary_is_a_fault() {
        let (core, solutions) = core(0, &[(9, hash_with_prefix(&[0x00, 0xFF]))]);

        assert!(!core.report(9));
        assert!(solutions.try_recv().is_err());
        assert_eq!(core.farm.stats.totals().hash_faults, 1);
        assert_eq!(core.stats.hash_faults.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn near_miss_under_threshold_is_a_close_hit() {
        let (core, solutions) = core(
            0x0001_0000_0000_0000,
            &[(5, hash_with_prefix(&[0x00, 0x00, 0xFF, 0xFF, 0x01]))],
        );

        assert!(!core.report(5));
        assert!(solutions.try_recv().is_err());
        let totals = core.farm.stats.totals();
        assert_eq!(totals.close_hits, 1);
        assert_eq!(totals.hash_faults, 0);
    }

    #[test]
    fn check_hash_skips_stale_header_and_flags_mismatch() {
        let value = hash_with_prefix(&[0x12, 0x34]);
        let (core, _solutions) = core(0, &[(3, value)]);

        core.check_hash(0, 3, &[8u8; 32]);
        assert_eq!(core.farm.stats.totals().hash_faults, 0);

        core.check_hash(upper64(&value), 3, &[7u8; 32]);
        assert_eq!(core.farm.stats.totals().hash_faults, 0);

        core.check_hash(upper64(&value) + 1, 3, &[7u8; 32]);
        assert_eq!(core.farm.stats.totals().hash_faults, 1);
    }
}
