// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/farm.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the farm, located in the miner subdirectory. The farm
// owns one miner per usable device, publishes work packages to them, and
// aggregates what they report: solutions go out over a channel, hash faults
// and close hits are counted per device.
//
// Tree Location:
// - src/miner/farm.rs (farm controller surface)
// - Depends on: arc-swap, crossbeam, log

use crate::core::config::FarmSettings;
use crate::core::dataset::DatasetCache;
use crate::core::ethash::{PowEvaluator, epoch_tag, seed_hash};
use crate::core::types::{H256, Solution, WorkPackage};
use crate::miner::backend::{DeviceDescriptor, DevicePlatform};
use crate::miner::dag_file::DagFileManager;
use crate::miner::error::FarmError;
use crate::miner::miner::Miner;
use crate::miner::sequencer::DagLoadSequencer;
use crate::miner::stats::FarmStats;
use crate::utils::format::FormatUtils;
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const LOG_TARGET: &str = "ethash_farm::farm";

/// The current package and the dataset load round it belongs to
pub(crate) struct PublishedWork {
    pub(crate) work: Arc<WorkPackage>,
    /// Bumped whenever a non-empty package changes epoch
    pub(crate) load_round: u64,
    round_seed: Option<H256>,
}

impl Default for PublishedWork {
    fn default() -> Self {
        Self {
            work: Arc::new(WorkPackage::default()),
            load_round: 0,
            round_seed: None,
        }
    }
}

/// State every miner holds a handle to
pub(crate) struct FarmShared {
    work: ArcSwap<PublishedWork>,
    is_mining: AtomicBool,
    stopping: AtomicBool,
    pub(crate) settings: FarmSettings,
    pub(crate) datasets: Arc<DatasetCache>,
    /// Independent hash used to verify device results
    pub(crate) evaluator: Arc<dyn PowEvaluator>,
    pub(crate) sequencer: DagLoadSequencer,
    pub(crate) stats: FarmStats,
    solution_tx: Sender<Solution>,
}

impl FarmShared {
    /// Verification defaults to the light path of the farm's dataset cache
    pub(crate) fn new(
        settings: FarmSettings,
        evaluator: Option<Arc<dyn PowEvaluator>>,
    ) -> (Arc<Self>, Receiver<Solution>) {
        let datasets = Arc::new(DatasetCache::new(
            settings.dataset_params(),
            settings.dataset_retention,
        ));
        let evaluator = evaluator.unwrap_or_else(|| datasets.clone() as Arc<dyn PowEvaluator>);
        let (solution_tx, solution_rx) = unbounded();
        let shared = Arc::new(Self {
            work: ArcSwap::from_pointee(PublishedWork::default()),
            is_mining: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            sequencer: DagLoadSequencer::new(settings.dag_load_mode),
            settings,
            datasets,
            evaluator,
            stats: FarmStats::new(),
            solution_tx,
        });
        (shared, solution_rx)
    }

    pub(crate) fn get_work(&self) -> Arc<WorkPackage> {
        self.work.load().work.clone()
    }

    pub(crate) fn published(&self) -> Arc<PublishedWork> {
        self.work.load_full()
    }

    /// Swaps in `work`, opening a new load round on an epoch change.
    /// Callers serialize publication; returns the previous state.
    fn publish(&self, work: WorkPackage) -> Arc<PublishedWork> {
        let previous = self.work.load_full();
        let mut next = PublishedWork {
            work: Arc::new(work),
            load_round: previous.load_round,
            round_seed: previous.round_seed,
        };
        if !next.work.is_empty() && next.round_seed != Some(next.work.seed_hash) {
            next.load_round += 1;
            next.round_seed = Some(next.work.seed_hash);
        }
        self.work.swap(Arc::new(next))
    }

    /// True when the solution reached a receiver
    pub(crate) fn submit_proof(&self, solution: Solution) -> bool {
        self.stats.record_solution(solution.device_index, solution.nonce);
        self.solution_tx.send(solution).is_ok()
    }

    pub(crate) fn report_hash_fault(&self, device_index: usize) {
        self.stats.record_hash_fault(device_index);
    }

    pub(crate) fn report_close_hit(&self, hash: u64, elapsed_secs: f64, device_index: usize) {
        info!(target: LOG_TARGET,
            "Close hit {:#018x} on device {} after {:.1}s",
            hash, device_index, elapsed_secs
        );
        self.stats.record_close_hit(device_index, hash, elapsed_secs);
    }

    pub(crate) fn set_is_mining(&self, mining: bool) {
        self.is_mining.store(mining, Ordering::SeqCst);
    }

    pub(crate) fn is_mining(&self) -> bool {
        self.is_mining.load(Ordering::SeqCst)
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Mining farm over one device platform
pub struct Farm {
    shared: Arc<FarmShared>,
    platform: Arc<dyn DevicePlatform>,
    miners: Vec<Miner>,
    /// Serializes start, stop and work restarts
    lifecycle: Mutex<()>,
    solutions: Receiver<Solution>,
    started: AtomicBool,
}

impl Farm {
    pub fn new(settings: FarmSettings, platform: Arc<dyn DevicePlatform>) -> Self {
        Self::build(settings, platform, None)
    }

    /// Farm that verifies candidates with `evaluator` instead of the dataset cache
    pub fn with_evaluator(
        settings: FarmSettings,
        platform: Arc<dyn DevicePlatform>,
        evaluator: Arc<dyn PowEvaluator>,
    ) -> Self {
        Self::build(settings, platform, Some(evaluator))
    }

    fn build(
        settings: FarmSettings,
        platform: Arc<dyn DevicePlatform>,
        evaluator: Option<Arc<dyn PowEvaluator>>,
    ) -> Self {
        let (shared, solutions) = FarmShared::new(settings, evaluator);
        Self {
            shared,
            platform,
            miners: Vec::new(),
            lifecycle: Mutex::new(()),
            solutions,
            started: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &FarmSettings {
        &self.shared.settings
    }

    pub fn datasets(&self) -> &Arc<DatasetCache> {
        &self.shared.datasets
    }

    /// Receiver for verified solutions
    pub fn solutions(&self) -> Receiver<Solution> {
        self.solutions.clone()
    }

    /// Validates the requested devices and creates one miner per usable device.
    ///
    /// Returns false, after logging why, when no miner could be created.
    pub fn configure(&mut self) -> bool {
        match self.try_configure() {
            Ok(count) => {
                info!(target: LOG_TARGET, "Configured {} miner(s) on {}", count, self.platform.name());
                true
            }
            Err(e) => {
                error!(target: LOG_TARGET, "{}", e);
                false
            }
        }
    }

    pub fn try_configure(&mut self) -> Result<usize, FarmError> {
        self.stop();
        self.miners.clear();

        let devices = self.select_devices()?;
        let stats = self.shared.stats.configure_devices(devices.len());
        self.miners = devices
            .iter()
            .zip(stats)
            .enumerate()
            .map(|(index, (&device_index, stats))| {
                Miner::new(
                    index,
                    device_index,
                    self.shared.clone(),
                    self.platform.clone(),
                    stats,
                )
            })
            .collect();
        Ok(self.miners.len())
    }

    fn select_devices(&self) -> Result<Vec<usize>, FarmError> {
        let available = self.platform.list_devices();
        if available.is_empty() {
            return Err(FarmError::NoDevices {
                platform: self.platform.name().to_string(),
            });
        }

        let requested: Vec<usize> = if self.shared.settings.devices.is_empty() {
            (0..available.len()).collect()
        } else {
            let mut requested = Vec::new();
            for &index in &self.shared.settings.devices {
                if !requested.contains(&index) {
                    requested.push(index);
                }
            }
            requested
        };

        if let Some(&index) = requested.iter().find(|&&index| index >= available.len()) {
            return Err(FarmError::InvalidDeviceIndex {
                index,
                available: available.len(),
            });
        }

        let required = self.shared.settings.required_device_memory();
        let usable: Vec<usize> = requested
            .into_iter()
            .filter(|&index| {
                let device = &available[index];
                if device.memory_bytes < required {
                    warn!(target: LOG_TARGET,
                        "Skipping {}: {} available, {} required",
                        device.info_string(),
                        FormatUtils::format_bytes(device.memory_bytes),
                        FormatUtils::format_bytes(required)
                    );
                    return false;
                }
                info!(target: LOG_TARGET, "Using {}", device.info_string());
                true
            })
            .collect();

        if usable.is_empty() {
            return Err(FarmError::InsufficientMemory { required });
        }
        Ok(usable)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kicks off every miner. Miners idle until a package is published.
    pub fn start(&self) -> Result<(), FarmError> {
        let _lifecycle = self.lock_lifecycle();
        if self.miners.is_empty() {
            return Err(FarmError::NotConfigured);
        }
        self.shared.stopping.store(false, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        for miner in &self.miners {
            miner.kick_off();
        }
        info!(target: LOG_TARGET, "⛏️ Farm started with {} miner(s)", self.miners.len());
        Ok(())
    }

    /// Signals shutdown, pauses every miner and clears the mining flag
    pub fn stop(&self) {
        let _lifecycle = self.lock_lifecycle();
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.stopping.store(true, Ordering::SeqCst);
        for miner in &self.miners {
            miner.pause();
        }
        self.shared.set_is_mining(false);
        info!(target: LOG_TARGET, "Farm stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Publishes `work` and restarts every miner on it
    pub fn set_work(&self, work: WorkPackage) {
        let _lifecycle = self.lock_lifecycle();
        let empty = work.is_empty();
        let previous = self.shared.publish(work);
        let published = self.shared.published();
        let current = &published.work;
        if published.load_round != previous.load_round {
            info!(target: LOG_TARGET,
                "New epoch {} (was {}), DAG load round {}",
                FormatUtils::short_hex(&current.seed_hash),
                FormatUtils::short_hex(&previous.work.seed_hash),
                published.load_round
            );
        }
        debug!(target: LOG_TARGET,
            "New work {} boundary {}",
            FormatUtils::short_hex(&current.header_hash),
            FormatUtils::short_hex(&current.boundary)
        );

        if !self.is_started() {
            return;
        }
        for miner in &self.miners {
            miner.pause();
            if !empty {
                miner.kick_off();
            }
        }
        if empty {
            self.shared.set_is_mining(false);
        }
    }

    pub fn get_work(&self) -> Arc<WorkPackage> {
        self.shared.get_work()
    }

    pub fn set_throttle(&self, percent: u8) {
        for miner in &self.miners {
            miner.set_throttle(percent);
        }
    }

    pub fn reset_stats(&self) {
        self.shared.stats.reset();
        for miner in &self.miners {
            miner.reset_best_hash();
        }
    }

    pub fn stats(&self) -> &FarmStats {
        &self.shared.stats
    }

    pub fn miners(&self) -> &[Miner] {
        &self.miners
    }

    pub fn submit_proof(&self, solution: Solution) -> bool {
        self.shared.submit_proof(solution)
    }

    pub fn report_hash_fault(&self, device_index: usize) {
        self.shared.report_hash_fault(device_index);
    }

    pub fn report_close_hit(&self, hash: u64, elapsed_secs: f64, device_index: usize) {
        self.shared.report_close_hit(hash, elapsed_secs, device_index);
    }

    pub fn set_is_mining(&self, mining: bool) {
        self.shared.set_is_mining(mining);
    }

    pub fn is_mining(&self) -> bool {
        self.shared.is_mining()
    }

    /// Total dataset loads completed across miners
    pub fn dag_load_index(&self) -> u64 {
        self.shared.sequencer.load_index()
    }

    pub fn num_devices(&self) -> usize {
        self.platform.num_devices()
    }

    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.platform.list_devices()
    }

    pub fn platform_info(&self) -> String {
        self.platform.platform_info()
    }

    /// Builds the dataset for `block`, loads it onto a fresh device handle and
    /// writes it to `dir`. Independent of any running search.
    pub fn export_dag(&self, block: u64, dir: impl AsRef<Path>) -> Result<PathBuf, FarmError> {
        let store = DagFileManager::new(dir.as_ref())?;
        let seed = seed_hash(block);
        let tag = epoch_tag(&seed);
        let index = self.miners.first().map(Miner::device_index).unwrap_or(0);

        info!(target: LOG_TARGET, "📦 Exporting DAG {} for block {}", tag, block);
        let dataset = self.shared.datasets.full(&seed);
        let mut device = self
            .platform
            .open(index)
            .map_err(|source| FarmError::Device { index, source })?;
        device
            .init(dataset)
            .map_err(|source| FarmError::Device { index, source })?;
        let path = device
            .export_dag(&tag, &store)
            .map_err(|source| FarmError::Device { index, source })?;
        info!(target: LOG_TARGET, "DAG {} written to {}", tag, path.display());
        Ok(path)
    }
}

impl Drop for Farm {
    fn drop(&mut self) {
        self.stop();
    }
}
