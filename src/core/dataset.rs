// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/dataset.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the process-wide epoch dataset cache, located in the
// core subdirectory. Each epoch's light cache and full dataset are built at
// most once; concurrent requesters for the same epoch wait on the build in
// progress and then share the same Arc handle. Only the most recently used
// epochs are retained.

use crate::core::ethash::{DatasetParams, FullDataset, LightDataset, PowEvaluator};
use crate::core::types::{H256, PowResult};
use crate::utils::format::FormatUtils;
use log::{debug, info};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

const LOG_TARGET: &str = "ethash_farm::dataset";

type Slot<T> = Arc<OnceLock<Arc<T>>>;

/// Most recently used epoch slots
struct EpochSlots<T> {
    slots: VecDeque<(H256, Slot<T>)>,
    retention: usize,
}

impl<T> EpochSlots<T> {
    fn new(retention: usize) -> Self {
        Self {
            slots: VecDeque::with_capacity(retention + 1),
            retention: retention.max(1),
        }
    }

    fn slot(&mut self, seed_hash: &H256) -> Slot<T> {
        if let Some(pos) = self.slots.iter().position(|(seed, _)| seed == seed_hash) {
            if let Some(entry) = self.slots.remove(pos) {
                let slot = entry.1.clone();
                self.slots.push_back(entry);
                return slot;
            }
        }
        let slot: Slot<T> = Arc::new(OnceLock::new());
        self.slots.push_back((*seed_hash, slot.clone()));
        while self.slots.len() > self.retention {
            if let Some((seed, _)) = self.slots.pop_front() {
                debug!(target: LOG_TARGET, "Evicting epoch {} from cache", FormatUtils::short_hex(&seed));
            }
        }
        slot
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Epoch dataset provider shared by every miner
pub struct DatasetCache {
    params: DatasetParams,
    lights: Mutex<EpochSlots<LightDataset>>,
    fulls: Mutex<EpochSlots<FullDataset>>,
    light_builds: AtomicU64,
    full_builds: AtomicU64,
}

impl DatasetCache {
    pub fn new(params: DatasetParams, retention: usize) -> Self {
        Self {
            params,
            lights: Mutex::new(EpochSlots::new(retention)),
            fulls: Mutex::new(EpochSlots::new(retention)),
            light_builds: AtomicU64::new(0),
            full_builds: AtomicU64::new(0),
        }
    }

    pub fn params(&self) -> DatasetParams {
        self.params
    }

    /// Light cache for an epoch, built on first request
    pub fn light(&self, seed_hash: &H256) -> Arc<LightDataset> {
        // The slot lock is released before building so other epochs are not blocked
        let slot = self
            .lights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slot(seed_hash);
        slot.get_or_init(|| {
            let started = Instant::now();
            let light = LightDataset::build(seed_hash, self.params);
            self.light_builds.fetch_add(1, Ordering::Relaxed);
            debug!(target: LOG_TARGET,
                "Built light cache for {} ({}) in {:.2}s",
                FormatUtils::short_hex(seed_hash),
                FormatUtils::format_bytes(light.size_bytes() as u64),
                started.elapsed().as_secs_f64()
            );
            Arc::new(light)
        })
        .clone()
    }

    /// Full dataset for an epoch, built from the light cache on first request
    pub fn full(&self, seed_hash: &H256) -> Arc<FullDataset> {
        let slot = self
            .fulls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slot(seed_hash);
        slot.get_or_init(|| {
            let light = self.light(seed_hash);
            info!(target: LOG_TARGET,
                "🧱 Generating DAG for {} ({} items)",
                FormatUtils::short_hex(seed_hash),
                light.full_items()
            );
            let started = Instant::now();
            let full = FullDataset::build(&light);
            self.full_builds.fetch_add(1, Ordering::Relaxed);
            info!(target: LOG_TARGET,
                "✅ DAG for {} ready: {} in {:.2}s",
                FormatUtils::short_hex(seed_hash),
                FormatUtils::format_bytes(full.size_bytes() as u64),
                started.elapsed().as_secs_f64()
            );
            Arc::new(full)
        })
        .clone()
    }

    /// Number of light caches built since creation
    pub fn light_builds(&self) -> u64 {
        self.light_builds.load(Ordering::Relaxed)
    }

    /// Number of full datasets built since creation
    pub fn full_builds(&self) -> u64 {
        self.full_builds.load(Ordering::Relaxed)
    }

    /// Epochs currently held (light, full)
    pub fn cached_epochs(&self) -> (usize, usize) {
        let lights = self.lights.lock().unwrap_or_else(PoisonError::into_inner).len();
        let fulls = self.fulls.lock().unwrap_or_else(PoisonError::into_inner).len();
        (lights, fulls)
    }
}

impl PowEvaluator for DatasetCache {
    /// Verification always goes through the light path
    fn eval(&self, seed_hash: &H256, header_hash: &H256, nonce: u64) -> PowResult {
        self.light(seed_hash).eval(header_hash, nonce)
    }
}
