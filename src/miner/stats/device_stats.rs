// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/stats/device_stats.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements per-device statistics tracking for the Ethash farm,
// located in the stats subdirectory of the miner module. It monitors each
// miner's search progress, best hash, faults, close hits and solutions.
//
// Tree Location:
// - src/miner/stats/device_stats.rs (per-device statistics logic)
// - Depends on: std

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

pub struct DeviceStats {
    index: usize,
    pub hashes_computed: AtomicU64,
    pub solutions: AtomicU64,
    pub hash_faults: AtomicU64,
    pub close_hits: AtomicU64,
    pub dag_loads: AtomicU64,
    pub device_errors: AtomicU64,
    /// Upper 64 bits of the last sampled hash
    pub current_hash: AtomicU64,
    /// Lowest upper-64 hash seen since the last reset
    pub best_hash: AtomicU64,
    start_time: Mutex<Instant>,
    current_hashrate: Mutex<f64>,
    pub peak_hashrate: AtomicU64,
}

impl DeviceStats {
    /// Create a new DeviceStats instance for a specific miner
    pub fn new(index: usize) -> Self {
        Self {
            index,
            hashes_computed: AtomicU64::new(0),
            solutions: AtomicU64::new(0),
            hash_faults: AtomicU64::new(0),
            close_hits: AtomicU64::new(0),
            dag_loads: AtomicU64::new(0),
            device_errors: AtomicU64::new(0),
            current_hash: AtomicU64::new(u64::MAX),
            best_hash: AtomicU64::new(u64::MAX),
            start_time: Mutex::new(Instant::now()),
            current_hashrate: Mutex::new(0.0),
            peak_hashrate: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Record a searched batch and refresh the hashrate
    pub fn record_searched(&self, count: u32, hash_sample: u64, best_hash: u64) {
        self.hashes_computed.fetch_add(count as u64, Ordering::Relaxed);
        self.current_hash.store(hash_sample, Ordering::Relaxed);
        self.best_hash.fetch_min(best_hash, Ordering::Relaxed);

        let elapsed = self
            .start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
            .as_secs_f64();
        if elapsed > 0.0 {
            let total_hashes = self.hashes_computed.load(Ordering::Relaxed);
            let current_rate = total_hashes as f64 / elapsed;
            *self
                .current_hashrate
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = current_rate;
            self.peak_hashrate
                .fetch_max(current_rate as u64, Ordering::Relaxed);
        }
    }

    pub fn record_solution(&self) {
        self.solutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hash_fault(&self) {
        self.hash_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close_hit(&self) {
        self.close_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dag_load(&self) {
        self.dag_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_error(&self) {
        self.device_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current hashrate
    pub fn get_hashrate(&self) -> f64 {
        *self
            .current_hashrate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the peak hashrate achieved
    pub fn get_peak_hashrate(&self) -> f64 {
        self.peak_hashrate.load(Ordering::Relaxed) as f64
    }

    pub fn best_hash(&self) -> u64 {
        self.best_hash.load(Ordering::Relaxed)
    }

    pub fn reset_best_hash(&self) {
        self.best_hash.store(u64::MAX, Ordering::Relaxed);
    }

    /// Zero every counter and restart the hashrate window
    pub fn reset(&self) {
        for counter in [
            &self.hashes_computed,
            &self.solutions,
            &self.hash_faults,
            &self.close_hits,
            &self.dag_loads,
            &self.device_errors,
            &self.peak_hashrate,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.reset_best_hash();
        *self.start_time.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        *self
            .current_hashrate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = 0.0;
    }

    /// Get a string of solution and fault indicators (dots)
    pub fn get_result_dots(&self) -> String {
        let solutions = self.solutions.load(Ordering::Relaxed);
        let faults = self.hash_faults.load(Ordering::Relaxed);

        let mut dots = String::new();
        for _ in 0..solutions.min(5) {
            dots.push('●');
        }
        for _ in 0..faults.min(5) {
            dots.push('✗');
        }
        dots
    }
}


// Changelog:
// - v1.1.0 (2026-10-12): Per-device farm statistics.
//   - Replaced share counters with solution, fault, close-hit and DAG load counters.
//   - Added current/best hash tracking fed by the search hook.
// - v1.0.1 (2025-06-14): Added peak hashrate tracking for benchmarking.
// - v1.0.0 (2025-06-14): Extracted from monolithic main.rs.
