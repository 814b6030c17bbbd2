// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/stats/farm_stats.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements farm-wide statistics tracking, located in the stats
// subdirectory of the miner module. Counters are updated concurrently by
// every miner thread and read or reset by the controller.
//
// Tree Location:
// - src/miner/stats/farm_stats.rs (farm-wide statistics logic)
// - Depends on: std, device_stats

use super::device_stats::DeviceStats;
use crate::utils::format::FormatUtils;
use log::{info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const LOG_TARGET: &str = "ethash_farm::stats";
const ACTIVITY_CAPACITY: usize = 50;
const CLOSE_HIT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct CloseHitInfo {
    pub time: Instant,
    pub device_index: usize,
    /// Upper 64 bits of the near-miss hash
    pub hash: u64,
    /// Seconds since the miner's previous close hit
    pub elapsed_secs: f64,
}

/// Counter snapshot handed to the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FarmTotals {
    pub solutions: u64,
    pub hash_faults: u64,
    pub close_hits: u64,
    pub hashes_computed: u64,
}

pub struct FarmStats {
    pub solutions: AtomicU64,
    pub hash_faults: AtomicU64,
    pub close_hits: AtomicU64,
    pub hashes_computed: AtomicU64,
    start_time: Mutex<Instant>,
    devices: Mutex<Vec<Arc<DeviceStats>>>,
    recent_activity: Mutex<VecDeque<(Instant, String)>>,
    recent_close_hits: Mutex<VecDeque<CloseHitInfo>>,
}

impl Default for FarmStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FarmStats {
    pub fn new() -> Self {
        Self {
            solutions: AtomicU64::new(0),
            hash_faults: AtomicU64::new(0),
            close_hits: AtomicU64::new(0),
            hashes_computed: AtomicU64::new(0),
            start_time: Mutex::new(Instant::now()),
            devices: Mutex::new(Vec::new()),
            recent_activity: Mutex::new(VecDeque::with_capacity(ACTIVITY_CAPACITY)),
            recent_close_hits: Mutex::new(VecDeque::with_capacity(CLOSE_HIT_CAPACITY)),
        }
    }

    /// Replaces the per-device stats with `count` fresh entries, one per miner
    pub fn configure_devices(&self, count: usize) -> Vec<Arc<DeviceStats>> {
        let fresh: Vec<_> = (0..count).map(|index| Arc::new(DeviceStats::new(index))).collect();
        *self.devices.lock().unwrap_or_else(PoisonError::into_inner) = fresh.clone();
        fresh
    }

    pub fn device(&self, index: usize) -> Option<Arc<DeviceStats>> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Runs `update` on a configured device; unknown indices only count farm-wide
    fn with_device<F: FnOnce(&DeviceStats)>(&self, index: usize, update: F) {
        match self.device(index) {
            Some(device) => update(&device),
            None => warn!(target: LOG_TARGET, "Report for unknown device {}", index),
        }
    }

    pub fn devices(&self) -> Vec<Arc<DeviceStats>> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn add_activity(&self, message: String) {
        let mut activity = self
            .recent_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        activity.push_back((Instant::now(), message));
        if activity.len() > ACTIVITY_CAPACITY {
            activity.pop_front();
        }
    }

    pub fn recent_activity(&self) -> Vec<(Instant, String)> {
        self.recent_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn record_searched(&self, index: usize, count: u32, hash_sample: u64, best_hash: u64) {
        self.hashes_computed.fetch_add(count as u64, Ordering::Relaxed);
        self.with_device(index, |d| d.record_searched(count, hash_sample, best_hash));
    }

    pub fn record_solution(&self, index: usize, nonce: u64) {
        self.solutions.fetch_add(1, Ordering::Relaxed);
        self.with_device(index, DeviceStats::record_solution);
        self.add_activity(format!("Solution {:#018x} on device {}", nonce, index));
    }

    pub fn record_hash_fault(&self, index: usize) {
        self.hash_faults.fetch_add(1, Ordering::Relaxed);
        self.with_device(index, DeviceStats::record_hash_fault);
        self.add_activity(format!("Hash fault on device {}", index));
    }

    pub fn record_close_hit(&self, index: usize, hash: u64, elapsed_secs: f64) {
        self.close_hits.fetch_add(1, Ordering::Relaxed);
        self.with_device(index, DeviceStats::record_close_hit);
        let mut hits = self
            .recent_close_hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        hits.push_back(CloseHitInfo {
            time: Instant::now(),
            device_index: index,
            hash,
            elapsed_secs,
        });
        if hits.len() > CLOSE_HIT_CAPACITY {
            hits.pop_front();
        }
    }

    pub fn recent_close_hits(&self) -> Vec<CloseHitInfo> {
        self.recent_close_hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub fn totals(&self) -> FarmTotals {
        FarmTotals {
            solutions: self.solutions.load(Ordering::Relaxed),
            hash_faults: self.hash_faults.load(Ordering::Relaxed),
            close_hits: self.close_hits.load(Ordering::Relaxed),
            hashes_computed: self.hashes_computed.load(Ordering::Relaxed),
        }
    }

    /// Returns the totals and zeroes the farm-level counters
    pub fn take_totals(&self) -> FarmTotals {
        FarmTotals {
            solutions: self.solutions.swap(0, Ordering::Relaxed),
            hash_faults: self.hash_faults.swap(0, Ordering::Relaxed),
            close_hits: self.close_hits.swap(0, Ordering::Relaxed),
            hashes_computed: self.hashes_computed.swap(0, Ordering::Relaxed),
        }
    }

    /// Zero every farm and device counter
    pub fn reset(&self) {
        self.take_totals();
        for device in self.devices() {
            device.reset();
        }
        self.recent_close_hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.start_time.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn session_time(&self) -> Duration {
        self.start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn get_total_hashrate(&self) -> f64 {
        let total_hashes = self.hashes_computed.load(Ordering::Relaxed);
        let elapsed = self.session_time().as_secs_f64();
        if elapsed > 0.0 {
            total_hashes as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Throughput implied by close hits: each hit is worth 2^64 / threshold hashes
    pub fn close_hit_hashrate(&self, close_hit_threshold: u64) -> f64 {
        if close_hit_threshold == 0 {
            return 0.0;
        }
        let hits = self.recent_close_hits();
        let seconds: f64 = hits.iter().map(|h| h.elapsed_secs).sum();
        if hits.is_empty() || seconds <= 0.0 {
            return 0.0;
        }
        let hashes_per_hit = 2f64.powi(64) / close_hit_threshold as f64;
        hits.len() as f64 * hashes_per_hit / seconds
    }

    pub fn get_active_device_count(&self) -> usize {
        self.devices()
            .iter()
            .filter(|d| d.get_hashrate() > 0.0)
            .count()
    }

    /// Display a text-based dashboard with farm statistics
    pub fn display_dashboard(&self, dashboard_id: &str, close_hit_threshold: u64) {
        let totals = self.totals();
        let devices = self.devices();
        let session_time = self.session_time();
        let last_activity = self
            .recent_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .map(|(time, message)| {
                format!("{} ({} ago)", message, FormatUtils::format_duration(time.elapsed()))
            })
            .unwrap_or_else(|| "None".to_string());

        info!(target: LOG_TARGET, "📊 FARM DASHBOARD - {}", dashboard_id);
        info!(target: LOG_TARGET, "├─ Hashrate: {}", FormatUtils::format_hashrate(self.get_total_hashrate()));
        if close_hit_threshold > 0 {
            info!(target: LOG_TARGET,
                "├─ Close-hit Estimate: {}",
                FormatUtils::format_hashrate(self.close_hit_hashrate(close_hit_threshold))
            );
        }
        info!(target: LOG_TARGET, "├─ Total Work: {} hashes", FormatUtils::format_number(totals.hashes_computed));
        info!(target: LOG_TARGET, "├─ Solutions: {}", totals.solutions);
        info!(target: LOG_TARGET, "├─ Close Hits: {}", totals.close_hits);
        info!(target: LOG_TARGET, "├─ Hash Faults: {}", totals.hash_faults);
        info!(target: LOG_TARGET, "├─ Last Activity: {}", last_activity);
        info!(target: LOG_TARGET, "├─ Session Time: {}", FormatUtils::format_duration(session_time));
        info!(target: LOG_TARGET,
            "├─ Active Devices: {}/{}",
            self.get_active_device_count(),
            devices.len()
        );
        for device in &devices {
            info!(target: LOG_TARGET,
                "│  ├─ Device {}: {} | best {:016x} | DAG loads {} {}",
                device.index(),
                FormatUtils::format_hashrate(device.get_hashrate()),
                device.best_hash(),
                device.dag_loads.load(Ordering::Relaxed),
                device.get_result_dots()
            );
        }
        info!(target: LOG_TARGET, "└─ Devices: {}", devices.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_aggregate_per_device() {
        let stats = FarmStats::new();
        stats.configure_devices(3);
        stats.record_hash_fault(2);
        stats.record_hash_fault(2);
        stats.record_solution(0, 42);
        assert_eq!(stats.devices().len(), 3);
        assert_eq!(stats.device(2).unwrap().hash_faults.load(Ordering::Relaxed), 2);
        assert_eq!(
            stats.totals(),
            FarmTotals {
                solutions: 1,
                hash_faults: 2,
                close_hits: 0,
                hashes_computed: 0
            }
        );
    }

    #[test]
    fn take_totals_resets_farm_counters() {
        let stats = FarmStats::new();
        stats.configure_devices(1);
        stats.record_close_hit(0, 5, 1.0);
        assert_eq!(stats.take_totals().close_hits, 1);
        assert_eq!(stats.totals().close_hits, 0);
        // Device counters are kept
        assert_eq!(stats.device(0).unwrap().close_hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unknown_device_counts_only_farm_wide() {
        let stats = FarmStats::new();
        stats.configure_devices(1);
        stats.record_hash_fault(5_000_000);
        stats.record_close_hit(usize::MAX, 7, 1.0);
        stats.record_solution(3, 1);
        stats.record_searched(9, 64, 1, 1);

        assert_eq!(stats.devices().len(), 1);
        assert!(stats.device(5_000_000).is_none());
        let totals = stats.totals();
        assert_eq!(totals.hash_faults, 1);
        assert_eq!(totals.close_hits, 1);
        assert_eq!(totals.solutions, 1);
        assert_eq!(totals.hashes_computed, 64);
        assert_eq!(stats.device(0).unwrap().hash_faults.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn configure_devices_replaces_previous_entries() {
        let stats = FarmStats::new();
        stats.configure_devices(4);
        stats.record_hash_fault(3);
        let fresh = stats.configure_devices(2);
        assert_eq!(fresh.len(), 2);
        assert_eq!(stats.devices().len(), 2);
        assert!(Arc::ptr_eq(&fresh[1], &stats.device(1).unwrap()));
        assert_eq!(fresh[1].hash_faults.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn close_hit_hashrate_scales_with_threshold() {
        let stats = FarmStats::new();
        stats.record_close_hit(0, 1, 2.0);
        stats.record_close_hit(0, 1, 2.0);
        let threshold = 1u64 << 60;
        // 16 hashes per hit, 2 hits in 4 seconds
        assert!((stats.close_hit_hashrate(threshold) - 8.0).abs() < 1e-9);
        assert_eq!(stats.close_hit_hashrate(0), 0.0);
    }
}

// Changelog:
// - v1.1.0 (2026-10-12): Farm-wide statistics.
//   - Replaced share tracking with solution, fault and close-hit counters.
//   - Added take_totals for controller read-and-reset.
//   - Added close-hit throughput estimation to the dashboard.
//   - Per-device entries are sized at configuration; unknown indices only
//     count farm-wide.
// - v1.0.3 (2025-06-14): Fixed Top 5 Shares sorting.
// - v1.0.0 (2025-06-14): Extracted from monolithic main.rs.
