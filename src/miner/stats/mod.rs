// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/stats/mod.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file is the module declaration for the statistics tracking
// functionality of the Ethash farm, located in the stats subdirectory of the
// miner module.
//
// Tree Location:
// - src/miner/stats/mod.rs (stats module entry point)
// - Submodules: farm_stats, device_stats

pub mod device_stats;
pub mod farm_stats;

// Re-export key types for convenience
pub use device_stats::DeviceStats;
pub use farm_stats::{CloseHitInfo, FarmStats, FarmTotals};

// Changelog:
// - v1.1.0 (2026-10-12): Renamed miner/thread stats to farm/device stats.
// - v1.0.0 (2025-06-14): Extracted from monolithic main.rs.
