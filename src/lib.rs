// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/lib.rs
// Version: 2.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file serves as the main library entry point for ethash-farm, located
// at the root of the source tree. It exports all public modules and types
// that the binary and tests use.
//
// Tree Location:
// - src/lib.rs (root library file)
// - Exports modules: core, miner, utils

pub mod core;
pub mod miner;
pub mod utils;

// Re-export commonly used types at the crate root for convenience
pub use crate::core::{DatasetCache, FarmSettings, PowEvaluator, Solution, WorkPackage};
pub use crate::miner::{Farm, FarmError, Miner, SearchHook};

#[cfg(feature = "cpu")]
pub use crate::miner::backend::cpu::CpuPlatform;
#[cfg(feature = "opencl")]
pub use crate::miner::backend::opencl::OpenClPlatform;

// Changelog:
// - v2.0.0 (2026-10-12): Ethash farm library.
//   - Dropped benchmark, help, pool and tui modules.
//   - Re-exported the farm surface and device platforms.
// - v1.0.2 (2025-06-15): Added help module support.
// - v1.0.1 (2025-06-14): Added benchmark module support.
// - v1.0.0 (2025-06-14): Initial modular breakout from monolithic main.rs.
