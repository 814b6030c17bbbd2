// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/mod.rs
// Version: 2.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file is the module declaration for the farm and its miners, located in
// the miner subdirectory. It declares submodules and re-exports key types for
// use throughout the project.
//
// Tree Location:
// - src/miner/mod.rs (miner module entry point)
// - Submodules: backend, dag_file, error, farm, hook, miner, sequencer, stats

pub mod backend;
pub mod dag_file;
pub mod error;
pub mod farm;
pub mod hook;
#[allow(clippy::module_inception)]
pub mod miner;
pub mod sequencer;
pub mod stats;

// Re-export key types for convenience
pub use backend::{DeviceDescriptor, DeviceKind, DevicePlatform, SearchDevice};
pub use dag_file::{DagFileError, DagFileManager, DagFileMetadata};
pub use error::FarmError;
pub use farm::Farm;
pub use hook::{HookOwner, SearchCallbacks, SearchHook};
pub use miner::{Miner, MinerState};
pub use sequencer::DagLoadSequencer;
pub use stats::{DeviceStats, FarmStats, FarmTotals};

// Changelog:
// - v2.0.0 (2026-10-12): Farm orchestration.
//   - Replaced the cpu/gpu pool miners with Farm, Miner and the search hook.
//   - Added the backend seam with cpu and opencl implementations.
//   - Added the DAG load sequencer and DAG export store.
// - v1.1.0 (2025-06-24): Added GPU mining module.
// - v1.0.0 (2025-06-14): Extracted from monolithic main.rs.
