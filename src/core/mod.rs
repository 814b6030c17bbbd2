// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/mod.rs
// Version: 1.1.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file is the module declaration for the core functionality of the
// Ethash farm, located in the core subdirectory. It declares submodules and
// re-exports key types for use throughout the project.

pub mod boundary;
pub mod config;
pub mod dataset;
pub mod ethash;
pub mod types;

// Re-export the most commonly used items
pub use boundary::{boundary_from_difficulty, upper64};
pub use config::{ConfigError, DagLoadMode, FarmSettings};
pub use dataset::DatasetCache;
pub use ethash::{DatasetParams, FullDataset, LightDataset, PowEvaluator, epoch_tag, seed_hash};
pub use types::{Args, H256, PowResult, Solution, WorkPackage};

// Changelog:
// - v1.1.0 (2026-10-12): Ethash core.
//   - Replaced sha3x/sha256/difficulty with ethash, dataset and boundary.
//   - Added config module for farm settings.
// - v1.0.1 (2025-06-16): Added simple SHA-256 support.
