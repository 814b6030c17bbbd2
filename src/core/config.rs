// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/config.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file defines the farm settings, located in the core subdirectory.
// Settings are loaded from JSON, defaulted field by field, overridden from
// the command line and validated before the farm is built.

use crate::core::ethash::{DatasetParams, ITEM_BYTES};
use crate::core::types::{Args, parse_u64};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config format: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Order in which miners build and upload their dataset after an epoch change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DagLoadMode {
    /// Every miner loads independently
    #[default]
    Parallel,
    /// Miner i waits for miners below i
    Sequential,
}

/// Farm configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmSettings {
    /// Requested device indices (empty = every enumerated device)
    pub devices: Vec<usize>,

    pub dag_load_mode: DagLoadMode,

    /// Upper-64 close-hit threshold, 0 disables close hits
    pub close_hit_threshold: u64,

    /// Bytes each device must have free beyond the full dataset
    pub extra_device_memory: u64,

    /// Nonces per device batch
    pub batch_size: u32,

    /// Throttle percentage (0-99)
    pub throttle: u8,

    /// Epochs kept in the dataset cache
    pub dataset_retention: usize,

    pub light_items: u32,
    pub full_items: u32,

    /// Batches between mid-search hash cross-checks (0 disables)
    pub check_interval: u32,

    /// OpenCL search kernel source
    pub opencl_kernel: Option<PathBuf>,
}

impl Default for FarmSettings {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            dag_load_mode: DagLoadMode::Parallel,
            close_hit_threshold: 0,
            extra_device_memory: 0,
            batch_size: 4096,
            throttle: 0,
            dataset_retention: 2,
            light_items: 1024,
            full_items: 1 << 16,
            check_interval: 64,
            opencl_kernel: None,
        }
    }
}

impl FarmSettings {
    /// Loads settings from a JSON file, missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be greater than 0".into()));
        }
        if self.throttle >= 100 {
            return Err(ConfigError::Invalid("throttle must be between 0 and 99".into()));
        }
        if self.dataset_retention == 0 {
            return Err(ConfigError::Invalid("dataset_retention must be at least 1".into()));
        }
        if self.light_items == 0 {
            return Err(ConfigError::Invalid("light_items must be at least 1".into()));
        }
        if self.full_items < 2 {
            return Err(ConfigError::Invalid("full_items must be at least 2".into()));
        }
        Ok(())
    }

    /// Command-line flags take precedence over the file
    pub fn apply_args(&mut self, args: &Args) {
        if !args.devices.is_empty() {
            self.devices = args.devices.clone();
        }
        if let Some(mode) = args.dag_load_mode {
            self.dag_load_mode = mode;
        }
        if let Some(threshold) = args.close_hit.as_deref().and_then(parse_u64) {
            self.close_hit_threshold = threshold;
        }
        if let Some(throttle) = args.throttle {
            self.throttle = throttle;
        }
    }

    pub fn dataset_params(&self) -> DatasetParams {
        DatasetParams {
            light_items: self.light_items,
            full_items: self.full_items,
        }
    }

    /// Memory a device needs to hold the full dataset plus the reserve
    pub fn required_device_memory(&self) -> u64 {
        self.full_items as u64 * ITEM_BYTES as u64 + self.extra_device_memory
    }
}
