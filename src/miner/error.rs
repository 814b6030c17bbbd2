// Ethash Farm - Free and Open Source Software Statement
//
// File: src/miner/error.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// Farm-level error type.

use crate::core::config::ConfigError;
use crate::miner::dag_file::DagFileError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FarmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No {platform} devices found")]
    NoDevices { platform: String },

    #[error("Device {index} does not exist ({available} available)")]
    InvalidDeviceIndex { index: usize, available: usize },

    #[error("No device with sufficient memory was found (need {required} bytes)")]
    InsufficientMemory { required: u64 },

    #[error("Farm has no configured miners")]
    NotConfigured,

    #[error("Device {index} failed: {source}")]
    Device {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("DAG export failed: {0}")]
    Export(#[from] DagFileError),
}
