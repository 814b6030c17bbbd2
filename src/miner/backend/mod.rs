// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/backend/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file defines the device backend seam, located in the backend
// subdirectory of the miner module. A DevicePlatform enumerates devices and
// opens search handles; a SearchDevice is owned by exactly one miner worker
// thread and runs the blocking search, polling the hook for cancellation.
//
// Tree Location:
// - src/miner/backend/mod.rs (backend traits)
// - Submodules: cpu (feature "cpu"), opencl (feature "opencl")

use crate::core::ethash::FullDataset;
use crate::core::types::H256;
use crate::miner::dag_file::DagFileManager;
use crate::miner::hook::SearchCallbacks;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "cpu")]
pub mod cpu;
#[cfg(feature = "opencl")]
pub mod opencl;

/// Device type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

/// Enumeration entry for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub kind: DeviceKind,
    /// Memory available for the dataset, in bytes
    pub memory_bytes: u64,
    pub compute_units: u32,
}

impl DeviceDescriptor {
    /// Get device info string for display
    pub fn info_string(&self) -> String {
        format!(
            "[{}] {} ({:?}, CU: {}, MEM: {:.1} GB)",
            self.index,
            self.name,
            self.kind,
            self.compute_units,
            self.memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
        )
    }
}

/// Device enumeration and factory
pub trait DevicePlatform: Send + Sync {
    fn name(&self) -> &str;

    fn num_devices(&self) -> usize;

    fn list_devices(&self) -> Vec<DeviceDescriptor>;

    fn platform_info(&self) -> String;

    /// Opens a search handle for device `index`
    fn open(&self, index: usize) -> Result<Box<dyn SearchDevice>>;
}

/// Per-miner device handle
pub trait SearchDevice: Send {
    fn name(&self) -> &str;

    /// Makes `dataset` resident on the device
    fn init(&mut self, dataset: Arc<FullDataset>) -> Result<()>;

    /// Blocking search; returns once the hook says stop.
    ///
    /// Candidates are nonces whose upper 64 result bits are strictly below `target`.
    fn search(
        &mut self,
        header_hash: &H256,
        target: u64,
        hook: &dyn SearchCallbacks,
        partitioned: bool,
        start_nonce: u64,
    ) -> Result<()>;

    fn set_throttle(&mut self, percent: u8);

    /// Writes the resident dataset to `store` under `tag`
    fn export_dag(&self, tag: &str, store: &DagFileManager) -> Result<PathBuf>;
}
