// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/backend/cpu/device.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// CPU device enumeration. Memory and processor details come from sysinfo;
// every logical device reports the host's available memory.

use super::engine::CpuSearchDevice;
use crate::core::config::FarmSettings;
use crate::miner::backend::{DeviceDescriptor, DeviceKind, DevicePlatform, SearchDevice};
use crate::utils::format::FormatUtils;
use anyhow::{Result, bail};
use log::{debug, info};
use sysinfo::System;

const LOG_TARGET: &str = "ethash_farm::cpu::device";

/// CPU platform exposing `count` logical search devices
pub struct CpuPlatform {
    devices: Vec<DeviceDescriptor>,
    batch_size: u32,
    check_interval: u32,
    info: String,
}

impl CpuPlatform {
    pub fn new(count: usize, settings: &FarmSettings) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_all();

        let brand = system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "CPU".to_string());
        let available = system.available_memory();
        let count = count.max(1);

        let devices = (0..count)
            .map(|index| DeviceDescriptor {
                index,
                name: format!("{} #{}", brand, index),
                kind: DeviceKind::Cpu,
                memory_bytes: available,
                compute_units: 1,
            })
            .collect();

        let info = format!(
            "CPU platform: {} | {} logical cores | {} available of {} | {}",
            brand,
            num_cpus::get(),
            FormatUtils::format_bytes(available),
            FormatUtils::format_bytes(system.total_memory()),
            System::long_os_version().unwrap_or_else(|| "unknown OS".to_string())
        );
        info!(target: LOG_TARGET, "🖥️ Detected {} CPU search device(s) on {}", count, brand);

        Self {
            devices,
            batch_size: settings.batch_size,
            check_interval: settings.check_interval,
            info,
        }
    }

    /// Platform with an explicit memory figure, for hosts where sysinfo is unreliable
    pub fn with_memory(count: usize, memory_bytes: u64, settings: &FarmSettings) -> Self {
        let mut platform = Self::new(count, settings);
        for device in &mut platform.devices {
            device.memory_bytes = memory_bytes;
        }
        platform
    }
}

impl DevicePlatform for CpuPlatform {
    fn name(&self) -> &str {
        "cpu"
    }

    fn num_devices(&self) -> usize {
        self.devices.len()
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.clone()
    }

    fn platform_info(&self) -> String {
        self.info.clone()
    }

    fn open(&self, index: usize) -> Result<Box<dyn SearchDevice>> {
        let Some(descriptor) = self.devices.get(index) else {
            bail!("CPU device {} does not exist ({} configured)", index, self.devices.len());
        };
        debug!(target: LOG_TARGET, "Opening {}", descriptor.name);
        Ok(Box::new(CpuSearchDevice::new(
            descriptor.name.clone(),
            self.batch_size,
            self.check_interval,
        )))
    }
}
