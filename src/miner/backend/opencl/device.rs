// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/backend/opencl/device.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// OpenCL GPU detection and the OpenCL device platform.

use super::engine::OpenClSearchDevice;
use crate::core::config::FarmSettings;
use crate::miner::backend::{DeviceDescriptor, DeviceKind, DevicePlatform, SearchDevice};
use anyhow::{Error, Result, bail};
use log::{debug, error, info, warn};
use opencl3::device::{CL_DEVICE_TYPE_GPU, Device};
use opencl3::platform::get_platforms;
use std::path::PathBuf;

const LOG_TARGET: &str = "ethash_farm::opencl::device";

/// OpenCL device information
#[derive(Debug, Clone)]
pub struct OpenClDevice {
    pub name: String,
    pub device_id: u32,
    pub platform_name: String,
    pub max_work_group_size: usize,
    pub max_compute_units: u32,
    pub global_mem_size: u64,
    pub max_mem_alloc_size: u64,
    pub device: Device,
}

impl OpenClDevice {
    /// Create a new OpenCL device
    pub fn new(device: Device, device_id: u32, platform_name: String) -> Self {
        let name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());
        let max_work_group_size = device.max_work_group_size().unwrap_or(256);
        let max_compute_units = device.max_compute_units().unwrap_or(1);
        let global_mem_size = device.global_mem_size().unwrap_or(0);
        let max_mem_alloc_size = device.max_mem_alloc_size().unwrap_or(global_mem_size);

        debug!(target: LOG_TARGET,
            "Created OpenCL device: {} (CU: {}, WG: {})",
            name, max_compute_units, max_work_group_size
        );

        Self {
            name,
            device_id,
            platform_name,
            max_work_group_size,
            max_compute_units,
            global_mem_size,
            max_mem_alloc_size,
            device,
        }
    }

    /// Get the underlying OpenCL device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Largest dataset this device can hold in one buffer
    pub fn usable_memory(&self) -> u64 {
        self.global_mem_size.min(self.max_mem_alloc_size)
    }

    /// Detect all available OpenCL GPU devices
    pub fn detect_devices() -> Result<Vec<OpenClDevice>> {
        debug!(target: LOG_TARGET, "Starting OpenCL device detection");

        let platforms = get_platforms().map_err(|e| {
            error!(target: LOG_TARGET, "Failed to get OpenCL platforms: {}", e);
            Error::msg(format!("OpenCL platform detection failed: {}", e))
        })?;

        if platforms.is_empty() {
            warn!(target: LOG_TARGET, "No OpenCL platforms found");
            return Ok(Vec::new());
        }

        let mut all_devices = Vec::new();
        let mut device_counter = 0;

        for platform in platforms {
            let platform_name = platform
                .name()
                .unwrap_or_else(|_| "Unknown Platform".to_string());

            match platform.get_devices(CL_DEVICE_TYPE_GPU) {
                Ok(devices) => {
                    for device_cl_id in devices {
                        let device = OpenClDevice::new(
                            Device::new(device_cl_id),
                            device_counter,
                            platform_name.clone(),
                        );
                        info!(target: LOG_TARGET,
                            "Detected OpenCL device {}: {} (Platform: {})",
                            device_counter, device.name, platform_name
                        );
                        all_devices.push(device);
                        device_counter += 1;
                    }
                }
                Err(e) => {
                    debug!(target: LOG_TARGET, "No GPU devices found on platform {}: {}", platform_name, e);
                }
            }
        }

        if all_devices.is_empty() {
            warn!(target: LOG_TARGET, "No OpenCL GPU devices detected");
        }
        Ok(all_devices)
    }

    pub fn descriptor(&self, index: usize) -> DeviceDescriptor {
        DeviceDescriptor {
            index,
            name: self.name.clone(),
            kind: DeviceKind::Gpu,
            memory_bytes: self.usable_memory(),
            compute_units: self.max_compute_units,
        }
    }
}

/// Every OpenCL GPU on the host
pub struct OpenClPlatform {
    devices: Vec<OpenClDevice>,
    kernel_path: Option<PathBuf>,
    batch_size: u32,
    check_interval: u32,
}

impl OpenClPlatform {
    pub fn new(settings: &FarmSettings) -> Result<Self> {
        let devices = OpenClDevice::detect_devices()?;
        Ok(Self {
            devices,
            kernel_path: settings.opencl_kernel.clone(),
            batch_size: settings.batch_size,
            check_interval: settings.check_interval,
        })
    }
}

impl DevicePlatform for OpenClPlatform {
    fn name(&self) -> &str {
        "opencl"
    }

    fn num_devices(&self) -> usize {
        self.devices.len()
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices
            .iter()
            .enumerate()
            .map(|(index, device)| device.descriptor(index))
            .collect()
    }

    fn platform_info(&self) -> String {
        let platforms: Vec<String> = self
            .devices
            .iter()
            .map(|d| d.platform_name.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        format!(
            "OpenCL: {} GPU(s) on [{}]",
            self.devices.len(),
            platforms.join(", ")
        )
    }

    fn open(&self, index: usize) -> Result<Box<dyn SearchDevice>> {
        let Some(device) = self.devices.get(index) else {
            bail!("OpenCL device {} does not exist ({} detected)", index, self.devices.len());
        };
        Ok(Box::new(OpenClSearchDevice::new(
            device.clone(),
            self.kernel_path.clone(),
            self.batch_size,
            self.check_interval,
        )))
    }
}
