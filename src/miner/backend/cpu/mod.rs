// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/backend/cpu/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file is the module declaration for the CPU reference backend, located
// in the backend subdirectory of the miner module. Each configured thread is
// exposed to the farm as one logical device.
//
// Tree Location:
// - src/miner/backend/cpu/mod.rs (CPU backend entry point)
// - Submodules: device, engine

pub mod device;
pub mod engine;

pub use device::CpuPlatform;
pub use engine::CpuSearchDevice;
