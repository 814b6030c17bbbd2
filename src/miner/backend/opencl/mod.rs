// Ethash Farm - Free and Open Source Software Statement
//
// File: src/miner/backend/opencl/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// OpenCL backend module declaration (feature "opencl")

pub mod device;
pub mod engine;

pub use device::{OpenClDevice, OpenClPlatform};
pub use engine::OpenClSearchDevice;
