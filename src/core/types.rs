// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/types.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file defines core data structures for the Ethash farm, located in the
// core subdirectory. It includes the work package handed to every miner, the
// solution forwarded to the controller, nonce partitioning across devices,
// and the command-line arguments of the ethash-farm binary.
//
// Tree Location:
// - src/core/types.rs (core data structures)
// - Depends on: clap, hex

use crate::core::boundary::{boundary_from_difficulty, parse_boundary, upper64};
use crate::core::config::DagLoadMode;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

/// 256-bit hash, big-endian when compared numerically
pub type H256 = [u8; 32];

/// Bits of the nonce reserved for the device index when partitioning
pub const DEVICE_INDEX_BITS: i32 = 4;

/// Immutable snapshot of the current mining job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPackage {
    /// Block header hash being mined
    pub header_hash: H256,

    /// Seed hash identifying the dataset epoch
    pub seed_hash: H256,

    /// A result value strictly below this is a solution
    pub boundary: H256,

    /// Base nonce (pool-assigned extra-nonce lives in its high bits)
    pub start_nonce: u64,

    /// High nonce bits reserved for extra-nonce; negative disables partitioning
    pub ex_size_bits: i32,
}

impl Default for WorkPackage {
    fn default() -> Self {
        Self {
            header_hash: [0u8; 32],
            seed_hash: [0u8; 32],
            boundary: [0u8; 32],
            start_nonce: 0,
            ex_size_bits: -1,
        }
    }
}

impl WorkPackage {
    /// Create an unpartitioned package
    pub fn new(header_hash: H256, seed_hash: H256, boundary: H256) -> Self {
        Self {
            header_hash,
            seed_hash,
            boundary,
            ..Self::default()
        }
    }

    /// Same job restricted to a pool-assigned nonce range
    pub fn with_nonce_range(mut self, start_nonce: u64, ex_size_bits: i32) -> Self {
        self.start_nonce = start_nonce;
        self.ex_size_bits = ex_size_bits;
        self
    }

    /// An all-zero header means "no work"
    pub fn is_empty(&self) -> bool {
        self.header_hash == [0u8; 32]
    }

    pub fn is_partitioned(&self) -> bool {
        self.ex_size_bits >= 0
    }

    /// Upper 64 bits of the boundary, compared against device-side hashes
    pub fn upper_boundary(&self) -> u64 {
        upper64(&self.boundary)
    }

    /// Starting nonce for the miner at `index`
    pub fn start_nonce_for(&self, index: usize) -> u64 {
        if self.is_partitioned() {
            partition_start_nonce(self.start_nonce, self.ex_size_bits, index)
        } else {
            self.start_nonce
        }
    }
}

/// Embeds the device index into the four nonce bits just below the extra-nonce.
///
/// Indices wrap at 16; more devices than that share ranges.
pub fn partition_start_nonce(start_nonce: u64, ex_size_bits: i32, index: usize) -> u64 {
    let shift = 64 - DEVICE_INDEX_BITS - ex_size_bits;
    if !(0..64).contains(&shift) {
        return start_nonce;
    }
    let slot = (index as u64) & ((1 << DEVICE_INDEX_BITS) - 1);
    start_nonce | (slot << shift)
}

/// Size of the nonce range each device owns when partitioned
pub fn partition_range_size(ex_size_bits: i32) -> u128 {
    let bits = (64 - DEVICE_INDEX_BITS - ex_size_bits).clamp(0, 64);
    1u128 << bits
}

/// Proof of work result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowResult {
    /// Final hash compared against the boundary
    pub value: H256,

    /// Compressed mix digest submitted with the nonce
    pub mix_hash: H256,
}

/// A verified solution ready for submission
#[derive(Debug, Clone)]
pub struct Solution {
    pub nonce: u64,
    pub mix_hash: H256,
    pub header_hash: H256,
    pub seed_hash: H256,

    /// Miner index that found the solution
    pub device_index: usize,

    /// Timestamp when the solution was verified
    pub found_at: Instant,
}

impl Solution {
    /// Get the age of this solution
    pub fn age(&self) -> std::time::Duration {
        self.found_at.elapsed()
    }
}

/// Command-line arguments for the ethash-farm binary
#[derive(Parser, Debug)]
#[command(
    name = "ethash-farm",
    version = "1.0.0",
    about = "Multi-device Ethash mining farm",
    long_about = "Ethash Farm drives one or more devices through an Ethash search, publishing\n\
                  work packages to every miner and verifying every reported nonce.\n\n\
                  Examples:\n\
                    Mine block 60000 on 4 CPU devices: ethash-farm --threads 4 --block 60000\n\
                    Sequential DAG load: ethash-farm --threads 4 --dag-load-mode sequential\n\
                    List devices: ethash-farm --list-devices\n\
                    Export DAG: ethash-farm --block 60000 --export-dag ./dags"
)]
pub struct Args {
    /// Device indices to mine on, comma separated (default: all)
    #[arg(long, value_delimiter = ',', value_name = "INDICES")]
    pub devices: Vec<usize>,

    /// Number of CPU devices to expose (0 = auto-detect)
    #[arg(short, long, default_value = "0", value_name = "COUNT")]
    pub threads: usize,

    /// Dataset load order across devices
    #[arg(long, value_enum, value_name = "MODE")]
    pub dag_load_mode: Option<DagLoadMode>,

    /// Close-hit threshold on the upper 64 hash bits (hex or decimal, 0 = disabled)
    #[arg(long, value_name = "THRESHOLD")]
    pub close_hit: Option<String>,

    /// Difficulty of the generated work packages
    #[arg(long, default_value = "4096", value_name = "DIFFICULTY")]
    pub difficulty: u64,

    /// Explicit 32-byte boundary in hex; overrides --difficulty
    #[arg(long, value_name = "HEX")]
    pub boundary: Option<String>,

    /// Block number selecting the epoch
    #[arg(long, default_value = "0", value_name = "NUMBER")]
    pub block: u64,

    /// Mining duration in seconds (0 = until Ctrl-C)
    #[arg(long, default_value = "0", value_name = "SECONDS")]
    pub duration: u64,

    /// Throttle percentage applied to every device
    #[arg(long, value_name = "PERCENT")]
    pub throttle: Option<u8>,

    /// JSON settings file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print device enumeration and exit
    #[arg(long, default_value = "false")]
    pub list_devices: bool,

    /// Export the dataset for --block into this directory and exit
    #[arg(long, value_name = "DIR")]
    pub export_dag: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    pub log_level: String,

    /// Use the OpenCL platform instead of the CPU devices
    #[cfg(feature = "opencl")]
    #[arg(long, default_value = "false")]
    pub opencl: bool,
}

impl Args {
    /// Validate arguments and return helpful errors
    pub fn validate(&self) -> Result<(), String> {
        if self.difficulty == 0 {
            return Err("Difficulty must be greater than 0".to_string());
        }
        if let Some(throttle) = self.throttle {
            if throttle >= 100 {
                return Err("Throttle must be between 0 and 99 percent".to_string());
            }
        }
        if self.threads > 1024 {
            return Err("Thread count cannot exceed 1024".to_string());
        }
        if let Some(ref close_hit) = self.close_hit {
            if parse_u64(close_hit).is_none() {
                return Err(format!("Invalid close-hit threshold '{}'", close_hit));
            }
        }
        if let Some(ref boundary) = self.boundary {
            if parse_boundary(boundary).is_none() {
                return Err(format!("Invalid boundary '{}': expected 64 hex characters", boundary));
            }
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(format!("Invalid log level '{}'", self.log_level));
        }
        Ok(())
    }

    /// CPU device count, auto-detected when zero
    pub fn device_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn close_hit_threshold(&self) -> Option<u64> {
        self.close_hit.as_deref().and_then(parse_u64)
    }

    /// Boundary for generated packages: --boundary if given, else from --difficulty
    pub fn work_boundary(&self) -> H256 {
        self.boundary
            .as_deref()
            .and_then(parse_boundary)
            .unwrap_or_else(|| boundary_from_difficulty(self.difficulty))
    }
}

/// Parses "0x" prefixed hex or plain decimal
pub fn parse_u64(text: &str) -> Option<u64> {
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}


// Changelog:
// - v1.0.0 (2026-10-12): Ethash farm data structures.
//   - Replaced pool jobs and shares with WorkPackage and Solution.
//   - Added nonce partitioning helpers for multi-device search.
//   - Rewrote Args for the farm controller binary.
//   - Added --boundary as an explicit alternative to --difficulty.
