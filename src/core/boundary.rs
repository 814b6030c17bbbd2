// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/boundary.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file contains the 256-bit boundary arithmetic used by the farm:
// converting between difficulty and boundary, extracting the upper 64 bits
// of a hash for the fast device-side comparison, and the big-endian
// "value below boundary" test used to classify reported nonces.

use crate::core::types::H256;
use log::{debug, warn};
use uint::construct_uint;

const LOG_TARGET: &str = "ethash_farm::boundary";

construct_uint! {
    pub struct U256(4);
}

/// Upper 64 bits of a big-endian 256-bit hash.
pub fn upper64(hash: &H256) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_be_bytes(bytes)
}

/// True when `value` interpreted as a big-endian 256-bit integer is strictly below `boundary`.
pub fn is_below(value: &H256, boundary: &H256) -> bool {
    value < boundary
}

pub fn to_u256(hash: &H256) -> U256 {
    U256::from_big_endian(hash)
}

pub fn from_u256(value: U256) -> H256 {
    let mut out = [0u8; 32];
    // Limbs are stored least significant first
    for (i, chunk) in out.chunks_exact_mut(8).enumerate() {
        chunk.copy_from_slice(&value.0[3 - i].to_be_bytes());
    }
    out
}

/// Boundary for a difficulty: `2^256 / difficulty`, saturated to all ones for difficulty <= 1.
pub fn boundary_from_difficulty(difficulty: u64) -> H256 {
    if difficulty <= 1 {
        if difficulty == 0 {
            warn!(target: LOG_TARGET, "Difficulty 0 is invalid, using the easiest boundary");
        }
        return [0xFF; 32];
    }
    let boundary = U256::MAX / U256::from(difficulty);
    debug!(target: LOG_TARGET, "Difficulty {} -> boundary: {:064x}", difficulty, boundary);
    from_u256(boundary)
}

/// Approximate difficulty represented by a boundary, saturated to u64.
pub fn difficulty_from_boundary(boundary: &H256) -> u64 {
    let value = to_u256(boundary);
    if value.is_zero() {
        warn!(target: LOG_TARGET, "Zero boundary has no finite difficulty");
        return u64::MAX;
    }
    let quotient = U256::MAX / value;
    if quotient > U256::from(u64::MAX) {
        u64::MAX
    } else {
        quotient.low_u64()
    }
}

/// Parses a 64 hex character boundary, with or without a 0x prefix.
pub fn parse_boundary(text: &str) -> Option<H256> {
    let trimmed = text.trim_start_matches("0x");
    let bytes = hex::decode(trimmed).ok()?;
    if bytes.len() != 32 {
        warn!(target: LOG_TARGET, "Invalid boundary: wrong length ({} bytes)", bytes.len());
        return None;
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Some(out)
}


// Changelog:
// - v1.0.0 (2026-10-12): Boundary arithmetic for Ethash work packages.
//   - Kept the construct_uint U256 from the share difficulty code.
//   - Added upper64, is_below, and difficulty/boundary conversions.
