// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/ethash.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the Ethash-style proof of work used by the farm,
// located in the core subdirectory of the source tree. It provides the epoch
// seed chain, light cache and full dataset generation, and the hashimoto
// evaluation over either of them.
//
// Tree Location:
// - src/core/ethash.rs (PoW algorithm implementation)
// - Depends on: sha3 crate

use crate::core::types::{H256, PowResult};
use sha3::{Digest, Keccak256, Keccak512};

/// Blocks per epoch
pub const EPOCH_LENGTH: u64 = 30_000;

/// Size of one dataset item in bytes
pub const ITEM_BYTES: usize = 64;

const ITEM_WORDS: usize = ITEM_BYTES / 4;
const MIX_WORDS: usize = ITEM_WORDS * 2;
const DATASET_PARENTS: u32 = 32;
const ACCESSES: u32 = 64;
const FNV_PRIME: u32 = 0x0100_0193;

/// One dataset item as little-endian words
pub type Item = [u32; ITEM_WORDS];

/// Dataset geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetParams {
    pub light_items: u32,
    pub full_items: u32,
}

/// Computes the PoW result for a nonce
pub trait PowEvaluator: Send + Sync {
    fn eval(&self, seed_hash: &H256, header_hash: &H256, nonce: u64) -> PowResult;
}

#[inline]
pub fn fnv(a: u32, b: u32) -> u32 {
    a.wrapping_mul(FNV_PRIME) ^ b
}

pub fn keccak256(data: &[u8]) -> H256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

fn keccak512(data: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Keccak512::digest(data));
    out
}

fn words_from_bytes(bytes: &[u8; 64]) -> Item {
    let mut item = [0u32; ITEM_WORDS];
    for (word, chunk) in item.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    item
}

pub fn item_to_bytes(item: &Item) -> [u8; 64] {
    let mut bytes = [0u8; 64];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(item.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

fn keccak512_item(item: &Item) -> Item {
    words_from_bytes(&keccak512(&item_to_bytes(item)))
}

pub fn epoch(block_number: u64) -> u64 {
    block_number / EPOCH_LENGTH
}

/// Keccak-256 applied once per epoch to 32 zero bytes
pub fn seed_hash(block_number: u64) -> H256 {
    let mut seed = [0u8; 32];
    for _ in 0..epoch(block_number) {
        seed = keccak256(&seed);
    }
    seed
}

/// First 16 hex characters of a seed, used to name exported datasets
pub fn epoch_tag(seed_hash: &H256) -> String {
    hex::encode(&seed_hash[..8])
}

/// Small, CPU-computable dataset form
#[derive(Debug)]
pub struct LightDataset {
    seed_hash: H256,
    items: Vec<Item>,
    full_items: u32,
}

impl LightDataset {
    pub fn build(seed_hash: &H256, params: DatasetParams) -> Self {
        let n = params.light_items.max(1) as usize;
        let mut items = Vec::with_capacity(n);
        items.push(words_from_bytes(&keccak512(seed_hash)));
        for i in 1..n {
            let next = keccak512_item(&items[i - 1]);
            items.push(next);
        }

        // One memory-hard mixing round
        for i in 0..n {
            let pick = items[i][0] as usize % n;
            let prev = items[(i + n - 1) % n];
            let mut mixed = [0u32; ITEM_WORDS];
            for (w, word) in mixed.iter_mut().enumerate() {
                *word = prev[w] ^ items[pick][w];
            }
            items[i] = keccak512_item(&mixed);
        }

        Self {
            seed_hash: *seed_hash,
            items,
            full_items: params.full_items.max(2),
        }
    }

    pub fn seed_hash(&self) -> &H256 {
        &self.seed_hash
    }

    pub fn full_items(&self) -> u32 {
        self.full_items
    }

    pub fn size_bytes(&self) -> usize {
        self.items.len() * ITEM_BYTES
    }

    /// Derives full dataset item `index` from the light cache
    pub fn calc_item(&self, index: u32) -> Item {
        let n = self.items.len();
        let mut mix = self.items[index as usize % n];
        mix[0] ^= index;
        mix = keccak512_item(&mix);
        for parent in 0..DATASET_PARENTS {
            let pick = fnv(index ^ parent, mix[parent as usize % ITEM_WORDS]) as usize % n;
            let source = &self.items[pick];
            for (w, word) in mix.iter_mut().enumerate() {
                *word = fnv(*word, source[w]);
            }
        }
        keccak512_item(&mix)
    }

    /// Evaluates the PoW computing every dataset item on demand
    pub fn eval(&self, header_hash: &H256, nonce: u64) -> PowResult {
        hashimoto(header_hash, nonce, self.full_items, |index| self.calc_item(index))
    }
}

/// Large, device-resident dataset form
#[derive(Debug)]
pub struct FullDataset {
    seed_hash: H256,
    items: Vec<Item>,
}

impl FullDataset {
    pub fn build(light: &LightDataset) -> Self {
        let items = (0..light.full_items()).map(|i| light.calc_item(i)).collect();
        Self {
            seed_hash: *light.seed_hash(),
            items,
        }
    }

    pub fn seed_hash(&self) -> &H256 {
        &self.seed_hash
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.items.len() * ITEM_BYTES
    }

    /// Raw little-endian dataset bytes, as uploaded to devices
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size_bytes());
        for item in &self.items {
            bytes.extend_from_slice(&item_to_bytes(item));
        }
        bytes
    }

    /// Evaluates the PoW with dataset lookups
    pub fn eval(&self, header_hash: &H256, nonce: u64) -> PowResult {
        let count = self.items.len();
        hashimoto(header_hash, nonce, count as u32, |index| {
            self.items[index as usize % count]
        })
    }
}

fn hashimoto<F>(header_hash: &H256, nonce: u64, full_items: u32, lookup: F) -> PowResult
where
    F: Fn(u32) -> Item,
{
    let mut input = [0u8; 40];
    input[..32].copy_from_slice(header_hash);
    input[32..].copy_from_slice(&nonce.to_le_bytes());
    let seed_bytes = keccak512(&input);
    let seed = words_from_bytes(&seed_bytes);

    let mut mix = [0u32; MIX_WORDS];
    for (i, word) in mix.iter_mut().enumerate() {
        *word = seed[i % ITEM_WORDS];
    }

    let pages = (full_items / 2).max(1);
    for i in 0..ACCESSES {
        let page = fnv(i ^ seed[0], mix[i as usize % MIX_WORDS]) % pages;
        let first = lookup(page * 2);
        let second = lookup(page * 2 + 1);
        for w in 0..ITEM_WORDS {
            mix[w] = fnv(mix[w], first[w]);
            mix[w + ITEM_WORDS] = fnv(mix[w + ITEM_WORDS], second[w]);
        }
    }

    let mut mix_hash = [0u8; 32];
    for (i, chunk) in mix_hash.chunks_exact_mut(4).enumerate() {
        let word = fnv(
            fnv(fnv(mix[i * 4], mix[i * 4 + 1]), mix[i * 4 + 2]),
            mix[i * 4 + 3],
        );
        chunk.copy_from_slice(&word.to_le_bytes());
    }

    let mut final_input = [0u8; 96];
    final_input[..64].copy_from_slice(&seed_bytes);
    final_input[64..].copy_from_slice(&mix_hash);

    PowResult {
        value: keccak256(&final_input),
        mix_hash,
    }
}


// Changelog:
// - v1.0.0 (2026-10-12): Ethash evaluation replacing the SHA3x triple hash.
//   - Keccak-256 seed chain, light cache and full dataset generation.
//   - Hashimoto evaluation shared by the light and full paths.
//   - PowEvaluator trait used by miners for independent verification.
