// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/backend/cpu/engine.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file implements the CPU reference search, located in the cpu backend
// subdirectory. It scans nonces in batches against the resident full
// dataset, hands candidates and progress to the hook after every batch, and
// periodically submits a sampled hash for cross-checking.
//
// Tree Location:
// - src/miner/backend/cpu/engine.rs (CPU search loop)
// - Depends on: rand, anyhow

use crate::core::boundary::upper64;
use crate::core::ethash::{FullDataset, ITEM_BYTES};
use crate::core::types::H256;
use crate::miner::backend::SearchDevice;
use crate::miner::dag_file::{DagFileManager, DagFileMetadata};
use crate::miner::hook::SearchCallbacks;
use crate::utils::format::FormatUtils;
use anyhow::{Result, anyhow};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LOG_TARGET: &str = "ethash_farm::cpu::engine";
const MAX_THROTTLE_PAUSE: Duration = Duration::from_millis(500);

pub struct CpuSearchDevice {
    name: String,
    batch_size: u32,
    check_interval: u32,
    throttle: u8,
    dataset: Option<Arc<FullDataset>>,
}

impl CpuSearchDevice {
    pub fn new(name: String, batch_size: u32, check_interval: u32) -> Self {
        Self {
            name,
            batch_size: batch_size.max(1),
            check_interval,
            throttle: 0,
            dataset: None,
        }
    }

    /// Pause proportional to the batch time so that `throttle` percent of wall time is idle
    fn apply_throttle_delay(&self, batch_time: Duration) {
        if self.throttle == 0 {
            return;
        }
        let pause = batch_time.mul_f64(self.throttle as f64 / (100 - self.throttle) as f64);
        std::thread::sleep(pause.min(MAX_THROTTLE_PAUSE));
    }
}

impl SearchDevice for CpuSearchDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, dataset: Arc<FullDataset>) -> Result<()> {
        info!(target: LOG_TARGET,
            "🧠 {} holding DAG {} ({})",
            self.name,
            FormatUtils::short_hex(dataset.seed_hash()),
            FormatUtils::format_bytes(dataset.size_bytes() as u64)
        );
        self.dataset = Some(dataset);
        Ok(())
    }

    fn search(
        &mut self,
        header_hash: &H256,
        target: u64,
        hook: &dyn SearchCallbacks,
        partitioned: bool,
        start_nonce: u64,
    ) -> Result<()> {
        let dataset = self
            .dataset
            .clone()
            .ok_or_else(|| anyhow!("{} has no dataset loaded", self.name))?;

        // Unpartitioned devices pick a random point to avoid duplicating each other
        let mut nonce = if partitioned {
            start_nonce
        } else {
            start_nonce.wrapping_add(rand::random::<u64>())
        };
        debug!(target: LOG_TARGET,
            "{} searching {} from {:#018x} (target {:#018x})",
            self.name,
            FormatUtils::short_hex(header_hash),
            nonce,
            target
        );

        let batch = self.batch_size;
        let mut batches: u64 = 0;
        let mut best = u64::MAX;
        loop {
            let started = Instant::now();
            let batch_start = nonce;
            let mut candidates = Vec::new();
            let mut sample = u64::MAX;

            for offset in 0..batch as u64 {
                let candidate = batch_start.wrapping_add(offset);
                let hash = upper64(&dataset.eval(header_hash, candidate).value);
                if offset == 0 {
                    sample = hash;
                }
                best = best.min(hash);
                if hash < target {
                    candidates.push(candidate);
                }
            }
            nonce = batch_start.wrapping_add(batch as u64);
            batches += 1;

            if !candidates.is_empty() && hook.found(&candidates) {
                return Ok(());
            }
            if self.check_interval > 0 && batches % self.check_interval as u64 == 0 {
                hook.check_hash(sample, batch_start, header_hash);
            }
            if hook.searched(batch, sample, best) {
                return Ok(());
            }
            self.apply_throttle_delay(started.elapsed());
        }
    }

    fn set_throttle(&mut self, percent: u8) {
        self.throttle = percent.min(99);
    }

    fn export_dag(&self, tag: &str, store: &DagFileManager) -> Result<PathBuf> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| anyhow!("{} has no dataset to export", self.name))?;
        let metadata = DagFileMetadata::new(
            dataset.seed_hash(),
            dataset.item_count() as u64,
            ITEM_BYTES as u32,
            self.name.clone(),
        );
        Ok(store.save(tag, &metadata, &dataset.to_bytes())?)
    }
}
