// Ethash Farm - Free and Open Source Software Statement
//
// File: tests/common/mod.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// Scripted device platform and hash evaluator shared by the farm tests.
// Devices record what they are asked to do and search until the hook says
// stop; candidate nonces and init failures are scripted per device.

#![allow(dead_code)]

use anyhow::{Result, bail};
use ethash_farm::FarmSettings;
use ethash_farm::core::ethash::{FullDataset, PowEvaluator};
use ethash_farm::core::types::{H256, PowResult};
use ethash_farm::miner::backend::{DeviceDescriptor, DeviceKind, DevicePlatform, SearchDevice};
use ethash_farm::miner::dag_file::DagFileManager;
use ethash_farm::miner::hook::SearchCallbacks;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    InitStarted(usize),
    InitFinished(usize),
    InitFailed(usize),
    Search {
        device: usize,
        header: H256,
        seed: H256,
        start_nonce: u64,
        partitioned: bool,
        target: u64,
        throttle: u8,
    },
}

#[derive(Default)]
pub struct Script {
    pub events: Mutex<Vec<Event>>,
    /// Nonces handed to `found` on the next search, per device
    pub nonces: Mutex<HashMap<usize, Vec<u64>>>,
    /// Remaining init failures, per device
    pub init_failures: Mutex<HashMap<usize, usize>>,
    pub init_delay: Mutex<Duration>,
}

impl Script {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn searches_for(&self, device: usize) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::Search { device: d, .. } if *d == device))
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events().iter().filter(|e| *e == wanted).count()
    }

    pub fn script_nonces(&self, device: usize, nonces: &[u64]) {
        self.nonces.lock().unwrap().insert(device, nonces.to_vec());
    }

    pub fn fail_inits(&self, device: usize, times: usize) {
        self.init_failures.lock().unwrap().insert(device, times);
    }

    pub fn set_init_delay(&self, delay: Duration) {
        *self.init_delay.lock().unwrap() = delay;
    }
}

pub struct ScriptedPlatform {
    devices: Vec<DeviceDescriptor>,
    pub script: Arc<Script>,
}

impl ScriptedPlatform {
    pub fn new(count: usize) -> Self {
        Self::with_memory(&vec![1 << 30; count])
    }

    pub fn with_memory(memory: &[u64]) -> Self {
        let devices = memory
            .iter()
            .enumerate()
            .map(|(index, &memory_bytes)| DeviceDescriptor {
                index,
                name: format!("scripted #{}", index),
                kind: DeviceKind::Gpu,
                memory_bytes,
                compute_units: 1,
            })
            .collect();
        Self {
            devices,
            script: Arc::new(Script::default()),
        }
    }
}

impl DevicePlatform for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted"
    }

    fn num_devices(&self) -> usize {
        self.devices.len()
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.clone()
    }

    fn platform_info(&self) -> String {
        format!("scripted platform with {} devices", self.devices.len())
    }

    fn open(&self, index: usize) -> Result<Box<dyn SearchDevice>> {
        if index >= self.devices.len() {
            bail!("no scripted device {}", index);
        }
        Ok(Box::new(ScriptedDevice {
            index,
            name: self.devices[index].name.clone(),
            script: self.script.clone(),
            dataset: None,
            throttle: 0,
        }))
    }
}

pub struct ScriptedDevice {
    index: usize,
    name: String,
    script: Arc<Script>,
    dataset: Option<Arc<FullDataset>>,
    throttle: u8,
}

impl SearchDevice for ScriptedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, dataset: Arc<FullDataset>) -> Result<()> {
        self.script.push(Event::InitStarted(self.index));
        let delay = *self.script.init_delay.lock().unwrap();
        thread::sleep(delay);

        let fail = {
            let mut failures = self.script.init_failures.lock().unwrap();
            match failures.get_mut(&self.index) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            self.script.push(Event::InitFailed(self.index));
            bail!("scripted init failure on device {}", self.index);
        }

        self.dataset = Some(dataset);
        self.script.push(Event::InitFinished(self.index));
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
        let Some(dataset) = self.dataset.as_ref() else {
            bail!("device {} searched without a dataset", self.index);
        };
        self.script.push(Event::Search {
            device: self.index,
            header: *header_hash,
            seed: *dataset.seed_hash(),
            start_nonce,
            partitioned,
            target,
            throttle: self.throttle,
        });

        let nonces = self
            .script
            .nonces
            .lock()
            .unwrap()
            .remove(&self.index)
            .unwrap_or_default();
        if !nonces.is_empty() && hook.found(&nonces) {
            return Ok(());
        }
        loop {
            if hook.searched(16, u64::MAX, u64::MAX) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn set_throttle(&mut self, percent: u8) {
        self.throttle = percent;
    }

    fn export_dag(&self, _tag: &str, _store: &DagFileManager) -> Result<PathBuf> {
        bail!("scripted devices do not export")
    }
}

/// Hash values chosen per nonce; anything unscripted hashes to all ones
#[derive(Default)]
pub struct ScriptedEvaluator {
    values: Mutex<HashMap<u64, H256>>,
}

impl ScriptedEvaluator {
    pub fn with(values: &[(u64, H256)]) -> Self {
        Self {
            values: Mutex::new(values.iter().copied().collect()),
        }
    }
}

impl PowEvaluator for ScriptedEvaluator {
    fn eval(&self, _seed_hash: &H256, _header_hash: &H256, nonce: u64) -> PowResult {
        let value = self
            .values
            .lock()
            .unwrap()
            .get(&nonce)
            .copied()
            .unwrap_or([0xFF; 32]);
        PowResult {
            value,
            mix_hash: [nonce as u8; 32],
        }
    }
}

/// 32-byte hash starting with `prefix`, zero padded
pub fn hash_with_prefix(prefix: &[u8]) -> H256 {
    let mut hash = [0u8; 32];
    hash[..prefix.len()].copy_from_slice(prefix);
    hash
}

/// Settings with a dataset small enough to build instantly
pub fn small_settings() -> FarmSettings {
    FarmSettings {
        light_items: 16,
        full_items: 64,
        batch_size: 64,
        ..FarmSettings::default()
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout` passes
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
