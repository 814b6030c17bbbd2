// Ethash Farm - Free and Open Source Software Statement
//
// File: src/miner/backend/opencl/engine.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// OpenCL search driver. The search kernel is loaded from the path in the
// farm settings and must export `ethash_search` with the arguments
//   (const uint* dag, const ulong* header, ulong start_nonce, ulong target,
//    uint dag_items, ulong* output)
// where output[0] is the candidate count, output[1] the upper 64 hash bits
// of start_nonce, and output[2..] the candidate nonces. A candidate's upper
// 64 hash bits are strictly below target.

use super::device::OpenClDevice;
use crate::core::ethash::{FullDataset, ITEM_BYTES};
use crate::core::types::H256;
use crate::miner::backend::SearchDevice;
use crate::miner::dag_file::{DagFileManager, DagFileMetadata};
use crate::miner::hook::SearchCallbacks;
use crate::utils::format::FormatUtils;
use anyhow::{Error, Result, anyhow};
use log::{debug, error, info};
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    kernel::{ExecuteKernel, Kernel},
    memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE},
    program::Program,
    types::{CL_TRUE, cl_uint, cl_ulong},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fs, ptr};

const LOG_TARGET: &str = "ethash_farm::opencl::engine";
const KERNEL_NAME: &str = "ethash_search";
const MAX_OUTPUTS: usize = 14;
const OUTPUT_LEN: usize = MAX_OUTPUTS + 2;
const MAX_THROTTLE_PAUSE: Duration = Duration::from_millis(500);

struct DeviceState {
    // Kept alive for the kernel
    _program: Program,
    _context: Context,
    kernel: Kernel,
    queue: CommandQueue,
    dag: Buffer<cl_uint>,
    dag_words: usize,
    header: Buffer<cl_ulong>,
    output: Buffer<cl_ulong>,
}

pub struct OpenClSearchDevice {
    device: OpenClDevice,
    kernel_path: Option<PathBuf>,
    batch_size: u32,
    check_interval: u32,
    throttle: u8,
    state: Option<DeviceState>,
    dataset: Option<Arc<FullDataset>>,
}

impl OpenClSearchDevice {
    pub fn new(
        device: OpenClDevice,
        kernel_path: Option<PathBuf>,
        batch_size: u32,
        check_interval: u32,
    ) -> Self {
        debug!(target: LOG_TARGET, "Creating OpenCL search device for: {}", device.name);
        Self {
            device,
            kernel_path,
            batch_size,
            check_interval,
            throttle: 0,
            state: None,
            dataset: None,
        }
    }

    /// Global work size: the batch rounded up to whole work groups
    fn work_size(&self) -> usize {
        let local = (self.device.max_work_group_size / 4).clamp(64, 256);
        // Work groups are kept a multiple of 8 work items
        let local = (local / 8).max(1) * 8;
        let batch = self.batch_size.max(1) as usize;
        batch.div_ceil(local) * local
    }

    fn build_state(&self, dataset: &FullDataset) -> Result<DeviceState> {
        let kernel_path = self
            .kernel_path
            .as_ref()
            .ok_or_else(|| anyhow!("No OpenCL search kernel configured (opencl_kernel)"))?;
        let source = fs::read_to_string(kernel_path)
            .map_err(|e| Error::msg(format!("Failed to read kernel {:?}: {}", kernel_path, e)))?;

        let context = Context::from_device(self.device.device())
            .map_err(|e| Error::msg(format!("Failed to create context: {}", e)))?;

        let mut program = Program::create_from_source(&context, &source)
            .map_err(|e| Error::msg(format!("Failed to create program: {}", e)))?;
        if let Err(e) = program.build(context.devices(), "") {
            for device_id in context.devices() {
                if let Ok(log) = program.get_build_log(*device_id) {
                    error!(target: LOG_TARGET, "Build log for device {:?}: {}", device_id, log);
                }
            }
            return Err(Error::msg(format!("Program build failed: {}", e)));
        }

        let kernel = Kernel::create(&program, KERNEL_NAME)
            .map_err(|e| Error::msg(format!("Failed to create kernel: {}", e)))?;
        let queue = CommandQueue::create_default(&context, 0)
            .map_err(|e| Error::msg(format!("Failed to create command queue: {}", e)))?;

        let words: Vec<cl_uint> = dataset.items().iter().flatten().copied().collect();
        let mut dag = unsafe {
            Buffer::<cl_uint>::create(&context, CL_MEM_READ_ONLY, words.len(), ptr::null_mut())
                .map_err(|e| Error::msg(format!("Failed to allocate DAG buffer: {}", e)))?
        };
        unsafe {
            queue
                .enqueue_write_buffer(&mut dag, CL_TRUE, 0, &words, &[])
                .map_err(|e| Error::msg(format!("Failed to upload DAG: {}", e)))?;
        }

        let header = unsafe {
            Buffer::<cl_ulong>::create(&context, CL_MEM_READ_ONLY, 4, ptr::null_mut())
                .map_err(|e| Error::msg(format!("Failed to create header buffer: {}", e)))?
        };
        let output = unsafe {
            Buffer::<cl_ulong>::create(&context, CL_MEM_READ_WRITE, OUTPUT_LEN, ptr::null_mut())
                .map_err(|e| Error::msg(format!("Failed to create output buffer: {}", e)))?
        };

        Ok(DeviceState {
            _program: program,
            _context: context,
            kernel,
            queue,
            dag,
            dag_words: words.len(),
            header,
            output,
        })
    }
}

impl SearchDevice for OpenClSearchDevice {
    fn name(&self) -> &str {
        &self.device.name
    }

    fn init(&mut self, dataset: Arc<FullDataset>) -> Result<()> {
        // Release the previous epoch before allocating the next one
        self.state = None;
        let started = Instant::now();
        let state = self.build_state(&dataset)?;
        info!(target: LOG_TARGET,
            "✅ {} loaded DAG {} ({}) in {:.2}s",
            self.device.name,
            FormatUtils::short_hex(dataset.seed_hash()),
            FormatUtils::format_bytes(dataset.size_bytes() as u64),
            started.elapsed().as_secs_f64()
        );
        self.state = Some(state);
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
        let global = self.work_size();
        let throttle = self.throttle;
        let check_interval = self.check_interval as u64;
        let dag_items = self
            .dataset
            .as_ref()
            .map(|d| d.item_count() as cl_uint)
            .ok_or_else(|| anyhow!("{} has no dataset loaded", self.device.name))?;
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("{} is not initialised", self.device.name))?;

        let mut header_words = [0 as cl_ulong; 4];
        for (word, chunk) in header_words.iter_mut().zip(header_hash.chunks_exact(8)) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            *word = u64::from_le_bytes(bytes);
        }
        unsafe {
            state
                .queue
                .enqueue_write_buffer(&mut state.header, CL_TRUE, 0, &header_words, &[])
                .map_err(|e| Error::msg(format!("Failed to write header: {}", e)))?;
        }

        let mut nonce = if partitioned {
            start_nonce
        } else {
            start_nonce.wrapping_add(rand::random::<u64>())
        };
        let zeros = [0 as cl_ulong; OUTPUT_LEN];
        let mut batches: u64 = 0;
        let mut best = u64::MAX;

        loop {
            let started = Instant::now();
            let mut output = [0 as cl_ulong; OUTPUT_LEN];
            unsafe {
                state
                    .queue
                    .enqueue_write_buffer(&mut state.output, CL_TRUE, 0, &zeros, &[])
                    .map_err(|e| Error::msg(format!("Failed to clear output buffer: {}", e)))?;
                ExecuteKernel::new(&state.kernel)
                    .set_arg(&state.dag)
                    .set_arg(&state.header)
                    .set_arg(&nonce)
                    .set_arg(&target)
                    .set_arg(&dag_items)
                    .set_arg(&state.output)
                    .set_global_work_size(global)
                    .enqueue_nd_range(&state.queue)
                    .map_err(|e| Error::msg(format!("Failed to execute kernel: {}", e)))?;
            }
            state
                .queue
                .finish()
                .map_err(|e| Error::msg(format!("Failed to finish queue: {}", e)))?;
            unsafe {
                state
                    .queue
                    .enqueue_read_buffer(&state.output, CL_TRUE, 0, &mut output, &[])
                    .map_err(|e| Error::msg(format!("Failed to read output buffer: {}", e)))?;
            }

            let batch_start = nonce;
            nonce = nonce.wrapping_add(global as u64);
            batches += 1;
            let count = (output[0] as usize).min(MAX_OUTPUTS);
            let sample = output[1];
            best = best.min(sample);

            if count > 0 && hook.found(&output[2..2 + count]) {
                return Ok(());
            }
            if check_interval > 0 && batches % check_interval == 0 {
                hook.check_hash(sample, batch_start, header_hash);
            }
            if hook.searched(global as u32, sample, best) {
                return Ok(());
            }

            if throttle > 0 {
                let pause = started
                    .elapsed()
                    .mul_f64(throttle as f64 / (100 - throttle) as f64);
                std::thread::sleep(pause.min(MAX_THROTTLE_PAUSE));
            }
        }
    }

    fn set_throttle(&mut self, percent: u8) {
        self.throttle = percent.min(99);
    }

    /// Reads the DAG back from device memory and writes it out
    fn export_dag(&self, tag: &str, store: &DagFileManager) -> Result<PathBuf> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| anyhow!("{} has no DAG resident", self.device.name))?;
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| anyhow!("{} has no dataset loaded", self.device.name))?;

        let mut words = vec![0 as cl_uint; state.dag_words];
        unsafe {
            state
                .queue
                .enqueue_read_buffer(&state.dag, CL_TRUE, 0, &mut words, &[])
                .map_err(|e| Error::msg(format!("Failed to read DAG buffer: {}", e)))?;
        }
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let metadata = DagFileMetadata::new(
            dataset.seed_hash(),
            dataset.item_count() as u64,
            ITEM_BYTES as u32,
            self.device.name.clone(),
        );
        Ok(store.save(tag, &metadata, &bytes)?)
    }
}
