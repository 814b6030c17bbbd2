// Ethash Farm - Free and Open Source Software Statement
//
// File: src/main.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// Self-contained farm controller: publishes work for one epoch, mines until
// the duration elapses or Ctrl-C, and republishes fresh work after every
// solution. Backends: --features cpu (default), --features opencl.

use anyhow::Result;
use clap::Parser;
use crossbeam::channel::RecvTimeoutError;
use ethash_farm::core::boundary::difficulty_from_boundary;
use ethash_farm::core::ethash::{epoch_tag, keccak256, seed_hash};
use ethash_farm::core::types::{Args, H256, WorkPackage};
use ethash_farm::miner::DevicePlatform;
use ethash_farm::utils::{FormatUtils, init_logging};
use ethash_farm::{Farm, FarmSettings};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(not(any(feature = "cpu", feature = "opencl")))]
compile_error!("Must enable a device backend: --features cpu or --features opencl");

const LOG_TARGET: &str = "ethash_farm::main";
const DASHBOARD_INTERVAL: Duration = Duration::from_secs(30);
const SOLUTION_POLL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(err) = args.validate() {
        eprintln!("❌ Error: {}", err);
        std::process::exit(1);
    }

    init_logging(args.log_level())?;

    let settings = load_settings(&args)?;
    let platform = build_platform(&args, &settings)?;

    if args.list_devices {
        return handle_list_devices(platform.as_ref());
    }

    let farm = Farm::new(settings, platform);
    if let Some(dir) = args.export_dag.clone() {
        return handle_export_dag(farm, args.block, dir).await;
    }
    handle_mining(farm, &args).await
}

fn load_settings(args: &Args) -> Result<FarmSettings> {
    let mut settings = match &args.config {
        Some(path) => FarmSettings::load(path)?,
        None => FarmSettings::default(),
    };
    settings.apply_args(args);
    settings.validate()?;
    Ok(settings)
}

fn build_platform(args: &Args, settings: &FarmSettings) -> Result<Arc<dyn DevicePlatform>> {
    #[cfg(feature = "opencl")]
    {
        if args.opencl {
            let platform = ethash_farm::OpenClPlatform::new(settings)?;
            return Ok(Arc::new(platform));
        }
    }
    default_platform(args, settings)
}

#[cfg(feature = "cpu")]
fn default_platform(args: &Args, settings: &FarmSettings) -> Result<Arc<dyn DevicePlatform>> {
    Ok(Arc::new(ethash_farm::CpuPlatform::new(
        args.device_threads(),
        settings,
    )))
}

#[cfg(not(feature = "cpu"))]
fn default_platform(_args: &Args, _settings: &FarmSettings) -> Result<Arc<dyn DevicePlatform>> {
    anyhow::bail!("CPU backend not compiled in; pass --opencl")
}

fn handle_list_devices(platform: &dyn DevicePlatform) -> Result<()> {
    println!("{}", platform.platform_info());
    let devices = platform.list_devices();
    if devices.is_empty() {
        println!("No {} devices found", platform.name());
    }
    for device in devices {
        println!("  {}", device.info_string());
    }
    Ok(())
}

async fn handle_export_dag(farm: Farm, block: u64, dir: PathBuf) -> Result<()> {
    info!(target: LOG_TARGET,
        "📦 Exporting DAG for block {} (epoch {})",
        block,
        epoch_tag(&seed_hash(block))
    );
    let path = tokio::task::spawn_blocking(move || farm.export_dag(block, dir)).await??;
    info!(target: LOG_TARGET, "✅ DAG exported to {}", path.display());
    Ok(())
}

/// Header for the `round`-th package mined at `block`
fn work_for(block: u64, seed: H256, boundary: H256, round: u64) -> WorkPackage {
    let header = keccak256(format!("ethash-farm|{}|{}", block, round).as_bytes());
    WorkPackage::new(header, seed, boundary).with_nonce_range(0, 0)
}

async fn handle_mining(mut farm: Farm, args: &Args) -> Result<()> {
    if !farm.configure() {
        eprintln!("❌ No usable devices; see the log above");
        std::process::exit(1);
    }
    let close_hit = farm.settings().close_hit_threshold;
    let farm = Arc::new(farm);

    let block = args.block;
    let seed = seed_hash(block);
    let boundary = args.work_boundary();
    info!(target: LOG_TARGET, "🚀 Starting Ethash farm");
    info!(target: LOG_TARGET, "🖥️ {}", farm.platform_info());
    info!(target: LOG_TARGET, "⛏️ Miners: {}", farm.miners().len());
    info!(target: LOG_TARGET, "🧱 Block {} (epoch {})", block, epoch_tag(&seed));
    info!(target: LOG_TARGET,
        "🎯 Difficulty: {} (boundary {})",
        FormatUtils::format_number(difficulty_from_boundary(&boundary)),
        FormatUtils::short_hex(&boundary)
    );

    farm.start()?;
    {
        let farm = farm.clone();
        tokio::task::spawn_blocking(move || farm.set_work(work_for(block, seed, boundary, 0))).await?;
    }

    // Solutions arrive on a crossbeam channel; republish after each one
    let shutdown = Arc::new(AtomicBool::new(false));
    let solver = {
        let farm = farm.clone();
        let shutdown = shutdown.clone();
        let solutions = farm.solutions();
        tokio::task::spawn_blocking(move || {
            let mut round = 0u64;
            while !shutdown.load(Ordering::SeqCst) {
                match solutions.recv_timeout(SOLUTION_POLL) {
                    Ok(solution) => {
                        info!(target: LOG_TARGET,
                            "💎 Solution: nonce {:#018x} mix {} from device {} (age {:?})",
                            solution.nonce,
                            hex::encode(solution.mix_hash),
                            solution.device_index,
                            solution.age()
                        );
                        round += 1;
                        farm.set_work(work_for(block, seed, boundary, round));
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
    };

    let mut dashboard = tokio::time::interval(DASHBOARD_INTERVAL);
    dashboard.tick().await;
    let deadline = async {
        if args.duration > 0 {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = dashboard.tick() => farm.stats().display_dashboard("farm", close_hit),
            _ = tokio::signal::ctrl_c() => {
                info!(target: LOG_TARGET, "🛑 Ctrl-C received, stopping farm");
                break;
            }
            _ = &mut deadline => {
                info!(target: LOG_TARGET, "⏱️ Mining duration elapsed");
                break;
            }
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = solver.await {
        error!(target: LOG_TARGET, "Solution loop failed: {}", e);
    }
    {
        let farm = farm.clone();
        tokio::task::spawn_blocking(move || farm.stop()).await?;
    }

    farm.stats().display_dashboard("final", close_hit);
    let totals = farm.stats().totals();
    info!(target: LOG_TARGET,
        "📊 Session complete: {} solutions, {} close hits, {} hash faults, {} hashes",
        totals.solutions,
        totals.close_hits,
        totals.hash_faults,
        FormatUtils::format_number(totals.hashes_computed)
    );
    Ok(())
}
