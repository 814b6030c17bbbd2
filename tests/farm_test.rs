// Ethash Farm - Free and Open Source Software Statement
//
// This project, ethash-farm, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: tests/farm_test.rs
// Version: 1.0.0
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file contains integration tests for the farm, located in the tests
// directory. It drives miners over a scripted device platform and checks
// device selection, DAG load ordering, nonce partitioning, work restarts,
// failure recovery and shutdown.
//
// Tree Location:
// - tests/farm_test.rs (farm integration tests)
// - Depends on: ethash-farm, tests/common

mod common;

#[cfg(test)]
mod tests {
    use super::common::{Event, Script, ScriptedPlatform, small_settings, wait_until};
    use ethash_farm::core::config::DagLoadMode;
    use ethash_farm::core::types::{WorkPackage, partition_start_nonce};
    use ethash_farm::miner::MinerState;
    use ethash_farm::{Farm, FarmError};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn work(header: u8, seed: u8) -> WorkPackage {
        WorkPackage::new([header; 32], [seed; 32], [0x00; 32])
    }

    fn init_events(script: &Script) -> Vec<Event> {
        script
            .events()
            .into_iter()
            .filter(|e| !matches!(e, Event::Search { .. }))
            .collect()
    }

    fn in_index_order(count: usize) -> Vec<Event> {
        (0..count)
            .flat_map(|i| [Event::InitStarted(i), Event::InitFinished(i)])
            .collect()
    }

    fn sequential_farm(devices: usize, init_delay: Duration) -> (Farm, Arc<Script>) {
        let platform = Arc::new(ScriptedPlatform::new(devices));
        let script = platform.script.clone();
        script.set_init_delay(init_delay);
        let mut settings = small_settings();
        settings.dag_load_mode = DagLoadMode::Sequential;
        let mut farm = Farm::new(settings, platform);
        assert!(farm.configure());
        (farm, script)
    }

    #[test]
    fn test_configure_rejects_out_of_range_device() {
        let platform = Arc::new(ScriptedPlatform::new(2));
        let mut settings = small_settings();
        settings.devices = vec![0, 3];
        let mut farm = Farm::new(settings, platform);

        assert!(!farm.configure());
        assert!(farm.miners().is_empty(), "No miner may be created for a bad index");
        assert!(matches!(
            farm.try_configure(),
            Err(FarmError::InvalidDeviceIndex { index: 3, available: 2 })
        ));
    }

    #[test]
    fn test_configure_without_devices_fails() {
        let platform = Arc::new(ScriptedPlatform::new(0));
        let mut farm = Farm::new(small_settings(), platform);

        assert!(matches!(farm.try_configure(), Err(FarmError::NoDevices { .. })));
        assert!(matches!(farm.start(), Err(FarmError::NotConfigured)));
    }

    #[test]
    fn test_configure_skips_devices_without_memory() {
        // 64 items of 64 bytes need 4096 bytes
        let platform = Arc::new(ScriptedPlatform::with_memory(&[1024, 1 << 20, 1 << 20]));
        let mut farm = Farm::new(small_settings(), platform);

        assert!(farm.configure());
        let devices: Vec<usize> = farm.miners().iter().map(|m| m.device_index()).collect();
        assert_eq!(devices, vec![1, 2]);
        let indices: Vec<usize> = farm.miners().iter().map(|m| m.index()).collect();
        assert_eq!(indices, vec![0, 1]);

        let platform = Arc::new(ScriptedPlatform::with_memory(&[1024]));
        let mut farm = Farm::new(small_settings(), platform);
        assert!(!farm.configure());
        assert!(matches!(
            farm.try_configure(),
            Err(FarmError::InsufficientMemory { required: 4096 })
        ));
    }

    #[test]
    fn test_duplicate_device_requests_are_merged() {
        let platform = Arc::new(ScriptedPlatform::new(3));
        let mut settings = small_settings();
        settings.devices = vec![2, 0, 2];
        let mut farm = Farm::new(settings, platform);

        assert!(farm.configure());
        let devices: Vec<usize> = farm.miners().iter().map(|m| m.device_index()).collect();
        assert_eq!(devices, vec![2, 0]);
    }

    #[test]
    fn test_sequential_dag_load_runs_in_index_order() {
        let platform = Arc::new(ScriptedPlatform::new(3));
        let script = platform.script.clone();
        script.set_init_delay(Duration::from_millis(30));
        let mut settings = small_settings();
        settings.dag_load_mode = DagLoadMode::Sequential;
        let mut farm = Farm::new(settings, platform);
        assert!(farm.configure());

        farm.start().unwrap();
        farm.set_work(work(1, 1));
        assert!(wait_until(TIMEOUT, || script.searches_for(2).len() == 1));

        let loads: Vec<Event> = script
            .events()
            .into_iter()
            .filter(|e| !matches!(e, Event::Search { .. }))
            .collect();
        assert_eq!(
            loads,
            vec![
                Event::InitStarted(0),
                Event::InitFinished(0),
                Event::InitStarted(1),
                Event::InitFinished(1),
                Event::InitStarted(2),
                Event::InitFinished(2),
            ]
        );
        assert_eq!(farm.dag_load_index(), 3);
        farm.stop();
    }

    #[test]
    fn test_sequential_order_holds_when_an_epoch_returns() {
        let (farm, script) = sequential_farm(3, Duration::from_millis(50));
        farm.start().unwrap();

        // Epoch 1, then 2, then back to 1
        for (round, (header, seed)) in [(1u8, 1u8), (2, 2), (3, 1)].into_iter().enumerate() {
            farm.set_work(work(header, seed));
            let loads = 3 * (round as u64 + 1);
            assert!(wait_until(TIMEOUT, || farm.dag_load_index() == loads));
        }

        let events = init_events(&script);
        assert_eq!(events.len(), 18);
        for (round, chunk) in events.chunks(6).enumerate() {
            assert_eq!(chunk, in_index_order(3).as_slice(), "round {}", round + 1);
        }
        assert!(wait_until(TIMEOUT, || script
            .searches_for(2)
            .last()
            .is_some_and(|e| matches!(e, Event::Search { seed, .. } if *seed == [1u8; 32]))));
        farm.stop();
    }

    #[test]
    fn test_failed_load_mid_round_releases_later_miners() {
        let (farm, script) = sequential_farm(3, Duration::from_millis(20));
        script.fail_inits(1, 1);
        farm.start().unwrap();
        farm.set_work(work(1, 1));

        assert!(wait_until(TIMEOUT, || script.count(&Event::InitFinished(1)) == 1));
        assert_eq!(
            init_events(&script),
            vec![
                Event::InitStarted(0),
                Event::InitFinished(0),
                Event::InitStarted(1),
                Event::InitFailed(1),
                Event::InitStarted(2),
                Event::InitFinished(2),
                // Retry after the failure delay
                Event::InitStarted(1),
                Event::InitFinished(1),
            ]
        );
        assert_eq!(farm.miners()[1].stats().device_errors.load(Ordering::Relaxed), 1);
        assert!(wait_until(TIMEOUT, || !script.searches_for(1).is_empty()));
        farm.stop();
    }

    #[test]
    fn test_empty_work_between_same_epoch_keeps_datasets() {
        let (farm, script) = sequential_farm(2, Duration::ZERO);
        farm.start().unwrap();
        farm.set_work(work(1, 1));
        assert!(wait_until(TIMEOUT, || farm.dag_load_index() == 2));

        farm.set_work(WorkPackage::default());
        farm.set_work(work(2, 1));
        assert!(wait_until(TIMEOUT, || {
            (0..2).all(|i| {
                script
                    .searches_for(i)
                    .iter()
                    .any(|e| matches!(e, Event::Search { header, .. } if *header == [2u8; 32]))
            })
        }));
        assert_eq!(farm.dag_load_index(), 2);
        assert_eq!(init_events(&script), in_index_order(2));
        farm.stop();
    }

    #[test]
    fn test_reports_for_unknown_devices_stay_bounded() {
        let platform = Arc::new(ScriptedPlatform::new(1));
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());

        farm.report_hash_fault(5_000_000);
        farm.report_close_hit(0x10, 1.0, usize::MAX);
        assert_eq!(farm.stats().devices().len(), 1);
        let totals = farm.stats().totals();
        assert_eq!(totals.hash_faults, 1);
        assert_eq!(totals.close_hits, 1);
        assert_eq!(farm.miners()[0].stats().hash_faults.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_reconfigure_sizes_stats_to_miners() {
        let platform = Arc::new(ScriptedPlatform::new(3));
        let mut settings = small_settings();
        settings.devices = vec![0, 2];
        let mut farm = Farm::new(settings, platform);
        assert!(farm.configure());
        assert_eq!(farm.stats().devices().len(), 2);

        farm.report_hash_fault(1);
        let stats = farm.stats().device(1).unwrap();
        assert!(Arc::ptr_eq(&stats, &farm.miners()[1].stats()));
        assert_eq!(stats.hash_faults.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stop_racing_set_work_leaves_miners_stopped() {
        let platform = Arc::new(ScriptedPlatform::new(3));
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());
        let farm = Arc::new(farm);

        for round in 0..20u8 {
            farm.start().unwrap();
            farm.set_work(work(round, 1));
            let publisher = {
                let farm = farm.clone();
                std::thread::spawn(move || farm.set_work(work(round.wrapping_add(100), 1)))
            };
            farm.stop();
            publisher.join().unwrap();

            assert!(!farm.is_started());
            for miner in farm.miners() {
                assert_ne!(miner.state(), MinerState::Working, "round {}", round);
            }
        }
    }

    #[test]
    fn test_partitioned_work_gives_each_device_its_own_range() {
        let platform = Arc::new(ScriptedPlatform::new(4));
        let script = platform.script.clone();
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());

        let base = 0xAB00_0000_0000_0000u64;
        farm.start().unwrap();
        farm.set_work(work(1, 1).with_nonce_range(base, 8));
        assert!(wait_until(TIMEOUT, || (0..4).all(|d| !script.searches_for(d).is_empty())));

        for device in 0..4 {
            match &script.searches_for(device)[0] {
                Event::Search { start_nonce, partitioned, .. } => {
                    assert!(*partitioned);
                    assert_eq!(*start_nonce, partition_start_nonce(base, 8, device));
                    assert_eq!(*start_nonce >> 56, 0xAB, "Extra-nonce bits are preserved");
                    assert_eq!((*start_nonce >> 52) & 0xF, device as u64);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        farm.stop();
    }

    #[test]
    fn test_unpartitioned_work_shares_the_base_nonce() {
        let platform = Arc::new(ScriptedPlatform::new(2));
        let script = platform.script.clone();
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());

        farm.start().unwrap();
        let mut package = work(1, 1);
        package.start_nonce = 500;
        farm.set_work(package);
        assert!(wait_until(TIMEOUT, || (0..2).all(|d| !script.searches_for(d).is_empty())));

        for device in 0..2 {
            assert!(matches!(
                script.searches_for(device)[0],
                Event::Search { start_nonce: 500, partitioned: false, .. }
            ));
        }
        farm.stop();
    }

    #[test]
    fn test_search_target_is_the_larger_of_close_hit_and_boundary() {
        let platform = Arc::new(ScriptedPlatform::new(1));
        let script = platform.script.clone();
        let mut settings = small_settings();
        settings.close_hit_threshold = 0x0001_0000_0000_0000;
        let mut farm = Farm::new(settings, platform);
        assert!(farm.configure());
        farm.start().unwrap();

        let mut boundary = [0u8; 32];
        boundary[2] = 0xFF;
        farm.set_work(WorkPackage::new([1; 32], [1; 32], boundary));
        assert!(wait_until(TIMEOUT, || script.searches_for(0).len() == 1));
        assert!(matches!(
            script.searches_for(0)[0],
            Event::Search { target: 0x0001_0000_0000_0000, .. }
        ));

        let mut boundary = [0u8; 32];
        boundary[1] = 0xFF;
        farm.set_work(WorkPackage::new([2; 32], [1; 32], boundary));
        assert!(wait_until(TIMEOUT, || script.searches_for(0).len() == 2));
        assert!(matches!(
            script.searches_for(0)[1],
            Event::Search { target: 0x00FF_0000_0000_0000, .. }
        ));
        farm.stop();
    }

    #[test]
    fn test_set_work_restarts_miners_and_reuses_dataset() {
        let platform = Arc::new(ScriptedPlatform::new(2));
        let script = platform.script.clone();
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());
        farm.start().unwrap();

        farm.set_work(work(1, 1));
        assert!(wait_until(TIMEOUT, || (0..2).all(|d| script.searches_for(d).len() == 1)));

        // Same epoch: new header, no reload
        farm.set_work(work(2, 1));
        assert!(wait_until(TIMEOUT, || (0..2).all(|d| script.searches_for(d).len() == 2)));
        for device in 0..2 {
            assert!(matches!(
                script.searches_for(device)[1],
                Event::Search { header, .. } if header == [2; 32]
            ));
            assert_eq!(script.count(&Event::InitFinished(device)), 1);
            assert_eq!(farm.miners()[device].work().header_hash, [2; 32]);
        }

        // New epoch: every miner reloads
        farm.set_work(work(3, 9));
        assert!(wait_until(TIMEOUT, || (0..2).all(|d| script.searches_for(d).len() == 3)));
        for device in 0..2 {
            assert_eq!(script.count(&Event::InitFinished(device)), 2);
            assert!(matches!(
                script.searches_for(device)[2],
                Event::Search { seed, .. } if seed == [9; 32]
            ));
        }
        assert_eq!(farm.datasets().full_builds(), 2, "Each epoch is built once");
        farm.stop();
    }

    #[test]
    fn test_empty_work_pauses_miners() {
        let platform = Arc::new(ScriptedPlatform::new(2));
        let script = platform.script.clone();
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());
        farm.start().unwrap();

        farm.set_work(work(1, 1));
        assert!(wait_until(TIMEOUT, || farm.is_mining()));
        farm.set_work(WorkPackage::default());

        assert!(!farm.is_mining());
        for miner in farm.miners() {
            assert_eq!(miner.state(), MinerState::Paused);
        }
        let searches = script.events().len();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(script.events().len(), searches);
        farm.stop();
    }

    #[test]
    fn test_device_failure_is_retried_without_affecting_others() {
        let platform = Arc::new(ScriptedPlatform::new(2));
        let script = platform.script.clone();
        script.fail_inits(0, 1);
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());
        farm.start().unwrap();

        farm.set_work(work(1, 1));
        assert!(wait_until(TIMEOUT, || script.searches_for(1).len() == 1));
        assert!(wait_until(TIMEOUT, || script.searches_for(0).len() == 1));

        assert_eq!(script.count(&Event::InitFailed(0)), 1);
        assert_eq!(script.count(&Event::InitFinished(0)), 1);
        assert_eq!(script.count(&Event::InitFailed(1)), 0);
        let stats = farm.miners()[0].stats();
        assert_eq!(stats.device_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.dag_loads.load(Ordering::Relaxed), 1);
        farm.stop();
    }

    #[test]
    fn test_stop_pauses_every_miner() {
        let platform = Arc::new(ScriptedPlatform::new(3));
        let script = platform.script.clone();
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());
        farm.start().unwrap();
        farm.set_work(work(1, 1));
        assert!(wait_until(TIMEOUT, || (0..3).all(|d| script.searches_for(d).len() == 1)));
        assert!(farm.is_mining());

        farm.stop();

        assert!(!farm.is_mining());
        assert!(!farm.is_started());
        for miner in farm.miners() {
            assert_eq!(miner.state(), MinerState::Paused);
        }
        let events = script.events().len();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(script.events().len(), events, "No search after stop");

        // Work published while stopped is only picked up on start
        farm.set_work(work(2, 1));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(script.events().len(), events);
        farm.start().unwrap();
        assert!(wait_until(TIMEOUT, || (0..3).all(|d| script.searches_for(d).len() == 2)));
        farm.stop();
    }

    #[test]
    fn test_throttle_applies_only_while_mining() {
        let platform = Arc::new(ScriptedPlatform::new(1));
        let script = platform.script.clone();
        let mut settings = small_settings();
        settings.throttle = 10;
        let mut farm = Farm::new(settings, platform);
        assert!(farm.configure());

        farm.set_throttle(50);
        assert_eq!(farm.miners()[0].throttle(), 10);

        farm.start().unwrap();
        farm.set_work(work(1, 1));
        assert!(wait_until(TIMEOUT, || script.searches_for(0).len() == 1));
        assert!(matches!(script.searches_for(0)[0], Event::Search { throttle: 10, .. }));

        farm.set_throttle(30);
        assert_eq!(farm.miners()[0].throttle(), 30);
        farm.set_work(work(2, 1));
        assert!(wait_until(TIMEOUT, || script.searches_for(0).len() == 2));
        assert!(matches!(script.searches_for(0)[1], Event::Search { throttle: 30, .. }));
        farm.stop();
    }

    #[test]
    fn test_kick_off_is_idempotent_and_pause_is_repeatable() {
        let platform = Arc::new(ScriptedPlatform::new(1));
        let script = platform.script.clone();
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());
        farm.set_work(work(1, 1));
        farm.start().unwrap();

        let miner = &farm.miners()[0];
        assert!(wait_until(TIMEOUT, || script.searches_for(0).len() == 1));
        miner.kick_off();
        assert_eq!(miner.state(), MinerState::Working);

        miner.pause();
        miner.pause();
        assert_eq!(miner.state(), MinerState::Paused);

        miner.kick_off();
        assert!(wait_until(TIMEOUT, || script.searches_for(0).len() == 2));
        farm.stop();
    }

    #[test]
    fn test_reset_stats_clears_counters() {
        let platform = Arc::new(ScriptedPlatform::new(2));
        let mut farm = Farm::new(small_settings(), platform);
        assert!(farm.configure());

        farm.report_hash_fault(1);
        farm.report_close_hit(0x10, 1.5, 0);
        assert_eq!(farm.stats().totals().hash_faults, 1);
        assert_eq!(farm.stats().totals().close_hits, 1);

        farm.reset_stats();
        assert_eq!(farm.stats().totals().hash_faults, 0);
        assert_eq!(farm.stats().totals().close_hits, 0);
    }
}

// Changelog:
// - v1.0.0 (2026-10-12): Farm integration tests over scripted devices.
//   - Added returning-epoch and mid-round failure load ordering tests.
//   - Added bounded per-device stats and stop/set_work race tests.
