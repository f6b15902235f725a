#[cfg(test)]
mod stress_tests {
    use splitorder_core::DeferredGuard;
    use splitorder_core::SplitOrderedConfig;
    use splitorder_core::common_tests::IdentityState;
    use splitorder_core::data_structures::SplitOrderedHashMap;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    // Type alias for cleaner test code
    type DeferredHashMap<K, V> = SplitOrderedHashMap<K, V, DeferredGuard>;

    #[test]
    fn test_stress_high_contention_single_key() {
        // Multiple threads hammering the same key
        let map: Arc<DeferredHashMap<usize, usize>> = Arc::new(SplitOrderedHashMap::new());
        let num_threads = 16;
        let ops_per_thread = 20_000;
        let key = 42;

        let handles: Vec<_> = (0..num_threads)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..ops_per_thread {
                        // Alternate between put and delete to maximize contention
                        if i % 2 == 0 {
                            map.put(key, t * 1_000_000 + i);
                        } else {
                            map.delete(&key);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(map.len() <= 1);
        assert_eq!(map.len(), map.to_vec().len());
        assert_eq!(map.verify(), Ok(()));
    }

    #[test]
    fn test_stress_thundering_herd() {
        // All threads start exactly at the same time
        let map: Arc<DeferredHashMap<usize, usize>> = Arc::new(SplitOrderedHashMap::new());
        let num_threads = 32;
        let barrier = Arc::new(Barrier::new(num_threads));
        let ops_per_thread = 5000;

        let handles: Vec<_> = (0..num_threads)
            .map(|t| {
                let map = Arc::clone(&map);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();

                    for i in 0..ops_per_thread {
                        let key = (t * ops_per_thread + i) % 1000; // Constrain to 1000 keys
                        match i % 4 {
                            0 => {
                                map.put(key, key * 2);
                            }
                            1 => {
                                if let Some(value) = map.get(&key) {
                                    assert!(value == key * 2 || value == key * 3);
                                }
                            }
                            2 => {
                                map.put_if_present(&key, &(key * 2), key * 3);
                            }
                            3 => {
                                map.delete(&key);
                            }
                            _ => unreachable!(),
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(map.len() <= 1000);
        assert_eq!(map.len(), map.to_vec().len());
        assert_eq!(map.verify(), Ok(()));
    }

    #[test]
    fn test_stress_reads_during_growth() {
        // Stable keys must stay visible while writers grow the table under them
        let map: Arc<SplitOrderedHashMap<u32, u32, DeferredGuard, IdentityState>> =
            Arc::new(SplitOrderedHashMap::with_hasher(IdentityState::default()));
        for i in 0..64 {
            map.put(i, i);
        }
        let start_exponent = map.exponent();
        let stop = Arc::new(AtomicBool::new(false));
        let reads = Arc::new(AtomicUsize::new(0));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let map = Arc::clone(&map);
                let stop = Arc::clone(&stop);
                let reads = Arc::clone(&reads);
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        for i in 0..64 {
                            assert_eq!(map.get(&i), Some(i), "stable key {i} lost");
                        }
                        reads.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        let writers: Vec<_> = (0..4u32)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..50_000u32 {
                        let key = 64 + t * 50_000 + i;
                        map.put(key, key);
                    }
                })
            })
            .collect();

        for handle in writers {
            handle.join().unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        for handle in readers {
            handle.join().unwrap();
        }

        assert!(map.exponent() > start_exponent);
        assert!(reads.load(Ordering::Relaxed) > 0);
        assert_eq!(map.len(), 64 + 4 * 50_000);
        assert_eq!(map.verify(), Ok(()));
    }

    #[test]
    fn test_stress_rapid_growth() {
        let config = SplitOrderedConfig::default().with_load_factor(0.25);
        let map: Arc<SplitOrderedHashMap<usize, usize, DeferredGuard>> =
            Arc::new(SplitOrderedHashMap::with_config(config).unwrap());
        let num_threads = 8;
        let num_insertions = 5_000;

        let handles: Vec<_> = (0..num_threads)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..num_insertions {
                        let key = t * num_insertions + i;
                        map.put(key, key * key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(map.len(), num_threads * num_insertions);
        for i in 0..(num_threads * num_insertions) {
            assert_eq!(map.get(&i), Some(i * i));
        }
        assert_eq!(map.verify(), Ok(()));
    }

    #[test]
    fn test_stress_long_running_chaos() {
        let map: Arc<DeferredHashMap<usize, usize>> = Arc::new(SplitOrderedHashMap::new());
        let stop = Arc::new(AtomicBool::new(false));
        let operations = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                let stop = Arc::clone(&stop);
                let operations = Arc::clone(&operations);
                thread::spawn(move || {
                    let mut i: usize = 0;
                    while !stop.load(Ordering::Relaxed) {
                        let key = (t * 7919 + i * 31) % 10_000;
                        match i % 5 {
                            0 | 1 => {
                                map.put(key, i);
                            }
                            2 => {
                                map.put_if_absent(key, i);
                            }
                            3 => {
                                let _ = map.get(&key);
                            }
                            _ => {
                                map.delete(&key);
                            }
                        }
                        i += 1;
                        operations.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(500));
        stop.store(true, Ordering::Relaxed);
        for handle in handles {
            handle.join().unwrap();
        }

        println!(
            "Chaos test completed after {:?}, {} operations, final size {}",
            start.elapsed(),
            operations.load(Ordering::Relaxed),
            map.len()
        );
        assert!(map.len() <= 10_000);
        assert_eq!(map.len(), map.to_vec().len());
        assert_eq!(map.verify(), Ok(()));
    }
}

#[cfg(test)]
mod scenario_tests {
    use rstest::rstest;
    use serial_test::serial;
    use splitorder_core::DeferredGuard;
    use splitorder_core::common_tests::hash_map_tests::*;

    #[test]
    fn put_then_get() {
        test_put_get::<DeferredGuard>();
    }

    #[test]
    fn put_delete() {
        test_put_delete::<DeferredGuard>();
    }

    #[test]
    fn idempotent_delete() {
        test_idempotent_delete::<DeferredGuard>();
    }

    #[test]
    fn put_if_present() {
        test_put_if_present::<DeferredGuard>();
    }

    #[test]
    fn put_if_absent() {
        test_put_if_absent::<DeferredGuard>();
    }

    #[test]
    fn none_values() {
        test_none_values::<DeferredGuard>();
    }

    #[test]
    fn each() {
        test_each::<DeferredGuard>();
    }

    #[test]
    fn growth_keeps_sentinels() {
        test_growth_keeps_sentinels::<DeferredGuard>();
    }

    #[rstest]
    #[serial(stress_tests)]
    #[case::small(10_000, 2)]
    #[case::million_keys(1_000_000, 4)]
    fn concurrent_insert_all(#[case] num_keys: u32, #[case] num_threads: u32) {
        test_concurrent_insert_all::<DeferredGuard>(num_keys, num_threads);
    }

    #[test]
    #[serial(stress_tests)]
    fn concurrent_put_same_key() {
        test_concurrent_put_same_key::<DeferredGuard>();
    }

    #[test]
    #[serial(stress_tests)]
    fn put_delete_race() {
        test_put_delete_race::<DeferredGuard>();
    }

    #[test]
    #[serial(stress_tests)]
    fn concurrent_put_if_absent() {
        test_concurrent_put_if_absent::<DeferredGuard>();
    }

    #[test]
    #[serial(stress_tests)]
    fn put_if_present_counter() {
        test_put_if_present_counter::<DeferredGuard>();
    }

    #[rstest]
    #[serial(stress_tests)]
    #[case::two_fiddlers(2, 10_000)]
    #[case::eight_fiddlers(8, 5_000)]
    fn concurrent_fiddle(#[case] num_threads: usize, #[case] keys_per_thread: usize) {
        test_concurrent_fiddle::<DeferredGuard>(num_threads, keys_per_thread);
    }

    #[test]
    #[serial(stress_tests)]
    fn concurrent_colliding_hashes() {
        test_concurrent_colliding_hashes::<DeferredGuard>();
    }
}
