//! Common tests for `SortedList`, generic over the reclamation guard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;

use crate::data_structures::SortedList;
use crate::guard::Guard;

/// Push prepends, pop takes from the front.
pub fn test_push_pop_stack<G: Guard>() {
    let list: SortedList<String, G> = SortedList::new();
    let words = ["plur", "knap", "hehu", "blar"];

    for (pushed, word) in words.iter().enumerate() {
        list.push(word.to_string());
        assert_eq!(list.len(), pushed + 1);

        let expected: Vec<String> = words[..=pushed].iter().rev().map(|w| w.to_string()).collect();
        assert_eq!(list.to_vec(), expected);
    }

    for word in words.iter().rev() {
        assert_eq!(list.pop().as_deref(), Some(*word));
    }
    assert_eq!(list.pop(), None);
    assert!(list.is_empty());
}

/// Threads push random values and then pop as many, every pop must succeed.
pub fn test_concurrent_push_pop<G: Guard + 'static>() {
    let list: Arc<SortedList<u64, G>> = Arc::new(SortedList::new());
    let num_threads = 4;
    let operations_per_thread = 10_000;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let list = Arc::clone(&list);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::rng();
                barrier.wait();
                for _ in 0..operations_per_thread {
                    list.push(rng.random());
                }
                for _ in 0..operations_per_thread {
                    assert!(list.pop().is_some(), "pop on a list that cannot be empty");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(list.is_empty());
    assert_eq!(list.len(), 0);
}

/// Threads inject values ordered before the fixed 3 4 5 7 8 9 run and pop
/// them again, while the main thread searches the fixed run.
///
/// Every value injected must be popped exactly as many times.
pub fn test_concurrent_inject_and_search<G: Guard + 'static>() {
    let list: Arc<SortedList<i64, G>> = Arc::new(SortedList::new());
    for v in [3, 5, 9, 7, 4, 8] {
        list.inject(v);
    }
    assert_eq!(list.to_vec(), vec![3, 4, 5, 7, 8, 9]);

    let num_threads = 4;
    let operations_per_thread = 1000;

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                let mut rng = rand::rng();
                let mut injected = Vec::with_capacity(operations_per_thread);
                let mut removed = Vec::with_capacity(operations_per_thread);
                for _ in 0..operations_per_thread {
                    let v = -rng.random_range(0..i64::MAX);
                    list.inject(v);
                    injected.push(v);
                    assert_eq!(list.verify(), Ok(()));
                }
                for _ in 0..operations_per_thread {
                    removed.push(list.pop().expect("injected values left to pop"));
                }
                (injected, removed)
            })
        })
        .collect();

    for _ in 0..100 {
        let hit = list.search(&1);
        assert_eq!((hit.found, hit.after), (None, Some(3)));
        let hit = list.search(&3);
        assert_eq!((hit.found, hit.after), (Some(3), Some(4)));

        let expected = [
            (4, Some(3), Some(4), Some(5)),
            (5, Some(4), Some(5), Some(7)),
            (6, Some(5), None, Some(7)),
            (7, Some(5), Some(7), Some(8)),
            (8, Some(7), Some(8), Some(9)),
            (9, Some(8), Some(9), None),
            (10, Some(9), None, None),
            (11, Some(9), None, None),
        ];
        for (key, before, found, after) in expected {
            let hit = list.search(&key);
            assert_eq!((hit.before, hit.found, hit.after), (before, found, after), "search {key}");
        }
    }

    let mut injected: HashMap<i64, usize> = HashMap::new();
    let mut removed: HashMap<i64, usize> = HashMap::new();
    for handle in handles {
        let (ins, rem) = handle.join().unwrap();
        for v in ins {
            *injected.entry(v).or_default() += 1;
        }
        for v in rem {
            *removed.entry(v).or_default() += 1;
        }
    }

    assert_eq!(injected, removed);
    assert_eq!(list.to_vec(), vec![3, 4, 5, 7, 8, 9]);
    assert_eq!(list.verify(), Ok(()));
}

/// Many threads remove the same values, each value is removed once.
pub fn test_concurrent_remove_same_value<G: Guard + 'static>() {
    let list: Arc<SortedList<i32, G>> = Arc::new(SortedList::new());
    let num_values = 1000;
    for i in 0..num_values {
        list.inject(i);
    }

    let removed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let list = Arc::clone(&list);
            let removed = Arc::clone(&removed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..num_values {
                    if list.remove(&i).is_some() {
                        removed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(removed.load(Ordering::Relaxed), num_values as usize);
    assert!(list.is_empty());
    assert_eq!(list.len(), 0);
}

/// Stable even values stay visible while odd values churn around them.
pub fn test_find_during_modifications<G: Guard + 'static>() {
    let list: Arc<SortedList<i32, G>> = Arc::new(SortedList::new());
    for i in 0..500 {
        list.inject(i * 2);
    }

    let mut handles = Vec::new();

    for t in 0..4 {
        let list = Arc::clone(&list);
        handles.push(thread::spawn(move || {
            for round in 0..20 {
                for i in 0..250 {
                    let v = (t * 250 + i) * 2 + 1;
                    if round % 2 == 0 {
                        list.inject(v);
                    } else {
                        list.remove(&v);
                    }
                }
            }
        }));
    }

    for _ in 0..4 {
        let list = Arc::clone(&list);
        handles.push(thread::spawn(move || {
            for _ in 0..20 {
                for i in 0..500 {
                    assert!(list.contains(&(i * 2)), "lost stable value {}", i * 2);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Odd rounds removed what even rounds injected.
    assert_eq!(list.len(), 500);
    assert_eq!(list.to_vec(), (0..500).map(|i| i * 2).collect::<Vec<_>>());
    assert_eq!(list.verify(), Ok(()));
}
