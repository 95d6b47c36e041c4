use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use optimistic_tree::OptimisticTree;

fn concurrency() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(8)
        * 2
}

/// Scatters `key` across the key space so that sequential loops do not
/// build a degenerate list-shaped tree. Injective for keys below 2^16.
fn scatter(key: u32) -> u32 {
    key.reverse_bits() >> 16
}

#[test]
fn concurrent_tree() {
    let n: u32 = 1024;
    let concurrency = concurrency();

    let run = |tree: OptimisticTree<u32, u32, 8>, barrier: &Barrier, low_bits| {
        let shift = concurrency.next_power_of_two().trailing_zeros();
        let unique_key = |key| (scatter(key) << shift) | low_bits;

        barrier.wait();
        for key in 0..n {
            let i = unique_key(key);
            assert_eq!(tree.search(&i), None);
            tree.insert(i, i);
            assert_eq!(tree.search(&i), Some(i), "failed to get key {i}");
        }
        for key in 0..n {
            let i = unique_key(key);
            assert_eq!(tree.search(&i), Some(i), "failed to get key {i}");
        }
        for key in 0..n {
            let i = unique_key(key);
            assert_eq!(tree.insert(i, !i), Some(i), "failed to overwrite key {i}");
        }
        for key in 0..n {
            let i = unique_key(key);
            assert_eq!(tree.remove(&i), Some(!i));
        }
        for key in 0..n {
            let i = unique_key(key);
            assert_eq!(tree.search(&i), None, "failed to remove key {i}");
        }
    };

    let tree = OptimisticTree::default();

    std::thread::scope(|s| {
        for _ in 0..8 {
            let barrier = Arc::new(Barrier::new(concurrency));
            let mut threads = vec![];
            for i in 0..concurrency {
                let tree_2 = tree.clone();
                let barrier_2 = barrier.clone();

                let thread = s.spawn(move || run(tree_2, &barrier_2, u32::try_from(i).unwrap()));
                threads.push(thread);
            }
            for thread in threads {
                thread.join().unwrap();
            }
        }
    });

    assert!(tree.is_empty());
}

#[test]
fn no_lost_inserts() {
    let n: u32 = 4096;
    let concurrency = concurrency();

    let tree = OptimisticTree::<u32, u32>::default();
    let barrier = Barrier::new(concurrency);

    std::thread::scope(|s| {
        for t in 0..concurrency {
            let tree = tree.clone();
            let barrier = &barrier;
            let t = u32::try_from(t).unwrap();
            let stride = u32::try_from(concurrency).unwrap();
            s.spawn(move || {
                barrier.wait();
                for key in (t..n).step_by(stride as usize) {
                    tree.insert(scatter(key), key);
                }
            });
        }
    });

    assert_eq!(tree.len(), n as usize);
    for key in 0..n {
        assert_eq!(tree.search(&scatter(key)), Some(key), "lost key {key}");
    }
}

#[test]
fn insert_remove_race() {
    let rounds: u32 = 2048;
    let stable = [4000, 2000, 6000, 1000, 3000, 5000, 7000];
    let tree = OptimisticTree::<u32, u32>::default();

    // a spread of stable keys, so that the raced key is not always the root
    for key in stable {
        tree.insert(key, key);
    }

    for round in 0..rounds {
        let mut key = (round * 7919) % 8000 + 1;
        if key % 1000 == 0 {
            key += 1;
        }
        let barrier = Barrier::new(2);

        std::thread::scope(|s| {
            let inserter = tree.clone();
            let remover = tree.clone();
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                inserter.insert(key, round);
            });
            s.spawn(move || {
                barrier.wait();
                remover.remove(&key);
            });
        });

        // either serialization is fine, but nothing else is
        match tree.search(&key) {
            None => {}
            Some(value) => assert_eq!(value, round, "key {key} holds a stale value"),
        }
        tree.remove(&key);
        assert_eq!(tree.search(&key), None);
    }

    for key in stable {
        assert_eq!(tree.search(&key), Some(key));
    }
    assert_eq!(tree.len(), stable.len());
}

#[test]
fn racing_root_removals_complete() {
    let (done_tx, done_rx) = mpsc::channel();
    let tree = OptimisticTree::<u32, u32>::default();
    let threads = 8;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tree = tree.clone();
            let done_tx = done_tx.clone();
            std::thread::spawn(move || {
                for round in 0..2000_u32 {
                    // the root and both of its children are the hottest keys
                    let key = [50, 25, 75][((round + t) % 3) as usize];
                    if round % 2 == 0 {
                        tree.insert(key, round);
                        tree.insert(key / 2, round);
                        tree.insert(key + key / 2, round);
                    } else {
                        tree.remove(&key);
                    }
                    tree.search(&key);
                }
                done_tx.send(()).unwrap();
            })
        })
        .collect();

    for _ in 0..threads {
        done_rx
            .recv_timeout(Duration::from_secs(60))
            .expect("removals deadlocked");
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn readers_see_stable_keys_during_churn() {
    let tree = OptimisticTree::<u32, u32>::default();

    // stable keys are even, churned keys are odd
    for key in 0..512 {
        tree.insert(scatter(key) & !1, key);
    }

    let churners = 4;
    let readers = 4;
    let barrier = Barrier::new(churners + readers);

    std::thread::scope(|s| {
        for t in 0..churners {
            let tree = tree.clone();
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for round in 0..20_000_u32 {
                    let key = scatter(round.wrapping_mul(7) + u32::try_from(t).unwrap()) | 1;
                    if round % 3 == 0 {
                        tree.remove(&key);
                    } else {
                        tree.insert(key, round);
                    }
                }
            });
        }
        for _ in 0..readers {
            let tree = tree.clone();
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    for key in 0..512 {
                        assert_eq!(
                            tree.search(&(scatter(key) & !1)),
                            Some(key),
                            "stable key {key} went missing during churn"
                        );
                    }
                }
            });
        }
    });
}
