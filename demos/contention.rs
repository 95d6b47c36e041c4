use std::thread::scope;
use std::time::Instant;

use optimistic_tree::OptimisticTree;

const WRITERS: usize = 16;
const READERS: usize = 16;
const KEYSPACE: u64 = 4096;
const N: usize = 1024 * 1024;
const WRITER_N: usize = N / WRITERS;
const READER_N: usize = N / READERS;

fn scatter(i: u64) -> u64 {
    i.wrapping_mul(0x9E37_79B9_7F4A_7C15) % KEYSPACE
}

fn writer(tree: OptimisticTree<u64, u64>, seed: u64) {
    for i in 0..WRITER_N as u64 {
        let key = scatter(i.wrapping_add(seed));
        if i % 4 == 0 {
            tree.remove(&key);
        } else {
            tree.insert(key, i);
        }
    }
}

fn reader(tree: OptimisticTree<u64, u64>, seed: u64) {
    let mut hits = 0;
    for i in 0..READER_N as u64 {
        if tree.search(&scatter(i ^ seed)).is_some() {
            hits += 1;
        }
    }
    assert!(hits <= READER_N);
}

fn main() {
    let tree = OptimisticTree::default();

    let before = Instant::now();
    scope(|s| {
        let mut handles = vec![];

        for i in 0..WRITERS {
            let tree = tree.clone();
            let handle = s.spawn(move || writer(tree, i as u64 * 7919));
            handles.push(handle);
        }

        for i in 0..READERS {
            let tree = tree.clone();
            let handle = s.spawn(move || reader(tree, i as u64 * 104_729));
            handles.push(handle);
        }

        for handle in handles.into_iter() {
            handle.join().unwrap()
        }
    });

    let elapsed = before.elapsed();

    let per_second = (N * 2) as u128 * 1000 / elapsed.as_millis().max(1);

    println!(
        "with {} writers and {} readers over {} keys, took {:?} for {} operations ({} per second), {} keys remain",
        WRITERS,
        READERS,
        KEYSPACE,
        elapsed,
        N * 2,
        per_second,
        tree.len(),
    );
}
