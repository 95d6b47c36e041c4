//! Property-based tests for single-threaded histories.
//!
//! Every operation is replayed against `BTreeMap` as an oracle.

use std::collections::BTreeMap;

use optimistic_tree::OptimisticTree;
use proptest::prelude::*;

const KEYSPACE: u16 = 128;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Search(u16),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..KEYSPACE, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => (0..KEYSPACE).prop_map(Op::Remove),
        1 => (0..KEYSPACE).prop_map(Op::Search),
    ]
}

proptest! {
    #[test]
    fn matches_btreemap(ops in prop::collection::vec(op(), 0..256)) {
        let tree = OptimisticTree::<u16, u32, 4>::default();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => prop_assert_eq!(tree.insert(k, v), model.insert(k, v)),
                Op::Remove(k) => prop_assert_eq!(tree.remove(&k), model.remove(&k)),
                Op::Search(k) => prop_assert_eq!(tree.search(&k), model.get(&k).copied()),
            }
        }

        prop_assert_eq!(tree.len(), model.len());
        for k in 0..KEYSPACE {
            prop_assert_eq!(tree.search(&k), model.get(&k).copied());
        }
    }

    #[test]
    fn repeated_search_is_stable(keys in prop::collection::hash_set(0..KEYSPACE, 0..64), probe in 0..KEYSPACE) {
        let tree = OptimisticTree::<u16, u16>::default();
        for k in &keys {
            tree.insert(*k, k.wrapping_mul(3));
        }

        let first = tree.search(&probe);
        for _ in 0..8 {
            prop_assert_eq!(tree.search(&probe), first);
        }
        prop_assert_eq!(first.is_some(), keys.contains(&probe));
    }

    #[test]
    fn removing_everything_empties(keys in prop::collection::vec(0..KEYSPACE, 0..128)) {
        let tree = OptimisticTree::<u16, u16>::default();
        for k in &keys {
            tree.insert(*k, *k);
        }
        for k in &keys {
            tree.remove(k);
        }

        prop_assert!(tree.is_empty());
        for k in &keys {
            prop_assert_eq!(tree.search(k), None);
        }
    }
}
