use std::collections::BTreeMap;

use optimistic_tree::OptimisticTree;

/// Tests are placed here when the fuzzer finds bugs, so we can re-play them deterministically
/// even if tested on a machine without a fuzzer corpus loaded etc...
#[test]
fn test_00() {
    // removing a root whose successor is its own right child
    let tree = OptimisticTree::<u64, u64>::default();
    tree.insert(1, 1);
    tree.insert(0, 0);
    tree.insert(2, 2);

    assert_eq!(tree.remove(&1), Some(1));
    assert_eq!(tree.search(&0), Some(0));
    assert_eq!(tree.search(&2), Some(2));
    assert_eq!(tree.search(&1), None);
}

#[test]
fn test_01() {
    let tree = OptimisticTree::<u64, u64>::default();
    let mut model = BTreeMap::new();

    let items = [95, 126, 2, 73, 0, 106, 54, 100, 110, 108];

    for item in items {
        assert_eq!(tree.insert(item, item), model.insert(item, item));
    }

    for item in [106, 95, 2, 126] {
        assert_eq!(tree.remove(&item), model.remove(&item));
        for (k, v) in &model {
            assert_eq!(tree.search(k), Some(*v), "lost {k} after removing {item}");
        }
        assert_eq!(tree.search(&item), None);
    }
}

#[test]
fn test_02() {
    // reinserting a key into the slot its removal vacated, then overwriting it
    let tree = OptimisticTree::<u64, u64>::default();

    for item in [8, 4, 12, 2, 6, 10, 14] {
        tree.insert(item, item);
    }

    assert_eq!(tree.remove(&4), Some(4));
    assert_eq!(tree.insert(4, 40), None);
    assert_eq!(tree.insert(4, 41), Some(40));
    assert_eq!(tree.remove(&8), Some(8));
    assert_eq!(tree.insert(8, 80), None);

    for (k, v) in [(2, 2), (4, 41), (6, 6), (8, 80), (10, 10), (12, 12), (14, 14)] {
        assert_eq!(tree.search(&k), Some(v));
    }
    assert_eq!(tree.len(), 7);
}
