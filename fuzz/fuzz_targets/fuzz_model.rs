#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate arbitrary;
extern crate optimistic_tree;

use arbitrary::Arbitrary;

const KEYSPACE: u64 = 128;

#[derive(Debug)]
enum Op {
    Insert { key: u64, value: u64 },
    Remove { key: u64 },
    Search { key: u64 },
}

impl<'a> Arbitrary<'a> for Op {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(if u.ratio(1, 2)? {
            Op::Insert {
                key: u.int_in_range(0..=KEYSPACE)?,
                value: u.int_in_range(0..=KEYSPACE)?,
            }
        } else if u.ratio(1, 2)? {
            Op::Remove {
                key: u.int_in_range(0..=KEYSPACE)?,
            }
        } else {
            Op::Search {
                key: u.int_in_range(0..=KEYSPACE)?,
            }
        })
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let tree = optimistic_tree::OptimisticTree::<_, _, 4>::default();
    let mut model = std::collections::BTreeMap::new();

    for op in ops {
        match op {
            Op::Insert { key, value } => {
                assert_eq!(tree.insert(key, value), model.insert(key, value));
            }
            Op::Remove { key } => {
                assert_eq!(tree.remove(&key), model.remove(&key));
            }
            Op::Search { key } => {
                assert_eq!(tree.search(&key), model.get(&key).copied());
            }
        };

        for (key, value) in &model {
            assert_eq!(tree.search(key), Some(*value));
        }
    }

    assert_eq!(tree.len(), model.len());
});
