#![cfg_attr(
    test,
    deny(
        missing_docs,
        future_incompatible,
        nonstandard_style,
        rust_2018_idioms,
        trivial_casts,
        trivial_numeric_casts,
    )
)]
#![cfg_attr(test, deny(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::doc_markdown,
    clippy::explicit_into_iter_loop,
    clippy::explicit_iter_loop,
    clippy::get_unwrap,
    clippy::if_not_else,
    clippy::inline_always,
    clippy::map_flatten,
    clippy::match_like_matches_macro,
    clippy::mem_forget,
    clippy::mut_mut,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::non_ascii_literal,
    clippy::string_add_assign,
    clippy::type_repetition_in_bounds,
    clippy::unimplemented,
    clippy::used_underscore_binding,
    clippy::wildcard_dependencies,
))]
#![cfg_attr(
    test,
    warn(
        clippy::missing_const_for_fn,
        clippy::multiple_crate_versions,
        clippy::wildcard_enum_match_arm,
    )
)]

//! A concurrent binary search tree using optimistic concurrency control.
//!
//! Searches never take a lock. Writers descend without locks as well, and
//! only lock the one or two nodes they are about to mutate. Once the locks
//! are held, the writer re-walks from the current root to check that what it
//! found during the unlocked descent is still attached where it expects. If
//! a concurrent writer restructured that part of the tree in the meantime,
//! everything is released and the operation starts over from the root.
//! There is no bound on the number of retries; contention is expected to be
//! low relative to the size of the tree.
//!
//! The tree is not balanced. Inserting keys in sorted order produces a
//! linked list.
//!
//! Unlinked nodes and overwritten values are reclaimed with epoch-based
//! reclamation provided by the `ebr` crate, so that readers which are still
//! traversing a node that was just removed never observe freed memory.
//!
//! # Examples
//!
//! ```
//! let tree = optimistic_tree::OptimisticTree::<u64, &str>::default();
//!
//! assert_eq!(tree.insert(5, "five"), None);
//! assert_eq!(tree.insert(3, "three"), None);
//! assert_eq!(tree.search(&3), Some("three"));
//!
//! // inserting an existing key overwrites it and returns the old value
//! assert_eq!(tree.insert(3, "tres"), Some("three"));
//!
//! assert_eq!(tree.remove(&3), Some("tres"));
//! assert_eq!(tree.search(&3), None);
//! ```
//!
//! # Cargo features
//!
//! * `fault_injection` makes validation fail at random, exercising retry
//!   paths far more often than real contention would.
//! * `timing` records the fastest and slowest operations and the number of
//!   retries, and prints them when the tree is dropped.
//! * `print_shape_on_drop` prints the node count and depth of the tree when
//!   it is dropped.
//! * `tracing` emits retry and root transition events through the `tracing`
//!   crate.

#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

mod node;

#[cfg(not(feature = "fault_injection"))]
#[inline]
const fn debug_delay() -> bool {
    false
}

/// Fails roughly one validation in a hundred so that retries happen
/// constantly under test. Compiled out without `fault_injection`.
#[cfg(feature = "fault_injection")]
fn debug_delay() -> bool {
    use rand::{thread_rng, Rng};

    let mut rng = thread_rng();

    matches!(rng.gen_range(0..100), 99)
}

use std::borrow::Borrow;
use std::fmt;
use std::sync::{
    atomic::{AtomicPtr, AtomicUsize, Ordering},
    Arc,
};

#[cfg(feature = "timing")]
use std::sync::atomic::AtomicU64;
#[cfg(feature = "timing")]
use std::time::{Duration, Instant};

use ebr::{Ebr, Guard};
use parking_lot::Mutex;

use node::{view, Conflict, Dir, Node, NodeView, ValuePtr};

/// Garbage handed to `ebr`, freed once no pinned reader can still see it.
enum Deferred<K, V> {
    Node(NodeView<K, V>),
    Value(ValuePtr<V>),
}

impl<K, V> Drop for Deferred<K, V> {
    fn drop(&mut self) {
        match self {
            Deferred::Node(node) => unsafe { Node::reclaim(node.as_ptr()) },
            Deferred::Value(value) => {
                assert!(!value.0.is_null());
                let reclaimed: Box<V> = unsafe { Box::from_raw(value.0) };
                drop(reclaimed);
            }
        }
    }
}

/// A concurrent, unbalanced binary search tree with optimistic locking.
///
/// Like the epoch-based reclamation state it carries, this structure is
/// `Send` but NOT `Sync`. To use one tree from several threads, clone it:
/// every clone refers to the same tree, and sets up its own thread-local
/// reclamation state.
///
/// Values are cloned out on `search`, so that no lock or guard needs to
/// outlive the call. Wrap expensive values in an `Arc`.
///
/// The `LOCAL_GC_BUFFER_SIZE` const generic must be greater than 0.
/// Unlinked nodes and overwritten values are placed into fixed-size
/// thread-local buffers, and only become eligible for freeing once a buffer
/// fills up. Lower values free memory sooner at some cost in efficiency.
///
/// # Examples
///
/// ```
/// use optimistic_tree::OptimisticTree;
///
/// let tree = OptimisticTree::<u32, u32>::default();
///
/// std::thread::scope(|s| {
///     for t in 0..4 {
///         let tree = tree.clone();
///         s.spawn(move || {
///             for i in 0..100 {
///                 tree.insert(i * 4 + t, i);
///             }
///         });
///     }
/// });
///
/// assert_eq!(tree.len(), 400);
/// assert_eq!(tree.search(&7), Some(1));
/// ```
#[derive(Clone)]
pub struct OptimisticTree<K, V, const LOCAL_GC_BUFFER_SIZE: usize = 128>
where
    K: 'static + Clone + Ord + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    // epoch-based reclamation
    ebr: Ebr<Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    // the tree structure, kept apart from ebr so that a mutable guard and
    // shared references to the tree can be held at the same time.
    inner: Arc<Inner<K, V>>,
    // an eventually consistent, lagging count of the
    // number of items in this structure.
    len: Arc<AtomicUsize>,
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> fmt::Debug
    for OptimisticTree<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Clone + Ord + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticTree")
            .field("len", &self.len())
            .finish()
    }
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> Default for OptimisticTree<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Clone + Ord + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    fn default() -> OptimisticTree<K, V, LOCAL_GC_BUFFER_SIZE> {
        assert!(
            LOCAL_GC_BUFFER_SIZE > 0,
            "LOCAL_GC_BUFFER_SIZE must be greater than 0"
        );

        let inner = Arc::new(Inner {
            root: AtomicPtr::default(),
            root_lock: Mutex::new(()),
            #[cfg(feature = "timing")]
            slowest_op: u64::MIN.into(),
            #[cfg(feature = "timing")]
            fastest_op: u64::MAX.into(),
            #[cfg(feature = "timing")]
            retries: 0.into(),
        });

        OptimisticTree {
            ebr: Ebr::default(),
            inner,
            len: Arc::new(0.into()),
        }
    }
}

struct Inner<K, V>
where
    K: 'static + Clone + Ord + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    // null iff the tree is empty. Only ever written while holding root_lock.
    root: AtomicPtr<Node<K, V>>,
    root_lock: Mutex<()>,
    #[cfg(feature = "timing")]
    slowest_op: AtomicU64,
    #[cfg(feature = "timing")]
    fastest_op: AtomicU64,
    #[cfg(feature = "timing")]
    retries: AtomicU64,
}

impl<K, V> Drop for Inner<K, V>
where
    K: 'static + Clone + Ord + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    fn drop(&mut self) {
        #[cfg(feature = "timing")]
        self.print_timing();

        let mut nodes_counted: usize = 0;
        let mut max_depth: usize = 0;

        let mut stack: Vec<(*mut Node<K, V>, usize)> = vec![(*self.root.get_mut(), 1)];

        while let Some((ptr, depth)) = stack.pop() {
            if ptr.is_null() {
                continue;
            }

            nodes_counted += 1;
            max_depth = max_depth.max(depth);

            let mut node: Box<Node<K, V>> = unsafe { Box::from_raw(ptr) };
            for child in node.take_children() {
                stack.push((child, depth + 1));
            }
        }

        if cfg!(feature = "print_shape_on_drop") {
            println!("nodes: {nodes_counted} depth: {max_depth}");
        }
    }
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> OptimisticTree<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Clone + Ord + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    /// Creates an empty tree. Equivalent to `Default::default()`.
    pub fn new() -> OptimisticTree<K, V, LOCAL_GC_BUFFER_SIZE> {
        OptimisticTree::default()
    }

    /// Get a clone of the value associated with this key, if present.
    ///
    /// Never blocks, but may internally restart its descent if it raced
    /// with a writer that restructured the path it was walking.
    ///
    /// # Examples
    /// ```
    /// let tree = optimistic_tree::OptimisticTree::<usize, usize>::default();
    ///
    /// tree.insert(1, 1);
    ///
    /// assert_eq!(tree.search(&0), None);
    /// assert_eq!(tree.search(&1), Some(1));
    /// ```
    pub fn search<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut guard = self.ebr.pin();

        #[cfg(feature = "timing")]
        let before = Instant::now();

        let ret = loop {
            let root = if let Some(root) = view(&self.inner.root, &mut guard) {
                root
            } else {
                break None;
            };

            match Node::search(root, key, &mut guard) {
                Ok(found) => break found,
                Err(Conflict) => self.inner.note_retry("search"),
            }
        };

        #[cfg(feature = "timing")]
        self.inner.record_timing(before.elapsed());

        ret
    }

    /// Returns `true` if the tree holds a value for this key.
    ///
    /// # Examples
    /// ```
    /// let tree = optimistic_tree::OptimisticTree::<usize, usize>::default();
    ///
    /// tree.insert(1, 1);
    ///
    /// assert!(tree.contains_key(&1));
    /// assert!(!tree.contains_key(&2));
    /// ```
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.search(key).is_some()
    }

    /// Insert a value, returning the previous value if the key was
    /// already present. An existing key keeps its node and has its value
    /// overwritten.
    ///
    /// # Examples
    ///
    /// ```
    /// let tree = optimistic_tree::OptimisticTree::<usize, usize>::default();
    ///
    /// assert_eq!(tree.insert(1, 1), None);
    /// assert_eq!(tree.insert(1, 2), Some(1));
    /// assert_eq!(tree.search(&1), Some(2));
    /// ```
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let mut guard = self.ebr.pin();

        #[cfg(feature = "timing")]
        let before = Instant::now();

        let ret = loop {
            let attempt = if let Some(root) = view(&self.inner.root, &mut guard) {
                Node::insert(root, &self.inner.root, &key, &value, &mut guard)
            } else {
                self.inner.install_root(&key, &value)
            };

            match attempt {
                Ok(ret) => break ret,
                Err(Conflict) => self.inner.note_retry("insert"),
            }
        };

        if ret.is_none() {
            self.len.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "timing")]
        self.inner.record_timing(before.elapsed());

        ret
    }

    /// Remove the value associated with this key, returning it if it
    /// was present. Removing an absent key does nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// let tree = optimistic_tree::OptimisticTree::<usize, usize>::default();
    ///
    /// assert_eq!(tree.remove(&1), None);
    /// assert_eq!(tree.insert(1, 1), None);
    /// assert_eq!(tree.remove(&1), Some(1));
    /// ```
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut guard = self.ebr.pin();

        #[cfg(feature = "timing")]
        let before = Instant::now();

        let ret = loop {
            let root = if let Some(root) = view(&self.inner.root, &mut guard) {
                root
            } else {
                break None;
            };

            let attempt = match root.step(key) {
                None => self.inner.remove_root(root, &mut guard),
                Some(dir) => match view(root.child(dir), &mut guard) {
                    Some(child) if child.step(key).is_none() => {
                        self.inner.remove_root_child(root, dir, child, &mut guard)
                    }
                    _ => Node::remove(root, &self.inner.root, key, &mut guard),
                },
            };

            match attempt {
                Ok(removed) => break removed,
                Err(Conflict) => self.inner.note_retry("remove"),
            }
        };

        if ret.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }

        #[cfg(feature = "timing")]
        self.inner.record_timing(before.elapsed());

        ret
    }

    /// A lagging count of the number of items in the tree. It is exact
    /// once all concurrent writers have returned.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns `true` if [`OptimisticTree::len`] is 0.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Inner<K, V>
where
    K: 'static + Clone + Ord + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn note_retry(&self, op: &'static str) {
        trace_log!(op = op, "validation failed, retrying from the root");

        #[cfg(feature = "timing")]
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Installs the first node of an empty tree. The emptiness check that
    /// led here was made without the root lock, so it is repeated under it.
    fn install_root(&self, key: &K, value: &V) -> Result<Option<V>, Conflict> {
        let _root_held = self.root_lock.lock();

        if !self.root.load(Ordering::Acquire).is_null() {
            trace_log!("lost the race to install the root");
            return Err(Conflict);
        }

        let root = Box::into_raw(Node::new(key.clone(), value.clone()));
        self.root.store(root, Ordering::Release);

        debug_log!("installed root node");

        Ok(None)
    }

    /// Removes the root node itself, promoting its only child or its
    /// in-order successor.
    fn remove_root<const LOCAL_GC_BUFFER_SIZE: usize>(
        &self,
        root: NodeView<K, V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> Result<Option<V>, Conflict> {
        let _root_held = self.root_lock.lock();
        let _node_held = root.lock.lock();

        if self.root.load(Ordering::Acquire) != root.as_ptr() || root.is_unlinked() {
            trace_log!("root was replaced before it was locked");
            return Err(Conflict);
        }

        let removed = Node::splice(&self.root, root, guard)?;

        debug_log!(
            emptied = self.root.load(Ordering::Acquire).is_null(),
            "removed root node"
        );

        Ok(Some(removed))
    }

    /// Removes a direct child of the root. Locks are taken top-down: the
    /// root lock, then the root node which owns the child slot, then the
    /// child. Guards drop in reverse declaration order.
    fn remove_root_child<const LOCAL_GC_BUFFER_SIZE: usize>(
        &self,
        root: NodeView<K, V>,
        dir: Dir,
        child: NodeView<K, V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> Result<Option<V>, Conflict> {
        let _root_held = self.root_lock.lock();
        let _parent_held = root.lock.lock();
        let _child_held = child.lock.lock();

        if self.root.load(Ordering::Acquire) != root.as_ptr()
            || root.is_unlinked()
            || root.child(dir).load(Ordering::Acquire) != child.as_ptr()
            || child.is_unlinked()
        {
            trace_log!("root child was replaced before it was locked");
            return Err(Conflict);
        }

        Node::splice(root.child(dir), child, guard).map(Some)
    }

    #[cfg(feature = "timing")]
    fn print_timing(&self) {
        println!(
            "min : {:?}",
            Duration::from_nanos(self.fastest_op.load(Ordering::Acquire))
        );
        println!(
            "max : {:?}",
            Duration::from_nanos(self.slowest_op.load(Ordering::Acquire))
        );
        println!("retries : {}", self.retries.load(Ordering::Acquire));
    }

    #[cfg(feature = "timing")]
    fn record_timing(&self, time: Duration) {
        let nanos = u64::try_from(time.as_nanos()).unwrap_or(u64::MAX);
        let min = self.fastest_op.load(Ordering::Relaxed);
        if nanos < min {
            self.fastest_op.fetch_min(nanos, Ordering::Relaxed);
        }

        let max = self.slowest_op.load(Ordering::Relaxed);
        if nanos > max {
            self.slowest_op.fetch_max(nanos, Ordering::Relaxed);
        }
    }
}

const fn _test_impls() {
    const fn send<T: Send>() {}
    const fn clone<T: Clone>() {}
    send::<OptimisticTree<usize, usize>>();
    clone::<OptimisticTree<usize, usize>>();
}

#[cfg(test)]
impl<K, V> Inner<K, V>
where
    K: 'static + Clone + Ord + Send + Sync + fmt::Debug,
    V: 'static + Clone + Send + Sync,
{
    /// In-order keys of a quiescent tree, asserting the ordering invariant
    /// at every node along the way.
    fn checked_keys(&self) -> Vec<K> {
        fn walk<K: Clone + Ord + fmt::Debug, V>(
            ptr: *mut Node<K, V>,
            lo: Option<&K>,
            hi: Option<&K>,
            out: &mut Vec<K>,
        ) {
            if ptr.is_null() {
                return;
            }
            let node = unsafe { &*ptr };
            assert!(!node.is_unlinked(), "reachable node {:?} is unlinked", node.key);
            if let Some(lo) = lo {
                assert!(*lo < node.key, "{:?} is not greater than {lo:?}", node.key);
            }
            if let Some(hi) = hi {
                assert!(node.key < *hi, "{:?} is not less than {hi:?}", node.key);
            }
            walk(node.child(Dir::Left).load(Ordering::Acquire), lo, Some(&node.key), out);
            out.push(node.key.clone());
            walk(node.child(Dir::Right).load(Ordering::Acquire), Some(&node.key), hi, out);
        }

        let mut out = vec![];
        walk(self.root.load(Ordering::Acquire), None, None, &mut out);
        out
    }
}

#[test]
fn basic_tree() {
    let tree = OptimisticTree::<usize, usize>::default();

    let n = 64;
    for i in 0..=n {
        // scatter the keys so the tree does not degrade into a list
        let key = (i * 37) % 65;
        assert_eq!(tree.search(&key), None);
        tree.insert(key, key);
        assert_eq!(tree.search(&key), Some(key), "failed to get key {key}");
    }

    assert_eq!(tree.len(), n + 1);
    assert_eq!(tree.inner.checked_keys(), (0..=n).collect::<Vec<_>>());

    for i in 0..=n {
        assert_eq!(tree.search(&i), Some(i), "failed to get key {i}");
    }

    for i in (0..=n).step_by(2) {
        assert_eq!(tree.remove(&i), Some(i));
        assert_eq!(tree.search(&i), None);
    }

    assert_eq!(
        tree.inner.checked_keys(),
        (0..=n).filter(|i| i % 2 == 1).collect::<Vec<_>>()
    );
}

#[test]
fn overwrite_keeps_structure() {
    let tree = OptimisticTree::<u32, &str>::default();

    assert_eq!(tree.insert(2, "a"), None);
    assert_eq!(tree.insert(1, "b"), None);
    assert_eq!(tree.insert(3, "c"), None);

    assert_eq!(tree.insert(2, "d"), Some("a"));
    assert_eq!(tree.insert(3, "e"), Some("c"));

    assert_eq!(tree.len(), 3);
    assert_eq!(tree.search(&2), Some("d"));
    assert_eq!(tree.search(&3), Some("e"));
    assert_eq!(tree.inner.checked_keys(), vec![1, 2, 3]);
}

#[test]
fn remove_absent_is_noop() {
    let tree = OptimisticTree::<u32, u32>::default();

    assert_eq!(tree.remove(&7), None);
    assert!(tree.is_empty());

    tree.insert(5, 5);
    tree.insert(3, 3);

    assert_eq!(tree.remove(&4), None);
    assert_eq!(tree.remove(&9), None);
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.inner.checked_keys(), vec![3, 5]);
}

#[test]
fn remove_root_promotes() {
    let tree = OptimisticTree::<u32, u32>::default();

    // single node: the tree becomes empty
    tree.insert(1, 1);
    assert_eq!(tree.remove(&1), Some(1));
    assert!(tree.inner.root.load(Ordering::Acquire).is_null());
    assert_eq!(tree.search(&1), None);

    // one child: the child becomes the root
    tree.insert(1, 1);
    tree.insert(2, 2);
    assert_eq!(tree.remove(&1), Some(1));
    assert_eq!(tree.inner.checked_keys(), vec![2]);

    // two children: the successor takes the root's place
    for key in [10, 5, 20, 15, 25, 12] {
        tree.insert(key, key);
    }
    assert_eq!(tree.remove(&2), Some(2));
    assert_eq!(tree.remove(&10), Some(10));

    let root = unsafe { &*tree.inner.root.load(Ordering::Acquire) };
    assert_eq!(root.key, 12);
    assert_eq!(tree.search(&12), Some(12));
    assert_eq!(tree.inner.checked_keys(), vec![5, 12, 15, 20, 25]);
}

#[test]
fn remove_two_child_nodes() {
    let tree = OptimisticTree::<u32, u32>::default();

    for key in [50, 30, 70, 20, 40, 60, 80, 35, 45, 42] {
        tree.insert(key, key * 2);
    }

    // successor is the right child itself
    assert_eq!(tree.remove(&70), Some(140));
    assert_eq!(tree.inner.checked_keys(), vec![20, 30, 35, 40, 42, 45, 50, 60, 80]);

    // successor sits deeper, at the bottom of the right subtree's left spine
    assert_eq!(tree.remove(&40), Some(80));
    assert_eq!(tree.inner.checked_keys(), vec![20, 30, 35, 42, 45, 50, 60, 80]);
    assert_eq!(tree.search(&42), Some(84));

    // direct child of the root with two children
    assert_eq!(tree.remove(&30), Some(60));
    assert_eq!(tree.inner.checked_keys(), vec![20, 35, 42, 45, 50, 60, 80]);

    for key in [20, 35, 42, 45, 50, 60, 80] {
        assert_eq!(tree.search(&key), Some(key * 2));
    }
    assert_eq!(tree.len(), 7);
}

#[test]
fn concrete_scenario() {
    let tree = OptimisticTree::<u32, u32>::default();

    for key in [5, 3, 8, 1, 4] {
        tree.insert(key, key + 100);
    }

    assert_eq!(tree.search(&4), Some(104));
    assert_eq!(tree.search(&9), None);

    std::thread::scope(|s| {
        for key in [3, 8] {
            let tree = tree.clone();
            s.spawn(move || assert_eq!(tree.remove(&key), Some(key + 100)));
        }
    });

    assert_eq!(tree.inner.checked_keys(), vec![1, 4, 5]);
    assert_eq!(tree.len(), 3);
}

#[test]
fn borrowed_keys() {
    let tree = OptimisticTree::<String, usize>::default();

    tree.insert("m".to_string(), 1);
    tree.insert("c".to_string(), 2);
    tree.insert("x".to_string(), 3);

    assert_eq!(tree.search("c"), Some(2));
    assert_eq!(tree.remove("m"), Some(1));
    assert!(!tree.contains_key("m"));
    assert_eq!(
        tree.inner.checked_keys(),
        vec!["c".to_string(), "x".to_string()]
    );
}
