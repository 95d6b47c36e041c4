//! Tree vertices and the optimistic locate/lock/validate/commit routines
//! that operate on them.
//!
//! Every routine here makes one attempt. An attempt either commits, or
//! returns [`Conflict`] after releasing every lock it took, and the caller
//! in `lib.rs` restarts the whole operation from the root.
//!
//! All [`NodeView`]s are only dereferenced while the calling thread holds an
//! `ebr` guard, which keeps unlinked nodes alive until no reader can still
//! observe them.

use std::borrow::Borrow;
use std::cmp;
use std::fmt;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use ebr::Guard;
use parking_lot::Mutex;

use crate::{debug_delay, Deferred};

/// An optimistic assumption made during an unlocked descent no longer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dir {
    Left,
    Right,
}

pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    // never null; swapped wholesale on overwrite
    value: AtomicPtr<V>,
    left: AtomicPtr<Node<K, V>>,
    right: AtomicPtr<Node<K, V>>,
    pub(crate) lock: Mutex<()>,
    unlinked: AtomicBool,
}

impl<K, V> Drop for Node<K, V> {
    fn drop(&mut self) {
        // children are owned by whoever took over this node's slot, or are
        // walked explicitly when the whole tree is dropped.
        let value = *self.value.get_mut();
        assert!(!value.is_null());
        let reclaimed: Box<V> = unsafe { Box::from_raw(value) };
        drop(reclaimed);
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Node<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("left", &self.left.load(Ordering::Relaxed))
            .field("right", &self.right.load(Ordering::Relaxed))
            .field("unlinked", &self.unlinked.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, V> Node<K, V> {
    pub(crate) fn new(key: K, value: V) -> Box<Node<K, V>> {
        Box::new(Node {
            key,
            value: AtomicPtr::new(Box::into_raw(Box::new(value))),
            left: AtomicPtr::default(),
            right: AtomicPtr::default(),
            lock: Mutex::new(()),
            unlinked: AtomicBool::new(false),
        })
    }

    pub(crate) const fn child(&self, dir: Dir) -> &AtomicPtr<Node<K, V>> {
        match dir {
            Dir::Left => &self.left,
            Dir::Right => &self.right,
        }
    }

    pub(crate) fn is_unlinked(&self) -> bool {
        self.unlinked.load(Ordering::Acquire)
    }

    /// Which child to follow when looking for `key`, or `None` if this
    /// node holds it.
    pub(crate) fn step<Q>(&self, key: &Q) -> Option<Dir>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match key.cmp(self.key.borrow()) {
            cmp::Ordering::Less => Some(Dir::Left),
            cmp::Ordering::Greater => Some(Dir::Right),
            cmp::Ordering::Equal => None,
        }
    }

    fn load_value(&self) -> V
    where
        V: Clone,
    {
        let value = self.value.load(Ordering::Acquire);
        assert!(!value.is_null(), "node value pointer must never be null");
        unsafe { (*value).clone() }
    }

    /// Takes ownership of a node that is no longer reachable by anyone.
    /// Children are not visited.
    pub(crate) unsafe fn reclaim(ptr: *mut Node<K, V>) {
        drop(Box::from_raw(ptr));
    }

    /// Collects the direct children of an exclusively owned node.
    pub(crate) fn take_children(&mut self) -> [*mut Node<K, V>; 2] {
        [
            std::mem::replace(self.left.get_mut(), ptr::null_mut()),
            std::mem::replace(self.right.get_mut(), ptr::null_mut()),
        ]
    }
}

/// A pointer to a node that is protected by the calling thread's `ebr` guard.
pub(crate) struct NodeView<K, V> {
    ptr: NonNull<Node<K, V>>,
}

impl<K, V> Clone for NodeView<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for NodeView<K, V> {}

impl<K, V> PartialEq for NodeView<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<K, V> fmt::Debug for NodeView<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeView({:p})", self.ptr)
    }
}

unsafe impl<K: Send + Sync, V: Send + Sync> Send for NodeView<K, V> {}

unsafe impl<K: Send + Sync, V: Send + Sync> Sync for NodeView<K, V> {}

impl<K, V> Deref for NodeView<K, V> {
    type Target = Node<K, V>;

    fn deref(&self) -> &Node<K, V> {
        unsafe { self.ptr.as_ref() }
    }
}

impl<K, V> NodeView<K, V> {
    pub(crate) const fn as_ptr(self) -> *mut Node<K, V> {
        self.ptr.as_ptr()
    }
}

/// Loads a child or root slot, returning `None` for an empty slot.
pub(crate) fn view<K, V, const LOCAL_GC_BUFFER_SIZE: usize>(
    slot: &AtomicPtr<Node<K, V>>,
    _guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
) -> Option<NodeView<K, V>>
where
    K: 'static + Send + Sync,
    V: 'static + Send + Sync,
{
    let ptr = NonNull::new(slot.load(Ordering::Acquire))?;
    Some(NodeView { ptr })
}

/// Result of an unlocked descent for a key.
#[derive(Debug)]
pub(crate) enum Position<K, V> {
    /// `node` holds the key. `parent` is `None` when `node` was the start
    /// of the descent.
    Occupied {
        parent: Option<(NodeView<K, V>, Dir)>,
        node: NodeView<K, V>,
    },
    /// The key is absent and belongs in the empty `dir` slot of `parent`.
    Vacant { parent: NodeView<K, V>, dir: Dir },
}

/// Walks from the tree's current root along `key` and reports whether
/// `node` is still attached on that path. Never takes a lock.
///
/// An empty root is a lost race rather than a broken invariant: the last
/// node may have been removed between the caller's unlocked descent and its
/// lock acquisition.
pub(crate) fn validate<K, V, Q, const LOCAL_GC_BUFFER_SIZE: usize>(
    root_slot: &AtomicPtr<Node<K, V>>,
    key: &Q,
    node: NodeView<K, V>,
    guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
) -> bool
where
    K: 'static + Borrow<Q> + Send + Sync,
    V: 'static + Send + Sync,
    Q: Ord + ?Sized,
{
    if debug_delay() {
        return false;
    }

    let mut cursor = if let Some(root) = view(root_slot, guard) {
        root
    } else {
        return false;
    };

    loop {
        if cursor == node {
            return !node.is_unlinked();
        }
        let dir = if let Some(dir) = cursor.step(key) {
            dir
        } else {
            // a different node now holds this key
            return false;
        };
        cursor = if let Some(child) = view(cursor.child(dir), guard) {
            child
        } else {
            return false;
        };
    }
}

impl<K, V> Node<K, V>
where
    K: 'static + Clone + Ord + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    /// Unlocked descent from `start`.
    ///
    /// A miss is only reported if no node on the walked path was unlinked
    /// while we walked it. Otherwise the key may have been moved above us
    /// by a two-child removal, and the descent is retried.
    pub(crate) fn locate<Q, const LOCAL_GC_BUFFER_SIZE: usize>(
        start: NodeView<K, V>,
        key: &Q,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> Result<Position<K, V>, Conflict>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut path: Vec<NodeView<K, V>> = vec![];
        let mut parent = None;
        let mut cursor = start;

        loop {
            let dir = if let Some(dir) = cursor.step(key) {
                dir
            } else {
                return Ok(Position::Occupied {
                    parent,
                    node: cursor,
                });
            };

            path.push(cursor);

            if let Some(child) = view(cursor.child(dir), guard) {
                parent = Some((cursor, dir));
                cursor = child;
            } else {
                if path.iter().any(|walked| walked.is_unlinked()) {
                    trace_log!("descent crossed an unlinked node");
                    return Err(Conflict);
                }
                return Ok(Position::Vacant {
                    parent: cursor,
                    dir,
                });
            }
        }
    }

    /// Lock-free point lookup.
    pub(crate) fn search<Q, const LOCAL_GC_BUFFER_SIZE: usize>(
        start: NodeView<K, V>,
        key: &Q,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> Result<Option<V>, Conflict>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match Self::locate(start, key, guard)? {
            Position::Occupied { node, .. } => {
                let value = node.load_value();
                if node.is_unlinked() {
                    trace_log!("search hit a node that was concurrently unlinked");
                    return Err(Conflict);
                }
                Ok(Some(value))
            }
            Position::Vacant { .. } => Ok(None),
        }
    }

    /// Attaches a new leaf, or overwrites the value of an existing key and
    /// returns the previous value.
    pub(crate) fn insert<const LOCAL_GC_BUFFER_SIZE: usize>(
        start: NodeView<K, V>,
        root_slot: &AtomicPtr<Node<K, V>>,
        key: &K,
        value: &V,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> Result<Option<V>, Conflict> {
        match Self::locate(start, key, guard)? {
            Position::Occupied { node, .. } => {
                let _held = node.lock.lock();
                if !validate(root_slot, key, node, guard) {
                    trace_log!("overwrite target moved before it was locked");
                    return Err(Conflict);
                }

                let replacement = Box::into_raw(Box::new(value.clone()));
                let previous = node.value.swap(replacement, Ordering::AcqRel);
                let ret = unsafe { (*previous).clone() };
                guard.defer_drop(Deferred::Value(ValuePtr(previous)));

                Ok(Some(ret))
            }
            Position::Vacant { parent, dir } => {
                let _held = parent.lock.lock();
                if !validate(root_slot, key, parent, guard)
                    || !parent.child(dir).load(Ordering::Acquire).is_null()
                {
                    trace_log!("attachment point changed before it was locked");
                    return Err(Conflict);
                }

                let leaf = Box::into_raw(Node::new(key.clone(), value.clone()));
                parent.child(dir).store(leaf, Ordering::Release);

                Ok(None)
            }
        }
    }

    /// Removes `key` from the subtree below `start`. The key being held by
    /// `start` itself is a conflict: the tree handles its root separately.
    pub(crate) fn remove<Q, const LOCAL_GC_BUFFER_SIZE: usize>(
        start: NodeView<K, V>,
        root_slot: &AtomicPtr<Node<K, V>>,
        key: &Q,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> Result<Option<V>, Conflict>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (parent, dir, node) = match Self::locate(start, key, guard)? {
            Position::Vacant { .. } => return Ok(None),
            Position::Occupied { parent: None, .. } => {
                trace_log!("removal target became the root");
                return Err(Conflict);
            }
            Position::Occupied {
                parent: Some((parent, dir)),
                node,
            } => (parent, dir, node),
        };

        let _parent_held = parent.lock.lock();
        let _node_held = node.lock.lock();

        if !validate(root_slot, key, parent, guard)
            || parent.child(dir).load(Ordering::Acquire) != node.as_ptr()
            || node.is_unlinked()
        {
            trace_log!("parent link changed before it was locked");
            return Err(Conflict);
        }

        Self::splice(parent.child(dir), node, guard).map(Some)
    }

    /// Unlinks `node` from `slot` and returns its value.
    ///
    /// The caller holds the lock that guards `slot` and the lock of `node`,
    /// and has validated that `slot` still points at `node`.
    pub(crate) fn splice<const LOCAL_GC_BUFFER_SIZE: usize>(
        slot: &AtomicPtr<Node<K, V>>,
        node: NodeView<K, V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> Result<V, Conflict> {
        debug_assert_eq!(slot.load(Ordering::Acquire), node.as_ptr());

        let removed = node.load_value();

        match (view(&node.left, guard), view(&node.right, guard)) {
            (Some(left), Some(right)) => {
                Self::replace_with_successor(slot, node, left, right, guard)?;
            }
            (left, right) => {
                let survivor = left.or(right).map_or(ptr::null_mut(), NodeView::as_ptr);
                node.unlinked.store(true, Ordering::Release);
                slot.store(survivor, Ordering::Release);
            }
        }

        guard.defer_drop(Deferred::Node(node));

        Ok(removed)
    }

    /// Replaces a two-child `node` with a fresh node carrying its in-order
    /// successor's key and value. Keys are immutable, so the successor
    /// cannot simply be copied into `node`.
    fn replace_with_successor<const LOCAL_GC_BUFFER_SIZE: usize>(
        slot: &AtomicPtr<Node<K, V>>,
        node: NodeView<K, V>,
        left: NodeView<K, V>,
        right: NodeView<K, V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> Result<(), Conflict> {
        let mut successor_parent = node;
        let mut successor = right;
        while let Some(next) = view(&successor.left, guard) {
            successor_parent = successor;
            successor = next;
        }

        let _successor_parent_held = if successor_parent == node {
            None
        } else {
            Some(successor_parent.lock.lock())
        };
        let _successor_held = successor.lock.lock();

        // node.right cannot change while node is locked, so re-walking the
        // left spine under the locks confirms the successor is still the
        // minimum of the right subtree.
        let mut spine_parent = node;
        let mut spine = right;
        while let Some(next) = view(&spine.left, guard) {
            spine_parent = spine;
            spine = next;
        }

        if spine_parent != successor_parent
            || spine != successor
            || successor_parent.is_unlinked()
            || successor.is_unlinked()
        {
            trace_log!("successor moved before it was locked");
            return Err(Conflict);
        }

        let mut replacement = Node::new(successor.key.clone(), successor.load_value());
        let successor_right = successor.right.load(Ordering::Acquire);
        *replacement.left.get_mut() = left.as_ptr();
        *replacement.right.get_mut() = if successor_parent == node {
            successor_right
        } else {
            right.as_ptr()
        };

        // readers whose path crosses either node must retry from now on
        node.unlinked.store(true, Ordering::Release);
        successor.unlinked.store(true, Ordering::Release);

        if successor_parent != node {
            successor_parent.left.store(successor_right, Ordering::Release);
        }
        slot.store(Box::into_raw(replacement), Ordering::Release);

        guard.defer_drop(Deferred::Node(successor));

        Ok(())
    }
}

/// A replaced value awaiting reclamation.
pub(crate) struct ValuePtr<V>(pub(crate) *mut V);

unsafe impl<V: Send> Send for ValuePtr<V> {}

unsafe impl<V: Send + Sync> Sync for ValuePtr<V> {}
