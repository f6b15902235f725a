use std::cmp::Ordering as CmpOrdering;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};

use crate::data_structures::CollectionNode;
use crate::data_structures::MarkedPtr;
use crate::error::VerifyError;
use crate::guard::Guard;

pub(crate) type NodePtr<T> = *mut SortedListNode<T>;

///
/// Concurrent singly linked list based on Harris's paper 'A Pragmatic Implementation of Non-Blocking Linked-Lists'.
/// Serves both as a general ordered list and as the backing list of SplitOrderedHashMap.
///
// =============================================================================
// SORTED LIST INVARIANTS & REMOVE OPERATION
// =============================================================================
//
// List Structure (sorted ascending):
// ┌──────┐    ┌──────┐    ┌──────┐    ┌──────┐    ┌──────┐
// │ HEAD │───►│  10  │───►│  20  │───►│  30  │───►│ NULL │
// │(sent)│    │      │    │      │    │      │    │      │
// └──────┘    └──────┘    └──────┘    └──────┘    └──────┘
//
// Marked Pointer: The mark bit on node.next indicates the NODE is logically deleted.
//                 curr.next = (succ | MARK) means curr is deleted, succ is untouched.
//
// INVARIANTS:
// 1. Live nodes reachable from HEAD are ordered by the caller's Ord, as long as
//    only ordered operations (inject, insert_before after search) are used.
//    `push` prepends and does not keep the order.
// 2. Once marked, a node never becomes unmarked and its next word never changes.
// 3. HEAD sentinel is never marked or removed.
// 4. The thread whose CAS physically unlinks a node is the one that defers it.
//
// =============================================================================
// REMOVE OPERATION (Two-Phase Delete)
// =============================================================================
//
// Phase 1: LOGICAL DELETE (mark curr.next)         - linearization point
// Phase 2: PHYSICAL UNLINK (CAS pred.next from curr to succ) - by anyone
//
// Before:  pred ──────► curr ──────► succ
//
// Step 1 - Mark curr (logical delete):
//          pred ──────► curr ──╳───► succ
//                              │
//                           (marked)
//
// Step 2 - Unlink (CAS pred.next from curr to succ):
//          pred ─────────────────────► succ
//                       curr ──╳───► succ  (unlinked, deferred by the unlinker)
//
// The unlink CAS expects an UNMARKED pred.next equal to curr. It fails when
// pred has been marked in the meantime, or when pred.next moved on (someone
// else unlinked curr, or inserted in front of it). Every failure restarts the
// traversal from the start node, so a thread never patches a topology it has
// not re-read. Exactly one unlink CAS can succeed for a node: after it, curr is
// only referenced by marked nodes, whose next words can no longer be swapped.
//
// =============================================================================
// INSERT
// =============================================================================
//
// Insert CAS: pred.next from curr to new_node, with new_node.next = curr.
// If pred got marked, the CAS fails (its word carries the mark bit). If curr
// got marked after the search, the insert still succeeds and new_node.next is
// a marked node; the next traversal through new_node snips it.
//
#[derive(Debug)]
pub struct SortedListNode<T> {
    data: Option<T>,
    next: AtomicPtr<SortedListNode<T>>,
}

impl<T> SortedListNode<T> {
    fn new(key: T) -> Self {
        SortedListNode {
            data: Some(key),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn new_sentinel() -> Self {
        SortedListNode {
            data: None,
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// The value of a data node, `None` for the head sentinel.
    #[inline]
    pub(crate) fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Whether the node has been logically deleted.
    #[inline]
    pub(crate) fn is_deleted(&self) -> bool {
        MarkedPtr::new(self.get_next()).is_marked()
    }

    // =========================================================================
    // Next pointer accessors
    // =========================================================================

    /// Load next pointer (Acquire ordering)
    #[inline]
    pub(crate) fn get_next(&self) -> NodePtr<T> {
        self.next.load(Ordering::Acquire)
    }

    /// Store next pointer (Release ordering). Only valid before the node is published.
    #[inline]
    fn set_next(&self, ptr: NodePtr<T>) {
        self.next.store(ptr, Ordering::Release)
    }

    /// CAS next pointer (AcqRel/Acquire ordering)
    #[inline]
    fn cas_next(&self, expected: NodePtr<T>, new: NodePtr<T>) -> Result<NodePtr<T>, NodePtr<T>> {
        self.next
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

impl<T> CollectionNode<T> for SortedListNode<T> {
    fn key(&self) -> &T {
        self.data
            .as_ref()
            .expect("Cannot get key from sentinel node")
    }
}

/// Position found by a list search.
///
/// `pred` is the last live node ordered before the searched value (the head
/// sentinel when there is none) and `node` is either the exact match or the
/// first node ordered after the searched value (null at the end of the list).
/// Inserting between `pred` and `node` keeps the list ordered, provided the
/// insert CAS still finds `node` behind `pred`.
///
/// The pointers are only valid while the list's guard protects them, so the
/// positional operations that take a `ListHit` are `unsafe`.
///
pub struct ListHit<T> {
    pred: NodePtr<T>,
    node: NodePtr<T>,
    found: bool,
}

// Manual impls to avoid requiring T: Clone/Copy
impl<T> Copy for ListHit<T> {}

impl<T> Clone for ListHit<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> ListHit<T> {
    pub(crate) fn new(pred: NodePtr<T>, node: NodePtr<T>, found: bool) -> Self {
        ListHit { pred, node, found }
    }

    /// Whether the search found an exact match.
    pub fn found(&self) -> bool {
        self.found
    }

    /// Predecessor node (for positional inserts).
    pub fn pred(&self) -> NodePtr<T> {
        self.pred
    }

    /// The matched node, or the successor when nothing matched. Null at the end.
    pub fn node(&self) -> NodePtr<T> {
        self.node
    }

    /// The value before the searched position, `None` when that is the head.
    ///
    /// # Safety
    /// The hit must come from a live list and its nodes must not have been reclaimed.
    pub unsafe fn before(&self) -> Option<&T> {
        unsafe { (*self.pred).data() }
    }

    /// The matched value, if any.
    ///
    /// # Safety
    /// The hit must come from a live list and its nodes must not have been reclaimed.
    pub unsafe fn matched(&self) -> Option<&T> {
        if self.found {
            unsafe { (*self.node).data() }
        } else {
            None
        }
    }
}

/// Cloned view of a search: the value before, the exact match and the value after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult<T> {
    pub before: Option<T>,
    pub found: Option<T>,
    pub after: Option<T>,
}

pub struct SortedList<T, G: Guard> {
    head: AtomicPtr<SortedListNode<T>>,
    size: AtomicIsize,
    /// Shared guard instance for deferred destruction.
    guard: G,
    _marker: PhantomData<Box<SortedListNode<T>>>,
}

// Values move between threads through push/pop and are read concurrently.
unsafe impl<T: Send, G: Guard> Send for SortedList<T, G> {}
unsafe impl<T: Send + Sync, G: Guard> Sync for SortedList<T, G> {}

impl<T, G> SortedList<T, G>
where
    G: Guard,
{
    pub fn new() -> Self {
        // Create sentinel head node without a value.
        //
        let head_node = Box::into_raw(Box::new(SortedListNode::new_sentinel()));
        SortedList {
            head: AtomicPtr::new(head_node),
            size: AtomicIsize::new(0),
            guard: G::default(),
            _marker: PhantomData,
        }
    }

    /// Get the shared guard instance for this collection.
    pub fn guard(&self) -> &G {
        &self.guard
    }

    /// Number of nodes added minus nodes removed.
    ///
    /// May trail concurrent operations, converges once they complete.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        let _guard = G::pin();
        self.first_node_internal().is_none()
    }

    #[inline]
    fn head_ptr(&self) -> NodePtr<T> {
        self.head.load(Ordering::Acquire)
    }

    /// Allocate an unpublished node.
    pub(crate) fn alloc_node(value: T) -> NodePtr<T> {
        Box::into_raw(Box::new(SortedListNode::new(value)))
    }

    /// Take the value back out of a node that was never published.
    ///
    /// # Safety
    /// `node` must come from `alloc_node` and must not be reachable by any thread.
    pub(crate) unsafe fn reclaim_unpublished(node: NodePtr<T>) -> T {
        let node = unsafe { Box::from_raw(node) };
        node.data.expect("allocated nodes carry a value")
    }

    /// Snip a marked node out from behind `pred`. The winner defers the node.
    ///
    /// # Safety
    /// `pred` and `curr` must be protected by the guard, `succ` must be the
    /// unmasked successor stored in curr's marked next word.
    #[inline]
    unsafe fn try_unlink(&self, pred: NodePtr<T>, curr: NodePtr<T>, succ: NodePtr<T>) -> bool {
        if unsafe { (*pred).cas_next(curr, succ) }.is_ok() {
            unsafe {
                self.guard
                    .defer_destroy(curr, <SortedListNode<T> as CollectionNode<T>>::dealloc_ptr);
            }
            true
        } else {
            false
        }
    }

    /// Core traversal: find with cleanup.
    ///
    /// Walks from `start` (HEAD when `None`), snipping every marked node on the
    /// way. `compare` orders a node's value against the target. Traversal stops
    /// at the first live node ordered after the target, or at an equal node for
    /// which `accept` returns true (`found`). Equal nodes that are not accepted
    /// are passed over, so the hash map can scan a run of colliding hashes.
    ///
    /// When a snip CAS fails the traversal restarts from `start`, or from HEAD
    /// once `start` itself has been deleted.
    ///
    pub(crate) fn search_from<C, A>(
        &self,
        start: Option<NodePtr<T>>,
        compare: C,
        accept: A,
    ) -> ListHit<T>
    where
        C: Fn(&T) -> CmpOrdering,
        A: Fn(&T) -> bool,
    {
        let head = self.head_ptr();
        let mut start = start.map(MarkedPtr::unmask).unwrap_or(head);

        'retry: loop {
            if unsafe { (*start).is_deleted() } {
                start = head;
            }

            let mut pred = start;
            let mut curr = MarkedPtr::unmask(unsafe { (*pred).get_next() });

            loop {
                if curr.is_null() {
                    return ListHit::new(pred, curr, false);
                }

                let next = MarkedPtr::new(unsafe { (*curr).get_next() });

                if next.is_marked() {
                    // Help: physically remove the deleted node.
                    //
                    if unsafe { self.try_unlink(pred, curr, next.as_ptr()) } {
                        curr = next.as_ptr();
                        continue;
                    }
                    continue 'retry;
                }

                if let Some(value) = unsafe { (*curr).data() } {
                    match compare(value) {
                        CmpOrdering::Greater => return ListHit::new(pred, curr, false),
                        CmpOrdering::Equal if accept(value) => {
                            return ListHit::new(pred, curr, true);
                        }
                        _ => {}
                    }
                }

                pred = curr;
                curr = next.as_ptr();
            }
        }
    }

    /// Single CAS linking `node` between `hit.pred` and `hit.node`.
    ///
    /// # Safety
    /// `hit` must be guard protected and `node` must be unpublished.
    pub(crate) unsafe fn try_link(&self, hit: &ListHit<T>, node: NodePtr<T>) -> bool {
        unsafe {
            (*node).set_next(hit.node);
            if (*hit.pred).cas_next(hit.node, node).is_ok() {
                self.size.fetch_add(1, Ordering::AcqRel);
                true
            } else {
                false
            }
        }
    }

    /// Logically delete `node`. Returns false if someone else deleted it first.
    ///
    /// # Safety
    /// `node` must be a guard protected data node of this list.
    pub(crate) unsafe fn mark_deleted(&self, node: NodePtr<T>) -> bool {
        loop {
            let next = MarkedPtr::new(unsafe { (*node).get_next() });
            if next.is_marked() {
                return false;
            }
            let marked = next.with_mark(true);
            if unsafe { (*node).cas_next(next.as_raw(), marked.as_raw()) }.is_ok() {
                self.size.fetch_sub(1, Ordering::AcqRel);
                return true;
            }
            // next moved (insert behind node or a snip), retry on the new word
        }
    }

    /// Insert `value` between the nodes of `hit`.
    ///
    /// Single CAS: on contention the value is handed back and the caller is
    /// expected to search again.
    ///
    /// # Safety
    /// `hit` must come from a search on this list and its nodes must still be
    /// protected (hold `G::pin()` across the search and this call).
    pub unsafe fn insert_before(&self, hit: &ListHit<T>, value: T) -> Result<ListHit<T>, T> {
        let node = Self::alloc_node(value);
        if unsafe { self.try_link(hit, node) } {
            Ok(ListHit::new(hit.pred, node, true))
        } else {
            Err(unsafe { Self::reclaim_unpublished(node) })
        }
    }

    /// Logically delete the node of `hit` and try to unlink it.
    ///
    /// Returns false when the node was already deleted, or when `hit` holds no
    /// match. A failed unlink is left to the next traversal passing by.
    ///
    /// # Safety
    /// `hit` must come from a search on this list and its nodes must still be
    /// protected (hold `G::pin()` across the search and this call).
    pub unsafe fn remove_exact(&self, hit: &ListHit<T>) -> bool {
        if !hit.found || hit.node.is_null() {
            return false;
        }
        let node = hit.node;
        if !unsafe { self.mark_deleted(node) } {
            return false;
        }
        let succ = MarkedPtr::unmask(unsafe { (*node).get_next() });
        unsafe {
            self.try_unlink(hit.pred, node, succ);
        }
        true
    }

    /// Prepend `value` right after HEAD, ignoring order.
    ///
    pub fn push(&self, value: T) {
        let _guard = G::pin();
        let head = self.head_ptr();
        let node = Self::alloc_node(value);
        loop {
            let first = unsafe { (*head).get_next() };
            let hit = ListHit::new(head, first, false);
            if unsafe { self.try_link(&hit, node) } {
                return;
            }
        }
    }

    /// Remove and return the first live value, or `None` when empty.
    ///
    pub fn pop(&self) -> Option<T>
    where
        T: Clone,
    {
        let _guard = G::pin();
        loop {
            // Every value orders "after", so this stops at the first live node.
            let hit = self.search_from(None, |_| CmpOrdering::Greater, |_| false);
            if hit.node.is_null() {
                return None;
            }
            let hit = ListHit::new(hit.pred, hit.node, true);
            let value = unsafe { (*hit.node).key().clone() };
            if unsafe { self.remove_exact(&hit) } {
                return Some(value);
            }
            // Raced with another pop or remove, retry.
        }
    }

    /// Get the first data node (skips the head sentinel and deleted nodes).
    ///
    pub(crate) fn first_node_internal(&self) -> Option<NodePtr<T>> {
        self.next_node_internal(self.head_ptr())
    }

    /// Get the next live node after the given node, without helping.
    ///
    pub(crate) fn next_node_internal(&self, node: NodePtr<T>) -> Option<NodePtr<T>> {
        let node = MarkedPtr::unmask(node);
        if node.is_null() {
            return None;
        }

        let mut curr = MarkedPtr::unmask(unsafe { (*node).get_next() });
        while !curr.is_null() {
            let next = MarkedPtr::new(unsafe { (*curr).get_next() });
            if !next.is_marked() {
                return Some(curr);
            }
            curr = next.as_ptr();
        }
        None
    }

    /// Walk live values in list order until `f` returns true.
    ///
    /// Returns true when the walk was interrupted by `f`.
    pub fn each<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        let _guard = G::pin();
        let mut current = self.first_node_internal();
        while let Some(node) = current {
            if f(unsafe { (*node).key() }) {
                return true;
            }
            current = self.next_node_internal(node);
        }
        false
    }

    /// Iterate over cloned live values in list order.
    pub fn iter(&self) -> SortedListIter<'_, T, G> {
        SortedListIter::new(self)
    }

    /// Collects all live values into a Vec.
    ///
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().collect()
    }

    /// Check that adjacent live nodes are in non-decreasing order.
    ///
    /// Diagnostic walk for tests. Every offending pair is reported.
    pub fn verify(&self) -> Result<(), VerifyError>
    where
        T: Ord + Debug,
    {
        let _guard = G::pin();
        let mut pairs = Vec::new();
        let mut prev = self.first_node_internal();
        while let Some(node) = prev {
            let next = self.next_node_internal(node);
            if let Some(next_node) = next {
                let (a, b) = unsafe { ((*node).key(), (*next_node).key()) };
                if a > b {
                    pairs.push((format!("{a:?}"), format!("{b:?}")));
                }
            }
            prev = next;
        }

        if pairs.is_empty() {
            Ok(())
        } else {
            tracing::warn!(offending_pairs = pairs.len(), "sorted list failed verification");
            Err(VerifyError::Unordered { pairs })
        }
    }
}

impl<T, G> SortedList<T, G>
where
    T: Ord,
    G: Guard,
{
    /// Insert `value` in order. Equal values are kept, the new one after them.
    ///
    pub fn inject(&self, value: T) {
        let _guard = G::pin();
        let node = Self::alloc_node(value);
        let key = unsafe { (*node).key() };
        loop {
            let hit = self.search_from(None, |v| v.cmp(key), |_| false);
            if unsafe { self.try_link(&hit, node) } {
                return;
            }
        }
    }

    /// Search for `key` and return the values around it.
    ///
    /// `before` is `None` when the position is right after HEAD, `after` is
    /// the first value following the match (or following the position when
    /// there is no match).
    pub fn search(&self, key: &T) -> SearchResult<T>
    where
        T: Clone,
    {
        let _guard = G::pin();
        let hit = self.search_from(None, |v| v.cmp(key), |_| true);
        let after = if hit.found {
            self.next_node_internal(hit.node)
        } else if hit.node.is_null() {
            None
        } else {
            Some(hit.node)
        };

        unsafe {
            SearchResult {
                before: hit.before().cloned(),
                found: hit.matched().cloned(),
                after: after.map(|node| (*node).key().clone()),
            }
        }
    }

    /// Search positioned at `key` for use with `insert_before`/`remove_exact`.
    ///
    /// The returned pointers are only protected while the caller keeps a
    /// guard from `G::pin()` alive (or uses `DeferredGuard`).
    pub fn locate(&self, key: &T) -> ListHit<T> {
        self.search_from(None, |v| v.cmp(key), |_| true)
    }

    /// Check if an equal value is in the list.
    ///
    pub fn contains(&self, key: &T) -> bool {
        let _guard = G::pin();
        self.search_from(None, |v| v.cmp(key), |_| true).found
    }

    /// Remove one value equal to `key` and return it.
    ///
    pub fn remove(&self, key: &T) -> Option<T>
    where
        T: Clone,
    {
        let _guard = G::pin();
        loop {
            let hit = self.search_from(None, |v| v.cmp(key), |_| true);
            if !hit.found {
                return None;
            }
            let value = unsafe { (*hit.node).key().clone() };
            if unsafe { self.remove_exact(&hit) } {
                return Some(value);
            }
        }
    }
}

impl<T, G> Default for SortedList<T, G>
where
    G: Guard,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G: Guard> Drop for SortedList<T, G> {
    fn drop(&mut self) {
        // Free every node still reachable, including the sentinel and nodes
        // that were marked but never snipped. Snipped nodes belong to the guard.
        //
        let mut curr = *self.head.get_mut();

        while !curr.is_null() {
            unsafe {
                let next = MarkedPtr::unmask((*curr).get_next());
                <SortedListNode<T> as CollectionNode<T>>::dealloc_ptr(curr);
                curr = next;
            }
        }
    }
}

// ============================================================================
// Iterator Support
// ============================================================================

/// Iterator over a sorted list with guard protection.
///
/// Holds a read guard for the duration of iteration. Values are cloned since
/// the nodes can be removed concurrently.
///
pub struct SortedListIter<'a, T, G: Guard> {
    _guard: G::ReadGuard,
    list: &'a SortedList<T, G>,
    current_node: Option<NodePtr<T>>,
}

impl<'a, T, G: Guard> SortedListIter<'a, T, G> {
    fn new(list: &'a SortedList<T, G>) -> Self {
        let guard = G::pin();
        let first = list.first_node_internal();
        Self {
            _guard: guard,
            list,
            current_node: first,
        }
    }
}

impl<T: Clone, G: Guard> Iterator for SortedListIter<'_, T, G> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current_node?;
        self.current_node = self.list.next_node_internal(node);
        unsafe { Some((*node).key().clone()) }
    }
}

// ============================================================================
// Tests - Unique to SortedList
// ============================================================================
