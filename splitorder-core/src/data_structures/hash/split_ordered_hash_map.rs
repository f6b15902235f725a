use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, AtomicU32, Ordering};

use crate::config::{MAX_EXPONENT, SplitOrderedConfig};
use crate::data_structures::CollectionNode;
use crate::data_structures::sorted::sorted_list::{ListHit, SortedList, SortedListNode};
use crate::error::{ConfigError, VerifyError};
use crate::guard::Guard;

type EntryNode<K, V> = SortedListNode<SplitOrderedEntry<K, V>>;
type EntryPtr<K, V> = *mut EntryNode<K, V>;

/// Number of directory levels: level 0 holds bucket 0, level `i` holds
/// buckets `2^(i-1)..2^i`.
const DIRECTORY_LEVELS: usize = MAX_EXPONENT as usize + 1;

/// A unified entry type for the split-ordered list.
/// Combines sentinels and regular entries in a single type.
///
/// Entries are ordered by `split_key` only. A sentinel's split key has bit 0
/// clear and a regular entry's has it set, so a bucket's sentinel always sorts
/// before the entries it owns.
pub enum SplitOrderedEntry<K, V> {
    Sentinel {
        split_key: u32, // Bit-reversed bucket index, LSB clear
        bucket: u32,
    },
    Regular {
        split_key: u32, // Bit-reversed hash, LSB set
        hash: u32,
        key: K,
        value: AtomicPtr<V>,
    },
}

// The value slot owns a `Box<V>`.
unsafe impl<K: Send, V: Send> Send for SplitOrderedEntry<K, V> {}
unsafe impl<K: Sync, V: Send + Sync> Sync for SplitOrderedEntry<K, V> {}

#[inline]
fn sentinel_key(bucket: u32) -> u32 {
    bucket.reverse_bits() & !1
}

#[inline]
fn regular_key(hash: u32) -> u32 {
    hash.reverse_bits() | 1
}

/// Bucket `b` hangs off `b` with its highest set bit cleared.
/// For example: bucket 5 (101) -> parent 1 (001), bucket 6 (110) -> parent 2 (010)
#[inline]
fn parent_bucket(bucket: u32) -> u32 {
    if bucket == 0 {
        return 0;
    }
    bucket & !(1 << bucket.ilog2())
}

/// Directory position of a bucket: (level, slot within the level).
#[inline]
fn bucket_slot(bucket: u32) -> (usize, usize) {
    if bucket == 0 {
        return (0, 0);
    }
    let level = bucket.ilog2();
    (level as usize + 1, (bucket - (1 << level)) as usize)
}

unsafe fn drop_value<V>(ptr: *mut V) {
    unsafe { drop(Box::from_raw(ptr)) };
}

impl<K, V> SplitOrderedEntry<K, V> {
    fn new_sentinel(bucket: u32) -> Self {
        SplitOrderedEntry::Sentinel {
            split_key: sentinel_key(bucket),
            bucket,
        }
    }

    fn new_regular(hash: u32, key: K, value: V) -> Self {
        SplitOrderedEntry::Regular {
            split_key: regular_key(hash),
            hash,
            key,
            value: AtomicPtr::new(Box::into_raw(Box::new(value))),
        }
    }

    pub fn split_key(&self) -> u32 {
        match self {
            SplitOrderedEntry::Sentinel { split_key, .. } => *split_key,
            SplitOrderedEntry::Regular { split_key, .. } => *split_key,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, SplitOrderedEntry::Sentinel { .. })
    }

    /// Bucket owned by a sentinel, `None` for regular entries.
    pub fn bucket(&self) -> Option<u32> {
        match self {
            SplitOrderedEntry::Sentinel { bucket, .. } => Some(*bucket),
            SplitOrderedEntry::Regular { .. } => None,
        }
    }

    /// Whether this is the regular entry for `key`.
    fn matches(&self, hash: u32, key: &K) -> bool
    where
        K: Eq,
    {
        match self {
            SplitOrderedEntry::Regular { hash: h, key: k, .. } => *h == hash && k == key,
            SplitOrderedEntry::Sentinel { .. } => false,
        }
    }

    /// Whether both are regular entries for the same key.
    fn same_key(&self, other: &Self) -> bool
    where
        K: Eq,
    {
        match other {
            SplitOrderedEntry::Regular { hash, key, .. } => self.matches(*hash, key),
            SplitOrderedEntry::Sentinel { .. } => false,
        }
    }

    fn value_slot(&self) -> Option<&AtomicPtr<V>> {
        match self {
            SplitOrderedEntry::Regular { value, .. } => Some(value),
            SplitOrderedEntry::Sentinel { .. } => None,
        }
    }

    /// Key and current value of a regular entry.
    ///
    /// # Safety
    /// The caller must be pinned so a concurrently replaced value box stays alive.
    unsafe fn key_value(&self) -> Option<(&K, &V)> {
        match self {
            SplitOrderedEntry::Regular { key, value, .. } => {
                let ptr = value.load(Ordering::Acquire);
                if ptr.is_null() {
                    None
                } else {
                    Some((key, unsafe { &*ptr }))
                }
            }
            SplitOrderedEntry::Sentinel { .. } => None,
        }
    }
}

impl<K, V> Drop for SplitOrderedEntry<K, V> {
    fn drop(&mut self) {
        if let SplitOrderedEntry::Regular { value, .. } = self {
            let ptr = *value.get_mut();
            if !ptr.is_null() {
                unsafe { drop_value(ptr) };
            }
        }
    }
}

impl<K, V> PartialEq for SplitOrderedEntry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.split_key() == other.split_key()
    }
}

impl<K, V> Eq for SplitOrderedEntry<K, V> {}

impl<K, V> PartialOrd for SplitOrderedEntry<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for SplitOrderedEntry<K, V> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.split_key().cmp(&other.split_key())
    }
}

impl<K, V> fmt::Debug for SplitOrderedEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitOrderedEntry::Sentinel { split_key, bucket } => {
                write!(f, "S{bucket}[{split_key:#010x}]")
            }
            SplitOrderedEntry::Regular {
                split_key, hash, ..
            } => write!(f, "K(h={hash:#x})[{split_key:#010x}]"),
        }
    }
}

/// One level of the bucket directory.
///
/// Slots start out null and are CAS-published exactly once with the address
/// of their bucket's sentinel node.
struct BucketLevel<K, V> {
    slots: Box<[AtomicPtr<EntryNode<K, V>>]>,
}

impl<K, V> BucketLevel<K, V> {
    fn new(len: usize) -> Self {
        BucketLevel {
            slots: (0..len).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
        }
    }
}

#[doc = r#"Lock-free Split-Ordered HashMap using SortedList

Based on Shalev and Shavit's "Split-Ordered Lists: Lock-Free Extensible Hash Tables" (2006).
The key insight is that items are ordered by reverse-bit hash, allowing bucket splits
without moving items in the list.

# Bucket Architecture in Split-Ordered Hash Table

## Overview
Buckets are logical divisions of a single sorted linked list. Each bucket is marked
by a "sentinel" node that acts as a starting point for operations on that bucket.

## Key Concepts

### 1. Reverse-Bit Ordering
Items are ordered by the reverse of their 32-bit hash, not by hash value:
- Hash: 0b0101 → Reverse: 0b1010 << 28
- This ensures items destined for future buckets are already in position

### 2. Bucket Sentinels
Each bucket has a sentinel node with:
- split_key = reverse_bits(bucket_index) with LSB cleared
- Regular entries have LSB set to 1, sentinels have LSB = 0
- This ensures sentinels always come before their bucket's items

### 3. Parent-Child Hierarchy
Buckets form a binary tree where parent(b) = b with highest bit cleared:

Bucket 0: '0000' -> parent: 0 (root)
Bucket 1: '0001' -> parent: 0 (clear bit 0)
Bucket 2: '0010' -> parent: 0 (clear bit 1)
Bucket 3: '0011' -> parent: 1 (clear bit 1, keeping bit 0)
Bucket 5: '0101' -> parent: 1 (clear bit 2, keeping bit 0)
Bucket 6: '0110' -> parent: 2 (clear bit 2, keeping bit 1)
Bucket 7: '0111' -> parent: 3 (clear bit 2, keeping bits 0&1)

A parent's sentinel always sorts before its children's, so a child sentinel
is found or inserted by searching forward from the parent.

### 4. Bucket Splitting During Growth
When table doubles from N to 2N buckets:
- Bucket i splits into buckets i and i+N
- Items don't move in the list!
- Example: When growing from 4 to 8 buckets:
  - Bucket 0 splits into 0 and 4
  - Bucket 1 splits into 1 and 5
  - Items with (hash % 8)=4 were already positioned after items with (hash % 8=0) due to reverse-bit ordering

### 5. Lazy Sentinel Initialization
Sentinels are inserted only when first accessed, by readers and writers alike:
1. Thread needs bucket 7
2. Walks up the parent chain (3, then 1) to the nearest published bucket
3. Materializes the missing ancestors top-down, each from its parent sentinel
4. Inserts sentinel 7 after sentinel 3 and publishes it in the directory

If another thread already inserted the sentinel, it is found and published instead.
Only one sentinel per bucket ever exists in the list.

## Memory Layout Example

List structure with 8 buckets (after growing from 4):

HEAD -> S0 -> K(h=8) -> K(h=16) -> S4 -> K(h=4) -> S2 → K(h=2) -> S6 -> K(h=6) →
        S1 -> K(h=1) -> K(h=9)  -> S5 -> K(h=5) -> S3 → K(h=3) -> S7 -> K(h=7) → NULL

Where:
- Sn = Sentinel for bucket n
- K(h=x) = Key with hash value x
- Order is by reverse-bit value, not hash value

## Bucket Directory

Two-level jagged array, one level per exponent:

level 0:  [S0]
level 1:  [S1]
level 2:  [S2, S3]
level 3:  [S4, S5, S6, S7]
...
level i:  2^(i-1) slots for buckets 2^(i-1)..2^i

Growth from exponent e publishes level e+1 with a CAS, then CASes the
exponent forward. A thread that finds the level already published helps
with the exponent. Levels are never replaced, so a published sentinel
address stays valid for the lifetime of the map."#]
pub struct SplitOrderedHashMap<K, V, G: Guard, S = RandomState> {
    list: SortedList<SplitOrderedEntry<K, V>, G>,
    size: AtomicIsize,
    exponent: AtomicU32,
    directory: [AtomicPtr<BucketLevel<K, V>>; DIRECTORY_LEVELS],
    load_factor: f64,
    hasher: S,
}

unsafe impl<K: Send, V: Send, G: Guard, S: Send> Send for SplitOrderedHashMap<K, V, G, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, G: Guard, S: Sync> Sync
    for SplitOrderedHashMap<K, V, G, S>
{
}

impl<K, V, G> SplitOrderedHashMap<K, V, G, RandomState>
where
    K: Hash + Eq,
    V: Clone,
    G: Guard,
{
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    pub fn with_config(config: SplitOrderedConfig) -> Result<Self, ConfigError> {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K, V, G> Default for SplitOrderedHashMap<K, V, G, RandomState>
where
    K: Hash + Eq,
    V: Clone,
    G: Guard,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, G, S> SplitOrderedHashMap<K, V, G, S>
where
    K: Hash + Eq,
    V: Clone,
    G: Guard,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::build(SplitOrderedConfig::default(), hasher)
    }

    pub fn with_config_and_hasher(config: SplitOrderedConfig, hasher: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, hasher))
    }

    fn build(config: SplitOrderedConfig, hasher: S) -> Self {
        let map = SplitOrderedHashMap {
            list: SortedList::new(),
            size: AtomicIsize::new(0),
            exponent: AtomicU32::new(config.initial_exponent),
            directory: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            load_factor: config.load_factor,
            hasher,
        };

        // Pre-allocate the levels covered by the initial exponent.
        for level in 0..=config.initial_exponent as usize {
            let len = if level == 0 { 1 } else { 1 << (level - 1) };
            let fresh = Box::into_raw(Box::new(BucketLevel::new(len)));
            map.directory[level].store(fresh, Ordering::Release);
        }

        // Bucket 0 is the root every other bucket hangs off, link it right after HEAD.
        let root = map.find_or_insert_sentinel(None, 0);
        map.publish_sentinel(0, root);

        map
    }

    fn hash_key(&self, key: &K) -> u32 {
        self.hasher.hash_one(key) as u32
    }

    /// Current directory exponent, the table addresses `2^exponent` buckets.
    pub fn exponent(&self) -> u32 {
        self.exponent.load(Ordering::Acquire)
    }

    pub fn bucket_count(&self) -> usize {
        1usize << self.exponent()
    }

    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Returns the number of key-value pairs in the map.
    ///
    /// Eventually consistent: may trail mutations still in flight.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire).max(0) as usize
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Bucket directory
    // =========================================================================

    fn directory_slot(&self, bucket: u32) -> Option<&AtomicPtr<EntryNode<K, V>>> {
        let (level, slot) = bucket_slot(bucket);
        let level = self.directory[level].load(Ordering::Acquire);
        if level.is_null() {
            return None;
        }
        let level = unsafe { &*level };
        level.slots.get(slot)
    }

    /// Sentinel address published for `bucket`, if any.
    pub(crate) fn published_sentinel(&self, bucket: u32) -> Option<EntryPtr<K, V>> {
        let ptr = self.directory_slot(bucket)?.load(Ordering::Acquire);
        if ptr.is_null() { None } else { Some(ptr) }
    }

    /// Publish `node` as the sentinel of `bucket`, returning the one that won.
    fn publish_sentinel(&self, bucket: u32, node: EntryPtr<K, V>) -> EntryPtr<K, V> {
        let Some(slot) = self.directory_slot(bucket) else {
            return node;
        };
        match slot.compare_exchange(ptr::null_mut(), node, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => node,
            Err(existing) => existing,
        }
    }

    /// Search forward from `start` for the sentinel of `bucket`, inserting it when missing.
    fn find_or_insert_sentinel(&self, start: Option<EntryPtr<K, V>>, bucket: u32) -> EntryPtr<K, V> {
        let split_key = sentinel_key(bucket);
        let mut fresh: Option<EntryPtr<K, V>> = None;

        loop {
            let hit = self.list.search_from(
                start,
                |entry| entry.split_key().cmp(&split_key),
                SplitOrderedEntry::is_sentinel,
            );

            if hit.found() {
                if let Some(node) = fresh {
                    // Another thread linked it first.
                    unsafe { drop(SortedList::<_, G>::reclaim_unpublished(node)) };
                }
                return hit.node();
            }

            let node = *fresh.get_or_insert_with(|| {
                SortedList::<_, G>::alloc_node(SplitOrderedEntry::new_sentinel(bucket))
            });
            if unsafe { self.list.try_link(&hit, node) } {
                tracing::trace!(bucket, split_key, "materialized bucket sentinel");
                return node;
            }
        }
    }

    /// Sentinel of `bucket`, materializing it and any missing ancestors.
    ///
    /// Ancestors are resolved iteratively: the chain of unpublished buckets is
    /// collected walking up (at most one step per hash bit), then materialized
    /// top-down, each one searched from its parent's sentinel.
    fn bucket_sentinel(&self, bucket: u32) -> EntryPtr<K, V> {
        if let Some(sentinel) = self.published_sentinel(bucket) {
            return sentinel;
        }

        let mut pending = [0u32; DIRECTORY_LEVELS];
        let mut depth = 0;
        let mut current = bucket;
        let mut sentinel = loop {
            pending[depth] = current;
            depth += 1;
            let parent = parent_bucket(current);
            if let Some(sentinel) = self.published_sentinel(parent) {
                break sentinel;
            }
            current = parent;
        };

        while depth > 0 {
            depth -= 1;
            let child = pending[depth];
            let node = self.find_or_insert_sentinel(Some(sentinel), child);
            sentinel = self.publish_sentinel(child, node);
        }

        sentinel
    }

    fn bucket_of(&self, hash: u32) -> u32 {
        let mask = ((1u64 << self.exponent()) - 1) as u32;
        hash & mask
    }

    // =========================================================================
    // Growth
    // =========================================================================

    fn add_size(&self, delta: isize) {
        let size = self.size.fetch_add(delta, Ordering::AcqRel) + delta;
        if delta > 0 {
            let exponent = self.exponent();
            if size as f64 > self.load_factor * (1u64 << exponent) as f64 {
                self.grow(exponent);
            }
        }
    }

    /// Double the bucket count from `2^from`.
    ///
    /// Both steps are CASes, losing either race is a no-op.
    fn grow(&self, from: u32) {
        if from >= MAX_EXPONENT {
            return;
        }
        let level = from + 1;
        let slot = &self.directory[level as usize];

        if slot.load(Ordering::Acquire).is_null() {
            let fresh = Box::into_raw(Box::new(BucketLevel::new(1usize << from)));
            if slot
                .compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                unsafe { drop(Box::from_raw(fresh)) };
            }
        }

        if self
            .exponent
            .compare_exchange(from, level, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(
                exponent = level,
                buckets = 1u64 << level,
                len = self.len(),
                "split-ordered table grew"
            );
        }
    }

    // =========================================================================
    // Entry operations
    // =========================================================================

    /// Search the bucket of `hash` for the regular entry accepted by `is_match`.
    fn locate_entry<F>(&self, hash: u32, is_match: F) -> ListHit<SplitOrderedEntry<K, V>>
    where
        F: Fn(&SplitOrderedEntry<K, V>) -> bool,
    {
        let sentinel = self.bucket_sentinel(self.bucket_of(hash));
        let split_key = regular_key(hash);
        self.list.search_from(
            Some(sentinel),
            |entry| entry.split_key().cmp(&split_key),
            is_match,
        )
    }

    pub(crate) fn get_with_hash(&self, hash: u32, key: &K) -> Option<V> {
        let _guard = G::pin();
        let hit = self.locate_entry(hash, |entry| entry.matches(hash, key));
        if !hit.found() {
            return None;
        }
        unsafe {
            (*hit.node())
                .key()
                .key_value()
                .map(|(_, value)| value.clone())
        }
    }

    /// Returns a clone of the value stored for `key`.
    ///
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_with_hash(self.hash_key(key), key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let hash = self.hash_key(key);
        let _guard = G::pin();
        self.locate_entry(hash, |entry| entry.matches(hash, key)).found()
    }

    /// Shared insert path. Links a new entry when the key is absent, otherwise
    /// hands the found node to `on_present` and frees the unused node.
    ///
    /// `on_present` returns `None` when the found node was deleted under it,
    /// and the search runs again.
    fn upsert<F, R>(&self, hash: u32, key: K, value: V, mut on_present: F) -> Result<R, R>
    where
        F: FnMut(&EntryNode<K, V>, &SplitOrderedEntry<K, V>) -> Option<R>,
        R: Default,
    {
        let _guard = G::pin();
        let node = SortedList::<_, G>::alloc_node(SplitOrderedEntry::new_regular(hash, key, value));
        let entry = unsafe { (*node).key() };

        loop {
            let hit = self.locate_entry(hash, |candidate| candidate.same_key(entry));
            if hit.found() {
                let Some(result) = on_present(unsafe { &*hit.node() }, entry) else {
                    continue;
                };
                unsafe { drop(SortedList::<_, G>::reclaim_unpublished(node)) };
                return Err(result);
            }

            if unsafe { self.list.try_link(&hit, node) } {
                self.add_size(1);
                return Ok(R::default());
            }
            // Contention on the insert position, search again.
        }
    }

    pub(crate) fn put_with_hash(&self, hash: u32, key: K, value: V) -> Option<V> {
        let swapped = self.upsert(hash, key, value, |found, fresh| {
            let (Some(slot), Some(fresh_slot)) = (found.key().value_slot(), fresh.value_slot())
            else {
                return Some(None);
            };
            if found.is_deleted() {
                return None;
            }
            // Move the value box over, the unused node is freed with a null slot.
            let new_value = fresh_slot.swap(ptr::null_mut(), Ordering::AcqRel);
            let old_value = slot.swap(new_value, Ordering::AcqRel);
            if found.is_deleted()
                && slot
                    .compare_exchange(new_value, old_value, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                // Deleted under us: put the old value back and insert again.
                fresh_slot.store(new_value, Ordering::Release);
                return None;
            }
            if old_value.is_null() {
                return Some(None);
            }
            let previous = unsafe { (*old_value).clone() };
            unsafe { self.list.guard().defer_destroy(old_value, drop_value::<V>) };
            Some(Some(previous))
        });
        swapped.unwrap_or_else(|previous| previous)
    }

    /// Store `value` for `key`, returning the value it replaced.
    ///
    /// The value slot is swapped atomically, so concurrent `put`s on one key
    /// each get back a value that was really stored.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.put_with_hash(self.hash_key(&key), key, value)
    }

    /// Insert only when `key` is absent. Returns whether it inserted.
    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        let hash = self.hash_key(&key);
        self.upsert(hash, key, value, |_, _| Some(())).is_ok()
    }

    /// Replace the value of `key` only while it equals `expected`.
    ///
    /// Compare-and-swap on the value slot using `V`'s `PartialEq`. Returns
    /// false when the key is absent or the stored value differs.
    pub fn put_if_present(&self, key: &K, expected: &V, new_value: V) -> bool
    where
        V: PartialEq,
    {
        let hash = self.hash_key(key);
        let _guard = G::pin();
        let hit = self.locate_entry(hash, |entry| entry.matches(hash, key));
        if !hit.found() {
            return false;
        }
        let found = unsafe { &*hit.node() };
        let Some(slot) = found.key().value_slot() else {
            return false;
        };

        let fresh = Box::into_raw(Box::new(new_value));
        loop {
            let current = slot.load(Ordering::Acquire);
            if current.is_null() || unsafe { &*current } != expected {
                unsafe { drop_value(fresh) };
                return false;
            }
            if slot
                .compare_exchange(current, fresh, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // A key deleted under the swap is absent, unless another
                // writer already took the new value over.
                if found.is_deleted()
                    && slot
                        .compare_exchange(fresh, current, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    unsafe { self.list.guard().defer_destroy(fresh, drop_value::<V>) };
                    return false;
                }
                unsafe { self.list.guard().defer_destroy(current, drop_value::<V>) };
                return true;
            }
        }
    }

    /// Remove `key`, returning its value. Deleting an absent key is a no-op.
    pub fn delete(&self, key: &K) -> Option<V> {
        let hash = self.hash_key(key);
        let _guard = G::pin();
        loop {
            let hit = self.locate_entry(hash, |entry| entry.matches(hash, key));
            if !hit.found() {
                return None;
            }
            if unsafe { self.list.remove_exact(&hit) } {
                self.add_size(-1);
                // Take the value out so a racing writer can tell it lost.
                let slot = unsafe { (*hit.node()).key() }.value_slot()?;
                let value = slot.swap(ptr::null_mut(), Ordering::AcqRel);
                if value.is_null() {
                    return None;
                }
                let previous = unsafe { (*value).clone() };
                unsafe { self.list.guard().defer_destroy(value, drop_value::<V>) };
                return Some(previous);
            }
            // Lost the mark to a concurrent delete, a fresh search decides.
        }
    }

    /// Alias of `delete`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.delete(key)
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Walk live entries in split order until `f` returns true.
    ///
    /// Returns true when the walk was interrupted by `f`.
    pub fn each<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.list.each(|entry| match unsafe { entry.key_value() } {
            Some((key, value)) => f(key, value),
            None => false,
        })
    }

    /// Collect all live pairs in split order.
    pub fn to_vec(&self) -> Vec<(K, V)>
    where
        K: Clone,
    {
        let mut pairs = Vec::with_capacity(self.len());
        self.each(|key, value| {
            pairs.push((key.clone(), value.clone()));
            false
        });
        pairs
    }

    /// Integrity check for tests.
    ///
    /// Checks that the backing list is in split order, that every published
    /// directory slot holds the sentinel of its own bucket, and that each
    /// published sentinel is the single one for its bucket in the list.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let _guard = G::pin();
        self.list.verify()?;

        let mut listed: HashMap<u32, usize> = HashMap::new();
        self.list.each(|entry| {
            if let Some(bucket) = entry.bucket() {
                *listed.entry(bucket).or_default() += 1;
            }
            false
        });

        if let Some((&bucket, &count)) = listed.iter().find(|(_, count)| **count > 1) {
            tracing::warn!(bucket, count, "duplicate bucket sentinel");
            return Err(VerifyError::DuplicateSentinel { bucket, count });
        }

        let mut unlisted = Vec::new();
        for (level, level_ptr) in self.directory.iter().enumerate() {
            let level_ptr = level_ptr.load(Ordering::Acquire);
            if level_ptr.is_null() {
                continue;
            }
            let base: u32 = if level == 0 { 0 } else { 1 << (level - 1) };
            let level_ref = unsafe { &*level_ptr };
            for (offset, slot) in level_ref.slots.iter().enumerate() {
                let node = slot.load(Ordering::Acquire);
                if node.is_null() {
                    continue;
                }
                let index = base + offset as u32;
                // u32::MAX: the slot does not point at a sentinel.
                let found = unsafe { (*node).data() }
                    .and_then(SplitOrderedEntry::bucket)
                    .unwrap_or(u32::MAX);
                if found != index {
                    tracing::warn!(index, found, "directory slot points at a foreign node");
                    return Err(VerifyError::BucketMismatch { index, found });
                }
                if unsafe { (*node).is_deleted() } || !listed.contains_key(&index) {
                    unlisted.push(index);
                }
            }
        }

        if unlisted.is_empty() {
            Ok(())
        } else {
            tracing::warn!(count = unlisted.len(), "published buckets missing from the list");
            Err(VerifyError::UnlistedBuckets { indices: unlisted })
        }
    }
}

impl<K, V, G: Guard, S> Drop for SplitOrderedHashMap<K, V, G, S> {
    fn drop(&mut self) {
        // Nodes belong to the list, levels only hold their addresses.
        for level in self.directory.iter_mut() {
            let level = *level.get_mut();
            if !level.is_null() {
                unsafe { drop(Box::from_raw(level)) };
            }
        }
    }
}

impl<K, V, G: Guard, S> fmt::Debug for SplitOrderedHashMap<K, V, G, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exponent = self.exponent.load(Ordering::Acquire);
        f.debug_struct("SplitOrderedHashMap")
            .field("len", &self.size.load(Ordering::Acquire).max(0))
            .field("exponent", &exponent)
            .field("buckets", &(1u64 << exponent))
            .field("load_factor", &self.load_factor)
            .finish_non_exhaustive()
    }
}
