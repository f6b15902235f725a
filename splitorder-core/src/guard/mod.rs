//! Guard trait for memory reclamation strategies.
//!
//! Nodes that have been logically deleted and physically unlinked, and value
//! boxes that have been replaced by a `put`, may still be referenced by threads
//! that loaded them before the change. The `Guard` trait abstracts over when
//! such memory is actually released.
//!
//! # Design
//!
//! ```text
//! SortedList<T, G: Guard>
//!     │
//!     ├── SortedList<T, DeferredGuard>   (released when the list drops)
//!     └── SortedList<T, EpochGuard>      (crossbeam-epoch, splitorder-crossbeam)
//!
//! SplitOrderedHashMap<K, V, G: Guard>
//!     └── owns one SortedList<SplitOrderedEntry<K, V>, G>
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use splitorder_core::{DeferredGuard, SortedList};
//! use splitorder_crossbeam::EpochGuard;
//!
//! // Long running process: epoch-based reclamation
//! let list: SortedList<i32, EpochGuard> = SortedList::new();
//! list.inject(42);
//!
//! // Scoped use and tests: everything is released on drop
//! let scoped: SortedList<i32, DeferredGuard> = SortedList::new();
//! ```

mod deferred_guard;

pub use deferred_guard::DeferredGuard;

/// A memory reclamation guard that protects concurrent access to nodes.
///
/// # Safety Contract
///
/// Implementations must ensure that a pointer passed to `defer_destroy` is
/// not released while any thread that pinned a `ReadGuard` before the call
/// may still dereference it.
///
/// Guards are stored in collections and must be `Send + Sync`. The stored
/// guard schedules destruction; per-operation protection comes from `pin`.
///
pub trait Guard: Sized + Default + Send + Sync {
    /// An active guard that protects reads for its lifetime.
    ///
    /// For epoch-based guards this is a pinned `crossbeam_epoch::Guard`.
    /// For deferred guards it is `()`, the stored guard already keeps every
    /// deferred node alive until the collection drops.
    ///
    type ReadGuard: Sized;

    /// Pin an active read guard for the duration of one operation.
    ///
    fn pin() -> Self::ReadGuard;

    /// Schedule a pointer for deferred destruction.
    ///
    /// # Safety
    ///
    /// - `ptr` must be a valid pointer previously allocated by the collection
    /// - `ptr` must no longer be reachable by a new traversal
    /// - `dealloc` must be the correct deallocation function for `ptr`
    /// - the same pointer must not be deferred twice
    ///
    unsafe fn defer_destroy<N>(&self, ptr: *mut N, dealloc: unsafe fn(*mut N));
}
