//! Epoch-based guard implementation using crossbeam-epoch.
//!
//! `EpochGuard` is a zero-sized type that schedules destruction using the global
//! epoch collector. Collections parameterized with `EpochGuard` get epoch-based
//! memory reclamation:
//!
//! ```text
//! SortedList<i32, EpochGuard>
//!     │
//!     └── unlinked nodes go to the global collector
//!
//! SplitOrderedHashMap<K, V, EpochGuard>
//!     │
//!     ├── unlinked entry nodes
//!     └── value boxes replaced by put / put_if_present
//! ```

use crossbeam_epoch::{self as epoch, Guard as CrossbeamGuard};
use splitorder_core::guard::Guard;

/// Epoch-based memory reclamation guard.
///
/// Nodes are not freed until all threads have advanced past the epoch
/// in which they were unlinked.
///
/// Unlike `DeferredGuard` which stores pending destructions, `EpochGuard`
/// keeps no state: every operation pins the current thread through `pin()`,
/// and `defer_destroy` hands the pointer to the global collector. Memory is
/// reclaimed while the collection is in use, which suits long-running maps.
///
/// Reclamation can run after the collection itself was dropped, so value
/// types should not borrow data that dies with it.
///
#[derive(Clone, Copy, Default, Debug)]
pub struct EpochGuard;

impl EpochGuard {
    pub fn new() -> Self {
        EpochGuard
    }
}

impl Guard for EpochGuard {
    /// A pinned crossbeam guard, protecting reads for the whole operation.
    type ReadGuard = CrossbeamGuard;

    fn pin() -> Self::ReadGuard {
        epoch::pin()
    }

    unsafe fn defer_destroy<N>(&self, ptr: *mut N, dealloc: unsafe fn(*mut N)) {
        // Destruction runs once every thread pinned now has unpinned.
        let guard = epoch::pin();
        unsafe {
            guard.defer_unchecked(move || {
                dealloc(ptr);
            });
        }
    }
}
