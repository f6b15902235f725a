//! Deferred guard implementation.
//!
//! This module provides `DeferredGuard`, a guard implementation that defers
//! all destruction until the guard itself (and so its collection) is dropped.

use std::collections::HashSet;
use std::sync::Mutex;

use super::Guard;

/// A guard that defers all destruction until the guard is dropped.
///
/// Removed nodes stay allocated, so any thread still holding a pointer into
/// the list can keep traversing through them. Memory accumulates until the
/// owning collection is dropped, which makes this guard a good fit for
/// scoped structures and tests, and a poor fit for long-running churn.
///
/// # Thread Safety
///
/// `DeferredGuard` uses a `Mutex` internally to collect pointers from
/// multiple threads. The pointers are released when the guard is dropped.
///
pub struct DeferredGuard {
    deferred: Mutex<Vec<DeferredNode>>,
    #[cfg(debug_assertions)]
    seen: Mutex<HashSet<usize>>,
}

struct DeferredNode {
    ptr: *mut (),
    dealloc: unsafe fn(*mut ()),
}

// Safety: DeferredNode only carries the pointer and its deallocation function,
// access is synchronized via the Mutex.
unsafe impl Send for DeferredNode {}

impl DeferredGuard {
    /// Create a new deferred guard.
    pub fn new() -> Self {
        DeferredGuard {
            deferred: Mutex::new(Vec::new()),
            #[cfg(debug_assertions)]
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Number of pointers waiting for release.
    pub fn pending(&self) -> usize {
        self.deferred.lock().map(|nodes| nodes.len()).unwrap_or(0)
    }
}

impl Default for DeferredGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeferredGuard {
    fn drop(&mut self) {
        let nodes = match self.deferred.get_mut() {
            Ok(nodes) => nodes,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Duplicates would mean a double free below.
        let mut seen: HashSet<usize> = HashSet::with_capacity(nodes.len());
        let dup_count = nodes
            .iter()
            .filter(|node| !seen.insert(node.ptr as usize))
            .count();
        if dup_count > 0 {
            tracing::error!(
                duplicates = dup_count,
                total = nodes.len(),
                "duplicate pointers in deferred list"
            );
            panic!("Found {} duplicate pointer(s) in deferred list", dup_count);
        }

        for node in nodes.drain(..) {
            unsafe {
                (node.dealloc)(node.ptr);
            }
        }
    }
}

impl Guard for DeferredGuard {
    /// Protection is provided by the collection's stored guard.
    type ReadGuard = ();

    fn pin() -> Self::ReadGuard {}

    unsafe fn defer_destroy<N>(&self, ptr: *mut N, dealloc: unsafe fn(*mut N)) {
        #[cfg(debug_assertions)]
        {
            let addr = ptr as usize;
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            if !seen.insert(addr) {
                panic!("DUPLICATE defer_destroy at {:#x}", addr);
            }
        }

        let node = DeferredNode {
            ptr: ptr as *mut (),
            dealloc: unsafe {
                std::mem::transmute::<unsafe fn(*mut N), unsafe fn(*mut ())>(dealloc)
            },
        };
        self.deferred
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_deferred_guard_basic() {
        let guard = DeferredGuard::default();

        let ptr = Box::into_raw(Box::new(42i32));
        unsafe {
            guard.defer_destroy(ptr, |p| {
                drop(Box::from_raw(p));
            });
        }
        assert_eq!(guard.pending(), 1);
    }

    #[test]
    fn test_release_happens_on_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let guard = DeferredGuard::default();

        for _ in 0..10 {
            let ptr = Box::into_raw(Box::new(DropCounter(Arc::clone(&drops))));
            unsafe {
                guard.defer_destroy(ptr, |p| drop(Box::from_raw(p)));
            }
        }

        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(guard);
        assert_eq!(drops.load(Ordering::SeqCst), 10);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "DUPLICATE defer_destroy")]
    fn test_double_defer_is_caught() {
        // Leaked on purpose: the guard panics before it could free it twice.
        let guard = std::mem::ManuallyDrop::new(DeferredGuard::default());
        let ptr = Box::into_raw(Box::new(1u8));
        unsafe {
            guard.defer_destroy(ptr, |p| drop(Box::from_raw(p)));
            guard.defer_destroy(ptr, |p| drop(Box::from_raw(p)));
        }
    }
}
