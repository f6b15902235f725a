// Marked pointer operations using the LSB as the logical deletion flag.
//
// Bit layout:
//   Bit 0: DELETE_MARK - the node owning this `next` word is logically deleted
//
// The mark describes the owner of the word, never the pointee. Nodes are
// heap allocated with at least 2-byte alignment, so bit 0 of a real node
// address is always zero.
//
const DELETE_MARK: usize = 0b1;

/// A pointer that uses the least significant bit as a deletion flag.
#[derive(Copy, Clone)]
pub(crate) struct MarkedPtr<T> {
    ptr: *mut T,
}

impl<T> MarkedPtr<T> {
    /// Create a new MarkedPtr from a (possibly marked) pointer.
    #[inline]
    pub(crate) fn new(ptr: *mut T) -> Self {
        MarkedPtr { ptr }
    }

    /// Strip the mark bit from a raw pointer without creating a MarkedPtr instance.
    #[inline]
    pub(crate) fn unmask(ptr: *mut T) -> *mut T {
        (ptr as usize & !DELETE_MARK) as *mut T
    }

    /// Get the clean pointer without the mark bit (the one you dereference).
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut T {
        Self::unmask(self.ptr)
    }

    /// Get the raw pointer with the mark bit intact (for CAS operations).
    #[inline]
    pub(crate) fn as_raw(&self) -> *mut T {
        self.ptr
    }

    #[inline]
    pub(crate) fn is_marked(&self) -> bool {
        (self.ptr as usize & DELETE_MARK) != 0
    }

    /// Create a DELETE-marked (or unmarked) version of this pointer.
    #[inline]
    pub(crate) fn with_mark(&self, mark: bool) -> Self {
        let ptr_bits = self.as_ptr() as usize;
        let marked_bits = if mark {
            ptr_bits | DELETE_MARK
        } else {
            ptr_bits
        };
        MarkedPtr {
            ptr: marked_bits as *mut T,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_round_trip() {
        let raw = Box::into_raw(Box::new(7u64));
        let clean = MarkedPtr::new(raw);
        assert!(!clean.is_marked());

        let marked = clean.with_mark(true);
        assert!(marked.is_marked());
        assert_ne!(marked.as_raw(), raw);
        assert_eq!(marked.as_ptr(), raw);
        assert_eq!(MarkedPtr::unmask(marked.as_raw()), raw);
        assert_eq!(marked.with_mark(false).as_raw(), raw);

        unsafe { drop(Box::from_raw(raw)) };
    }

    #[test]
    fn test_null_is_unmarked() {
        let null: MarkedPtr<u64> = MarkedPtr::new(std::ptr::null_mut());
        assert!(!null.is_marked());
        assert!(null.with_mark(true).is_marked());
        assert!(null.with_mark(true).as_ptr().is_null());
    }
}
