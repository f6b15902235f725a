//! Data structures for concurrent collections.
//!
//! # Organization
//!
//! - [`sorted`] - Lock-free ordered list (SortedList)
//! - [`hash`] - Split-ordered hash map built on the ordered list
//! - `internal` - Internal implementation details (pub(crate))

pub mod hash;
pub(crate) mod internal;
pub mod sorted;

pub use hash::{SplitOrderedEntry, SplitOrderedHashMap};
pub use sorted::{ListHit, SearchResult, SortedList, SortedListIter};

// MarkedPtr stays pub(crate) - truly internal implementation detail
pub use internal::CollectionNode;
pub(crate) use internal::MarkedPtr;
