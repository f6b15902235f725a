//! Lock-free ordered list.
//!
//! Collections are parameterized by a guard type `G: Guard` that determines
//! the memory reclamation strategy:
//!
//! - `DeferredGuard`: Testing - defers destruction until the collection drops
//! - `EpochGuard`: Production - epoch-based reclamation (crossbeam-epoch)

pub mod sorted_list;

pub use sorted_list::{ListHit, SearchResult, SortedList, SortedListIter};
