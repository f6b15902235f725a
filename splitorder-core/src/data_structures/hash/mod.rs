//! Hash-based collection implementations.

pub mod split_ordered_hash_map;

pub use split_ordered_hash_map::{SplitOrderedEntry, SplitOrderedHashMap};
