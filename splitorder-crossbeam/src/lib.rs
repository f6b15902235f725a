//! Crossbeam-based reclamation for splitorder collections.
//!
//! This crate provides `EpochGuard`, an implementation of the `Guard` trait
//! using crossbeam-epoch for memory reclamation.
//!
//! # Usage
//!
//! ```
//! use splitorder_core::{SortedList, SplitOrderedHashMap};
//! use splitorder_crossbeam::EpochGuard;
//!
//! let list: SortedList<i32, EpochGuard> = SortedList::new();
//! list.inject(42);
//! assert!(list.contains(&42));
//!
//! let map: SplitOrderedHashMap<&str, i32, EpochGuard> = SplitOrderedHashMap::new();
//! assert_eq!(map.put("a", 1), None);
//! assert_eq!(map.get(&"a"), Some(1));
//! ```

pub mod epoch_guard;

pub use epoch_guard::EpochGuard;
