//! Internal implementation details.
//!
//! These are pub(crate) and not intended for external use.

pub mod collection_node;
pub mod marked_ptr;

pub use collection_node::CollectionNode;
pub(crate) use marked_ptr::MarkedPtr;
