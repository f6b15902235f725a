//! Error types.
//!
//! Contention and absence are never reported as errors: CAS failures are
//! retried inside the operation that hit them, and a missing key is a plain
//! `None`/`false`. The only failures are invalid configuration and the
//! integrity problems found by the opt-in `verify()` walks.

/// Integrity problems found by `SortedList::verify` and
/// `SplitOrderedHashMap::verify`.
///
/// Any of these means a bug in the structure itself or a caller-supplied
/// `Ord`/`Hash`/`Eq` implementation that does not follow its contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Adjacent live nodes whose values are in descending order.
    #[error("list is badly ordered, the following elements are in the wrong order: {}", format_pairs(.pairs))]
    Unordered {
        /// `(earlier, later)` debug renderings of each offending pair.
        pairs: Vec<(String, String)>,
    },
    /// A directory slot points at a sentinel belonging to another bucket.
    #[error("directory slot {index} points at the sentinel of bucket {found}")]
    BucketMismatch {
        /// Directory index of the slot.
        index: u32,
        /// Bucket recorded in the sentinel the slot points at.
        found: u32,
    },
    /// More than one sentinel for the same bucket in the backing list.
    #[error("bucket {bucket} has {count} sentinels in the backing list")]
    DuplicateSentinel {
        /// Bucket index.
        bucket: u32,
        /// Number of sentinels found.
        count: usize,
    },
    /// Published directory slots whose sentinel is not in the backing list.
    #[error("buckets {indices:?} are not represented in the backing list")]
    UnlistedBuckets {
        /// Directory indices of the missing sentinels.
        indices: Vec<u32>,
    },
}

fn format_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(a, b)| format!("{a},{b}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned when building a hash map from a `SplitOrderedConfig`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Load factor must be a positive finite number.
    #[error("invalid load factor: {0}")]
    InvalidLoadFactor(f64),
    /// Initial exponent above the directory capacity.
    #[error("initial exponent {requested} exceeds the maximum of {max}")]
    ExponentTooLarge {
        /// Requested initial exponent.
        requested: u32,
        /// Largest supported exponent.
        max: u32,
    },
}
