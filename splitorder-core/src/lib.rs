pub mod common_tests;
pub mod config;
pub mod data_structures;
pub mod error;
pub mod guard;

pub use config::{DEFAULT_LOAD_FACTOR, MAX_EXPONENT, SplitOrderedConfig};
pub use data_structures::{SortedList, SplitOrderedHashMap};
pub use error::{ConfigError, VerifyError};
pub use guard::{DeferredGuard, Guard};
