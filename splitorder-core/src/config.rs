//! Hash map tunables.

use crate::error::ConfigError;

/// Default fraction of the bucket count at which the table grows.
pub const DEFAULT_LOAD_FACTOR: f64 = 0.5;

/// Largest supported directory exponent.
///
/// Bit 0 of an ordering key distinguishes real entries from sentinels, which
/// leaves 31 hash bits to address buckets with.
pub const MAX_EXPONENT: u32 = 31;

/// Configuration for a `SplitOrderedHashMap`.
///
/// ```rust
/// use splitorder_core::SplitOrderedConfig;
///
/// let config = SplitOrderedConfig::default()
///     .with_load_factor(2.0)
///     .with_initial_exponent(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOrderedConfig {
    /// Growth triggers once `len > load_factor * 2^exponent`.
    pub load_factor: f64,
    /// Exponent the table starts with (`2^initial_exponent` buckets).
    pub initial_exponent: u32,
}

impl Default for SplitOrderedConfig {
    fn default() -> Self {
        Self {
            load_factor: DEFAULT_LOAD_FACTOR,
            initial_exponent: 0,
        }
    }
}

impl SplitOrderedConfig {
    pub fn with_load_factor(mut self, load_factor: f64) -> Self {
        self.load_factor = load_factor;
        self
    }

    pub fn with_initial_exponent(mut self, initial_exponent: u32) -> Self {
        self.initial_exponent = initial_exponent;
        self
    }

    /// Check the values before a map is built from them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.load_factor.is_finite() || self.load_factor <= 0.0 {
            return Err(ConfigError::InvalidLoadFactor(self.load_factor));
        }
        if self.initial_exponent > MAX_EXPONENT {
            return Err(ConfigError::ExponentTooLarge {
                requested: self.initial_exponent,
                max: MAX_EXPONENT,
            });
        }
        Ok(())
    }
}
