//! Error types for the carcache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache construction parameters are
//!   invalid (zero capacity, or a capacity too small for the adaptive
//!   policies to partition).
//!
//! Loader failures are not represented here: they propagate through the
//! cache unchanged as the loader's own error type. Internal invariant
//! violations are programmer faults and panic.
//!
//! ## Example Usage
//!
//! ```
//! use carcache::error::ConfigError;
//! use carcache::policy::car::CarCore;
//! use carcache::traits::from_fn;
//!
//! // Fallible constructor for user-configurable parameters
//! let cache = CarCore::<u64, u64, _>::new(100, from_fn(|k: &u64| *k));
//! assert!(cache.is_ok());
//!
//! // Invalid capacity is caught without panicking
//! let bad: ConfigError = CarCore::<u64, u64, _>::new(0, from_fn(|k: &u64| *k)).unwrap_err();
//! assert!(bad.to_string().contains("capacity"));
//! ```

use std::fmt;

/// Error returned when cache construction parameters are invalid.
///
/// Produced by the fallible `new` constructors on the policy types. Carries
/// a human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use carcache::policy::lru::LruCore;
/// use carcache::traits::from_fn;
///
/// let err = LruCore::<u64, u64, _>::new(0, from_fn(|k: &u64| *k)).unwrap_err();
/// assert!(err.to_string().contains("capacity"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}
