/// Configuration error raised at component construction (spec §7).
///
/// This is the one error class components actually return as an `Err`:
/// negative thresholds, non-positive intervals, and similarly
/// self-contradictory tunables are refused up front rather than producing
/// undefined behavior later. Every other failure mode in the core (§7's
/// admission rejection, not-found, invalid transition, capacity exhaustion,
/// integrity failure) is a typed return value, never a raised error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field that must be strictly positive was zero or negative.
    #[error("{field} must be positive, got {value}")]
    NotPositive {
        /// Name of the offending field.
        field: &'static str,
        /// The value that was rejected.
        value: i64,
    },
    /// A percentage field was outside `[0, 100]`.
    #[error("{field} must be within [0, 100], got {value}")]
    OutOfPercentRange {
        /// Name of the offending field.
        field: &'static str,
        /// The value that was rejected.
        value: i64,
    },
    /// Two fields that must be mutually consistent were not.
    #[error("{message}")]
    Inconsistent {
        /// Description of the inconsistency.
        message: String,
    },
}

impl ConfigError {
    /// Returns `NotPositive` if `value <= 0`.
    pub fn require_positive(field: &'static str, value: i64) -> Result<(), ConfigError> {
        if value <= 0 {
            Err(ConfigError::NotPositive { field, value })
        } else {
            Ok(())
        }
    }

    /// Returns `OutOfPercentRange` if `value` is outside `[0, 100]`.
    pub fn require_percent(field: &'static str, value: i64) -> Result<(), ConfigError> {
        if !(0..=100).contains(&value) {
            Err(ConfigError::OutOfPercentRange { field, value })
        } else {
            Ok(())
        }
    }
}
