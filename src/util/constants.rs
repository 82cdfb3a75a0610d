//! Centralized constants for Zim runtime configuration.
//!
//! All timeout, depth, and schema-version values in one place for easy
//! tuning.

use std::time::Duration;

/// Key document schema version. Bump this to
/// invalidate every previously-cached key in the world.
pub const CACHE_KEY_VERSION: u32 = 1;

/// Maximum `${VAR}` expansion recursion depth before `RecursiveExpansion`
/// is reported.
pub const MAX_ENVSUB_DEPTH: usize = 32;

/// Grace period between SIGINT and SIGKILL when a cancellation token fires
/// mid-execution.
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Read buffer for streaming zip/archive entries during unzip/unarchive.
pub const ARCHIVE_BUF_SIZE: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_version_is_positive() {
        assert!(CACHE_KEY_VERSION >= 1);
    }

    #[test]
    fn envsub_depth_bound_is_reasonable() {
        assert!(MAX_ENVSUB_DEPTH >= 8);
        assert!(MAX_ENVSUB_DEPTH <= 256);
    }

    #[test]
    fn cancel_grace_period_is_positive() {
        assert!(CANCEL_GRACE_PERIOD.as_secs() > 0);
    }
}
