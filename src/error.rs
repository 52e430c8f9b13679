//! Error types for the climb introspection engine.

use thiserror::Error;

/// Main error type for climb operations.
///
/// Per the propagation rule, most of the engine (sandbox, discovery, help
/// parsing, output parsing) never raises — uncertainty is expressed as
/// telemetry/warnings on the returned value instead. These variants are
/// raised only at the few points where failure cannot be expressed that way:
/// a child process that could not be spawned at all, a config file that
/// fails schema checks, or an executable that cannot be resolved on PATH.
#[derive(Error, Debug)]
pub enum ClimbError {
    /// The child process could not be started at all (not found, not executable, OS error).
    #[error("failed to spawn '{0}': {1}")]
    SpawnFailure(String, String),

    /// Caller asked to run a CLI name that does not resolve to a path on PATH.
    #[error("'{0}' not found on PATH")]
    NotFound(String),

    /// A PATH directory or the discovery cache file could not be accessed.
    #[error("permission denied accessing '{0}': {1}")]
    PermissionDenied(String, String),

    /// The on-disk discovery cache failed to parse; treated as absent by callers.
    #[error("discovery cache corrupt at '{0}': {1}")]
    CacheCorruption(String, String),

    /// Configuration failed schema validation; callers fall back to defaults.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// I/O error while reading or writing a file (config, cache).
    #[error("I/O error on '{0}': {1}")]
    Io(String, String),
}

/// Result type alias for climb operations.
pub type Result<T> = std::result::Result<T, ClimbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_failure_display() {
        let err = ClimbError::SpawnFailure("gh".to_string(), "No such file or directory".to_string());
        assert_eq!(err.to_string(), "failed to spawn 'gh': No such file or directory");
    }

    #[test]
    fn test_not_found_display() {
        let err = ClimbError::NotFound("frobnicate".to_string());
        assert_eq!(err.to_string(), "'frobnicate' not found on PATH");
    }

    #[test]
    fn test_config_invalid_display() {
        let err = ClimbError::ConfigInvalid("unknown field 'theme.mode'".to_string());
        assert_eq!(err.to_string(), "invalid configuration: unknown field 'theme.mode'");
    }
}
