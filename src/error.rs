//! Error types shared across the crate

use std::time::Duration;

use thiserror::Error;

/// Failure of the input backend or one of the actuators built on it.
#[derive(Debug, Clone, Error)]
pub enum InputError {
    #[error("input backend failed: {0}")]
    Backend(String),
    #[error("unknown key name '{0}'")]
    UnknownKey(String),
}

/// Errors surfaced by the fishing controller.
///
/// These are the only error kinds an observer ever sees; they end up in
/// `Status.last_error` and the controller unwinds to the `Error` phase
/// (or stays `Stopped` for init failures).
#[derive(Debug, Clone, Error)]
pub enum FishingError {
    /// No expected cue appeared within the waiting deadline.
    #[error("timeout waiting for initial state")]
    PerceptionTimeout { waited: Duration },

    /// The remedial cast of the retry branch could not be performed.
    #[error("retry cast failed")]
    RetryCast,

    /// An actuator call failed mid-round.
    #[error(transparent)]
    Actuator(#[from] InputError),

    /// Perception could not be brought up when starting.
    #[error("perception init failed: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = FishingError::PerceptionTimeout {
            waited: Duration::from_secs(180),
        };
        assert_eq!(err.to_string(), "timeout waiting for initial state");
    }

    #[test]
    fn test_retry_cast_message() {
        assert_eq!(FishingError::RetryCast.to_string(), "retry cast failed");
    }
}
