use thiserror::Error;

use crate::models::SessionStatus;

/// Domain failures raised by the session subsystems.
///
/// The gateway maps every variant into the result envelope's `errorCode`;
/// none of these ever escape to a client as a raw fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("session is busy, try again")]
    Busy,
}

impl SessionError {
    /// Stable wire code consumed by the frontend envelope.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SessionError::Forbidden(_) => "FORBIDDEN",
            SessionError::SessionClosed => "SESSION_CLOSED",
            SessionError::NotFound(_) => "NOT_FOUND",
            SessionError::InvalidArgument(_) => "INVALID_ARGUMENT",
            SessionError::Busy => "BUSY",
        }
    }
}

/// Infrastructure-level failures (config, IO, wire).
#[derive(Error, Debug)]
pub enum PercolateError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            SessionError::InvalidTransition {
                from: SessionStatus::Draft,
                to: SessionStatus::Closed,
            }
            .code(),
            "INVALID_TRANSITION"
        );
        assert_eq!(SessionError::Forbidden("x".into()).code(), "FORBIDDEN");
        assert_eq!(SessionError::SessionClosed.code(), "SESSION_CLOSED");
        assert_eq!(SessionError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(
            SessionError::InvalidArgument("x".into()).code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(SessionError::Busy.code(), "BUSY");
    }

    #[test]
    fn test_invalid_transition_message_names_both_states() {
        let e = SessionError::InvalidTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::InProgress,
        };
        let msg = e.to_string();
        assert!(msg.contains("Completed"), "message was: {}", msg);
        assert!(msg.contains("InProgress"), "message was: {}", msg);
    }
}
