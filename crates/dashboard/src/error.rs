//! Error taxonomy for talking to the farm server.
//!
//! None of these are fatal: the dashboard logs them and keeps polling.

use thiserror::Error;

use crate::engine::CommandKind;

/// Transport-level failure, non-2xx reply, or a payload we could not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("request to {path} failed: {detail}")]
    Transport { path: String, detail: String },

    #[error("HTTP {status} from {path}")]
    Status { path: String, status: u16 },

    #[error("malformed payload from {path}: {detail}")]
    Malformed { path: String, detail: String },

    /// The server bounced the request to its login page.
    #[error("session is not authenticated")]
    Unauthenticated,
}

/// A client-side guard refused to send the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("pump can only be toggled in manual mode")]
    ManualModeRequired,

    #[error("a {0} command is already in flight")]
    CommandInFlight(CommandKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// 2xx reply whose `status` was not `"ok"`.
    #[error("server rejected command ({message})")]
    Rejected { message: String },

    #[error(transparent)]
    Precondition(#[from] Precondition),
}

impl CommandError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Network(NetworkError::Unauthenticated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        let e = CommandError::from(NetworkError::Status {
            path: "/api/data".into(),
            status: 502,
        });
        assert_eq!(e.to_string(), "HTTP 502 from /api/data");

        let e = CommandError::from(Precondition::CommandInFlight(CommandKind::Toggle));
        assert_eq!(e.to_string(), "a toggle command is already in flight");

        let e = CommandError::Rejected {
            message: "error: Invalid action".into(),
        };
        assert_eq!(e.to_string(), "server rejected command (error: Invalid action)");
    }

    #[test]
    fn unauthenticated_is_detected() {
        assert!(CommandError::from(NetworkError::Unauthenticated).is_unauthenticated());
        assert!(!CommandError::from(Precondition::ManualModeRequired).is_unauthenticated());
    }
}
