//! Error types for Channel Player Core

use thiserror::Error;

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Playback error types
#[derive(Error, Debug)]
pub enum Error {
    // Source errors
    #[error("Invalid video source: {0}")]
    InvalidSource(String),

    #[error("Failed to load asset: {0}")]
    AssetLoadFailed(String),

    // Playback errors
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid seek target: {0}")]
    InvalidSeek(f64),

    #[error("Playback failed, session must be set up again")]
    PlaybackFailed,

    #[error("Duration unknown, cannot seek")]
    DurationUnknown,

    // Binding errors
    #[error("Session has no bound player")]
    NotBound,

    #[error("No active session")]
    NoActiveSession,

    #[error("Invalid presentation mode: {0}")]
    InvalidPresentationMode(String),

    #[error("Presentation transition in progress")]
    TransitionInProgress,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Persistence errors
    #[error("Resume store error: {0}")]
    ResumeStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DurationUnknown
                | Error::InvalidSeek(_)
                | Error::NotBound
                | Error::NoActiveSession
                | Error::TransitionInProgress
        )
    }

    /// Returns the error code for telemetry
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidSource(_) => "INVALID_SOURCE",
            Error::AssetLoadFailed(_) => "ASSET_LOAD_FAILED",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::InvalidSeek(_) => "INVALID_SEEK",
            Error::PlaybackFailed => "PLAYBACK_FAILED",
            Error::DurationUnknown => "DURATION_UNKNOWN",
            Error::NotBound => "NOT_BOUND",
            Error::NoActiveSession => "NO_ACTIVE_SESSION",
            Error::InvalidPresentationMode(_) => "INVALID_PRESENTATION",
            Error::TransitionInProgress => "TRANSITION_IN_PROGRESS",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ResumeStore(_) => "RESUME_STORE",
            Error::Io(_) => "IO",
            Error::Json(_) => "JSON",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::DurationUnknown.is_recoverable());
        assert!(Error::NotBound.is_recoverable());
        assert!(!Error::InvalidSource("nope".into()).is_recoverable());
        assert!(!Error::AssetLoadFailed("timeout".into()).is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidSource("x".into()).error_code(), "INVALID_SOURCE");
        assert_eq!(Error::NoActiveSession.error_code(), "NO_ACTIVE_SESSION");
    }
}
