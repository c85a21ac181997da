//! Runtime error types.

use crate::popup::PopupHandle;
use thiserror::Error;

/// Errors raised by a [`StateMachine`](crate::StateMachine).
///
/// Every variant is fatal: it signals a malformed state graph or caller
/// misuse, never a condition worth retrying.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid state: update called before any state was entered")]
    InvalidState,

    #[error("subject is gone: the owner dropped it while the machine was still driving it")]
    NullSubject,

    #[error("parameter type mismatch in {state}: expected {expected}, got {actual}")]
    ParameterTypeMismatch {
        state: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("state change not properly finished: transition depth is {depth} at update")]
    UnterminatedTransition { depth: usize },

    #[error("unexpected source for {state}: expected {expected}, entered from {actual}")]
    UnexpectedSource {
        state: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("popup not found: {handle}")]
    UnknownPopupHandle { handle: PopupHandle },

    #[error("side-track {index} out of range: machine has {count} side-track(s)")]
    UnknownSideTrack { index: usize, count: usize },
}

impl MachineError {
    /// Returns whether this error can be retried. Always false: the runtime
    /// halts at the point of detection.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Returns a stable error code suitable for logs and host diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            MachineError::InvalidState => "INVALID_STATE",
            MachineError::NullSubject => "NULL_SUBJECT",
            MachineError::ParameterTypeMismatch { .. } => "PARAMETER_TYPE_MISMATCH",
            MachineError::UnterminatedTransition { .. } => "UNTERMINATED_TRANSITION",
            MachineError::UnexpectedSource { .. } => "UNEXPECTED_SOURCE",
            MachineError::UnknownPopupHandle { .. } => "UNKNOWN_POPUP",
            MachineError::UnknownSideTrack { .. } => "UNKNOWN_SIDE_TRACK",
        }
    }
}
