use thiserror::Error;

use super::{ControllerState, Mode};

/// The workflow was driven in a way its current state does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// The operation is not available in this state.
    #[error("operation not allowed while {0:?}")]
    InvalidState(ControllerState),
    /// The operation belongs to the other mode.
    #[error("operation requires {expected} mode, controller is in {actual} mode")]
    WrongMode {
        /// Mode the operation needs.
        expected: Mode,
        /// Mode the controller is in.
        actual: Mode,
    },
    /// The identity was already committed; the draft can no longer change.
    #[error("identity already committed")]
    AlreadyCommitted,
    /// Input changes schedule derivation tasks and need a Tokio runtime.
    #[error("no tokio runtime available to schedule address derivation")]
    NoRuntime,
}
