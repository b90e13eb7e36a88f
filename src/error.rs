//! Error taxonomy for the gameplay path and ship layouts.

use serde::{Deserialize, Serialize};

use crate::dispatch::JobKind;

/// Errors returned by board layout and placement operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("ship {0} does not fit on the board")]
    ShipOutOfBounds(&'static str),
    #[error("ship {0} cells do not form one straight line")]
    ShipNotInLine(&'static str),
    #[error("ship {0} overlaps another ship")]
    ShipOverlaps(&'static str),
    #[error("unknown ship {0:?}")]
    UnknownShip(String),
    #[error("ship {0} placed more than once")]
    DuplicateShip(&'static str),
    #[error("ship {0} is missing from the layout")]
    MissingShip(&'static str),
    #[error("unable to find a free spot for ship {0}")]
    UnableToPlaceShip(&'static str),
}

/// Failures surfaced synchronously to gameplay callers.
///
/// Every variant is raised before any session state is written, so a caller
/// receiving one can assume the session is exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("unknown session or connection")]
    NotFound,
    #[error("connection is not a participant of this session")]
    NotParticipant,
    #[error("action not allowed in the current session state")]
    InvalidState,
    #[error("coordinate is outside the board")]
    OutOfBounds,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("cell was already targeted")]
    AlreadyTargeted,
    #[error("opponent did not finish placing ships in time")]
    ReadinessTimeout,
    #[error("{kind} job failed: {reason}")]
    DispatchFailure { kind: JobKind, reason: String },
    #[error("invalid ship layout: {0}")]
    InvalidPlacement(#[from] PlacementError),
}

/// Wire-level classification of a [`GameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    NotParticipant,
    InvalidState,
    OutOfBounds,
    NotYourTurn,
    AlreadyTargeted,
    ReadinessTimeout,
    DispatchFailure,
    InvalidPlacement,
    Protocol,
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::NotFound => ErrorKind::NotFound,
            GameError::NotParticipant => ErrorKind::NotParticipant,
            GameError::InvalidState => ErrorKind::InvalidState,
            GameError::OutOfBounds => ErrorKind::OutOfBounds,
            GameError::NotYourTurn => ErrorKind::NotYourTurn,
            GameError::AlreadyTargeted => ErrorKind::AlreadyTargeted,
            GameError::ReadinessTimeout => ErrorKind::ReadinessTimeout,
            GameError::DispatchFailure { .. } => ErrorKind::DispatchFailure,
            GameError::InvalidPlacement(_) => ErrorKind::InvalidPlacement,
        }
    }
}
