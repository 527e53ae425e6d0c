//! Errors shared between the world and the systems.

use thiserror::Error;

use crate::CellCoord;

/// Reasons a move cannot be committed.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum MoveError {
    /// The footprint would leave the grid.
    #[error("move to {target:?} leaves the grid")]
    OutOfBounds {
        /// Requested destination.
        target: CellCoord,
    },
    /// Another entity occupies the destination footprint.
    #[error("move to {target:?} is blocked by an occupant")]
    Blocked {
        /// Requested destination.
        target: CellCoord,
    },
    /// Segmented bodies cannot move diagonally.
    #[error("segmented body cannot move diagonally to {target:?}")]
    SegmentedDiagonal {
        /// Requested destination.
        target: CellCoord,
    },
}
