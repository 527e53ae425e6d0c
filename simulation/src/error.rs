//! Failures while preparing a simulation from configuration and level data.

use std::{io, path::PathBuf};

use thiserror::Error;

use kiln_core::{CellCoord, EntityKind, SubstanceKind};

/// Reasons a simulation could not be set up.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A configuration or level file could not be read.
    #[error("failed to read {path}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A document was not valid TOML for the expected shape.
    #[error("failed to parse {what}")]
    Parse {
        /// Kind of document being parsed.
        what: &'static str,
        /// Underlying parse failure.
        #[source]
        source: toml::de::Error,
    },
    /// The level describes a grid without cells.
    #[error("level grid {columns}x{rows} has no cells")]
    EmptyGrid {
        /// Requested column count.
        columns: u32,
        /// Requested row count.
        rows: u32,
    },
    /// A level entity does not fit the grid.
    #[error("{kind:?} at {cell:?} does not fit the grid")]
    EntityOutOfBounds {
        /// Kind of the rejected entity.
        kind: EntityKind,
        /// Requested upper-left cell.
        cell: CellCoord,
    },
    /// A level task was given to an entity that cannot perform it.
    #[error("{kind:?} at {cell:?} cannot be assigned a task")]
    NotAnAgent {
        /// Kind of the entity.
        kind: EntityKind,
        /// Upper-left cell of the entity.
        cell: CellCoord,
    },
    /// A level substance lies outside the grid.
    #[error("{kind:?} seeded outside the grid at {cell:?}")]
    SubstanceOutOfBounds {
        /// Substance being seeded.
        kind: SubstanceKind,
        /// Requested cell.
        cell: CellCoord,
    },
}
