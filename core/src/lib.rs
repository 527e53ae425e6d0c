#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Kiln simulation engine.
//!
//! This crate defines the vocabulary every other crate speaks. Adapters submit
//! [`Command`] values describing external intents, the simulation executes
//! them through its `apply` entry point and broadcasts [`Event`] values that
//! describe what changed. The substance field worker speaks its own one-way
//! protocol, [`FieldCommand`], and answers with [`FieldReport`] snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod action;
pub mod capability;
pub mod error;
pub mod field;
pub mod kind;
pub mod substance;

pub use action::{Action, ActionKind, ActionPayload, ActionQueue, ActionTiming};
pub use capability::{Capability, CapabilitySet};
pub use error::MoveError;
pub use field::{
    BlockerSeed, Condensation, EmitterSeed, FieldCommand, FieldReport, FieldSource, TurbineSeed,
};
pub use kind::EntityKind;
pub use substance::{
    CoolTarget, CoolTransition, Drift, SubstanceGrid, SubstanceKind, SubstanceRule, Transition,
    Viscosity, SUBSTANCE_COUNT,
};

/// Owner identifier used for entities that belong to nobody in particular.
pub const GAIA: PlayerId = PlayerId::new(0);

/// Commands that express every external intent the simulation accepts.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation by one step covering the measured wall time.
    Tick {
        /// Wall-clock time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Hands control of an entity to the player, or releases control.
    SetControlledEntity {
        /// Entity steered by held movement keys, if any.
        entity: Option<EntityId>,
    },
    /// Replaces the set of movement keys currently held by the player.
    SetHeldKeys {
        /// Snapshot of the held movement keys.
        keys: HeldKeys,
    },
    /// Creates a new entity from its kind defaults.
    Spawn {
        /// Kind of entity to create.
        kind: EntityKind,
        /// Upper-left cell of the new entity's footprint.
        cell: CellCoord,
        /// Player that owns the new entity.
        owner: PlayerId,
    },
}

/// Events broadcast by the simulation after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Sequence number of the tick that completed.
        tick: u64,
        /// Wall-clock time covered by the tick.
        dt: Duration,
    },
    /// Confirms that an entity joined the world.
    EntitySpawned {
        /// Identifier assigned to the entity.
        entity: EntityId,
        /// Kind of the new entity.
        kind: EntityKind,
        /// Upper-left cell of its footprint.
        cell: CellCoord,
    },
    /// Reports that a spawn request could not be honored.
    SpawnRejected {
        /// Kind of entity requested.
        kind: EntityKind,
        /// Requested upper-left cell.
        cell: CellCoord,
    },
    /// Confirms that an entity moved between two cells.
    EntityMoved {
        /// Identifier of the entity that moved.
        entity: EntityId,
        /// Cell occupied before the move.
        from: CellCoord,
        /// Cell occupied after the move.
        to: CellCoord,
    },
    /// Announces that an entity switched to another kind.
    EntityKindChanged {
        /// Identifier of the entity.
        entity: EntityId,
        /// Kind before the change.
        from: EntityKind,
        /// Kind after the change.
        to: EntityKind,
    },
    /// Reports damage applied to an entity.
    EntityDamaged {
        /// Identifier of the damaged entity.
        entity: EntityId,
        /// Hit points removed.
        amount: f64,
        /// Hit points left after the damage.
        remaining: f64,
    },
    /// Confirms that an entity left the world.
    EntityRemoved {
        /// Identifier of the removed entity.
        entity: EntityId,
        /// Kind the entity had when it was removed.
        kind: EntityKind,
    },
    /// Reports that a turret launched a projectile.
    ProjectileFired {
        /// Turret that fired.
        tower: EntityId,
        /// Projectile that was created.
        projectile: EntityId,
    },
    /// Reports that an explosive detonated.
    Exploded {
        /// Explosive that detonated.
        entity: EntityId,
        /// Cell at the centre of the blast.
        cell: CellCoord,
    },
    /// Reports a resource credited to a player's stockpile.
    ResourceCollected {
        /// Player credited.
        owner: PlayerId,
        /// Resource kind credited.
        kind: EntityKind,
        /// Fractional quantity credited.
        quantity: f64,
    },
}

/// Movement keys held by the player during a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeldKeys {
    /// Movement toward increasing row indices.
    pub up: bool,
    /// Movement toward decreasing row indices.
    pub down: bool,
    /// Movement toward decreasing column indices.
    pub left: bool,
    /// Movement toward increasing column indices.
    pub right: bool,
}

impl HeldKeys {
    /// Reports whether any movement key is held.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.up || self.down || self.left || self.right
    }
}

/// Unique identifier assigned to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of a player owning entities and a resource ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(u32);

impl PlayerId {
    /// Creates a new player identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Returns the cell displaced by the signed offsets, if it stays non-negative.
    #[must_use]
    pub fn offset(self, columns: i64, rows: i64) -> Option<CellCoord> {
        let column = i64::from(self.column).checked_add(columns)?;
        let row = i64::from(self.row).checked_add(rows)?;
        Some(CellCoord::new(
            u32::try_from(column).ok()?,
            u32::try_from(row).ok()?,
        ))
    }

    /// Signed displacement from `self` to `other` as `(columns, rows)`.
    #[must_use]
    pub fn delta_to(self, other: CellCoord) -> (i64, i64) {
        (
            i64::from(other.column) - i64::from(self.column),
            i64::from(other.row) - i64::from(self.row),
        )
    }

    /// Computes the Euclidean distance between two cell coordinates.
    #[must_use]
    pub fn distance(self, other: CellCoord) -> f64 {
        let (dx, dy) = self.delta_to(other);
        ((dx * dx + dy * dy) as f64).sqrt()
    }

    /// Reports whether moving from `self` to `other` changes both axes.
    #[must_use]
    pub fn is_diagonal_to(self, other: CellCoord) -> bool {
        self.column != other.column && self.row != other.row
    }
}

/// Size of a [`CellRect`] measured in whole cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRectSize {
    width: u32,
    height: u32,
}

impl CellRectSize {
    /// Creates a new size descriptor with explicit dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width of the rectangle in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height of the rectangle in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }
}

/// Axis-aligned rectangle expressed in cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRect {
    origin: CellCoord,
    size: CellRectSize,
}

impl CellRect {
    /// Constructs a rectangle from an origin cell and size.
    #[must_use]
    pub const fn from_origin_and_size(origin: CellCoord, size: CellRectSize) -> Self {
        Self { origin, size }
    }

    /// Upper-left cell that anchors the rectangle.
    #[must_use]
    pub const fn origin(&self) -> CellCoord {
        self.origin
    }

    /// Dimensions of the rectangle measured in whole cells.
    #[must_use]
    pub const fn size(&self) -> CellRectSize {
        self.size
    }

    /// Iterates over every cell covered by the rectangle in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        let origin = self.origin;
        let width = self.size.width;
        (0..self.size.height).flat_map(move |row| {
            (0..width).map(move |column| {
                CellCoord::new(
                    origin.column.saturating_add(column),
                    origin.row.saturating_add(row),
                )
            })
        })
    }

    /// Reports whether the rectangle covers the provided cell.
    #[must_use]
    pub fn contains(&self, cell: CellCoord) -> bool {
        cell.column >= self.origin.column
            && cell.row >= self.origin.row
            && cell.column - self.origin.column < self.size.width
            && cell.row - self.origin.row < self.size.height
    }

    /// Reports whether two rectangles share at least one cell.
    #[must_use]
    pub fn intersects(&self, other: &CellRect) -> bool {
        let left = self.origin.column.max(other.origin.column);
        let top = self.origin.row.max(other.origin.row);
        let right = (self.origin.column + self.size.width)
            .min(other.origin.column + other.size.width);
        let bottom =
            (self.origin.row + self.size.height).min(other.origin.row + other.size.height);
        left < right && top < bottom
    }
}

/// Dimensions of the simulated grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    columns: u32,
    rows: u32,
}

impl GridSize {
    /// Creates a grid description with the provided dimensions.
    #[must_use]
    pub const fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    /// Number of columns in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of cells in the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        usize::try_from(u64::from(self.columns) * u64::from(self.rows)).unwrap_or(0)
    }

    /// Reports whether the cell lies within the grid bounds.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column < self.columns && cell.row < self.rows
    }

    /// Reports whether every cell of the rectangle lies within the grid.
    #[must_use]
    pub fn contains_rect(&self, rect: &CellRect) -> bool {
        let size = rect.size();
        if size.width() == 0 || size.height() == 0 {
            return self.contains(rect.origin());
        }
        let origin = rect.origin();
        u64::from(origin.column()) + u64::from(size.width()) <= u64::from(self.columns)
            && u64::from(origin.row()) + u64::from(size.height()) <= u64::from(self.rows)
    }

    /// Row-major index of the cell, when in bounds.
    #[must_use]
    pub fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }

    /// Cell located at the row-major index.
    #[must_use]
    pub fn cell_at(&self, index: usize) -> Option<CellCoord> {
        let width = usize::try_from(self.columns).ok()?;
        if width == 0 || index >= self.cell_count() {
            return None;
        }
        Some(CellCoord::new(
            u32::try_from(index % width).ok()?,
            u32::try_from(index / width).ok()?,
        ))
    }

    /// In-bounds neighbours of a cell, including diagonals, in a fixed order.
    pub fn neighbors(&self, cell: CellCoord) -> impl Iterator<Item = CellCoord> + '_ {
        const OFFSETS: [(i64, i64); 8] = [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ];
        OFFSETS.iter().filter_map(move |(dx, dy)| {
            cell.offset(*dx, *dy)
                .filter(|neighbor| self.contains(*neighbor))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_rejects_negative_cells() {
        let origin = CellCoord::new(0, 3);
        assert_eq!(origin.offset(-1, 0), None);
        assert_eq!(origin.offset(2, -3), Some(CellCoord::new(2, 0)));
    }

    #[test]
    fn rect_intersection_requires_shared_cells() {
        let a = CellRect::from_origin_and_size(CellCoord::new(0, 0), CellRectSize::new(2, 2));
        let b = CellRect::from_origin_and_size(CellCoord::new(1, 1), CellRectSize::new(2, 2));
        let c = CellRect::from_origin_and_size(CellCoord::new(2, 0), CellRectSize::new(1, 1));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.cells().count(), 4);
    }

    #[test]
    fn grid_neighbors_are_clipped_at_edges() {
        let grid = GridSize::new(3, 3);
        assert_eq!(grid.neighbors(CellCoord::new(0, 0)).count(), 3);
        assert_eq!(grid.neighbors(CellCoord::new(1, 1)).count(), 8);
    }

    #[test]
    fn grid_index_round_trips_cells() {
        let grid = GridSize::new(4, 3);
        let cell = CellCoord::new(3, 2);
        let index = grid.index(cell).expect("in bounds");
        assert_eq!(index, 11);
        assert_eq!(grid.cell_at(index), Some(cell));
        assert_eq!(grid.index(CellCoord::new(4, 0)), None);
    }

    #[test]
    fn rect_containment_checks_grid_edges() {
        let grid = GridSize::new(4, 4);
        let inside = CellRect::from_origin_and_size(CellCoord::new(2, 2), CellRectSize::new(2, 2));
        let outside =
            CellRect::from_origin_and_size(CellCoord::new(3, 2), CellRectSize::new(2, 2));
        assert!(grid.contains_rect(&inside));
        assert!(!grid.contains_rect(&outside));
    }
}
