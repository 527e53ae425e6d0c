//! Level data: grid size, starting entities, substances, and player stockpiles.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use kiln_core::{CellCoord, EntityKind, PlayerId, SubstanceKind, GAIA};
use kiln_world::blueprint::Task;

use crate::SetupError;

/// Entity placed when the level loads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelEntity {
    /// Kind of entity.
    pub kind: EntityKind,
    /// Upper-left cell of its footprint.
    pub cell: CellCoord,
    /// Owning player; nature when omitted.
    #[serde(default = "gaia")]
    pub owner: u32,
    /// Starting task of an agent.
    #[serde(default)]
    pub task: Option<Task>,
}

impl LevelEntity {
    /// Owning player.
    #[must_use]
    pub const fn owner(&self) -> PlayerId {
        PlayerId::new(self.owner)
    }
}

fn gaia() -> u32 {
    GAIA.get()
}

/// Substance quantity seeded into one cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelSubstance {
    /// Cell receiving the substance.
    pub cell: CellCoord,
    /// Substance seeded.
    pub kind: SubstanceKind,
    /// Quantity seeded.
    pub quantity: f64,
}

/// Stockpiled resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelResource {
    /// Resource kind.
    pub kind: EntityKind,
    /// Quantity held.
    pub quantity: f64,
}

/// Outstanding demand for agents on a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelTaskNeed {
    /// Task in demand.
    pub task: Task,
    /// Number of agents still wanted.
    pub need: i64,
}

/// Starting ledger of a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelPlayer {
    /// Player identifier.
    pub id: u32,
    /// Starting stockpile.
    #[serde(default)]
    pub resources: Vec<LevelResource>,
    /// Task demand counters.
    #[serde(default)]
    pub task_needs: Vec<LevelTaskNeed>,
}

/// Everything needed to populate a world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    /// Number of grid columns.
    pub columns: u32,
    /// Number of grid rows.
    pub rows: u32,
    /// Entities placed in listed order.
    #[serde(default)]
    pub entities: Vec<LevelEntity>,
    /// Substances seeded before the field initialises.
    #[serde(default)]
    pub substances: Vec<LevelSubstance>,
    /// Player ledgers.
    #[serde(default)]
    pub players: Vec<LevelPlayer>,
}

impl LevelData {
    /// Parses a level document.
    pub fn from_toml_str(text: &str) -> Result<Self, SetupError> {
        toml::from_str(text).map_err(|source| SetupError::Parse {
            what: "level",
            source,
        })
    }

    /// Reads and parses a level file.
    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let text = fs::read_to_string(path).map_err(|source| SetupError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
