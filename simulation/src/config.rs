//! Runtime configuration loaded from TOML.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use kiln_world::Tuning;

use crate::SetupError;

/// Where the substance field solver runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMode {
    /// On a dedicated worker thread.
    #[default]
    Threaded,
    /// Synchronously on the simulation thread; used for replays.
    Inline,
}

/// Settings that shape a simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed wall time covered by one tick, in milliseconds.
    pub tick_ms: u64,
    /// Seed of the random source behind every stochastic choice.
    pub seed: u64,
    /// Substance solver placement.
    pub field: FieldMode,
    /// Numeric knobs shared by the systems.
    pub tuning: Tuning,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            seed: 0,
            field: FieldMode::default(),
            tuning: Tuning::default(),
        }
    }
}

impl SimulationConfig {
    /// Parses a configuration document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, SetupError> {
        toml::from_str(text).map_err(|source| SetupError::Parse {
            what: "configuration",
            source,
        })
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let text = fs::read_to_string(path).map_err(|source| SetupError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Wall time covered by one tick.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}
