//! One-way protocol spoken between the simulation and the substance field worker.

use serde::{Deserialize, Serialize};

use crate::{CapabilitySet, CellCoord, CellRect, EntityId, EntityKind, SubstanceGrid, SubstanceKind};

/// Substance source used by flood fills and direct writes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSource {
    /// Cell the source sits in.
    pub cell: CellCoord,
    /// Substance emitted.
    pub kind: SubstanceKind,
    /// Quantity at the source cell.
    pub quantity: f64,
}

/// Entity footprint that keeps substances out of its cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockerSeed {
    /// Blocking entity.
    pub entity: EntityId,
    /// Cells covered by the entity.
    pub footprint: CellRect,
    /// Capabilities the entity carries.
    pub capabilities: CapabilitySet,
}

/// Emitter registered with the worker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmitterSeed {
    /// Emitting entity.
    pub entity: EntityId,
    /// Cell the emitter injects into.
    pub cell: CellCoord,
    /// Substance injected.
    pub kind: SubstanceKind,
    /// Quantity injected on each refresh.
    pub quantity: f64,
}

/// Turbine whose rotor is spun by fluid flowing into its footprint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurbineSeed {
    /// Turbine entity.
    pub entity: EntityId,
    /// Cells covered by the turbine.
    pub footprint: CellRect,
    /// Largest rotor speed.
    pub max_speed: f64,
    /// Rotor speed gained per unit of fluid inflow.
    pub flow_gain: f64,
}

/// Commands accepted by the substance field worker, processed in order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldCommand {
    /// Replaces the whole field state.
    Init {
        /// Number of grid columns.
        columns: u32,
        /// Number of grid rows.
        rows: u32,
        /// Initial quantities.
        quantities: SubstanceGrid,
        /// Substance-blocking entity footprints.
        blockers: Vec<BlockerSeed>,
        /// Registered emitters.
        emitters: Vec<EmitterSeed>,
        /// Registered turbines.
        turbines: Vec<TurbineSeed>,
    },
    /// Runs one decay, diffusion and phase transition pass.
    DispersePheromones,
    /// Propagates steady-state sources outward.
    FloodFill {
        /// Sources to propagate.
        sources: Vec<FieldSource>,
    },
    /// Retracts the field derived from removed sources and refloods the boundary.
    ReverseFloodFill {
        /// Sources that disappeared.
        sources: Vec<FieldSource>,
    },
    /// Switches the substance an emitter injects.
    ChangeEmitterType {
        /// Emitting entity.
        entity: EntityId,
        /// New substance.
        kind: SubstanceKind,
    },
    /// Registers an emitter created after initialisation and injects it.
    RegisterEmitter(EmitterSeed),
    /// Updates an emitter's position and quantity and re-injects it.
    SetEmitterQuantity {
        /// Emitting entity.
        entity: EntityId,
        /// Cell the emitter currently sits in.
        cell: CellCoord,
        /// Quantity injected; zero stops emission.
        quantity: f64,
    },
    /// Overwrites a cell's quantity.
    SetQuantity {
        /// Target cell.
        cell: CellCoord,
        /// Target substance.
        kind: SubstanceKind,
        /// New quantity.
        quantity: f64,
    },
    /// Adds to a cell's quantity up to the substance capacity.
    Deposit {
        /// Target cell.
        cell: CellCoord,
        /// Target substance.
        kind: SubstanceKind,
        /// Quantity added.
        quantity: f64,
    },
    /// Registers or relocates a substance-blocking entity.
    TrackBlocker(BlockerSeed),
    /// Registers or relocates a turbine, keeping its current rotor speed.
    TrackTurbine(TurbineSeed),
    /// Forgets every record of an entity.
    ForgetEntity {
        /// Entity to forget.
        entity: EntityId,
    },
}

/// Entity the worker asks the main thread to spawn after a cooling transition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condensation {
    /// Cell the entity should appear in.
    pub cell: CellCoord,
    /// Kind of entity to spawn.
    pub kind: EntityKind,
}

/// State published by the worker after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldReport {
    /// Full copy of the quantities.
    pub snapshot: SubstanceGrid,
    /// Entities to spawn, in the order they condensed.
    pub condensations: Vec<Condensation>,
    /// Latest rotor speed of every turbine.
    pub turbine_speeds: Vec<(EntityId, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridSize;

    #[test]
    fn commands_survive_bincode_round_trip() {
        let mut quantities = SubstanceGrid::new(GridSize::new(2, 1));
        quantities.set(CellCoord::new(1, 0), SubstanceKind::Oil, 42.5);
        let commands = vec![
            FieldCommand::Init {
                columns: 2,
                rows: 1,
                quantities,
                blockers: Vec::new(),
                emitters: vec![EmitterSeed {
                    entity: EntityId::new(3),
                    cell: CellCoord::new(0, 0),
                    kind: SubstanceKind::Heat,
                    quantity: 150.0,
                }],
                turbines: Vec::new(),
            },
            FieldCommand::FloodFill {
                sources: vec![FieldSource {
                    cell: CellCoord::new(0, 0),
                    kind: SubstanceKind::Light,
                    quantity: 350.0,
                }],
            },
            FieldCommand::ForgetEntity {
                entity: EntityId::new(9),
            },
        ];

        let bytes = bincode::serialize(&commands).expect("serialize commands");
        let decoded: Vec<FieldCommand> = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(decoded, commands);
    }
}
