#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tick orchestration for the Kiln simulation.
//!
//! A [`Simulation`] owns the [`World`] together with every system and runs
//! them in a fixed order on each tick. Given the same configuration, level
//! and command stream, two runs with an inline substance field produce the
//! same events and the same final state.

mod config;
mod error;
mod level;

use kiln_core::{Command, Event, GridSize, PlayerId, SubstanceGrid};
use kiln_substances::{InlineField, ThreadedField};
use kiln_system_actions::Actions;
use kiln_system_agents::Agents;
use kiln_system_ballistics::{Ballistics, Explosives};
use kiln_system_economy::Economy;
use kiln_system_reactions::Reactions;
use kiln_system_towers::Towers;
use kiln_world::World;

pub use config::{FieldMode, SimulationConfig};
pub use error::SetupError;
pub use kiln_world::{query, Tuning};
pub use level::{LevelData, LevelEntity, LevelPlayer, LevelResource, LevelSubstance, LevelTaskNeed};

/// World plus the systems that advance it.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    actions: Actions,
    agents: Agents,
    towers: Towers,
    ballistics: Ballistics,
    explosives: Explosives,
    economy: Economy,
    reactions: Reactions,
}

impl Simulation {
    /// Builds a world from level data and wires up every system.
    pub fn new(config: &SimulationConfig, level: &LevelData) -> Result<Self, SetupError> {
        if level.columns == 0 || level.rows == 0 {
            return Err(SetupError::EmptyGrid {
                columns: level.columns,
                rows: level.rows,
            });
        }
        let size = GridSize::new(level.columns, level.rows);
        let mut world = match config.field {
            FieldMode::Inline => World::new(
                size,
                config.tuning.clone(),
                config.seed,
                Box::new(InlineField::new(size)),
            ),
            FieldMode::Threaded => World::new(
                size,
                config.tuning.clone(),
                config.seed,
                Box::new(ThreadedField::spawn(size)),
            ),
        };

        let mut quantities = SubstanceGrid::new(size);
        for seed in &level.substances {
            if !size.contains(seed.cell) {
                return Err(SetupError::SubstanceOutOfBounds {
                    kind: seed.kind,
                    cell: seed.cell,
                });
            }
            quantities.set(seed.cell, seed.kind, seed.quantity);
        }
        world.set_initial_quantities(quantities);

        for placed in &level.entities {
            let Some(id) = world.spawn(placed.kind, placed.cell, placed.owner()) else {
                return Err(SetupError::EntityOutOfBounds {
                    kind: placed.kind,
                    cell: placed.cell,
                });
            };
            if let Some(task) = placed.task {
                let agent = world.entity_mut(id).and_then(|e| e.agent.as_mut());
                let Some(agent) = agent else {
                    return Err(SetupError::NotAnAgent {
                        kind: placed.kind,
                        cell: placed.cell,
                    });
                };
                agent.task = task;
            }
        }

        for player in &level.players {
            let ledger = world.ledger_mut(PlayerId::new(player.id));
            for resource in &player.resources {
                ledger.credit(resource.kind, resource.quantity);
            }
            for need in &player.task_needs {
                ledger.set_task_need(need.task, need.need);
            }
        }

        tracing::info!(
            columns = level.columns,
            rows = level.rows,
            entities = level.entities.len(),
            field = ?config.field,
            seed = config.seed,
            "simulation ready"
        );

        Ok(Self {
            world,
            actions: Actions::new(),
            agents: Agents::new(),
            towers: Towers::new(),
            ballistics: Ballistics::new(),
            explosives: Explosives::new(),
            economy: Economy::new(),
            reactions: Reactions::new(),
        })
    }

    /// Read-only access to the world for queries.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Applies a command, appending the resulting events.
    ///
    /// `Tick` runs every system once; other commands only change world state.
    pub fn apply(&mut self, command: Command, out_events: &mut Vec<Event>) {
        match command {
            Command::Tick { .. } => {
                kiln_world::apply(&mut self.world, command, out_events);
                self.run_systems();
                self.world.finish_tick();
                self.world.drain_events(out_events);
            }
            other => kiln_world::apply(&mut self.world, other, out_events),
        }
    }

    fn run_systems(&mut self) {
        let world = &mut self.world;
        self.agents.steer(world);
        let agents = &mut self.agents;
        self.actions.run(world, |world, id| agents.decide(world, id));
        self.agents.run(world);
        self.reactions.emitters(world);
        self.towers.run(world);
        self.economy.collect(world);
        self.ballistics.run(world);
        self.reactions.flammables(world);
        self.reactions.coal(world);
        self.reactions.meltables(world);
        self.explosives.run(world);
        self.economy.power(world);
    }
}
