#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Reactions between entities and the substances around them: emitter
//! refreshes, burning, smelting, and melting.

use kiln_core::{
    ActionKind, ActionPayload, Capability, EntityId, EntityKind, FieldCommand, SubstanceKind,
};
use kiln_world::{blueprint::blueprint, World};

/// Reports whether an emitter refreshes on this tick.
///
/// Emitters are staggered by id so they do not all refresh together.
#[must_use]
pub fn refresh_due(tick: u64, entity: EntityId, interval: u64) -> bool {
    interval > 0 && (tick + u64::from(entity.get())) % interval == 0
}

/// Runs the reaction stages of a tick.
#[derive(Debug, Default)]
pub struct Reactions;

impl Reactions {
    /// Creates the system.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Re-injects the quantity of every active emitter that is due.
    pub fn emitters(&mut self, world: &mut World) {
        let tick = world.tick();
        for id in world.entities_with(Capability::Emitter) {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            if entity.carried_by().is_some() {
                continue;
            }
            let Some(emitter) = entity.emitter.as_ref() else {
                tracing::warn!(entity = id.get(), "emitter tag without emitter state");
                continue;
            };
            let Some(interval) = emitter.refresh_interval else {
                continue;
            };
            if emitter.quantity == 0.0 || !refresh_due(tick, id, interval) {
                continue;
            }
            let command = FieldCommand::SetEmitterQuantity {
                entity: id,
                cell: entity.position(),
                quantity: emitter.quantity,
            };
            world.send_field(command);
        }
    }

    /// Ignites hot flammables and burns down the ones on fire.
    pub fn flammables(&mut self, world: &mut World) {
        let dt = world.dt();
        for id in world.entities_with(Capability::Flammable) {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            if entity.carried_by().is_some() {
                continue;
            }
            let kind = entity.kind();
            let cell = entity.position();
            let Some(profile) = blueprint(kind).flammable else {
                tracing::warn!(entity = id.get(), ?kind, "flammable tag without a profile");
                continue;
            };
            let Some(on_fire) = entity.flammable.as_ref().map(|state| state.on_fire) else {
                tracing::warn!(entity = id.get(), ?kind, "flammable tag without burn state");
                continue;
            };

            if on_fire {
                let _ = world.set_capability(id, Capability::Collectable, false);
                let dying = entity_dying(world, id);
                let Some(entity) = world.entity_mut(id) else {
                    continue;
                };
                let mut refresh = None;
                if let Some(emitter) = entity.emitter.as_mut() {
                    if emitter.quantity == 0.0 {
                        emitter.quantity = profile.heat_quantity;
                        refresh = Some(emitter.quantity);
                    }
                }
                let spent = entity.flammable.as_mut().is_some_and(|state| {
                    state.fuel = state.fuel.saturating_sub(dt);
                    state.fuel.is_zero()
                });
                if let Some(quantity) = refresh {
                    world.send_field(FieldCommand::SetEmitterQuantity {
                        entity: id,
                        cell,
                        quantity,
                    });
                }
                if spent && !dying {
                    tracing::debug!(entity = id.get(), ?kind, "burnt out");
                    let _ = world.enqueue(id, ActionKind::Die, ActionPayload::None);
                }
                continue;
            }

            if entity.capabilities().contains(Capability::Agent) {
                continue;
            }
            if world.substances().temperature(cell) < profile.combustion_temp {
                continue;
            }
            tracing::debug!(entity = id.get(), ?kind, "ignited");
            if let Some(state) = world.entity_mut(id).and_then(|e| e.flammable.as_mut()) {
                state.on_fire = true;
            }
            if kind == EntityKind::Coal {
                let _ = world.change_kind(id, EntityKind::HotCoal);
            }
        }
    }

    /// Consumes coal lying in molten iron or molten sand.
    pub fn coal(&mut self, world: &mut World) {
        for id in world.entities_with(Capability::Coal) {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            if entity.carried_by().is_some() {
                continue;
            }
            let cell = entity.position();
            let owner = entity.owner();
            let iron = world.substance(cell, SubstanceKind::MoltenIron);
            let sand = world.substance(cell, SubstanceKind::MoltenSand);

            if iron > 0.0 {
                tracing::debug!(entity = id.get(), ?cell, "coal smelted iron into steel");
                let _ = world.remove(id);
                world.send_field(FieldCommand::SetQuantity {
                    cell,
                    kind: SubstanceKind::MoltenIron,
                    quantity: 0.0,
                });
                world.send_field(FieldCommand::Deposit {
                    cell,
                    kind: SubstanceKind::MoltenSteel,
                    quantity: iron * 2.0,
                });
            } else if sand > 0.0 {
                tracing::debug!(entity = id.get(), ?cell, "coal reduced sand into silicon");
                let _ = world.remove(id);
                world.send_field(FieldCommand::SetQuantity {
                    cell,
                    kind: SubstanceKind::MoltenSand,
                    quantity: 0.0,
                });
                let _ = world.spawn(EntityKind::Silicon, cell, owner);
            }
        }
    }

    /// Melts meltables that got hot enough, releasing their substance.
    pub fn meltables(&mut self, world: &mut World) {
        for id in world.entities_with(Capability::Meltable) {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            if entity.carried_by().is_some() || entity.actions().is_queued(ActionKind::Die, false) {
                continue;
            }
            let kind = entity.kind();
            let cell = entity.position();
            let template = blueprint(kind);
            let Some(profile) = template.meltable else {
                tracing::warn!(entity = id.get(), ?kind, "meltable tag without a profile");
                continue;
            };
            if world.substances().temperature(cell) < profile.melt_temp {
                continue;
            }
            let quantity = profile.heat_quantity * entity.hp() / template.hp;
            tracing::debug!(entity = id.get(), ?kind, quantity, "melted");

            world.send_field(FieldCommand::SetEmitterQuantity {
                entity: id,
                cell,
                quantity: 0.0,
            });
            if let Some(melt_kind) = profile.melt_kind {
                world.send_field(FieldCommand::ChangeEmitterType {
                    entity: id,
                    kind: melt_kind,
                });
            }
            if let Some(emitter) = world.entity_mut(id).and_then(|e| e.emitter.as_mut()) {
                if let Some(melt_kind) = profile.melt_kind {
                    emitter.kind = melt_kind;
                }
                emitter.quantity = quantity;
            }
            world.send_field(FieldCommand::SetEmitterQuantity {
                entity: id,
                cell,
                quantity,
            });
            let _ = world.enqueue(id, ActionKind::Die, ActionPayload::None);
        }
    }
}

fn entity_dying(world: &World, id: EntityId) -> bool {
    world
        .entity(id)
        .is_some_and(|e| e.actions().is_queued(ActionKind::Die, false))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use kiln_core::{CellCoord, GridSize, PlayerId, SubstanceGrid, GAIA};
    use kiln_world::Tuning;

    fn world() -> World {
        let mut world = World::inline(GridSize::new(8, 8), Tuning::default(), 2);
        world.begin_tick(Duration::from_millis(16));
        world
    }

    fn with_substance(world: &mut World, cell: CellCoord, kind: SubstanceKind, quantity: f64) {
        let mut grid = SubstanceGrid::new(world.size());
        grid.set(cell, kind, quantity);
        world.set_initial_quantities(grid);
    }

    #[test]
    fn refreshes_are_staggered_by_id() {
        assert!(refresh_due(58, EntityId::new(2), 60));
        assert!(!refresh_due(59, EntityId::new(2), 60));
        assert!(refresh_due(59, EntityId::new(1), 60));
        assert!(!refresh_due(10, EntityId::new(2), 0));
    }

    #[test]
    fn hot_coal_ignites_and_stops_being_collectable() {
        let mut world = world();
        let cell = CellCoord::new(3, 3);
        let coal = world.spawn(EntityKind::Coal, cell, GAIA).expect("coal fits");
        with_substance(&mut world, cell, SubstanceKind::Heat, 130.0);

        let mut reactions = Reactions::new();
        reactions.flammables(&mut world);
        let entity = world.entity(coal).expect("burning");
        assert_eq!(entity.kind(), EntityKind::HotCoal);
        assert_eq!(entity.flammable.as_ref().map(|s| s.on_fire), Some(true));
        assert_eq!(entity.emitter.as_ref().map(|e| e.quantity), Some(150.0));

        reactions.flammables(&mut world);
        let entity = world.entity(coal).expect("burning");
        assert!(!entity.capabilities().contains(Capability::Collectable));
        assert_eq!(
            entity.flammable.as_ref().map(|s| s.fuel),
            Some(Duration::from_millis(3 * 60 * 1000 - 16))
        );
    }

    #[test]
    fn cold_coal_and_hot_agents_stay_unlit() {
        let mut world = world();
        let cell = CellCoord::new(3, 3);
        let coal = world
            .spawn(EntityKind::Coal, CellCoord::new(5, 5), GAIA)
            .expect("coal fits");
        let agent = world
            .spawn(EntityKind::Agent, cell, PlayerId::new(1))
            .expect("agent fits");
        with_substance(&mut world, cell, SubstanceKind::Heat, 150.0);

        Reactions::new().flammables(&mut world);
        for id in [coal, agent] {
            let state = world.entity(id).and_then(|e| e.flammable.clone());
            assert_eq!(state.map(|s| s.on_fire), Some(false));
        }
    }

    #[test]
    fn spent_fuel_queues_die_once() {
        let mut world = world();
        let coal = world
            .spawn(EntityKind::HotCoal, CellCoord::new(1, 1), GAIA)
            .expect("coal fits");
        if let Some(state) = world.entity_mut(coal).and_then(|e| e.flammable.as_mut()) {
            state.on_fire = true;
            state.fuel = Duration::from_millis(10);
        }
        let mut reactions = Reactions::new();
        reactions.flammables(&mut world);
        reactions.flammables(&mut world);

        let entity = world.entity(coal).expect("still registered");
        assert_eq!(entity.actions().len(), 1);
        assert!(entity.actions().is_queued(ActionKind::Die, true));
    }

    #[test]
    fn coal_smelts_molten_iron_into_steel() {
        let mut world = world();
        let cell = CellCoord::new(4, 6);
        let coal = world.spawn(EntityKind::Coal, cell, GAIA).expect("coal fits");
        with_substance(&mut world, cell, SubstanceKind::MoltenIron, 30.0);

        Reactions::new().coal(&mut world);
        assert!(world.entity(coal).is_none());
        world.finish_tick();
        world.begin_tick(Duration::from_millis(16));
        assert!(world.substance(cell, SubstanceKind::MoltenSteel) > 0.0);
        assert_eq!(world.substance(cell, SubstanceKind::MoltenIron), 0.0);
    }

    #[test]
    fn coal_reduces_molten_sand_to_silicon() {
        let mut world = world();
        let cell = CellCoord::new(2, 6);
        let coal = world.spawn(EntityKind::Coal, cell, GAIA).expect("coal fits");
        with_substance(&mut world, cell, SubstanceKind::MoltenSand, 30.0);

        Reactions::new().coal(&mut world);
        assert!(world.entity(coal).is_none());
        let silicon = world
            .entities_at(cell)
            .into_iter()
            .filter_map(|id| world.entity(id))
            .any(|e| e.kind() == EntityKind::Silicon);
        assert!(silicon);
    }

    #[test]
    fn melting_releases_quantity_scaled_by_health() {
        let mut world = world();
        let cell = CellCoord::new(3, 4);
        let ice = world.spawn(EntityKind::Ice, cell, GAIA).expect("ice fits");
        if let Some(entity) = world.entity_mut(ice) {
            entity.set_hp(60.0);
        }
        with_substance(&mut world, cell, SubstanceKind::Heat, 20.0);

        Reactions::new().meltables(&mut world);
        let entity = world.entity(ice).expect("melting");
        assert!(entity.actions().is_queued(ActionKind::Die, true));
        let emitter = entity.emitter.clone().expect("emitter state");
        assert_eq!(emitter.kind, SubstanceKind::Water);
        assert_eq!(emitter.quantity, 60.0);
    }

    #[test]
    fn cool_meltables_stay_solid() {
        let mut world = world();
        let iron = world
            .spawn(EntityKind::Iron, CellCoord::new(3, 4), GAIA)
            .expect("iron fits");
        Reactions::new().meltables(&mut world);
        assert!(world.entity(iron).is_some_and(|e| e.actions().is_empty()));
    }
}
