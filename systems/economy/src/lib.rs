#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Power generation, power allocation, and resource collection at bases.

use std::collections::BTreeMap;

use kiln_core::{
    ActionKind, ActionPayload, Capability, CapabilitySet, EntityId, Event, PlayerId, SubstanceKind,
};
use kiln_world::{
    blueprint::{blueprint, GeneratorSource},
    World,
};

/// Rotor speeds below this are treated as stalled.
const STALL_SPEED: f64 = 0.001;

const COLLECTABLE: CapabilitySet = CapabilitySet::of(&[Capability::Collectable]);

/// Splits a power pool between consumers in order.
///
/// A consumer is powered only when what is left of the pool covers its whole
/// demand. Returns the total demand; `powered` receives one flag per consumer.
pub fn allocate(generated: f64, demands: &[f64], powered: &mut Vec<bool>) -> f64 {
    powered.clear();
    let mut pool = generated;
    let mut needed = 0.0;
    for demand in demands {
        needed += demand;
        let covered = pool >= *demand;
        if covered {
            pool -= demand;
        }
        powered.push(covered);
    }
    needed
}

/// Runs the economy stages of a tick.
#[derive(Debug, Default)]
pub struct Economy {
    generated: BTreeMap<PlayerId, f64>,
    consumers: BTreeMap<PlayerId, Vec<(EntityId, f64)>>,
    demands: Vec<f64>,
    powered: Vec<bool>,
}

impl Economy {
    /// Creates the system with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits every collectable entity lying on a base to the base's owner.
    pub fn collect(&mut self, world: &mut World) {
        for base in world.entities_with(Capability::Base) {
            let Some(owner) = world.entity(base).map(|e| e.owner()) else {
                continue;
            };
            for item in world.collisions(base, COLLECTABLE) {
                let Some(entity) = world.entity(item) else {
                    continue;
                };
                if entity.carried_by().is_some()
                    || entity.actions().is_queued(ActionKind::Die, false)
                {
                    continue;
                }
                let template = blueprint(entity.kind());
                let kind = template.collected_as.unwrap_or(entity.kind());
                let quantity = entity.hp().ceil() / template.hp;
                let _ = world.enqueue(item, ActionKind::Die, ActionPayload::None);
                world.ledger_mut(owner).credit(kind, quantity);
                tracing::debug!(base = base.get(), ?kind, quantity, "resource collected");
                world.emit(Event::ResourceCollected {
                    owner,
                    kind,
                    quantity,
                });
            }
        }
    }

    /// Runs every generator and powers consumers from each owner's output.
    pub fn power(&mut self, world: &mut World) {
        self.generated.clear();
        self.consumers.clear();
        let light_capacity = SubstanceKind::Light.rule().capacity;

        for id in world.entities_with(Capability::Generator) {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            let Some(profile) = blueprint(entity.kind()).generator else {
                tracing::warn!(entity = id.get(), kind = ?entity.kind(), "generator without a profile");
                continue;
            };
            let owner = entity.owner();
            let light = world.substance(entity.position(), SubstanceKind::Light);
            let carried = entity.carried_by().is_some();
            let Some(state) = world.entity_mut(id).and_then(|e| e.generator.as_mut()) else {
                continue;
            };
            state.power_generated = match profile.source {
                _ if carried => 0.0,
                GeneratorSource::Turbine { max_speed } => {
                    state.rotor += state.speed;
                    if state.speed < STALL_SPEED {
                        state.speed = 0.0;
                    }
                    profile.power * (state.speed / max_speed).ceil()
                }
                GeneratorSource::Solar => profile.power * light / light_capacity,
            };
            *self.generated.entry(owner).or_insert(0.0) += state.power_generated;
        }

        for id in world.entities_with(Capability::PowerConsumer) {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            let Some(consumer) = entity.consumer.as_ref() else {
                tracing::warn!(entity = id.get(), "power consumer without demand");
                continue;
            };
            self.consumers
                .entry(entity.owner())
                .or_default()
                .push((id, consumer.power_needed));
        }

        let paused = world.tuning().pause_power_consumption;
        for player in world.players() {
            let generated = self.generated.get(&player).copied().unwrap_or(0.0);
            let consumers = self.consumers.remove(&player).unwrap_or_default();
            self.demands.clear();
            self.demands.extend(consumers.iter().map(|(_, demand)| *demand));
            let needed = allocate(generated, &self.demands, &mut self.powered);
            for ((id, _), powered) in consumers.iter().zip(&self.powered) {
                if let Some(state) = world.entity_mut(*id).and_then(|e| e.consumer.as_mut()) {
                    state.powered = paused || *powered;
                }
            }
            world.ledger_mut(player).set_power(generated, needed);
        }
    }
}
