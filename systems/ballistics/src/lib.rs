#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Projectile flight, impacts, and explosive fuses.

use std::{collections::BTreeSet, time::Duration};

use glam::DVec2;
use rand::Rng;

use kiln_core::{ActionKind, ActionPayload, Capability, CellCoord, CellRect, EntityId};
use kiln_world::{blueprint::blueprint, entity::BallisticState, Tuning, World};

/// Position of a projectile's upper-left corner after flying for `age`.
///
/// Gravity acts along the row axis; a negative value pulls toward higher rows.
#[must_use]
pub fn trajectory(
    origin: DVec2,
    theta: f64,
    velocity: f64,
    age: Duration,
    tuning: &Tuning,
) -> DVec2 {
    let t = age.as_secs_f64() * 1000.0 / tuning.trajectory_divisor_ms;
    DVec2::new(
        origin.x + velocity * t * theta.cos(),
        origin.y + velocity * t * theta.sin() - 0.5 * tuning.gravity * t * t,
    )
}

/// Flies projectiles and resolves their impacts.
#[derive(Debug, Default)]
pub struct Ballistics {
    hits: BTreeSet<EntityId>,
}

impl Ballistics {
    /// Creates the system with an empty hit buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances every free-flying projectile by one tick.
    pub fn run(&mut self, world: &mut World) {
        for id in world.entities_with(Capability::Ballistic) {
            self.step(world, id);
        }
    }

    fn step(&mut self, world: &mut World, id: EntityId) {
        let dt = world.dt();
        let Some(entity) = world.entity_mut(id) else {
            return;
        };
        if entity.carried_by().is_some() || entity.actions().is_queued(ActionKind::Die, false) {
            return;
        }
        let kind = entity.kind();
        let owner = entity.owner();
        let armed = entity
            .holder
            .as_ref()
            .is_some_and(|holder| !holder.held.is_empty());
        let Some(profile) = blueprint(kind).ballistic else {
            tracing::warn!(entity = id.get(), ?kind, "ballistic tag without a profile");
            return;
        };
        let Some(state) = entity.ballistic.as_mut() else {
            tracing::warn!(entity = id.get(), ?kind, "ballistic tag without flight state");
            return;
        };
        state.age += dt;
        let state = state.clone();
        let centre = entity.centre();

        self.hits.clear();
        for other in world.collisions(id, profile.blocking) {
            if world.entity(other).is_some_and(|e| e.owner() != owner) {
                let _ = self.hits.insert(other);
            }
        }
        let mut in_radius = state.target.filter(|_| armed).is_some_and(|target| {
            world.entity(target).is_some_and(|target| {
                !target.actions().is_queued(ActionKind::Die, false)
                    && target.centre().distance(centre) <= world.tuning().homing_radius
            })
        });
        if (in_radius || !self.hits.is_empty())
            && profile.miss_rate > 0.0
            && world.rng().gen_bool(profile.miss_rate.min(1.0))
        {
            tracing::trace!(entity = id.get(), "projectile missed");
            self.hits.clear();
            in_radius = false;
        }

        if in_radius || !self.hits.is_empty() {
            for hit in &self.hits {
                if profile.piercing {
                    let toll = world
                        .entity(*hit)
                        .filter(|e| e.capabilities().contains(Capability::Collectable))
                        .map_or(0.0, |e| e.hp() / 20.0);
                    if let Some(projectile) = world.entity_mut(id) {
                        let hp = projectile.hp() - toll;
                        projectile.set_hp(hp);
                    }
                }
                let _ = world.damage(*hit, profile.damage);
            }
            tracing::trace!(
                entity = id.get(),
                hits = self.hits.len(),
                in_radius,
                "projectile impact"
            );
            let spent = world.entity(id).map_or(true, |e| e.hp() <= 0.0);
            if in_radius || !profile.piercing || spent {
                let _ = world.enqueue(id, ActionKind::Die, ActionPayload::None);
            }
            return;
        }

        fly(world, id, &state, centre);
    }
}

fn fly(world: &mut World, id: EntityId, state: &BallisticState, centre: DVec2) {
    let next = trajectory(
        state.origin,
        state.initial_theta,
        state.velocity,
        state.age,
        world.tuning(),
    )
    .round();
    let Some(size) = world.entity(id).map(|e| e.size()) else {
        return;
    };
    let inside = next.x >= 0.0
        && next.y >= 0.0
        && world.size().contains_rect(&CellRect::from_origin_and_size(
            CellCoord::new(next.x as u32, next.y as u32),
            size,
        ));
    if !inside {
        tracing::trace!(entity = id.get(), "projectile left the grid");
        let _ = world.enqueue(id, ActionKind::Die, ActionPayload::None);
        return;
    }
    let cell = CellCoord::new(next.x as u32, next.y as u32);
    if world.move_to(id, cell).is_err() {
        return;
    }
    let Some(entity) = world.entity_mut(id) else {
        return;
    };
    let delta = entity.centre() - centre;
    if delta != DVec2::ZERO {
        entity.set_theta(delta.y.atan2(delta.x));
    }
}

/// Ages explosives and queues DIE once their fuse runs out.
#[derive(Debug, Default)]
pub struct Explosives;

impl Explosives {
    /// Creates the system.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Advances every explosive lying on the grid.
    pub fn run(&mut self, world: &mut World) {
        let dt = world.dt();
        for id in world.entities_with(Capability::Explosive) {
            let Some(entity) = world.entity_mut(id) else {
                continue;
            };
            if entity.carried_by().is_some() {
                continue;
            }
            let dying = entity.actions().is_queued(ActionKind::Die, false);
            let Some(state) = entity.explosive.as_mut() else {
                tracing::warn!(entity = id.get(), "explosive tag without fuse state");
                continue;
            };
            state.age += dt;
            let lit = state.timer.map_or(true, |timer| state.age > timer);
            if lit && !dying {
                tracing::debug!(entity = id.get(), "fuse lit");
                let _ = world.enqueue(id, ActionKind::Die, ActionPayload::None);
            }
        }
    }
}
