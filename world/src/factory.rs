//! Builds entities from their blueprints.

use std::f64::consts::FRAC_PI_2;

use glam::DVec2;

use kiln_core::{CellCoord, EntityId, EntityKind, PlayerId};

use crate::{
    blueprint::{blueprint, Blueprint},
    entity::{
        AgentState, BallisticState, ConsumerState, EmitterState, Entity, ExplosiveState,
        FlammableState,
    },
};

/// Creates an entity of the given kind with every component at its default.
#[must_use]
pub fn make(kind: EntityKind, cell: CellCoord, owner: PlayerId) -> Entity {
    let blueprint = blueprint(kind);
    let mut entity = Entity::new(
        kind,
        owner,
        cell,
        blueprint.size,
        blueprint.hp,
        blueprint.capabilities,
    );
    attach_components(&mut entity, &blueprint);
    if blueprint.turret.is_some() {
        entity.set_theta(FRAC_PI_2);
    }
    entity
}

/// Creates a projectile fired by a turret aiming at `theta`.
///
/// Turret barrels point along `theta + π`, which becomes the direction of travel.
#[must_use]
pub fn make_projectile(
    kind: EntityKind,
    cell: CellCoord,
    owner: PlayerId,
    theta: f64,
    velocity: Option<f64>,
    target: Option<EntityId>,
) -> Entity {
    let mut entity = make(kind, cell, owner);
    let heading = theta + std::f64::consts::PI;
    entity.set_theta(heading);
    if let Some(ballistic) = entity.ballistic.as_mut() {
        ballistic.initial_theta = heading;
        ballistic.target = target;
        if let Some(velocity) = velocity {
            ballistic.velocity = velocity;
        }
    }
    entity
}

/// Replaces the component state of an entity with the defaults of its kind.
///
/// Existing state that the new kind also uses is kept.
pub(crate) fn attach_components(entity: &mut Entity, blueprint: &Blueprint) {
    let position = entity.position();
    entity.agent = blueprint.agent.and_then(|profile| {
        entity.agent.take().or_else(|| {
            profile.tasks.first().map(|weights| AgentState {
                task: weights.task,
                prev_position: position,
                time_on_task: std::time::Duration::ZERO,
            })
        })
    });
    entity.turret = blueprint
        .turret
        .map(|_| entity.turret.take().unwrap_or_default());
    entity.ballistic = blueprint.ballistic.map(|profile| {
        entity.ballistic.take().unwrap_or_else(|| BallisticState {
            age: std::time::Duration::ZERO,
            origin: DVec2::new(f64::from(position.column()), f64::from(position.row())),
            initial_theta: FRAC_PI_2,
            velocity: profile.velocity,
            target: None,
        })
    });
    entity.emitter = blueprint.emitter.map(|profile| EmitterState {
        kind: profile.kind,
        quantity: if profile.active { profile.quantity } else { 0.0 },
        refresh_interval: profile.refresh_interval,
    });
    entity.flammable = blueprint.flammable.map(|profile| {
        entity.flammable.take().unwrap_or(FlammableState {
            on_fire: false,
            fuel: profile.fuel,
        })
    });
    entity.explosive = blueprint.explosive.map(|profile| {
        entity.explosive.take().unwrap_or(ExplosiveState {
            age: std::time::Duration::ZERO,
            timer: profile.timer,
        })
    });
    entity.generator = blueprint
        .generator
        .map(|_| entity.generator.take().unwrap_or_default());
    entity.consumer = blueprint.power_consumed.map(|power_needed| ConsumerState {
        power_needed,
        powered: false,
    });
    entity.holder = blueprint
        .holder
        .map(|_| entity.holder.take().unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::Capability;

    #[test]
    fn coal_starts_cold_and_idle() {
        let coal = make(EntityKind::Coal, CellCoord::new(1, 1), PlayerId::new(0));
        assert_eq!(coal.emitter.as_ref().map(|e| e.quantity), Some(0.0));
        assert_eq!(coal.flammable.as_ref().map(|f| f.on_fire), Some(false));
        assert!(coal.capabilities().contains(Capability::Collectable));
    }

    #[test]
    fn projectiles_face_away_from_their_launch_angle() {
        let bullet = make_projectile(
            EntityKind::Bullet,
            CellCoord::new(4, 4),
            PlayerId::new(1),
            0.5,
            None,
            None,
        );
        let ballistic = bullet.ballistic.as_ref().expect("bullets fly");
        assert!((ballistic.initial_theta - (0.5 + std::f64::consts::PI)).abs() < 1e-12);
        assert_eq!(ballistic.velocity, 500.0);
        assert_eq!(bullet.theta(), ballistic.initial_theta);
    }

    #[test]
    fn turrets_start_pointing_straight_up() {
        let turret = make(EntityKind::BasicTurret, CellCoord::new(0, 0), PlayerId::new(1));
        assert_eq!(turret.theta(), FRAC_PI_2);
        assert!(turret.turret.is_some());
        assert!(turret.consumer.is_none());
    }

    #[test]
    fn agents_start_on_their_first_task() {
        let agent = make(EntityKind::Agent, CellCoord::new(3, 2), PlayerId::new(1));
        let state = agent.agent.as_ref().expect("agent state");
        assert_eq!(state.task, crate::blueprint::Task::Wander);
        assert_eq!(state.prev_position, CellCoord::new(3, 2));
    }
}
