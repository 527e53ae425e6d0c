//! Side effects executed when an action reaches its effect offset.

use std::f64::consts::{FRAC_PI_2, PI};

use glam::DVec2;

use kiln_core::{
    Action, ActionKind, ActionPayload, Capability, CellCoord, CellRect, CellRectSize, EntityId,
    EntityKind, Event, FieldCommand, MoveError, SubstanceKind,
};
use kiln_world::{blueprint::blueprint, factory, World};

const FACING_EPSILON: f64 = 1e-6;
const AGENT_TURN_LIMIT: f64 = FRAC_PI_2 + 0.1;

pub(crate) fn execute(world: &mut World, id: EntityId, action: &Action) {
    match (action.kind(), action.payload()) {
        (ActionKind::Move, ActionPayload::Move { target }) => move_effect(world, id, target),
        (ActionKind::MoveTurn, ActionPayload::MoveTurn { target, heading }) => {
            turn_effect(world, id, heading);
            move_effect(world, id, target);
        }
        (ActionKind::Turn, ActionPayload::Turn { heading }) => turn_effect(world, id, heading),
        (ActionKind::Pickup, ActionPayload::Pickup { entity }) => {
            if !world.carry(id, entity) {
                tracing::trace!(holder = id.get(), item = entity.get(), "pickup refused");
            }
        }
        (ActionKind::Putdown, _) => put_down_effect(world, id),
        (ActionKind::Shoot, ActionPayload::Shoot { theta, projectile }) => {
            shoot_effect(world, id, theta, projectile);
        }
        (ActionKind::Die, _) => die_effect(world, id),
        (ActionKind::Cooldown, _) => {}
        (kind, payload) => {
            tracing::warn!(entity = id.get(), ?kind, ?payload, "action payload mismatch");
        }
    }
}

/// Angle of travel from one cell to another, in column/row space.
fn heading_between(from: CellCoord, to: CellCoord) -> f64 {
    let (columns, rows) = from.delta_to(to);
    (rows as f64).atan2(columns as f64)
}

/// Smallest absolute difference between two angles.
fn angle_between(a: f64, b: f64) -> f64 {
    let difference = (a - b).rem_euclid(2.0 * PI);
    difference.min(2.0 * PI - difference)
}

fn move_effect(world: &mut World, id: EntityId, target: CellCoord) {
    let Some(entity) = world.entity(id) else {
        return;
    };
    let heading = heading_between(entity.position(), target);
    let turn = angle_between(entity.theta(), heading);
    let facing = turn < FACING_EPSILON;
    let steers_itself = entity.capabilities().contains(Capability::Agent)
        && world.controlled() != Some(id);

    match world.check_move(id, target) {
        Err(MoveError::OutOfBounds { .. } | MoveError::SegmentedDiagonal { .. }) => {
            let _ = world.queue_mut(id).and_then(|queue| queue.cancel());
        }
        Err(MoveError::Blocked { .. }) => {
            let _ = world.queue_mut(id).and_then(|queue| queue.cancel());
            if !facing {
                preempt_and_fire(world, id, ActionKind::Turn, ActionPayload::Turn { heading });
            }
        }
        Ok(()) if !facing => {
            let _ = world.queue_mut(id).and_then(|queue| queue.cancel());
            if steers_itself && turn <= AGENT_TURN_LIMIT {
                preempt_and_fire(
                    world,
                    id,
                    ActionKind::MoveTurn,
                    ActionPayload::MoveTurn { target, heading },
                );
            } else {
                preempt_and_fire(world, id, ActionKind::Turn, ActionPayload::Turn { heading });
            }
        }
        Ok(()) => {
            if let Err(error) = world.move_to(id, target) {
                tracing::trace!(entity = id.get(), %error, "move rejected");
            }
        }
    }
}

fn preempt_and_fire(world: &mut World, id: EntityId, kind: ActionKind, payload: ActionPayload) {
    if !world.preempt(id, kind, payload) {
        return;
    }
    let action = world.queue_mut(id).and_then(|queue| queue.head_mut()).map(|head| {
        let _ = head.mark_effect_fired();
        head.clone()
    });
    if let Some(action) = action {
        execute(world, id, &action);
    }
}

fn turn_effect(world: &mut World, id: EntityId, heading: f64) {
    if let Some(entity) = world.entity_mut(id) {
        entity.set_theta(heading);
    }
}

/// Cell directly in front of the holder for an item of the given size.
fn front_cell(world: &World, id: EntityId, item: EntityId) -> Option<CellCoord> {
    let holder = world.entity(id)?;
    let item = world.entity(item)?;
    let direction = DVec2::new(holder.theta().cos(), holder.theta().sin()).round();
    let reach = DVec2::new(
        f64::from(holder.size().width() + item.size().width()) / 2.0,
        f64::from(holder.size().height() + item.size().height()) / 2.0,
    );
    let half_item = DVec2::new(
        f64::from(item.size().width()),
        f64::from(item.size().height()),
    ) / 2.0;
    let origin = (holder.centre() + direction * reach - half_item).round();
    if origin.x < 0.0 || origin.y < 0.0 {
        return None;
    }
    Some(CellCoord::new(origin.x as u32, origin.y as u32))
}

fn put_down_effect(world: &mut World, id: EntityId) {
    let Some(item) = world
        .entity(id)
        .and_then(|entity| entity.holder.as_ref())
        .and_then(|holder| holder.held.last().copied())
    else {
        return;
    };
    let Some(cell) = front_cell(world, id, item) else {
        return;
    };
    let Some(size) = world.entity(item).map(|entity| entity.size()) else {
        return;
    };
    let footprint = CellRect::from_origin_and_size(cell, size);
    if !world.size().contains_rect(&footprint) || !world.entities_in(&footprint).is_empty() {
        tracing::trace!(holder = id.get(), "no room to put down");
        return;
    }
    let _ = world.put_down(id, item, cell);
}

fn shoot_effect(world: &mut World, id: EntityId, theta: f64, projectile: EntityKind) {
    let Some(tower) = world.entity(id) else {
        return;
    };
    let owner = tower.owner();
    let target = tower.turret.as_ref().and_then(|turret| turret.target);
    let profile = blueprint(tower.kind()).turret;
    let distance = if projectile == EntityKind::Missile { 4.0 } else { 2.0 };
    let spawn = (tower.centre() - distance * DVec2::new(theta.cos(), theta.sin())).round();
    if spawn.x < 0.0 || spawn.y < 0.0 {
        return;
    }
    let cell = CellCoord::new(spawn.x as u32, spawn.y as u32);
    let homing = if projectile == EntityKind::Missile { target } else { None };
    let entity = factory::make_projectile(
        projectile,
        cell,
        owner,
        theta,
        profile.and_then(|profile| profile.launch_velocity),
        homing,
    );
    let Some(fired) = world.add(entity) else {
        return;
    };
    if projectile == EntityKind::Missile {
        if let Some(warhead) = world.spawn(EntityKind::Dynamite, cell, owner) {
            if !world.carry(fired, warhead) {
                let _ = world.remove(warhead);
            }
        }
    }
    world.emit(Event::ProjectileFired {
        tower: id,
        projectile: fired,
    });
}

fn die_effect(world: &mut World, id: EntityId) {
    let Some(entity) = world.entity(id) else {
        return;
    };
    let position = entity.position();
    let explosive = entity.capabilities().contains(Capability::Explosive);
    let held = entity
        .holder
        .as_ref()
        .map(|holder| holder.held.clone())
        .unwrap_or_default();
    let ballistic = entity.capabilities().contains(Capability::Ballistic);

    if explosive {
        explode(world, id);
    }
    for item in held {
        if !world.put_down(id, item, position) {
            continue;
        }
        let warhead = ballistic
            && world
                .entity(item)
                .is_some_and(|item| item.capabilities().contains(Capability::Explosive));
        if warhead {
            explode(world, item);
            let _ = world.remove(item);
        }
    }
    let _ = world.remove(id);
}

/// Detonates an explosive: damages everything in its blast square and deposits heat.
pub fn explode(world: &mut World, id: EntityId) {
    let Some(entity) = world.entity(id) else {
        return;
    };
    let Some(profile) = blueprint(entity.kind()).explosive else {
        tracing::warn!(entity = id.get(), kind = ?entity.kind(), "explosive without blast profile");
        return;
    };
    let centre = entity.centre().floor();
    let radius = f64::from(profile.radius);
    let size = world.size();
    let left = (centre.x - radius).max(0.0) as u32;
    let top = (centre.y - radius).max(0.0) as u32;
    let right = ((centre.x + radius) as u32).min(size.columns().saturating_sub(1));
    let bottom = ((centre.y + radius) as u32).min(size.rows().saturating_sub(1));
    if right < left || bottom < top {
        return;
    }
    let blast = CellRect::from_origin_and_size(
        CellCoord::new(left, top),
        CellRectSize::new(right - left + 1, bottom - top + 1),
    );
    let cell = CellCoord::new(centre.x as u32, centre.y as u32);
    tracing::debug!(entity = id.get(), ?cell, "explosion");

    for victim in world.entities_in(&blast) {
        if victim != id {
            let _ = world.damage(victim, profile.damage);
        }
    }
    for cell in blast.cells() {
        world.send_field(FieldCommand::Deposit {
            cell,
            kind: SubstanceKind::Heat,
            quantity: profile.heat,
        });
    }
    world.emit(Event::Exploded { entity: id, cell });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use kiln_core::{GridSize, PlayerId, GAIA};
    use kiln_world::Tuning;

    fn world() -> World {
        let mut world = World::inline(GridSize::new(10, 10), Tuning::default(), 5);
        world.begin_tick(Duration::from_millis(16));
        world
    }

    fn run_head(world: &mut World, id: EntityId) {
        let action = world
            .queue_mut(id)
            .and_then(|queue| queue.head_mut())
            .map(|head| {
                let _ = head.mark_effect_fired();
                head.clone()
            })
            .expect("queued action");
        execute(world, id, &action);
    }

    #[test]
    fn agents_turn_while_moving_toward_a_new_heading() {
        let mut world = world();
        let agent = world
            .spawn(EntityKind::Agent, CellCoord::new(4, 4), PlayerId::new(1))
            .expect("agent fits");
        assert!(world.enqueue(
            agent,
            ActionKind::Move,
            ActionPayload::Move {
                target: CellCoord::new(4, 5)
            }
        ));
        run_head(&mut world, agent);

        let entity = world.entity(agent).expect("alive");
        assert_eq!(entity.position(), CellCoord::new(4, 5));
        assert!((entity.theta() - FRAC_PI_2).abs() < 1e-12);
        assert!(entity.actions().is_queued(ActionKind::MoveTurn, true));
    }

    #[test]
    fn controlled_entities_turn_in_place() {
        let mut world = world();
        let truck = world
            .spawn(EntityKind::Truck, CellCoord::new(4, 4), PlayerId::new(1))
            .expect("truck fits");
        let mut events = Vec::new();
        kiln_world::apply(
            &mut world,
            kiln_core::Command::SetControlledEntity {
                entity: Some(truck),
            },
            &mut events,
        );
        assert!(world.enqueue(
            truck,
            ActionKind::Move,
            ActionPayload::Move {
                target: CellCoord::new(3, 4)
            }
        ));
        run_head(&mut world, truck);

        let entity = world.entity(truck).expect("alive");
        assert_eq!(entity.position(), CellCoord::new(4, 4));
        assert!((entity.theta() - PI).abs() < 1e-12);
        assert!(entity.actions().is_queued(ActionKind::Turn, true));
    }

    #[test]
    fn blocked_moves_are_cancelled() {
        let mut world = world();
        let agent = world
            .spawn(EntityKind::Agent, CellCoord::new(4, 4), PlayerId::new(1))
            .expect("agent fits");
        let _ = world.spawn(EntityKind::Stone, CellCoord::new(5, 4), GAIA);
        assert!(world.enqueue(
            agent,
            ActionKind::Move,
            ActionPayload::Move {
                target: CellCoord::new(5, 4)
            }
        ));
        run_head(&mut world, agent);

        let entity = world.entity(agent).expect("alive");
        assert_eq!(entity.position(), CellCoord::new(4, 4));
        assert!(entity.actions().is_empty());
    }

    #[test]
    fn pickup_then_put_down_in_front() {
        let mut world = world();
        let truck = world
            .spawn(EntityKind::Truck, CellCoord::new(2, 2), PlayerId::new(1))
            .expect("truck fits");
        let dirt = world
            .spawn(EntityKind::Dirt, CellCoord::new(5, 3), GAIA)
            .expect("dirt fits");

        assert!(world.enqueue(truck, ActionKind::Pickup, ActionPayload::Pickup { entity: dirt }));
        run_head(&mut world, truck);
        assert_eq!(world.entity(dirt).and_then(|e| e.carried_by()), Some(truck));

        let _ = world.queue_mut(truck).and_then(|queue| queue.cancel());
        assert!(world.enqueue(truck, ActionKind::Putdown, ActionPayload::None));
        run_head(&mut world, truck);
        let dirt = world.entity(dirt).expect("dirt survives");
        assert_eq!(dirt.carried_by(), None);
        assert_eq!(dirt.position(), CellCoord::new(5, 3));
    }

    #[test]
    fn shooting_spawns_the_projectile_along_the_barrel() {
        let mut world = world();
        let turret = world
            .spawn(EntityKind::BasicTurret, CellCoord::new(5, 8), PlayerId::new(1))
            .expect("turret fits");
        assert!(world.enqueue(
            turret,
            ActionKind::Shoot,
            ActionPayload::Shoot {
                theta: FRAC_PI_2,
                projectile: EntityKind::Bullet,
            }
        ));
        run_head(&mut world, turret);

        let bullets = world.entities_with(Capability::Ballistic);
        assert_eq!(bullets.len(), 1);
        let bullet = world.entity(bullets[0]).expect("bullet alive");
        assert_eq!(bullet.position(), CellCoord::new(6, 7));
        assert!((bullet.theta() - (FRAC_PI_2 + PI)).abs() < 1e-12);
    }

    #[test]
    fn missiles_carry_a_warhead_that_detonates_on_death() {
        let mut world = world();
        let turret = world
            .spawn(EntityKind::MissileTurret, CellCoord::new(3, 6), PlayerId::new(1))
            .expect("turret fits");
        assert!(world.enqueue(
            turret,
            ActionKind::Shoot,
            ActionPayload::Shoot {
                theta: FRAC_PI_2,
                projectile: EntityKind::Missile,
            }
        ));
        run_head(&mut world, turret);

        let missile = world.entities_with(Capability::Ballistic)[0];
        let warhead = world
            .entity(missile)
            .and_then(|e| e.holder.as_ref())
            .and_then(|holder| holder.held.first().copied())
            .expect("warhead loaded");
        let victim = world
            .spawn(EntityKind::Dirt, CellCoord::new(6, 2), GAIA)
            .expect("dirt fits");

        die_effect(&mut world, missile);
        assert!(world.entity(missile).is_none());
        assert!(world.entity(warhead).is_none());
        assert!(world
            .entity(victim)
            .is_some_and(|dirt| dirt.actions().is_queued(ActionKind::Die, false)));
    }
}
