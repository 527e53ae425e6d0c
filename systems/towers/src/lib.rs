#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Turret targeting, aiming, and firing.

use std::f64::consts::FRAC_PI_2;

use glam::DVec2;
use rand::Rng;

use kiln_core::{ActionKind, ActionPayload, Capability, EntityId, PlayerId};
use kiln_world::{
    blueprint::{blueprint, TurretProfile},
    entity::TurretState,
    World,
};

/// Aim error below which a turret stops accelerating and settles.
pub const AIM_TOLERANCE: f64 = 0.01;

/// Aim angle a turret needs to face the target.
///
/// Targets level with or below the turret fall back to the lowest angle.
#[must_use]
pub fn bearing(tower: DVec2, target: DVec2, profile: &TurretProfile) -> f64 {
    if target.y >= tower.y {
        return profile.min_theta;
    }
    let raw = (tower.y - target.y).atan2(tower.x - target.x);
    (raw % FRAC_PI_2).clamp(profile.min_theta, profile.max_theta)
}

/// Steps the aim controller once and returns the new aim angle.
///
/// Accelerates toward `bearing`, braking once the stopping distance covers the
/// remaining error, and bleeds off motion inside the tolerance window. Hitting
/// either end of the arc stops the turret dead.
pub fn aim(theta: f64, bearing: f64, state: &mut TurretState, profile: &TurretProfile) -> f64 {
    let error = bearing - theta;
    if error.abs() <= AIM_TOLERANCE {
        state.theta_accel *= 0.5;
        state.theta_speed *= 0.5;
    } else {
        let direction = error.signum();
        let stopping = state.theta_speed * state.theta_speed / (2.0 * profile.theta_accel);
        state.theta_accel = if state.theta_speed * direction > 0.0 && stopping >= error.abs() {
            -direction * profile.theta_accel
        } else {
            direction * profile.theta_accel
        };
        state.theta_speed = (state.theta_speed + state.theta_accel)
            .clamp(-profile.max_theta_speed, profile.max_theta_speed);
    }

    let next = theta + state.theta_speed;
    let clamped = next.clamp(profile.min_theta, profile.max_theta);
    if clamped != next {
        state.theta_speed = 0.0;
        state.theta_accel = 0.0;
    }
    clamped
}

/// Runs every turret once per tick.
#[derive(Debug, Default)]
pub struct Towers {
    candidates: Vec<EntityId>,
}

impl Towers {
    /// Creates the system with an empty candidate buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retargets, aims, and fires every powered turret.
    pub fn run(&mut self, world: &mut World) {
        let paused = world.tuning().pause_power_consumption;
        for id in world.entities_with(Capability::Tower) {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            let Some(profile) = blueprint(entity.kind()).turret else {
                tracing::warn!(entity = id.get(), kind = ?entity.kind(), "tower without a turret profile");
                continue;
            };
            let Some(state) = entity.turret.clone() else {
                tracing::warn!(entity = id.get(), "tower without aim state");
                continue;
            };
            let unpowered = entity.consumer.as_ref().is_some_and(|c| !c.powered);
            if unpowered && !paused {
                continue;
            }
            let owner = entity.owner();
            let centre = entity.centre();
            let theta = entity.theta();

            let mut state = state;
            state.target = state.target.filter(|target| is_live(world, *target));
            if state.target.is_none() {
                state.target = self.pick_target(world, owner);
            }
            let Some(target) = state.target else {
                let theta = if profile.snaps {
                    profile.min_theta
                } else {
                    aim(theta, profile.min_theta, &mut state, &profile)
                };
                store(world, id, theta, state);
                continue;
            };
            let Some(target_centre) = world.entity(target).map(|e| e.centre()) else {
                continue;
            };

            let bearing = bearing(centre, target_centre, &profile);
            let theta = if profile.snaps {
                bearing
            } else {
                aim(theta, bearing, &mut state, &profile)
            };
            fire(world, id, owner, theta, &profile, &mut state);
            store(world, id, theta, state);
        }
    }

    fn pick_target(&mut self, world: &mut World, owner: PlayerId) -> Option<EntityId> {
        self.candidates.clear();
        for id in world.entities_with(Capability::Ballistic) {
            let opposing = world
                .entity(id)
                .is_some_and(|e| e.owner() != owner && e.carried_by().is_none());
            if opposing && is_live(world, id) {
                self.candidates.push(id);
            }
        }
        if self.candidates.is_empty() {
            return None;
        }
        let index = world.rng().gen_range(0..self.candidates.len());
        let target = self.candidates[index];
        tracing::trace!(target = target.get(), "turret acquired target");
        Some(target)
    }
}

fn is_live(world: &World, id: EntityId) -> bool {
    world
        .entity(id)
        .is_some_and(|e| !e.actions().is_queued(ActionKind::Die, false))
}

fn fire(
    world: &mut World,
    id: EntityId,
    owner: PlayerId,
    theta: f64,
    profile: &TurretProfile,
    state: &mut TurretState,
) {
    let busy = world.entity(id).map_or(true, |e| {
        e.actions().is_queued(ActionKind::Shoot, false)
            || e.actions().is_queued(ActionKind::Cooldown, false)
    });
    if busy {
        return;
    }
    if let Some(limit) = profile.shots_till_cooldown {
        if state.shots_since_cooldown >= limit {
            tracing::debug!(entity = id.get(), "turret cooling down");
            state.shots_since_cooldown = 0;
            let _ = world.enqueue(id, ActionKind::Cooldown, ActionPayload::None);
            return;
        }
    }
    if !world.ledger_mut(owner).try_spend(profile.launch_cost) {
        return;
    }
    let payload = ActionPayload::Shoot {
        theta,
        projectile: profile.projectile,
    };
    if world.enqueue(id, ActionKind::Shoot, payload) {
        state.shots_since_cooldown += 1;
    }
}

fn store(world: &mut World, id: EntityId, theta: f64, state: TurretState) {
    if let Some(entity) = world.entity_mut(id) {
        entity.set_theta(theta);
        entity.turret = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use std::{f64::consts::PI, time::Duration};

    use super::*;
    use kiln_core::{CellCoord, EntityKind, GridSize};
    use kiln_world::{factory::make_projectile, Tuning};

    const ARC: TurretProfile = TurretProfile {
        min_theta: 0.2,
        max_theta: PI - 0.2,
        theta_accel: 0.000_05,
        max_theta_speed: 0.04,
        snaps: false,
        projectile: EntityKind::Bullet,
        shots_till_cooldown: None,
        launch_cost: &[],
        launch_velocity: None,
    };

    fn world_with(tuning: Tuning) -> World {
        let mut world = World::inline(GridSize::new(16, 16), tuning, 21);
        world.begin_tick(Duration::from_millis(16));
        world
    }

    fn enemy_bullet(world: &mut World, cell: CellCoord) -> EntityId {
        let bullet = make_projectile(
            EntityKind::Bullet,
            cell,
            PlayerId::new(2),
            FRAC_PI_2,
            Some(0.0),
            None,
        );
        world.add(bullet).expect("bullet fits")
    }

    fn head(world: &World, id: EntityId) -> Option<ActionPayload> {
        world
            .entity(id)
            .and_then(|e| e.actions().head().map(|action| action.payload()))
    }

    #[test]
    fn aim_settles_inside_the_window_and_stays_there() {
        let mut state = TurretState::default();
        let mut theta = FRAC_PI_2;
        let mut settled = false;
        for _ in 0..2_000 {
            theta = aim(theta, 1.5, &mut state, &ARC);
            assert!((ARC.min_theta..=ARC.max_theta).contains(&theta));
            assert!(state.theta_speed.abs() <= ARC.max_theta_speed);
            let inside = (theta - 1.5).abs() <= AIM_TOLERANCE;
            assert!(inside || !settled, "left the window at {theta}");
            settled |= inside;
        }
        assert!(settled);
    }

    #[test]
    fn arc_limits_stop_the_turret() {
        let mut state = TurretState {
            theta_speed: -0.04,
            ..TurretState::default()
        };
        let theta = aim(0.21, 0.2, &mut state, &ARC);
        assert_eq!(theta, ARC.min_theta);
        assert_eq!(state.theta_speed, 0.0);
        assert_eq!(state.theta_accel, 0.0);
    }

    #[test]
    fn bearing_folds_and_clamps_into_the_arc() {
        let tower = DVec2::new(5.5, 8.5);
        let left = bearing(tower, DVec2::new(2.5, 5.5), &ARC);
        assert!((left - PI / 4.0).abs() < 1e-12);
        let right = bearing(tower, DVec2::new(8.5, 5.5), &ARC);
        assert!((right - PI / 4.0).abs() < 1e-12);
        assert_eq!(bearing(tower, DVec2::new(1.5, 8.5), &ARC), ARC.min_theta);
        assert_eq!(bearing(tower, DVec2::new(9.5, 12.5), &ARC), ARC.min_theta);
    }

    #[test]
    fn turrets_acquire_opposing_projectiles_and_shoot() {
        let mut world = world_with(Tuning::default());
        let turret = world
            .spawn(EntityKind::BasicTurret, CellCoord::new(8, 12), PlayerId::new(1))
            .expect("turret fits");
        let bullet = enemy_bullet(&mut world, CellCoord::new(4, 2));
        let friendly = make_projectile(
            EntityKind::Bullet,
            CellCoord::new(1, 1),
            PlayerId::new(1),
            0.0,
            Some(0.0),
            None,
        );
        let _ = world.add(friendly);

        Towers::new().run(&mut world);
        let entity = world.entity(turret).expect("alive");
        assert_eq!(entity.turret.as_ref().and_then(|t| t.target), Some(bullet));
        assert!(entity.theta() < FRAC_PI_2);
        assert!(matches!(
            head(&world, turret),
            Some(ActionPayload::Shoot {
                projectile: EntityKind::Bullet,
                ..
            })
        ));
    }

    #[test]
    fn idle_turrets_return_to_rest() {
        let mut world = world_with(Tuning::default());
        let turret = world
            .spawn(EntityKind::BasicTurret, CellCoord::new(8, 12), PlayerId::new(1))
            .expect("turret fits");
        if let Some(entity) = world.entity_mut(turret) {
            entity.set_theta(FRAC_PI_2);
        }
        let theta = |world: &World| world.entity(turret).map_or(f64::NAN, |e| e.theta());

        let mut towers = Towers::new();
        towers.run(&mut world);
        assert!(theta(&world) < FRAC_PI_2);

        for _ in 0..3_000 {
            towers.run(&mut world);
        }
        let min_theta = blueprint(EntityKind::BasicTurret)
            .turret
            .map_or(f64::NAN, |profile| profile.min_theta);
        assert!((theta(&world) - min_theta).abs() <= AIM_TOLERANCE);
        assert!(world.entity(turret).is_some_and(|e| e.actions().is_empty()));
    }

    #[test]
    fn dead_targets_are_dropped() {
        let mut world = world_with(Tuning::default());
        let turret = world
            .spawn(EntityKind::BasicTurret, CellCoord::new(8, 12), PlayerId::new(1))
            .expect("turret fits");
        let bullet = enemy_bullet(&mut world, CellCoord::new(4, 2));
        let mut towers = Towers::new();
        towers.run(&mut world);
        assert!(world.enqueue(bullet, ActionKind::Die, ActionPayload::None));
        let _ = world.queue_mut(turret).map(|queue| queue.clear());

        towers.run(&mut world);
        let entity = world.entity(turret).expect("alive");
        assert_eq!(entity.turret.as_ref().and_then(|t| t.target), None);
        assert!(entity.actions().is_empty());
    }

    #[test]
    fn missile_turrets_snap_and_pay_for_each_launch() {
        let mut world = world_with(Tuning::default());
        let owner = PlayerId::new(1);
        let turret = world
            .spawn(EntityKind::MissileTurret, CellCoord::new(8, 12), owner)
            .expect("turret fits");
        let bullet = enemy_bullet(&mut world, CellCoord::new(5, 3));
        let profile = blueprint(EntityKind::MissileTurret).turret.expect("turret profile");
        let expected = bearing(
            world.entity(turret).expect("alive").centre(),
            world.entity(bullet).expect("alive").centre(),
            &profile,
        );

        let mut towers = Towers::new();
        towers.run(&mut world);
        let entity = world.entity(turret).expect("alive");
        assert_eq!(entity.theta(), expected);
        assert!((entity.theta() - FRAC_PI_2).abs() > 0.1);
        assert!(entity.actions().is_empty());

        for kind in [EntityKind::Iron, EntityKind::Coal, EntityKind::Sulphur] {
            world.ledger_mut(owner).credit(kind, 0.15);
        }
        towers.run(&mut world);
        assert!(matches!(
            head(&world, turret),
            Some(ActionPayload::Shoot {
                projectile: EntityKind::Missile,
                ..
            })
        ));
        let ledger = world.ledger(owner).expect("ledger");
        assert!((ledger.resource(EntityKind::Iron) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn unpowered_turrets_idle_unless_consumption_is_paused() {
        let mut world = world_with(Tuning::default());
        let turret = world
            .spawn(EntityKind::FastTurret, CellCoord::new(8, 12), PlayerId::new(1))
            .expect("turret fits");
        let _ = enemy_bullet(&mut world, CellCoord::new(4, 2));
        Towers::new().run(&mut world);
        assert!(world.entity(turret).is_some_and(|e| e.actions().is_empty()));

        let mut world = world_with(Tuning {
            pause_power_consumption: true,
            ..Tuning::default()
        });
        let turret = world
            .spawn(EntityKind::FastTurret, CellCoord::new(8, 12), PlayerId::new(1))
            .expect("turret fits");
        let _ = enemy_bullet(&mut world, CellCoord::new(4, 2));
        Towers::new().run(&mut world);
        assert!(world.entity(turret).is_some_and(|e| !e.actions().is_empty()));
    }

    #[test]
    fn overheated_turrets_cool_down() {
        let mut world = world_with(Tuning::default());
        let turret = world
            .spawn(EntityKind::FastTurret, CellCoord::new(8, 12), PlayerId::new(1))
            .expect("turret fits");
        let _ = enemy_bullet(&mut world, CellCoord::new(4, 2));
        if let Some(entity) = world.entity_mut(turret) {
            if let Some(consumer) = entity.consumer.as_mut() {
                consumer.powered = true;
            }
            if let Some(state) = entity.turret.as_mut() {
                state.shots_since_cooldown = 20;
            }
        }

        Towers::new().run(&mut world);
        let entity = world.entity(turret).expect("alive");
        assert!(entity.actions().is_queued(ActionKind::Cooldown, true));
        assert_eq!(entity.turret.as_ref().map(|t| t.shots_since_cooldown), Some(0));
    }
}
