#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Substance-driven movement policy for agents and key steering for the
//! controlled entity.

use std::f64::consts::PI;

use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};

use kiln_core::{ActionKind, ActionPayload, Capability, CellCoord, EntityId, HeldKeys};
use kiln_world::{
    blueprint::{blueprint, Task, TaskWeights},
    World,
};

const FACING_EPSILON: f64 = 1e-6;

/// Chooses the next move of every idle agent.
#[derive(Debug, Default)]
pub struct Agents {
    candidates: Vec<CellCoord>,
    scores: Vec<f64>,
}

impl Agents {
    /// Creates the system with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances task bookkeeping and queues a move for every idle agent.
    pub fn run(&mut self, world: &mut World) {
        let dt = world.dt();
        for id in world.entities_with(Capability::Agent) {
            if world.controlled() == Some(id) {
                continue;
            }
            let Some(entity) = world.entity_mut(id) else {
                continue;
            };
            let carrying = entity
                .holder
                .as_ref()
                .is_some_and(|holder| !holder.held.is_empty());
            let kind = entity.kind();
            let Some(state) = entity.agent.as_mut() else {
                continue;
            };
            state.time_on_task += dt;
            let current = state.task;

            let Some(profile) = blueprint(kind).agent else {
                tracing::warn!(entity = id.get(), ?kind, "agent state without a profile");
                continue;
            };
            let next = if carrying && profile.task(Task::Return).is_some() {
                Task::Return
            } else if !carrying && current == Task::Return {
                profile.tasks.first().map_or(current, |weights| weights.task)
            } else {
                current
            };
            let _ = switch_task(world, id, next);

            if world.entity(id).is_some_and(|e| e.actions().is_empty()) {
                self.decide(world, id);
            }
        }
    }

    /// Queues a scored random move for an idle agent.
    ///
    /// Does nothing for the controlled entity, busy agents, and agents whose
    /// kind defines no weights for their task. An agent with no legal move
    /// forgets its previous cell.
    pub fn decide(&mut self, world: &mut World, id: EntityId) {
        if world.controlled() == Some(id) {
            return;
        }
        let Some(entity) = world.entity(id) else {
            return;
        };
        if !entity.capabilities().contains(Capability::Agent) || !entity.actions().is_empty() {
            return;
        }
        let Some(state) = entity.agent.as_ref() else {
            return;
        };
        let Some(weights) = blueprint(entity.kind())
            .agent
            .and_then(|profile| profile.task(state.task).copied())
        else {
            return;
        };
        let current = entity.position();
        let previous = state.prev_position;

        self.candidates.clear();
        self.candidates.extend(
            world
                .size()
                .neighbors(current)
                .filter(|cell| world.check_move(id, *cell).is_ok()),
        );
        if self.candidates.is_empty() {
            if let Some(state) = world.entity_mut(id).and_then(|e| e.agent.as_mut()) {
                state.prev_position = current;
            }
            return;
        }

        self.scores.clear();
        self.scores.extend(self.candidates.iter().map(|candidate| {
            score(&weights, current, previous, *candidate, |cell, kind| {
                world.substance(cell, kind)
            })
        }));
        let Some(choice) = pick(&mut self.scores, world.rng()) else {
            return;
        };
        let target = self.candidates[choice];
        tracing::trace!(entity = id.get(), ?target, "agent chose move");
        let _ = world.enqueue(id, ActionKind::Move, ActionPayload::Move { target });
    }

    /// Turns held movement keys into actions for the controlled entity.
    pub fn steer(&mut self, world: &mut World) {
        let keys = world.held_keys();
        if !keys.any() {
            return;
        }
        let Some(id) = world.controlled() else {
            return;
        };
        let Some(entity) = world.entity(id) else {
            return;
        };
        let queue = entity.actions();
        if queue.is_queued(ActionKind::Move, true)
            || queue.is_queued(ActionKind::MoveTurn, true)
            || queue.is_queued(ActionKind::Turn, false)
        {
            return;
        }
        let Some((columns, rows)) = key_direction(keys) else {
            return;
        };
        let heading = (rows as f64).atan2(columns as f64);
        let facing = angle_between(entity.theta(), heading) < FACING_EPSILON;
        let target = entity.position().offset(columns, rows);

        let _ = match target {
            Some(target) if facing => {
                world.enqueue(id, ActionKind::Move, ActionPayload::Move { target })
            }
            Some(target) if world.held_ticks() > 1 => world.enqueue(
                id,
                ActionKind::MoveTurn,
                ActionPayload::MoveTurn { target, heading },
            ),
            _ if !facing => world.enqueue(id, ActionKind::Turn, ActionPayload::Turn { heading }),
            _ => false,
        };
    }
}

/// Moves an agent to another task, returning whether anything changed.
///
/// Leaving a task gives one unit back to the owner's need counter for it, and
/// the new task consumes one unit of its own counter.
pub fn switch_task(world: &mut World, id: EntityId, task: Task) -> bool {
    let Some(entity) = world.entity_mut(id) else {
        return false;
    };
    let owner = entity.owner();
    let Some(state) = entity.agent.as_mut() else {
        return false;
    };
    if state.task == task {
        return false;
    }
    let previous = std::mem::replace(&mut state.task, task);
    state.time_on_task = std::time::Duration::ZERO;
    tracing::debug!(entity = id.get(), ?previous, ?task, "agent switched task");

    let ledger = world.ledger_mut(owner);
    ledger.adjust_task_need(previous, 1);
    ledger.adjust_task_need(task, -1);
    true
}

/// Scores moving from `current` to `candidate`.
///
/// `quantity` reads a substance in a cell. The result is floored at the task's
/// base score and rounded up.
pub fn score<Q>(
    weights: &TaskWeights,
    current: CellCoord,
    previous: CellCoord,
    candidate: CellCoord,
    quantity: Q,
) -> f64
where
    Q: Fn(CellCoord, kiln_core::SubstanceKind) -> f64,
{
    let mut score = weights.base;
    for (kind, weight) in weights.substances {
        score += (quantity(candidate, *kind) - quantity(current, *kind)) * weight;
    }
    if candidate == previous {
        score += weights.prev_position_penalty;
    }
    if previous != current && current.delta_to(candidate) == previous.delta_to(current) {
        score += weights.forward_movement_bonus;
    }
    score.max(weights.base).ceil()
}

/// Draws an index with probability proportional to its score.
///
/// All-zero scores are treated as equal; negative scores never win unless
/// every score is non-positive, in which case the draw is uniform.
pub fn pick<R: Rng>(scores: &mut [f64], rng: &mut R) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    if scores.iter().all(|score| *score == 0.0) {
        scores.iter_mut().for_each(|score| *score = 1.0);
    }
    let weights = scores.iter().map(|score| score.max(0.0));
    match WeightedIndex::new(weights) {
        Ok(distribution) => Some(distribution.sample(rng)),
        Err(_) => Some(rng.gen_range(0..scores.len())),
    }
}

fn key_direction(keys: HeldKeys) -> Option<(i64, i64)> {
    let columns = i64::from(keys.right) - i64::from(keys.left);
    let rows = i64::from(keys.up) - i64::from(keys.down);
    (columns != 0 || rows != 0).then_some((columns, rows))
}

fn angle_between(a: f64, b: f64) -> f64 {
    let difference = (a - b).rem_euclid(2.0 * PI);
    difference.min(2.0 * PI - difference)
}

#[cfg(test)]
mod tests {
    use std::{f64::consts::FRAC_PI_2, time::Duration};

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use kiln_core::{Command, EntityKind, GridSize, PlayerId, SubstanceKind, GAIA};
    use kiln_world::Tuning;

    fn world(columns: u32, rows: u32) -> World {
        let mut world = World::inline(GridSize::new(columns, rows), Tuning::default(), 11);
        world.begin_tick(Duration::from_millis(16));
        world
    }

    const COLONY_SEEKER: TaskWeights = TaskWeights {
        task: Task::Return,
        base: 0.0,
        prev_position_penalty: 0.0,
        forward_movement_bonus: 0.0,
        substances: &[(SubstanceKind::Colony, 2.0)],
    };

    #[test]
    fn colony_gradient_decides_the_draw() {
        let current = CellCoord::new(1, 1);
        let neighbours = [
            CellCoord::new(1, 0),
            CellCoord::new(0, 1),
            CellCoord::new(2, 1),
            CellCoord::new(1, 2),
        ];
        let colony = |cell: CellCoord, _kind: SubstanceKind| {
            if cell == neighbours[0] {
                10.0
            } else {
                5.0
            }
        };
        let mut scores: Vec<f64> = neighbours
            .iter()
            .map(|candidate| score(&COLONY_SEEKER, current, current, *candidate, colony))
            .collect();
        assert_eq!(scores, vec![10.0, 0.0, 0.0, 0.0]);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(pick(&mut scores, &mut rng), Some(0));
        }
    }

    #[test]
    fn straight_lines_and_backtracking_adjust_the_score() {
        let weights = TaskWeights {
            task: Task::Explore,
            base: 1.0,
            prev_position_penalty: -5.0,
            forward_movement_bonus: 1.0,
            substances: &[],
        };
        let previous = CellCoord::new(1, 2);
        let current = CellCoord::new(2, 2);
        let flat = |_: CellCoord, _: SubstanceKind| 0.0;
        assert_eq!(score(&weights, current, previous, CellCoord::new(3, 2), flat), 2.0);
        assert_eq!(score(&weights, current, previous, previous, flat), 1.0);
        assert_eq!(score(&weights, current, previous, CellCoord::new(2, 3), flat), 1.0);
    }

    #[test]
    fn all_zero_scores_become_uniform() {
        let mut scores = vec![0.0, 0.0, 0.0];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut seen = [false; 3];
        for _ in 0..200 {
            if let Some(index) = pick(&mut scores, &mut rng) {
                seen[index] = true;
            }
        }
        assert_eq!(scores, vec![1.0, 1.0, 1.0]);
        assert!(seen.iter().all(|hit| *hit));
    }

    #[test]
    fn negative_scores_fall_back_to_uniform() {
        let mut scores = vec![-3.0, -1.0];
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert!(pick(&mut scores, &mut rng).is_some_and(|index| index < 2));
        assert_eq!(pick(&mut [], &mut rng), None);
    }

    #[test]
    fn idle_agents_queue_a_single_move() {
        let mut world = world(6, 6);
        let agent = world
            .spawn(EntityKind::Agent, CellCoord::new(2, 2), PlayerId::new(1))
            .expect("agent fits");
        let mut agents = Agents::new();
        agents.run(&mut world);

        let entity = world.entity(agent).expect("alive");
        assert_eq!(entity.actions().len(), 1);
        let head = entity.actions().head().expect("move queued");
        let ActionPayload::Move { target } = head.payload() else {
            panic!("expected a move, got {:?}", head.payload());
        };
        let (columns, rows) = CellCoord::new(2, 2).delta_to(target);
        assert!(columns.abs() <= 1 && rows.abs() <= 1);
        assert_ne!(target, CellCoord::new(2, 2));
    }

    #[test]
    fn boxed_in_agents_forget_their_previous_cell() {
        let mut world = world(3, 3);
        for row in 0..3 {
            for column in 0..3 {
                if (column, row) != (1, 1) {
                    let _ = world.spawn(EntityKind::Stone, CellCoord::new(column, row), GAIA);
                }
            }
        }
        let agent = world
            .spawn(EntityKind::Agent, CellCoord::new(1, 1), PlayerId::new(1))
            .expect("agent fits");
        if let Some(state) = world.entity_mut(agent).and_then(|e| e.agent.as_mut()) {
            state.prev_position = CellCoord::new(0, 0);
        }

        Agents::new().decide(&mut world, agent);
        let entity = world.entity(agent).expect("alive");
        assert!(entity.actions().is_empty());
        assert_eq!(
            entity.agent.as_ref().map(|state| state.prev_position),
            Some(CellCoord::new(1, 1))
        );
    }

    #[test]
    fn switching_tasks_moves_need_between_counters() {
        let mut world = world(4, 4);
        let owner = PlayerId::new(1);
        let agent = world
            .spawn(EntityKind::Agent, CellCoord::new(0, 0), owner)
            .expect("agent fits");
        world.ledger_mut(owner).set_task_need(Task::Wander, 0);
        world.ledger_mut(owner).set_task_need(Task::Explore, 3);

        assert!(!switch_task(&mut world, agent, Task::Wander));
        assert!(switch_task(&mut world, agent, Task::Explore));
        let ledger = world.ledger(owner).expect("ledger exists");
        assert_eq!(ledger.task_need(Task::Wander), Some(1));
        assert_eq!(ledger.task_need(Task::Explore), Some(2));
        assert_eq!(ledger.task_need(Task::Return), None);
    }

    #[test]
    fn carrying_agents_head_home() {
        let mut world = world(4, 4);
        let agent = world
            .spawn(EntityKind::Agent, CellCoord::new(0, 0), PlayerId::new(1))
            .expect("agent fits");
        let dirt = world
            .spawn(EntityKind::Dirt, CellCoord::new(3, 3), GAIA)
            .expect("dirt fits");
        assert!(world.carry(agent, dirt));

        Agents::new().run(&mut world);
        let task = world.entity(agent).and_then(|e| e.agent.as_ref().map(|s| s.task));
        assert_eq!(task, Some(Task::Return));
    }

    fn control(world: &mut World, id: EntityId, keys: HeldKeys) {
        let mut events = Vec::new();
        kiln_world::apply(world, Command::SetControlledEntity { entity: Some(id) }, &mut events);
        kiln_world::apply(world, Command::SetHeldKeys { keys }, &mut events);
    }

    #[test]
    fn steering_moves_when_already_facing() {
        let mut world = world(8, 8);
        let truck = world
            .spawn(EntityKind::Truck, CellCoord::new(2, 2), PlayerId::new(1))
            .expect("truck fits");
        control(&mut world, truck, HeldKeys { right: true, ..HeldKeys::default() });
        world.begin_tick(Duration::from_millis(16));

        Agents::new().steer(&mut world);
        let head = world.entity(truck).and_then(|e| e.actions().head().cloned());
        assert_eq!(
            head.map(|action| action.payload()),
            Some(ActionPayload::Move {
                target: CellCoord::new(3, 2)
            })
        );
    }

    #[test]
    fn steering_turns_first_then_turns_while_moving() {
        let mut world = world(8, 8);
        let truck = world
            .spawn(EntityKind::Truck, CellCoord::new(2, 2), PlayerId::new(1))
            .expect("truck fits");
        control(&mut world, truck, HeldKeys { up: true, ..HeldKeys::default() });
        world.begin_tick(Duration::from_millis(16));

        let mut agents = Agents::new();
        agents.steer(&mut world);
        let head = world.entity(truck).and_then(|e| e.actions().head().cloned());
        assert_eq!(
            head.map(|action| action.payload()),
            Some(ActionPayload::Turn { heading: FRAC_PI_2 })
        );

        let _ = world.queue_mut(truck).map(|queue| queue.clear());
        world.begin_tick(Duration::from_millis(16));
        agents.steer(&mut world);
        let head = world.entity(truck).and_then(|e| e.actions().head().cloned());
        assert_eq!(
            head.map(|action| action.payload()),
            Some(ActionPayload::MoveTurn {
                target: CellCoord::new(2, 3),
                heading: FRAC_PI_2,
            })
        );
    }

    #[test]
    fn steering_waits_for_queued_turns() {
        let mut world = world(8, 8);
        let truck = world
            .spawn(EntityKind::Truck, CellCoord::new(2, 2), PlayerId::new(1))
            .expect("truck fits");
        control(&mut world, truck, HeldKeys { up: true, ..HeldKeys::default() });
        world.begin_tick(Duration::from_millis(16));
        assert!(world.enqueue(truck, ActionKind::Cooldown, ActionPayload::None));
        assert!(world.enqueue(truck, ActionKind::Turn, ActionPayload::Turn { heading: 0.0 }));

        Agents::new().steer(&mut world);
        assert_eq!(world.entity(truck).map(|e| e.actions().len()), Some(2));
    }
}
