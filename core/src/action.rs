//! Timed actions and the per-entity queue that orders them.

use std::{collections::VecDeque, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{CellCoord, EntityId, EntityKind};

/// Tag describing what an action does when its effect fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    /// Step into a neighbouring cell.
    Move,
    /// Rotate toward a heading, then step.
    MoveTurn,
    /// Rotate in place.
    Turn,
    /// Lift an entity into the holder.
    Pickup,
    /// Place the top held entity in front of the holder.
    Putdown,
    /// Launch a projectile.
    Shoot,
    /// Remove the entity from the world.
    Die,
    /// Occupy the queue without any effect.
    Cooldown,
}

/// Typed data carried by an action.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionPayload {
    /// Action needs no data.
    None,
    /// Destination of a move.
    Move {
        /// Upper-left cell the entity moves to.
        target: CellCoord,
    },
    /// Heading to rotate toward.
    Turn {
        /// Heading in radians.
        heading: f64,
    },
    /// Destination and heading of a turning move.
    MoveTurn {
        /// Upper-left cell the entity moves to.
        target: CellCoord,
        /// Heading in radians.
        heading: f64,
    },
    /// Entity to lift.
    Pickup {
        /// Entity that will be carried.
        entity: EntityId,
    },
    /// Aim and projectile of a shot.
    Shoot {
        /// Launch angle in radians.
        theta: f64,
        /// Kind of projectile to spawn.
        projectile: EntityKind,
    },
}

/// Duration and effect offset used when constructing an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTiming {
    /// Total duration of the action.
    pub duration: Duration,
    /// Elapsed time at which the effect fires.
    pub effect_offset: Duration,
}

impl ActionTiming {
    /// Timing whose effect fires as soon as the action reaches the head.
    #[must_use]
    pub const fn immediate(duration: Duration) -> Self {
        Self {
            duration,
            effect_offset: Duration::ZERO,
        }
    }

    /// Timing whose effect fires once the full duration has elapsed.
    #[must_use]
    pub const fn deferred(duration: Duration) -> Self {
        Self {
            duration,
            effect_offset: duration,
        }
    }
}

/// One timed step in an entity's state machine.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    kind: ActionKind,
    total: Duration,
    remaining: Duration,
    effect_offset: Duration,
    effect_fired: bool,
    payload: ActionPayload,
}

impl Action {
    /// Creates a fresh action with its full duration remaining.
    #[must_use]
    pub fn new(kind: ActionKind, timing: ActionTiming, payload: ActionPayload) -> Self {
        Self {
            kind,
            total: timing.duration,
            remaining: timing.duration,
            effect_offset: timing.effect_offset.min(timing.duration),
            effect_fired: false,
            payload,
        }
    }

    /// Kind of the action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Payload carried by the action.
    #[must_use]
    pub const fn payload(&self) -> ActionPayload {
        self.payload
    }

    /// Total duration fixed at construction.
    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    /// Duration still left before the action completes.
    #[must_use]
    pub const fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Offset into the action at which the effect fires.
    #[must_use]
    pub const fn effect_offset(&self) -> Duration {
        self.effect_offset
    }

    /// Time already spent on the action.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.total.saturating_sub(self.remaining)
    }

    /// Reports whether the effect has already fired.
    #[must_use]
    pub const fn effect_fired(&self) -> bool {
        self.effect_fired
    }

    /// Reports whether the effect is due and has not fired yet.
    #[must_use]
    pub fn effect_due(&self) -> bool {
        !self.effect_fired && self.elapsed() >= self.effect_offset
    }

    /// Marks the effect as fired. Returns `false` when it had already fired.
    pub fn mark_effect_fired(&mut self) -> bool {
        let first = !self.effect_fired;
        self.effect_fired = true;
        first
    }

    /// Reports whether the remaining duration has run out.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Consumes elapsed time, saturating at zero.
    pub fn advance(&mut self, dt: Duration) {
        self.remaining = self.remaining.saturating_sub(dt);
    }
}

/// Ordered queue of actions owned by one entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActionQueue {
    actions: VecDeque<Action>,
    previous: Option<ActionKind>,
}

impl ActionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action to the tail.
    pub fn enqueue(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    /// Pushes an action to the head, displacing the current one without firing it.
    pub fn preempt(&mut self, action: Action) {
        self.actions.push_front(action);
    }

    /// Drops the head action without firing its effect.
    pub fn cancel(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Removes the finished head action and remembers its kind.
    pub fn pop(&mut self) -> Option<Action> {
        let action = self.actions.pop_front()?;
        self.previous = Some(action.kind());
        Some(action)
    }

    /// Reports whether an action of the kind is queued, optionally only at the head.
    #[must_use]
    pub fn is_queued(&self, kind: ActionKind, head_only: bool) -> bool {
        if head_only {
            return self.head().map(Action::kind) == Some(kind);
        }
        self.actions.iter().any(|action| action.kind() == kind)
    }

    /// Action currently in progress.
    #[must_use]
    pub fn head(&self) -> Option<&Action> {
        self.actions.front()
    }

    /// Mutable access to the action currently in progress.
    pub fn head_mut(&mut self) -> Option<&mut Action> {
        self.actions.front_mut()
    }

    /// Kind of the most recently completed action.
    #[must_use]
    pub const fn previous(&self) -> Option<ActionKind> {
        self.previous
    }

    /// Number of queued actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Reports whether the queue holds no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drops every queued action.
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Iterates over the queued actions from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: ActionKind, millis: u64, offset: u64) -> Action {
        Action::new(
            kind,
            ActionTiming {
                duration: Duration::from_millis(millis),
                effect_offset: Duration::from_millis(offset),
            },
            ActionPayload::None,
        )
    }

    #[test]
    fn effect_is_due_once_offset_elapsed() {
        let mut move_action = action(ActionKind::Move, 100, 60);
        assert!(!move_action.effect_due());

        move_action.advance(Duration::from_millis(60));
        assert!(move_action.effect_due());
        assert!(move_action.mark_effect_fired());
        assert!(!move_action.effect_due());
        assert!(!move_action.mark_effect_fired());
    }

    #[test]
    fn advance_saturates_at_zero() {
        let mut cooldown = action(ActionKind::Cooldown, 10, 0);
        cooldown.advance(Duration::from_millis(25));
        assert_eq!(cooldown.remaining(), Duration::ZERO);
        assert!(cooldown.is_finished());
        assert_eq!(cooldown.elapsed(), Duration::from_millis(10));
    }

    #[test]
    fn preempt_displaces_head_without_dropping_it() {
        let mut queue = ActionQueue::new();
        queue.enqueue(action(ActionKind::Move, 100, 50));
        queue.preempt(action(ActionKind::Turn, 20, 20));

        assert!(queue.is_queued(ActionKind::Turn, true));
        assert!(queue.is_queued(ActionKind::Move, false));
        assert!(!queue.is_queued(ActionKind::Move, true));

        let cancelled = queue.cancel().expect("head present");
        assert_eq!(cancelled.kind(), ActionKind::Turn);
        assert_eq!(queue.previous(), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_records_previous_kind() {
        let mut queue = ActionQueue::new();
        queue.enqueue(action(ActionKind::Shoot, 0, 0));
        let _ = queue.pop();
        assert_eq!(queue.previous(), Some(ActionKind::Shoot));
        assert!(queue.is_empty());
    }

    #[test]
    fn effect_offset_never_exceeds_duration() {
        let clipped = action(ActionKind::Die, 30, 90);
        assert_eq!(clipped.effect_offset(), Duration::from_millis(30));
    }
}
