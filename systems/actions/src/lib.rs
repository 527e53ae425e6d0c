#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Steps every actor's action queue and executes due effects.

mod effects;

use std::collections::BTreeSet;

use kiln_core::{Action, Capability, EntityId};
use kiln_world::World;

pub use effects::explode;

/// Advances action queues once per tick.
#[derive(Debug, Default)]
pub struct Actions {
    visited: BTreeSet<EntityId>,
    drained: Vec<EntityId>,
}

impl Actions {
    /// Creates the system with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps every actor once.
    ///
    /// `decide` is invoked for an entity whose queue just emptied so it can
    /// enqueue its next action. Entities that become actors during the pass are
    /// stepped in the same pass; entities left idle lose the actor tag once the
    /// pass completes.
    pub fn run<D>(&mut self, world: &mut World, mut decide: D)
    where
        D: FnMut(&mut World, EntityId),
    {
        self.visited.clear();
        self.drained.clear();
        loop {
            let pending: Vec<EntityId> = world
                .entities_with(Capability::Actor)
                .into_iter()
                .filter(|id| !self.visited.contains(id))
                .collect();
            if pending.is_empty() {
                break;
            }
            for id in pending {
                let _ = self.visited.insert(id);
                self.step(world, id, &mut decide);
            }
        }
        for id in self.drained.drain(..) {
            let idle = world
                .entity(id)
                .is_some_and(|entity| entity.actions().is_empty());
            if idle {
                let _ = world.set_capability(id, Capability::Actor, false);
            }
        }
    }

    fn step<D>(&mut self, world: &mut World, id: EntityId, decide: &mut D)
    where
        D: FnMut(&mut World, EntityId),
    {
        let dt = world.dt();
        let Some(queue) = world.queue_mut(id) else {
            return;
        };
        let Some(head) = queue.head_mut() else {
            self.drained.push(id);
            return;
        };

        if head.effect_due() {
            let action = fire(head);
            effects::execute(world, id, &action);
        } else if head.is_finished() {
            let _ = queue.pop();
            if queue.is_empty() {
                decide(world, id);
            }
            let next = world
                .queue_mut(id)
                .and_then(|queue| queue.head_mut())
                .filter(|head| head.effect_offset().is_zero() && !head.effect_fired())
                .map(fire);
            if let Some(action) = next {
                effects::execute(world, id, &action);
            }
        }

        if let Some(head) = world.queue_mut(id).and_then(|queue| queue.head_mut()) {
            head.advance(dt);
        }
        let idle = world
            .entity(id)
            .map_or(true, |entity| entity.actions().is_empty());
        if idle {
            self.drained.push(id);
        }
    }
}

/// Marks the effect as fired and returns a copy to execute.
fn fire(head: &mut Action) -> Action {
    let _ = head.mark_effect_fired();
    head.clone()
}
