//! Per-player resources, power balance and task demand.

use std::collections::BTreeMap;

use kiln_core::EntityKind;

use crate::blueprint::Task;

/// Bookkeeping kept for every player.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerLedger {
    resources: BTreeMap<EntityKind, f64>,
    task_needs: BTreeMap<Task, i64>,
    power_generated: f64,
    power_consumed: f64,
}

impl PlayerLedger {
    /// Quantity of a resource held.
    #[must_use]
    pub fn resource(&self, kind: EntityKind) -> f64 {
        self.resources.get(&kind).copied().unwrap_or(0.0)
    }

    /// Every resource with a recorded quantity.
    pub fn resources(&self) -> impl Iterator<Item = (EntityKind, f64)> + '_ {
        self.resources.iter().map(|(kind, quantity)| (*kind, *quantity))
    }

    /// Adds to a resource.
    pub fn credit(&mut self, kind: EntityKind, quantity: f64) {
        *self.resources.entry(kind).or_insert(0.0) += quantity;
    }

    /// Checks whether every listed cost can be paid.
    #[must_use]
    pub fn can_afford(&self, costs: &[(EntityKind, f64)]) -> bool {
        costs
            .iter()
            .all(|(kind, quantity)| self.resource(*kind) >= *quantity)
    }

    /// Deducts every listed cost, or nothing when one of them cannot be paid.
    pub fn try_spend(&mut self, costs: &[(EntityKind, f64)]) -> bool {
        if !self.can_afford(costs) {
            return false;
        }
        for (kind, quantity) in costs {
            *self.resources.entry(*kind).or_insert(0.0) -= quantity;
        }
        true
    }

    /// Outstanding demand for agents performing a task.
    #[must_use]
    pub fn task_need(&self, task: Task) -> Option<i64> {
        self.task_needs.get(&task).copied()
    }

    /// Declares how many more agents a task needs.
    pub fn set_task_need(&mut self, task: Task, need: i64) {
        let _ = self.task_needs.insert(task, need);
    }

    /// Adjusts a task's demand if the task tracks one.
    pub fn adjust_task_need(&mut self, task: Task, delta: i64) {
        if let Some(need) = self.task_needs.get_mut(&task) {
            *need += delta;
        }
    }

    /// Power produced during the latest economy pass.
    #[must_use]
    pub const fn power_generated(&self) -> f64 {
        self.power_generated
    }

    /// Power drawn during the latest economy pass.
    #[must_use]
    pub const fn power_consumed(&self) -> f64 {
        self.power_consumed
    }

    /// Records the outcome of an economy pass.
    pub fn set_power(&mut self, generated: f64, consumed: f64) {
        self.power_generated = generated;
        self.power_consumed = consumed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spending_is_all_or_nothing() {
        let mut ledger = PlayerLedger::default();
        ledger.credit(EntityKind::Iron, 1.0);
        let costs = [(EntityKind::Iron, 0.5), (EntityKind::Coal, 0.1)];

        assert!(!ledger.try_spend(&costs));
        assert_eq!(ledger.resource(EntityKind::Iron), 1.0);

        ledger.credit(EntityKind::Coal, 0.1);
        assert!(ledger.try_spend(&costs));
        assert_eq!(ledger.resource(EntityKind::Iron), 0.5);
        assert!(ledger.resource(EntityKind::Coal).abs() < 1e-12);
    }

    #[test]
    fn untracked_task_needs_ignore_adjustments() {
        let mut ledger = PlayerLedger::default();
        ledger.adjust_task_need(Task::Return, -1);
        assert_eq!(ledger.task_need(Task::Return), None);

        ledger.set_task_need(Task::Return, 2);
        ledger.adjust_task_need(Task::Return, -1);
        assert_eq!(ledger.task_need(Task::Return), Some(1));
    }
}
