//! JSON summary printed after a headless run.

use std::collections::BTreeMap;

use serde::Serialize;

use kiln_core::{Event, SubstanceKind};
use kiln_simulation::{
    query::{self, EntityView, LedgerView},
    Simulation,
};

/// Final state of a run together with event tallies.
#[derive(Debug, Serialize)]
pub(crate) struct RunReport {
    pub(crate) ticks: u64,
    pub(crate) events: BTreeMap<&'static str, usize>,
    pub(crate) entities: Vec<EntityView>,
    pub(crate) ledgers: Vec<LedgerView>,
    pub(crate) substances: Vec<(SubstanceKind, f64)>,
}

impl RunReport {
    pub(crate) fn new(simulation: &Simulation, events: &EventTally) -> Self {
        let world = simulation.world();
        Self {
            ticks: query::tick(world),
            events: events.counts.clone(),
            entities: query::entities(world),
            ledgers: query::ledgers(world),
            substances: query::substance_totals(world)
                .into_iter()
                .filter(|(_, total)| *total > 0.0)
                .collect(),
        }
    }
}

/// Running count of events by variant.
#[derive(Debug, Default)]
pub(crate) struct EventTally {
    counts: BTreeMap<&'static str, usize>,
}

impl EventTally {
    pub(crate) fn record(&mut self, events: &[Event]) {
        for event in events {
            *self.counts.entry(event_name(event)).or_insert(0) += 1;
        }
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::TimeAdvanced { .. } => "time_advanced",
        Event::EntitySpawned { .. } => "entity_spawned",
        Event::SpawnRejected { .. } => "spawn_rejected",
        Event::EntityMoved { .. } => "entity_moved",
        Event::EntityKindChanged { .. } => "entity_kind_changed",
        Event::EntityDamaged { .. } => "entity_damaged",
        Event::EntityRemoved { .. } => "entity_removed",
        Event::ProjectileFired { .. } => "projectile_fired",
        Event::Exploded { .. } => "exploded",
        Event::ResourceCollected { .. } => "resource_collected",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use kiln_core::{CellCoord, EntityId, EntityKind};

    #[test]
    fn tally_counts_each_variant() {
        let mut tally = EventTally::default();
        tally.record(&[
            Event::TimeAdvanced {
                tick: 1,
                dt: Duration::from_millis(16),
            },
            Event::EntitySpawned {
                entity: EntityId::new(1),
                kind: EntityKind::Dirt,
                cell: CellCoord::new(0, 0),
            },
            Event::TimeAdvanced {
                tick: 2,
                dt: Duration::from_millis(16),
            },
        ]);

        assert_eq!(tally.counts.get("time_advanced"), Some(&2));
        assert_eq!(tally.counts.get("entity_spawned"), Some(&1));
        assert_eq!(tally.counts.get("exploded"), None);
    }
}
