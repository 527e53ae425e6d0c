#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the Kiln simulation.
//!
//! The [`World`] owns every entity together with the indexes that keep them
//! addressable by capability and by cell, the latest substance snapshot, the
//! player ledgers and the seeded random source. Every mutation that changes an
//! entity's footprint or capabilities goes through the world so the indexes
//! and the substance field worker stay in sync.

pub mod blueprint;
pub mod entity;
pub mod factory;
pub mod ledger;
mod store;
mod tuning;

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use kiln_core::{
    Action, ActionKind, ActionPayload, ActionQueue, BlockerSeed, Capability, CapabilitySet,
    CellCoord, CellRect, Command, EmitterSeed, EntityId, EntityKind, Event, FieldCommand,
    FieldReport, FieldSource, GridSize, HeldKeys, MoveError, PlayerId, SubstanceGrid,
    SubstanceKind, TurbineSeed, GAIA,
};
use kiln_substances::{FieldChannel, InlineField};

use crate::{
    blueprint::{blueprint, GeneratorSource},
    entity::Entity,
    ledger::PlayerLedger,
    store::{EntityStore, SpatialIndex},
};

pub use tuning::Tuning;

/// Capabilities that keep at least one substance out of a cell.
pub const SUBSTANCE_BLOCKERS: CapabilitySet = CapabilitySet::of(&[
    Capability::Terrain,
    Capability::Mineral,
    Capability::Coal,
    Capability::Structure,
    Capability::Turbine,
]);

const STEADY_KINDS: [SubstanceKind; 2] = [SubstanceKind::Colony, SubstanceKind::Light];
const ORTHOGONAL: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

/// Authoritative simulation context.
#[derive(Debug)]
pub struct World {
    size: GridSize,
    tuning: Tuning,
    store: EntityStore,
    spatial: SpatialIndex,
    field: Box<dyn FieldChannel>,
    substances: SubstanceGrid,
    ledgers: BTreeMap<PlayerId, PlayerLedger>,
    rng: ChaCha8Rng,
    tick: u64,
    dt: Duration,
    controlled: Option<EntityId>,
    held_keys: HeldKeys,
    held_ticks: u32,
    flood_sources: Vec<FieldSource>,
    retract_sources: Vec<FieldSource>,
    initial_quantities: Option<SubstanceGrid>,
    tracked_blockers: BTreeSet<EntityId>,
    initialised: bool,
    events: Vec<Event>,
}

impl World {
    /// Creates an empty world backed by the provided field transport.
    #[must_use]
    pub fn new(size: GridSize, tuning: Tuning, seed: u64, field: Box<dyn FieldChannel>) -> Self {
        Self {
            size,
            tuning,
            store: EntityStore::new(),
            spatial: SpatialIndex::new(size),
            field,
            substances: SubstanceGrid::new(size),
            ledgers: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            tick: 0,
            dt: Duration::ZERO,
            controlled: None,
            held_keys: HeldKeys::default(),
            held_ticks: 0,
            flood_sources: Vec::new(),
            retract_sources: Vec::new(),
            initial_quantities: None,
            tracked_blockers: BTreeSet::new(),
            initialised: false,
            events: Vec::new(),
        }
    }

    /// Creates an empty world whose substance field runs on the caller's thread.
    #[must_use]
    pub fn inline(size: GridSize, tuning: Tuning, seed: u64) -> Self {
        Self::new(size, tuning, seed, Box::new(InlineField::new(size)))
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn size(&self) -> GridSize {
        self.size
    }

    /// Shared numeric knobs.
    #[must_use]
    pub const fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Number of ticks started so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Wall time covered by the current tick.
    #[must_use]
    pub const fn dt(&self) -> Duration {
        self.dt
    }

    /// Seeded random source used for every stochastic choice.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Entity steered by the player.
    #[must_use]
    pub const fn controlled(&self) -> Option<EntityId> {
        self.controlled
    }

    /// Movement keys currently held.
    #[must_use]
    pub const fn held_keys(&self) -> HeldKeys {
        self.held_keys
    }

    /// Consecutive ticks the current key combination has been held.
    #[must_use]
    pub const fn held_ticks(&self) -> u32 {
        self.held_ticks
    }

    /// Latest substance snapshot published by the field worker.
    #[must_use]
    pub const fn substances(&self) -> &SubstanceGrid {
        &self.substances
    }

    /// Quantity of a substance in a cell according to the latest snapshot.
    #[must_use]
    pub fn substance(&self, cell: CellCoord, kind: SubstanceKind) -> f64 {
        self.substances.get(cell, kind)
    }

    /// Seeds the quantities sent to the field worker when it is initialised.
    pub fn set_initial_quantities(&mut self, quantities: SubstanceGrid) {
        self.substances = quantities.clone();
        self.initial_quantities = Some(quantities);
    }

    /// Ledger of a player, if the player owns anything or was credited.
    #[must_use]
    pub fn ledger(&self, player: PlayerId) -> Option<&PlayerLedger> {
        self.ledgers.get(&player)
    }

    /// Ledger of a player, created on first use.
    pub fn ledger_mut(&mut self, player: PlayerId) -> &mut PlayerLedger {
        self.ledgers.entry(player).or_default()
    }

    /// Players with a ledger, in ascending order.
    #[must_use]
    pub fn players(&self) -> Vec<PlayerId> {
        self.ledgers.keys().copied().collect()
    }

    /// Looks up a live entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.store.get(id)
    }

    /// Mutable access to a live entity's component state.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.store.get_mut(id)
    }

    /// Identifiers of every live entity carrying the capability, ascending.
    #[must_use]
    pub fn entities_with(&self, tag: Capability) -> Vec<EntityId> {
        self.store.with_capability(tag)
    }

    /// Identifiers of the entities whose footprint covers the cell, ascending.
    #[must_use]
    pub fn entities_at(&self, cell: CellCoord) -> Vec<EntityId> {
        self.spatial.at(cell).collect()
    }

    /// Identifiers of the entities overlapping the rectangle, ascending.
    #[must_use]
    pub fn entities_in(&self, rect: &CellRect) -> Vec<EntityId> {
        self.spatial.within(rect).into_iter().collect()
    }

    /// Other entities overlapping the entity's footprint.
    ///
    /// An empty mask matches every capability.
    #[must_use]
    pub fn collisions(&self, id: EntityId, mask: CapabilitySet) -> Vec<EntityId> {
        let Some(entity) = self.store.get(id) else {
            return Vec::new();
        };
        if entity.carried_by.is_some() {
            return Vec::new();
        }
        self.spatial
            .within(&entity.footprint())
            .into_iter()
            .filter(|other| *other != id)
            .filter(|other| {
                mask.is_empty()
                    || self
                        .store
                        .get(*other)
                        .is_some_and(|entity| entity.capabilities.intersects(mask))
            })
            .collect()
    }

    /// Creates an entity from its blueprint defaults.
    pub fn spawn(&mut self, kind: EntityKind, cell: CellCoord, owner: PlayerId) -> Option<EntityId> {
        self.add(factory::make(kind, cell, owner))
    }

    /// Registers an entity and returns its identifier.
    ///
    /// Entities whose footprint does not fit the grid are rejected.
    pub fn add(&mut self, mut entity: Entity) -> Option<EntityId> {
        if !self.size.contains_rect(&entity.footprint()) {
            tracing::debug!(kind = ?entity.kind, cell = ?entity.position, "entity outside grid rejected");
            self.events.push(Event::SpawnRejected {
                kind: entity.kind,
                cell: entity.position,
            });
            return None;
        }
        let id = self.store.allocate();
        entity.id = id;
        if !entity.actions.is_empty() {
            entity.capabilities.set(Capability::Actor, true);
        }
        let _ = self.ledgers.entry(entity.owner).or_default();
        let footprint = entity.footprint();
        let kind = entity.kind;
        let cell = entity.position;
        self.spatial.occupy(id, &footprint);
        self.store.insert(entity);

        if self.initialised {
            self.sync_blocker(id);
            self.sync_emitter(id, true);
            self.sync_turbine(id);
            self.cover_steady_fields(id, &footprint);
        }
        tracing::trace!(entity = id.get(), ?kind, "entity added");
        self.events.push(Event::EntitySpawned {
            entity: id,
            kind,
            cell,
        });
        Some(id)
    }

    /// Deregisters an entity. Anything it carries is dropped at its position.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let held = self
            .store
            .get(id)?
            .holder
            .as_ref()
            .map(|holder| holder.held.clone())
            .unwrap_or_default();
        for item in held {
            let drop_cell = self.store.get(id).map(Entity::position);
            if let Some(cell) = drop_cell {
                if !self.put_down(id, item, cell) {
                    let _ = self.remove(item);
                }
            }
        }

        if let Some(holder) = self.store.get(id).and_then(|entity| entity.carried_by) {
            if let Some(holder) = self.store.get_mut(holder).and_then(|e| e.holder.as_mut()) {
                holder.held.retain(|item| *item != id);
            }
        }

        let entity = self.store.remove(id)?;
        let footprint = entity.footprint();
        if entity.carried_by.is_none() {
            self.spatial.vacate(id, &footprint);
        }
        if self.controlled == Some(id) {
            self.controlled = None;
        }
        let _ = self.tracked_blockers.remove(&id);
        if self.initialised && self.is_field_tracked(&entity) {
            self.field.send(FieldCommand::ForgetEntity { entity: id });
            if entity.carried_by.is_none() && entity.capabilities.intersects(SUBSTANCE_BLOCKERS) {
                self.uncover_steady_fields(&footprint);
            }
            if let Some(emitter) = entity.emitter.as_ref() {
                if !emitter.kind.rule().dispersing && emitter.quantity > 0.0 {
                    self.retract_sources.push(FieldSource {
                        cell: entity.position,
                        kind: emitter.kind,
                        quantity: emitter.quantity,
                    });
                }
            }
        }
        tracing::trace!(entity = id.get(), kind = ?entity.kind, "entity removed");
        self.events.push(Event::EntityRemoved {
            entity: id,
            kind: entity.kind,
        });
        Some(entity)
    }

    /// Checks whether the entity could occupy `target`.
    pub fn check_move(&self, id: EntityId, target: CellCoord) -> Result<(), MoveError> {
        let Some(entity) = self.store.get(id) else {
            return Err(MoveError::OutOfBounds { target });
        };
        let footprint = CellRect::from_origin_and_size(target, entity.size);
        if !self.size.contains_rect(&footprint) {
            return Err(MoveError::OutOfBounds { target });
        }
        let profile = blueprint(entity.kind).agent;
        if profile.is_some_and(|profile| profile.segmented)
            && entity.position.is_diagonal_to(target)
        {
            return Err(MoveError::SegmentedDiagonal { target });
        }
        let blocking = profile.map_or(CapabilitySet::EMPTY, |profile| profile.blocking);
        let blocked = self.spatial.within(&footprint).into_iter().any(|other| {
            other != id
                && self
                    .store
                    .get(other)
                    .is_some_and(|other| other.capabilities.intersects(blocking))
        });
        if blocked {
            return Err(MoveError::Blocked { target });
        }
        Ok(())
    }

    /// Relocates an entity, updating the old and new footprints together.
    pub fn move_to(&mut self, id: EntityId, target: CellCoord) -> Result<(), MoveError> {
        let Some(entity) = self.store.get(id) else {
            return Err(MoveError::OutOfBounds { target });
        };
        let from = entity.position;
        let old = entity.footprint();
        let new = CellRect::from_origin_and_size(target, entity.size);
        if !self.size.contains_rect(&new) {
            return Err(MoveError::OutOfBounds { target });
        }
        if from == target {
            return Ok(());
        }
        let carried = entity.carried_by.is_some();
        if !carried {
            self.spatial.vacate(id, &old);
            self.spatial.occupy(id, &new);
        }
        if let Some(entity) = self.store.get_mut(id) {
            entity.position = target;
            if let Some(agent) = entity.agent.as_mut() {
                agent.prev_position = from;
            }
        }
        if self.initialised && !carried {
            self.sync_blocker(id);
            self.sync_emitter(id, false);
            self.sync_turbine(id);
            if self
                .store
                .get(id)
                .is_some_and(|entity| entity.capabilities.intersects(SUBSTANCE_BLOCKERS))
            {
                self.uncover_steady_fields(&old);
                self.cover_steady_fields(id, &new);
            }
        }
        self.events.push(Event::EntityMoved {
            entity: id,
            from,
            to: target,
        });
        Ok(())
    }

    /// Switches an entity to another kind.
    ///
    /// Capabilities come from the new blueprint, except that an actor stays an
    /// actor and an entity that lost its collectable tag does not regain it.
    pub fn change_kind(&mut self, id: EntityId, kind: EntityKind) -> bool {
        let Some(entity) = self.store.get_mut(id) else {
            return false;
        };
        let from = entity.kind;
        let blueprint = blueprint(kind);
        let old_caps = entity.capabilities;
        let mut capabilities = blueprint.capabilities;
        capabilities.set(Capability::Actor, old_caps.contains(Capability::Actor));
        if !old_caps.contains(Capability::Collectable) {
            capabilities.set(Capability::Collectable, false);
        }
        entity.kind = kind;
        factory::attach_components(entity, &blueprint);
        self.store.set_capabilities(id, capabilities);

        if self.initialised {
            self.sync_blocker(id);
            self.sync_emitter(id, true);
            self.sync_turbine(id);
        }
        self.events.push(Event::EntityKindChanged {
            entity: id,
            from,
            to: kind,
        });
        true
    }

    /// Adds or removes a capability tag.
    pub fn set_capability(&mut self, id: EntityId, tag: Capability, enabled: bool) -> bool {
        let Some(entity) = self.store.get(id) else {
            return false;
        };
        let mut capabilities = entity.capabilities;
        if capabilities.contains(tag) == enabled {
            return true;
        }
        capabilities.set(tag, enabled);
        self.store.set_capabilities(id, capabilities);
        if self.initialised && SUBSTANCE_BLOCKERS.contains(tag) {
            self.sync_blocker(id);
        }
        true
    }

    /// Lifts `item` into `holder`'s cargo.
    pub fn carry(&mut self, holder: EntityId, item: EntityId) -> bool {
        if holder == item {
            return false;
        }
        let Some(carrier) = self.store.get(holder) else {
            return false;
        };
        let Some(profile) = blueprint(carrier.kind).holder else {
            return false;
        };
        let held = carrier.holder.as_ref().map_or(0, |cargo| cargo.held.len());
        let Some(target) = self.store.get(item) else {
            return false;
        };
        if held >= profile.max_hold
            || target.carried_by.is_some()
            || !profile.pickup.contains(&target.kind)
        {
            return false;
        }
        let footprint = target.footprint();
        self.spatial.vacate(item, &footprint);
        if let Some(target) = self.store.get_mut(item) {
            target.carried_by = Some(holder);
        }
        if let Some(cargo) = self.store.get_mut(holder).and_then(|e| e.holder.as_mut()) {
            cargo.held.push(item);
        }
        if self.initialised {
            self.sync_blocker(item);
            if self
                .store
                .get(item)
                .is_some_and(|entity| entity.capabilities.intersects(SUBSTANCE_BLOCKERS))
            {
                self.uncover_steady_fields(&footprint);
            }
        }
        true
    }

    /// Places a carried entity back on the grid at `cell`.
    pub fn put_down(&mut self, holder: EntityId, item: EntityId, cell: CellCoord) -> bool {
        let Some(target) = self.store.get(item) else {
            return false;
        };
        if target.carried_by != Some(holder) {
            return false;
        }
        let footprint = CellRect::from_origin_and_size(cell, target.size);
        if !self.size.contains_rect(&footprint) {
            return false;
        }
        if let Some(cargo) = self.store.get_mut(holder).and_then(|e| e.holder.as_mut()) {
            cargo.held.retain(|held| *held != item);
        }
        if let Some(target) = self.store.get_mut(item) {
            target.carried_by = None;
            target.position = cell;
        }
        self.spatial.occupy(item, &footprint);
        if self.initialised {
            self.sync_blocker(item);
            self.sync_emitter(item, false);
            self.cover_steady_fields(item, &footprint);
        }
        true
    }

    /// Builds an action with the timing the entity's kind uses for it.
    #[must_use]
    pub fn make_action(&self, id: EntityId, kind: ActionKind, payload: ActionPayload) -> Option<Action> {
        let entity = self.store.get(id)?;
        Some(Action::new(kind, blueprint(entity.kind).timing(kind), payload))
    }

    /// Appends an action and marks the entity as an actor.
    pub fn enqueue(&mut self, id: EntityId, kind: ActionKind, payload: ActionPayload) -> bool {
        let Some(action) = self.make_action(id, kind, payload) else {
            return false;
        };
        if let Some(entity) = self.store.get_mut(id) {
            entity.actions.enqueue(action);
        }
        self.set_capability(id, Capability::Actor, true)
    }

    /// Pushes an action in front of the one in progress and marks the entity as an actor.
    pub fn preempt(&mut self, id: EntityId, kind: ActionKind, payload: ActionPayload) -> bool {
        let Some(action) = self.make_action(id, kind, payload) else {
            return false;
        };
        if let Some(entity) = self.store.get_mut(id) {
            entity.actions.preempt(action);
        }
        self.set_capability(id, Capability::Actor, true)
    }

    /// Mutable access to an entity's action queue for stepping.
    pub fn queue_mut(&mut self, id: EntityId) -> Option<&mut ActionQueue> {
        self.store.get_mut(id).map(|entity| &mut entity.actions)
    }

    /// Lowers hit points and queues DIE once they are spent.
    pub fn damage(&mut self, id: EntityId, amount: f64) -> bool {
        let Some(entity) = self.store.get_mut(id) else {
            return false;
        };
        let remaining = entity.hp() - amount;
        entity.set_hp(remaining);
        let dying = entity.actions.is_queued(ActionKind::Die, false);
        self.events.push(Event::EntityDamaged {
            entity: id,
            amount,
            remaining,
        });
        if remaining <= 0.0 && !dying {
            let _ = self.preempt(id, ActionKind::Die, ActionPayload::None);
        }
        true
    }

    /// Sends a command to the substance field worker.
    pub fn send_field(&mut self, command: FieldCommand) {
        self.field.send(command);
    }

    /// Schedules a steady-state source to be flood filled at the end of the tick.
    pub fn queue_flood_fill(&mut self, source: FieldSource) {
        self.flood_sources.push(source);
    }

    /// Records an event for the caller of the current command.
    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Moves every buffered event into `out`.
    pub fn drain_events(&mut self, out: &mut Vec<Event>) {
        out.append(&mut self.events);
    }

    /// Opens a tick: advances the clock, adopts worker reports and initialises
    /// the field on the very first tick.
    pub fn begin_tick(&mut self, dt: Duration) {
        self.tick += 1;
        self.dt = dt;
        if let Some(report) = self.field.drain() {
            self.absorb(report);
        }
        if !self.initialised {
            self.initialise_field();
        }
        if self.held_keys.any() {
            self.held_ticks = self.held_ticks.saturating_add(1);
        } else {
            self.held_ticks = 0;
        }
    }

    /// Closes a tick: dispatches pending field work and frees released ids.
    pub fn finish_tick(&mut self) {
        if self.tuning.disperse_interval > 0 && self.tick % self.tuning.disperse_interval == 0 {
            self.field.send(FieldCommand::DispersePheromones);
        }
        if !self.retract_sources.is_empty() {
            let sources = std::mem::take(&mut self.retract_sources);
            self.field.send(FieldCommand::ReverseFloodFill { sources });
        }
        if !self.flood_sources.is_empty() {
            let sources = std::mem::take(&mut self.flood_sources);
            self.field.send(FieldCommand::FloodFill { sources });
        }
        self.store.release_ids();
        self.events.push(Event::TimeAdvanced {
            tick: self.tick,
            dt: self.dt,
        });
    }

    fn absorb(&mut self, report: FieldReport) {
        if report.snapshot.size() == self.size {
            self.substances = report.snapshot;
        }
        for (id, speed) in report.turbine_speeds {
            if let Some(generator) = self.store.get_mut(id).and_then(|e| e.generator.as_mut()) {
                generator.speed = speed;
            }
        }
        for condensation in report.condensations {
            tracing::trace!(kind = ?condensation.kind, cell = ?condensation.cell, "condensation");
            let _ = self.spawn(condensation.kind, condensation.cell, GAIA);
        }
    }

    fn initialise_field(&mut self) {
        let quantities = self
            .initial_quantities
            .take()
            .unwrap_or_else(|| SubstanceGrid::new(self.size));
        let mut blockers = Vec::new();
        let mut emitters = Vec::new();
        let mut turbines = Vec::new();
        let mut sources = Vec::new();
        for entity in self.store.iter() {
            if let Some(seed) = blocker_seed(entity) {
                blockers.push(seed);
            }
            if let Some(seed) = emitter_seed(entity) {
                if !seed.kind.rule().dispersing && seed.quantity > 0.0 {
                    sources.push(FieldSource {
                        cell: seed.cell,
                        kind: seed.kind,
                        quantity: seed.quantity,
                    });
                }
                emitters.push(seed);
            }
            if let Some(seed) = self.turbine_seed(entity) {
                turbines.push(seed);
            }
        }
        if let Some(light) = self.tuning.surface_light {
            for column in 0..self.size.columns() {
                sources.push(FieldSource {
                    cell: CellCoord::new(column, 0),
                    kind: SubstanceKind::Light,
                    quantity: light,
                });
            }
        }
        tracing::debug!(
            blockers = blockers.len(),
            emitters = emitters.len(),
            turbines = turbines.len(),
            "initialising substance field"
        );
        self.tracked_blockers = blockers.iter().map(|seed| seed.entity).collect();
        self.field.send(FieldCommand::Init {
            columns: self.size.columns(),
            rows: self.size.rows(),
            quantities,
            blockers,
            emitters,
            turbines,
        });
        if !sources.is_empty() {
            self.field.send(FieldCommand::FloodFill { sources });
        }
        self.initialised = true;
    }

    fn is_field_tracked(&self, entity: &Entity) -> bool {
        entity.capabilities.intersects(SUBSTANCE_BLOCKERS)
            || entity.emitter.is_some()
            || self.turbine_seed(entity).is_some()
    }

    fn turbine_seed(&self, entity: &Entity) -> Option<TurbineSeed> {
        let profile = blueprint(entity.kind).generator?;
        let GeneratorSource::Turbine { max_speed } = profile.source else {
            return None;
        };
        Some(TurbineSeed {
            entity: entity.id,
            footprint: entity.footprint(),
            max_speed,
            flow_gain: self.tuning.turbine_flow_gain,
        })
    }

    /// Tells the worker where a blocker sits, or that it no longer blocks.
    fn sync_blocker(&mut self, id: EntityId) {
        let Some(entity) = self.store.get(id) else {
            return;
        };
        if let Some(seed) = blocker_seed(entity) {
            let _ = self.tracked_blockers.insert(id);
            self.field.send(FieldCommand::TrackBlocker(seed));
        } else if self.tracked_blockers.remove(&id) {
            self.field.send(FieldCommand::TrackBlocker(BlockerSeed {
                entity: id,
                footprint: entity.footprint(),
                capabilities: CapabilitySet::EMPTY,
            }));
        }
    }

    fn sync_emitter(&mut self, id: EntityId, register: bool) {
        let Some(seed) = self.store.get(id).and_then(emitter_seed) else {
            return;
        };
        if register {
            self.field.send(FieldCommand::RegisterEmitter(seed));
        } else {
            self.field.send(FieldCommand::SetEmitterQuantity {
                entity: id,
                cell: seed.cell,
                quantity: seed.quantity,
            });
        }
    }

    fn sync_turbine(&mut self, id: EntityId) {
        let Some(seed) = self.store.get(id).and_then(|entity| self.turbine_seed(entity)) else {
            return;
        };
        self.field.send(FieldCommand::TrackTurbine(seed));
    }

    /// Retracts steady fields from cells a blocker now covers.
    fn cover_steady_fields(&mut self, id: EntityId, footprint: &CellRect) {
        let blocks = self
            .store
            .get(id)
            .is_some_and(|entity| entity.capabilities.intersects(SUBSTANCE_BLOCKERS));
        if !blocks {
            return;
        }
        for cell in footprint.cells() {
            for kind in STEADY_KINDS {
                let quantity = self.substances.get(cell, kind);
                if quantity > 0.0 {
                    self.retract_sources.push(FieldSource {
                        cell,
                        kind,
                        quantity,
                    });
                }
            }
        }
    }

    /// Refloods steady fields into cells a blocker no longer covers.
    fn uncover_steady_fields(&mut self, footprint: &CellRect) {
        for cell in footprint.cells() {
            if cell.row() == 0 {
                if let Some(light) = self.tuning.surface_light {
                    self.flood_sources.push(FieldSource {
                        cell,
                        kind: SubstanceKind::Light,
                        quantity: light,
                    });
                }
            }
            for (dx, dy) in ORTHOGONAL {
                let Some(neighbor) = cell.offset(dx, dy).filter(|n| self.size.contains(*n)) else {
                    continue;
                };
                if footprint.contains(neighbor) {
                    continue;
                }
                for kind in STEADY_KINDS {
                    let quantity = self.substances.get(neighbor, kind);
                    if quantity > 0.0 {
                        self.flood_sources.push(FieldSource {
                            cell: neighbor,
                            kind,
                            quantity,
                        });
                    }
                }
            }
        }
    }
}

fn blocker_seed(entity: &Entity) -> Option<BlockerSeed> {
    if !entity.capabilities.intersects(SUBSTANCE_BLOCKERS) || entity.carried_by.is_some() {
        return None;
    }
    Some(BlockerSeed {
        entity: entity.id,
        footprint: entity.footprint(),
        capabilities: entity.capabilities,
    })
}

fn emitter_seed(entity: &Entity) -> Option<EmitterSeed> {
    if entity.carried_by.is_some() {
        return None;
    }
    let emitter = entity.emitter.as_ref()?;
    Some(EmitterSeed {
        entity: entity.id,
        cell: entity.position,
        kind: emitter.kind,
        quantity: emitter.quantity,
    })
}

/// Applies an intent to the world, appending the resulting events.
///
/// `Tick` only opens the tick; the simulation runs its systems afterwards and
/// closes the tick with [`World::finish_tick`].
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => world.begin_tick(dt),
        Command::SetControlledEntity { entity } => {
            world.controlled = entity.filter(|id| world.store.get(*id).is_some());
            world.held_ticks = 0;
        }
        Command::SetHeldKeys { keys } => {
            if keys != world.held_keys {
                world.held_ticks = 0;
            }
            world.held_keys = keys;
        }
        Command::Spawn { kind, cell, owner } => {
            let _ = world.spawn(kind, cell, owner);
        }
    }
    world.drain_events(out_events);
}

/// Read-only views used by adapters and tests.
pub mod query {
    use serde::Serialize;

    use kiln_core::{CellCoord, CellRectSize, EntityId, EntityKind, PlayerId, SubstanceKind};

    use super::World;
    use crate::ledger::PlayerLedger;

    /// Snapshot of a single entity.
    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct EntityView {
        /// Entity identifier.
        pub id: EntityId,
        /// Entity kind.
        pub kind: EntityKind,
        /// Owning player.
        pub owner: PlayerId,
        /// Upper-left cell.
        pub position: CellCoord,
        /// Footprint size.
        pub size: CellRectSize,
        /// Hit points.
        pub hp: f64,
        /// Heading or aim angle.
        pub theta: f64,
        /// Whether a holder carries the entity.
        pub carried: bool,
    }

    /// Resource and power totals of a player.
    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct LedgerView {
        /// Player the ledger belongs to.
        pub player: PlayerId,
        /// Resource stockpile.
        pub resources: Vec<(EntityKind, f64)>,
        /// Power produced during the latest tick.
        pub power_generated: f64,
        /// Power required by consumers during the latest tick.
        pub power_needed: f64,
        /// Generated minus needed.
        pub power_margin: f64,
    }

    impl LedgerView {
        fn new(player: PlayerId, ledger: &PlayerLedger) -> Self {
            Self {
                player,
                resources: ledger.resources().collect(),
                power_generated: ledger.power_generated(),
                power_needed: ledger.power_consumed(),
                power_margin: ledger.power_generated() - ledger.power_consumed(),
            }
        }
    }

    /// Number of ticks started so far.
    #[must_use]
    pub fn tick(world: &World) -> u64 {
        world.tick
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(world: &World) -> usize {
        world.store.len()
    }

    /// Snapshot of one entity.
    #[must_use]
    pub fn entity_view(world: &World, id: EntityId) -> Option<EntityView> {
        let entity = world.store.get(id)?;
        Some(EntityView {
            id,
            kind: entity.kind,
            owner: entity.owner,
            position: entity.position,
            size: entity.size,
            hp: entity.hp(),
            theta: entity.theta(),
            carried: entity.carried_by.is_some(),
        })
    }

    /// Snapshots of every live entity in ascending id order.
    #[must_use]
    pub fn entities(world: &World) -> Vec<EntityView> {
        world
            .store
            .iter()
            .filter_map(|entity| entity_view(world, entity.id))
            .collect()
    }

    /// Quantity of a substance in a cell according to the latest snapshot.
    #[must_use]
    pub fn substance(world: &World, cell: CellCoord, kind: SubstanceKind) -> f64 {
        world.substances.get(cell, kind)
    }

    /// Total quantity of every substance according to the latest snapshot.
    #[must_use]
    pub fn substance_totals(world: &World) -> Vec<(SubstanceKind, f64)> {
        SubstanceKind::ALL
            .iter()
            .map(|kind| (*kind, world.substances.total(*kind)))
            .collect()
    }

    /// Ledgers of every known player in ascending order.
    #[must_use]
    pub fn ledgers(world: &World) -> Vec<LedgerView> {
        world
            .ledgers
            .iter()
            .map(|(player, ledger)| LedgerView::new(*player, ledger))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(columns: u32, rows: u32) -> World {
        World::inline(GridSize::new(columns, rows), Tuning::default(), 7)
    }

    #[test]
    fn spawn_indexes_by_cell_and_capability() {
        let mut world = world(6, 6);
        let truck = world
            .spawn(EntityKind::Truck, CellCoord::new(1, 1), PlayerId::new(1))
            .expect("truck fits");

        assert_eq!(world.entities_at(CellCoord::new(3, 3)), vec![truck]);
        assert!(world.entities_at(CellCoord::new(4, 4)).is_empty());
        assert_eq!(world.entities_with(Capability::Agent), vec![truck]);
    }

    #[test]
    fn out_of_bounds_spawns_are_rejected() {
        let mut world = world(4, 4);
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::Spawn {
                kind: EntityKind::Truck,
                cell: CellCoord::new(2, 2),
                owner: PlayerId::new(1),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::SpawnRejected {
                kind: EntityKind::Truck,
                cell: CellCoord::new(2, 2),
            }]
        );
        assert_eq!(query::entity_count(&world), 0);
    }

    #[test]
    fn move_updates_both_footprints() {
        let mut world = world(6, 6);
        let agent = world
            .spawn(EntityKind::Agent, CellCoord::new(2, 2), PlayerId::new(1))
            .expect("agent fits");

        world.move_to(agent, CellCoord::new(3, 2)).expect("legal move");
        assert!(world.entities_at(CellCoord::new(2, 2)).is_empty());
        assert_eq!(world.entities_at(CellCoord::new(3, 2)), vec![agent]);
        assert_eq!(
            world.entity(agent).and_then(|e| e.agent.as_ref()).map(|a| a.prev_position),
            Some(CellCoord::new(2, 2))
        );
        assert_eq!(
            world.move_to(agent, CellCoord::new(6, 2)),
            Err(MoveError::OutOfBounds {
                target: CellCoord::new(6, 2)
            })
        );
    }

    #[test]
    fn check_move_reports_blockers_and_segmented_diagonals() {
        let mut world = world(8, 8);
        let truck = world
            .spawn(EntityKind::Truck, CellCoord::new(2, 2), PlayerId::new(1))
            .expect("truck fits");
        let _ = world.spawn(EntityKind::Stone, CellCoord::new(5, 3), GAIA);

        assert_eq!(
            world.check_move(truck, CellCoord::new(3, 3)),
            Err(MoveError::SegmentedDiagonal {
                target: CellCoord::new(3, 3)
            })
        );
        assert_eq!(
            world.check_move(truck, CellCoord::new(3, 2)),
            Err(MoveError::Blocked {
                target: CellCoord::new(3, 2)
            })
        );
        assert_eq!(world.check_move(truck, CellCoord::new(2, 1)), Ok(()));
    }

    #[test]
    fn removed_ids_are_only_reused_after_the_tick() {
        let mut world = world(4, 4);
        let first = world
            .spawn(EntityKind::Dirt, CellCoord::new(0, 0), GAIA)
            .expect("dirt fits");
        let _ = world.remove(first);
        assert!(world.remove(first).is_none());

        let second = world
            .spawn(EntityKind::Dirt, CellCoord::new(1, 0), GAIA)
            .expect("dirt fits");
        assert_ne!(second, first);

        world.begin_tick(Duration::from_millis(16));
        world.finish_tick();
        let third = world
            .spawn(EntityKind::Dirt, CellCoord::new(2, 0), GAIA)
            .expect("dirt fits");
        assert_eq!(third, first);
    }

    #[test]
    fn change_kind_keeps_actor_and_dropped_collectable() {
        let mut world = world(4, 4);
        let coal = world
            .spawn(EntityKind::Coal, CellCoord::new(1, 1), GAIA)
            .expect("coal fits");
        assert!(world.enqueue(coal, ActionKind::Die, ActionPayload::None));
        assert!(world.set_capability(coal, Capability::Collectable, false));

        assert!(world.change_kind(coal, EntityKind::Iron));
        let entity = world.entity(coal).expect("still alive");
        assert!(entity.capabilities().contains(Capability::Actor));
        assert!(entity.capabilities().contains(Capability::Meltable));
        assert!(!entity.capabilities().contains(Capability::Collectable));
        assert!(world.entities_with(Capability::Coal).is_empty());
        assert!(!world.change_kind(EntityId::new(99), EntityKind::Dirt));
    }

    #[test]
    fn carried_entities_leave_the_spatial_index() {
        let mut world = world(6, 6);
        let truck = world
            .spawn(EntityKind::Truck, CellCoord::new(0, 0), PlayerId::new(1))
            .expect("truck fits");
        let dirt = world
            .spawn(EntityKind::Dirt, CellCoord::new(4, 4), GAIA)
            .expect("dirt fits");
        let stone = world
            .spawn(EntityKind::Stone, CellCoord::new(5, 5), GAIA)
            .expect("stone fits");

        assert!(!world.carry(truck, stone));
        assert!(world.carry(truck, dirt));
        assert!(world.entities_at(CellCoord::new(4, 4)).is_empty());
        assert!(world.collisions(dirt, CapabilitySet::EMPTY).is_empty());

        assert!(world.put_down(truck, dirt, CellCoord::new(3, 4)));
        assert_eq!(world.entities_at(CellCoord::new(3, 4)), vec![dirt]);
        assert!(world
            .entity(truck)
            .and_then(|e| e.holder.as_ref())
            .is_some_and(|cargo| cargo.held.is_empty()));
    }

    #[test]
    fn damage_queues_a_single_die() {
        let mut world = world(4, 4);
        let dirt = world
            .spawn(EntityKind::Dirt, CellCoord::new(0, 0), GAIA)
            .expect("dirt fits");
        assert!(world.damage(dirt, 6.0));
        assert!(world.damage(dirt, 6.0));
        assert!(world.damage(dirt, 6.0));

        let queue = world.entity(dirt).expect("alive").actions();
        assert_eq!(queue.len(), 1);
        assert!(queue.is_queued(ActionKind::Die, true));
        assert_eq!(world.entities_with(Capability::Actor), vec![dirt]);
    }

    #[test]
    fn first_tick_initialises_the_field_with_surface_light() {
        let mut world = world(3, 3);
        let _ = world.spawn(EntityKind::Stone, CellCoord::new(1, 1), GAIA);
        world.begin_tick(Duration::from_millis(16));
        world.finish_tick();
        world.begin_tick(Duration::from_millis(16));

        assert_eq!(query::substance(&world, CellCoord::new(1, 0), SubstanceKind::Light), 350.0);
        assert_eq!(query::substance(&world, CellCoord::new(1, 1), SubstanceKind::Light), 0.0);
        assert!(query::substance(&world, CellCoord::new(1, 2), SubstanceKind::Light) > 0.0);
    }

    #[test]
    fn collisions_filter_by_mask() {
        let mut world = world(4, 4);
        let bullet = world
            .spawn(EntityKind::Bullet, CellCoord::new(0, 0), PlayerId::new(1))
            .expect("bullet fits");
        let dirt = world
            .spawn(EntityKind::Dirt, CellCoord::new(1, 0), GAIA)
            .expect("dirt fits");
        let _base = world.spawn(EntityKind::Base, CellCoord::new(0, 1), GAIA);

        let mask = CapabilitySet::of(&[Capability::Terrain]);
        assert_eq!(world.collisions(bullet, mask), vec![dirt]);
    }
}
