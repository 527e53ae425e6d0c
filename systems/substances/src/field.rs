//! Authoritative substance field and the solver passes that evolve it.

use std::collections::BTreeMap;

use kiln_core::{
    BlockerSeed, CapabilitySet, CellCoord, Condensation, CoolTarget, Drift, EmitterSeed, EntityId,
    FieldCommand, FieldReport, FieldSource, GridSize, SubstanceGrid, SubstanceKind, TurbineSeed,
    SUBSTANCE_COUNT,
};

use crate::flood;

/// Quantities at or below this are treated as absent.
pub(crate) const EPSILON: f64 = 1e-9;

/// Rotor speeds below this are reported as stopped.
const TURBINE_STALL: f64 = 0.001;

#[derive(Clone, Copy, Debug)]
struct Turbine {
    seed: TurbineSeed,
    speed: f64,
}

/// Substance quantities plus everything the solver needs to evolve them.
#[derive(Debug)]
pub struct Field {
    grid: SubstanceGrid,
    cell_blockers: Vec<Vec<(EntityId, CapabilitySet)>>,
    blockers: BTreeMap<EntityId, BlockerSeed>,
    emitters: BTreeMap<EntityId, EmitterSeed>,
    turbines: BTreeMap<EntityId, Turbine>,
    condensations: Vec<Condensation>,
}

impl Field {
    /// Creates an empty field covering the grid.
    #[must_use]
    pub fn new(size: GridSize) -> Self {
        Self {
            grid: SubstanceGrid::new(size),
            cell_blockers: vec![Vec::new(); size.cell_count()],
            blockers: BTreeMap::new(),
            emitters: BTreeMap::new(),
            turbines: BTreeMap::new(),
            condensations: Vec::new(),
        }
    }

    /// Current quantities.
    #[must_use]
    pub fn grid(&self) -> &SubstanceGrid {
        &self.grid
    }

    /// Latest rotor speed of a turbine.
    #[must_use]
    pub fn turbine_speed(&self, entity: EntityId) -> Option<f64> {
        self.turbines.get(&entity).map(|turbine| turbine.speed)
    }

    /// Executes a single command.
    pub fn apply(&mut self, command: FieldCommand) {
        match command {
            FieldCommand::Init {
                columns,
                rows,
                quantities,
                blockers,
                emitters,
                turbines,
            } => self.init(GridSize::new(columns, rows), quantities, blockers, emitters, turbines),
            FieldCommand::DispersePheromones => self.disperse(),
            FieldCommand::FloodFill { sources } => self.flood_fill(&sources),
            FieldCommand::ReverseFloodFill { sources } => self.reverse_flood_fill(&sources),
            FieldCommand::ChangeEmitterType { entity, kind } => {
                if let Some(emitter) = self.emitters.get_mut(&entity) {
                    emitter.kind = kind;
                } else {
                    tracing::trace!(entity = entity.get(), "emitter type change for unknown entity");
                }
            }
            FieldCommand::RegisterEmitter(seed) => {
                let _ = self.emitters.insert(seed.entity, seed);
                self.set_emitter_quantity(seed.entity, seed.cell, seed.quantity);
            }
            FieldCommand::SetEmitterQuantity {
                entity,
                cell,
                quantity,
            } => self.set_emitter_quantity(entity, cell, quantity),
            FieldCommand::SetQuantity {
                cell,
                kind,
                quantity,
            } => self.grid.set(cell, kind, quantity.min(kind.rule().capacity)),
            FieldCommand::Deposit {
                cell,
                kind,
                quantity,
            } => self.deposit(cell, kind, quantity),
            FieldCommand::TrackBlocker(seed) => self.track_blocker(seed),
            FieldCommand::TrackTurbine(seed) => {
                let speed = self
                    .turbines
                    .get(&seed.entity)
                    .map_or(0.0, |turbine| turbine.speed);
                let _ = self.turbines.insert(seed.entity, Turbine { seed, speed });
            }
            FieldCommand::ForgetEntity { entity } => self.forget(entity),
        }
    }

    /// Builds a report and clears the accumulated condensations.
    pub fn take_report(&mut self) -> FieldReport {
        FieldReport {
            snapshot: self.grid.clone(),
            condensations: std::mem::take(&mut self.condensations),
            turbine_speeds: self
                .turbines
                .iter()
                .map(|(entity, turbine)| (*entity, turbine.speed))
                .collect(),
        }
    }

    fn init(
        &mut self,
        size: GridSize,
        quantities: SubstanceGrid,
        blockers: Vec<BlockerSeed>,
        emitters: Vec<EmitterSeed>,
        turbines: Vec<TurbineSeed>,
    ) {
        *self = Field::new(size);
        if quantities.size() == size {
            self.grid = quantities;
        } else {
            tracing::warn!(
                columns = size.columns(),
                rows = size.rows(),
                "initial quantities do not match the grid, starting empty"
            );
        }
        for seed in blockers {
            self.track_blocker(seed);
        }
        for seed in emitters {
            let _ = self.emitters.insert(seed.entity, seed);
        }
        for seed in turbines {
            let _ = self
                .turbines
                .insert(seed.entity, Turbine { seed, speed: 0.0 });
        }
        tracing::debug!(
            columns = size.columns(),
            rows = size.rows(),
            blockers = self.blockers.len(),
            emitters = self.emitters.len(),
            "substance field initialised"
        );
    }

    fn set_emitter_quantity(&mut self, entity: EntityId, cell: CellCoord, quantity: f64) {
        let Some(emitter) = self.emitters.get_mut(&entity) else {
            tracing::trace!(entity = entity.get(), "quantity update for unknown emitter");
            return;
        };
        emitter.cell = cell;
        emitter.quantity = quantity;
        if quantity <= EPSILON {
            return;
        }
        let kind = emitter.kind;
        let rule = kind.rule();
        if rule.dispersing {
            let current = self.grid.get(cell, kind);
            self.grid
                .set(cell, kind, current.max(quantity.min(rule.capacity)));
        } else {
            self.flood_fill(&[FieldSource {
                cell,
                kind,
                quantity,
            }]);
        }
    }

    fn deposit(&mut self, cell: CellCoord, kind: SubstanceKind, quantity: f64) {
        let capacity = kind.rule().capacity;
        let current = self.grid.get(cell, kind);
        if current >= capacity {
            return;
        }
        self.grid
            .set(cell, kind, (current + quantity).min(capacity));
    }

    fn track_blocker(&mut self, seed: BlockerSeed) {
        self.release_blocker(seed.entity);
        let size = self.grid.size();
        for cell in seed.footprint.cells() {
            if let Some(index) = size.index(cell) {
                self.cell_blockers[index].push((seed.entity, seed.capabilities));
            }
        }
        let _ = self.blockers.insert(seed.entity, seed);
    }

    fn release_blocker(&mut self, entity: EntityId) {
        let Some(previous) = self.blockers.remove(&entity) else {
            return;
        };
        let size = self.grid.size();
        for cell in previous.footprint.cells() {
            if let Some(index) = size.index(cell) {
                self.cell_blockers[index].retain(|(id, _)| *id != entity);
            }
        }
    }

    fn forget(&mut self, entity: EntityId) {
        self.release_blocker(entity);
        let _ = self.emitters.remove(&entity);
        let _ = self.turbines.remove(&entity);
    }

    /// Union of the capabilities of every blocker covering the cell.
    pub(crate) fn cell_capabilities(&self, index: usize) -> CapabilitySet {
        self.cell_blockers
            .get(index)
            .map(|entries| {
                entries
                    .iter()
                    .fold(CapabilitySet::EMPTY, |set, (_, caps)| set.union(*caps))
            })
            .unwrap_or_default()
    }

    /// Reports whether no blocker in the cell keeps the kind out.
    pub(crate) fn capability_admits(&self, index: usize, kind: SubstanceKind) -> bool {
        !self
            .cell_capabilities(index)
            .intersects(kind.rule().blocking)
    }

    /// Reports whether the kind may enter the cell given the reference quantities.
    fn admits(&self, reference: &SubstanceGrid, index: usize, kind: SubstanceKind) -> bool {
        self.capability_admits(index, kind)
            && kind
                .rule()
                .blocking_substances
                .iter()
                .all(|blocker| reference.at(index, *blocker) <= EPSILON)
    }

    fn disperse(&mut self) {
        self.decay();
        let inflow = self.diffuse();
        self.update_turbines(&inflow);
        self.transition();
    }

    fn decay(&mut self) {
        let cells = self.grid.size().cell_count();
        for kind in SubstanceKind::ALL {
            let amount = kind.rule().decay_per_pass();
            if amount <= 0.0 {
                continue;
            }
            for index in 0..cells {
                let quantity = self.grid.at(index, kind);
                if quantity > 0.0 {
                    self.grid.set_at(index, kind, quantity - amount);
                }
            }
        }
    }

    /// Spreads every dispersing kind once and returns fluid inflow per cell.
    fn diffuse(&mut self) -> Vec<f64> {
        let size = self.grid.size();
        let cells = size.cell_count();
        let snapshot = self.grid.clone();
        let mut deltas = vec![0.0; cells * SUBSTANCE_COUNT];
        let mut incoming = vec![0.0; cells * SUBSTANCE_COUNT];
        let mut fluid_inflow = vec![0.0; cells];

        for kind in SubstanceKind::ALL {
            let rule = kind.rule();
            if !rule.dispersing {
                continue;
            }
            let slot = kind.index();
            for index in 0..cells {
                let quantity = snapshot.at(index, kind);
                if quantity <= EPSILON {
                    continue;
                }
                let Some(cell) = size.cell_at(index) else {
                    continue;
                };
                for tier in tiers(rule.drift) {
                    let receivers: Vec<usize> = tier
                        .offsets
                        .iter()
                        .filter_map(|(dx, dy)| cell.offset(*dx, *dy))
                        .filter_map(|neighbor| size.index(neighbor))
                        .filter(|neighbor| self.admits(&snapshot, *neighbor, kind))
                        .filter(|neighbor| {
                            room(&snapshot, &incoming, *neighbor, kind, rule.capacity) > EPSILON
                        })
                        .collect();
                    if receivers.is_empty() {
                        continue;
                    }
                    let retained = match rule.viscosity {
                        Some(viscosity) => match tier.class {
                            TierClass::Vertical => viscosity.vertical,
                            TierClass::Diagonal => viscosity.diagonal,
                            TierClass::Horizontal | TierClass::Surrounding => viscosity.horizontal,
                        },
                        None => 1.0 / (receivers.len() as f64 + 1.0),
                    };
                    let share = quantity * (1.0 - retained) / receivers.len() as f64;
                    for receiver in receivers {
                        let moved =
                            share.min(room(&snapshot, &incoming, receiver, kind, rule.capacity));
                        if moved <= 0.0 {
                            continue;
                        }
                        deltas[receiver * SUBSTANCE_COUNT + slot] += moved;
                        incoming[receiver * SUBSTANCE_COUNT + slot] += moved;
                        deltas[index * SUBSTANCE_COUNT + slot] -= moved;
                        if rule.is_fluid() {
                            fluid_inflow[receiver] += moved;
                        }
                    }
                    break;
                }
            }
        }

        for index in 0..cells {
            for kind in SubstanceKind::ALL {
                let delta = deltas[index * SUBSTANCE_COUNT + kind.index()];
                if delta != 0.0 {
                    self.grid.add_at(index, kind, delta);
                }
            }
        }
        fluid_inflow
    }

    fn update_turbines(&mut self, inflow: &[f64]) {
        let size = self.grid.size();
        for turbine in self.turbines.values_mut() {
            let flow: f64 = turbine
                .seed
                .footprint
                .cells()
                .filter_map(|cell| size.index(cell))
                .filter_map(|index| inflow.get(index))
                .sum();
            let speed = (flow * turbine.seed.flow_gain).min(turbine.seed.max_speed);
            turbine.speed = if speed < TURBINE_STALL { 0.0 } else { speed };
        }
    }

    fn transition(&mut self) {
        let size = self.grid.size();
        for index in 0..size.cell_count() {
            let temperature =
                self.grid.at(index, SubstanceKind::Heat) - self.grid.at(index, SubstanceKind::Cold);
            for kind in SubstanceKind::ALL {
                let quantity = self.grid.at(index, kind);
                if quantity <= EPSILON {
                    continue;
                }
                let rule = kind.rule();
                let warm = rule
                    .combustion
                    .filter(|transition| temperature >= transition.threshold)
                    .or_else(|| {
                        rule.heat
                            .filter(|transition| temperature >= transition.threshold)
                    });
                if let Some(transition) = warm {
                    let amount = (quantity * transition.rate).min(quantity);
                    self.grid.add_at(index, kind, -amount);
                    self.grid.add_at(index, transition.target, amount);
                    continue;
                }
                let Some(cool) = rule.cool else {
                    continue;
                };
                if temperature > cool.threshold || quantity < cool.min_concentration {
                    continue;
                }
                let amount = (quantity * cool.rate).min(quantity);
                self.grid.add_at(index, kind, -amount);
                match cool.target {
                    CoolTarget::Substance(target) => self.grid.add_at(index, target, amount),
                    CoolTarget::Entity(entity) => {
                        if let Some(cell) = size.cell_at(index) {
                            self.condensations.push(Condensation { cell, kind: entity });
                        }
                    }
                }
            }
        }
    }

    fn flood_fill(&mut self, sources: &[FieldSource]) {
        let mut grid = std::mem::replace(&mut self.grid, SubstanceGrid::new(GridSize::new(0, 0)));
        flood::fill(self, &mut grid, sources);
        self.grid = grid;
    }

    fn reverse_flood_fill(&mut self, sources: &[FieldSource]) {
        let mut grid = std::mem::replace(&mut self.grid, SubstanceGrid::new(GridSize::new(0, 0)));
        let mut survivors = flood::retract(self, &mut grid, sources);
        for emitter in self.emitters.values() {
            let rule = emitter.kind.rule();
            let retracted = sources.iter().any(|source| source.kind == emitter.kind);
            if !rule.dispersing && retracted && emitter.quantity > EPSILON {
                survivors.push(FieldSource {
                    cell: emitter.cell,
                    kind: emitter.kind,
                    quantity: emitter.quantity,
                });
            }
        }
        flood::fill(self, &mut grid, &survivors);
        self.grid = grid;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TierClass {
    Vertical,
    Diagonal,
    Horizontal,
    Surrounding,
}

#[derive(Clone, Copy, Debug)]
struct Tier {
    class: TierClass,
    offsets: &'static [(i64, i64)],
}

const SIDEWAYS: Tier = Tier {
    class: TierClass::Horizontal,
    offsets: &[(-1, 0), (1, 0)],
};

const FALLING: [Tier; 3] = [
    Tier {
        class: TierClass::Vertical,
        offsets: &[(0, 1)],
    },
    Tier {
        class: TierClass::Diagonal,
        offsets: &[(-1, 1), (1, 1)],
    },
    SIDEWAYS,
];

const RISING: [Tier; 3] = [
    Tier {
        class: TierClass::Vertical,
        offsets: &[(0, -1)],
    },
    Tier {
        class: TierClass::Diagonal,
        offsets: &[(-1, -1), (1, -1)],
    },
    SIDEWAYS,
];

const SURROUNDING: [Tier; 1] = [Tier {
    class: TierClass::Surrounding,
    offsets: &[
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ],
}];

/// Direction tiers in priority order; row zero is the surface.
fn tiers(drift: Drift) -> &'static [Tier] {
    match drift {
        Drift::Falling => &FALLING,
        Drift::Rising => &RISING,
        Drift::None => &SURROUNDING,
    }
}

fn room(
    snapshot: &SubstanceGrid,
    incoming: &[f64],
    index: usize,
    kind: SubstanceKind,
    capacity: f64,
) -> f64 {
    let pending = incoming
        .get(index * SUBSTANCE_COUNT + kind.index())
        .copied()
        .unwrap_or(0.0);
    (capacity - snapshot.at(index, kind) - pending).max(0.0)
}
