//! Substance kinds, their immutable rule table, and the dense per-cell grid.

use serde::{Deserialize, Serialize};

use crate::{Capability, CapabilitySet, CellCoord, EntityKind, GridSize};

/// Blockers every substance respects.
const NON_MOLTEN_BLOCKERS: CapabilitySet =
    CapabilitySet::of(&[Capability::Terrain, Capability::Structure]);

/// Blockers respected by fluids, gases and steady-state fields.
const STANDARD_BLOCKERS: CapabilitySet = NON_MOLTEN_BLOCKERS.with(Capability::Mineral);

/// Named per-cell quantity simulated by the substance field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubstanceKind {
    /// Homing field emitted by the base.
    Colony,
    /// Sunlight flooding in from the surface.
    Light,
    /// Falling fluid.
    Water,
    /// Rising gas produced by boiling water.
    Steam,
    /// Falling fluid that combusts.
    Oil,
    /// Short-lived burning oil.
    HotOil,
    /// Rising gas that freezes into sulphur.
    SulphurDioxide,
    /// Falling particulate that melts.
    Sand,
    /// Molten sand that cools into glass.
    MoltenSand,
    /// Molten iron that cools into iron.
    MoltenIron,
    /// Molten steel that cools into steel.
    MoltenSteel,
    /// Thermal energy.
    Heat,
    /// Negative thermal energy.
    Cold,
}

/// Number of substance kinds.
pub const SUBSTANCE_COUNT: usize = 13;

impl SubstanceKind {
    /// Every substance kind in declaration order.
    pub const ALL: [SubstanceKind; SUBSTANCE_COUNT] = [
        SubstanceKind::Colony,
        SubstanceKind::Light,
        SubstanceKind::Water,
        SubstanceKind::Steam,
        SubstanceKind::Oil,
        SubstanceKind::HotOil,
        SubstanceKind::SulphurDioxide,
        SubstanceKind::Sand,
        SubstanceKind::MoltenSand,
        SubstanceKind::MoltenIron,
        SubstanceKind::MoltenSteel,
        SubstanceKind::Heat,
        SubstanceKind::Cold,
    ];

    /// Dense index of the kind.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Immutable rule data for the kind.
    #[must_use]
    pub const fn rule(self) -> SubstanceRule {
        match self {
            SubstanceKind::Colony => SubstanceRule {
                blocking: STANDARD_BLOCKERS.with(Capability::Coal),
                ..SubstanceRule::steady(350.0, 1.0)
            },
            SubstanceKind::Light => SubstanceRule {
                blocking: STANDARD_BLOCKERS
                    .with(Capability::Coal)
                    .with(Capability::Turbine),
                ..SubstanceRule::steady(350.0, 1.0)
            },
            SubstanceKind::Water => SubstanceRule {
                heat: Some(Transition {
                    threshold: 100.0,
                    target: SubstanceKind::Steam,
                    rate: 1.0 / 60.0,
                }),
                cool: Some(CoolTransition {
                    threshold: -100.0,
                    target: CoolTarget::Entity(EntityKind::Ice),
                    rate: 1.0,
                    min_concentration: 5.0,
                }),
                ..SubstanceRule::fluid(Drift::Falling, Viscosity::new(0.0, 0.5, 0.8))
            },
            SubstanceKind::Steam => SubstanceRule {
                cool: Some(CoolTransition {
                    threshold: 5.0,
                    target: CoolTarget::Substance(SubstanceKind::Water),
                    rate: 0.1,
                    min_concentration: 60.0,
                }),
                ..SubstanceRule::fluid(Drift::Rising, Viscosity::new(0.0, 0.3, 0.66))
            },
            SubstanceKind::Oil => SubstanceRule {
                blocking: STANDARD_BLOCKERS.with(Capability::Coal),
                heat: Some(Transition {
                    threshold: 10.0,
                    target: SubstanceKind::SulphurDioxide,
                    rate: 0.02,
                }),
                combustion: Some(Transition {
                    threshold: 126.0,
                    target: SubstanceKind::HotOil,
                    rate: 1.0,
                }),
                ..SubstanceRule::fluid(Drift::Falling, Viscosity::new(0.0, 0.8, 0.9))
            },
            SubstanceKind::HotOil => SubstanceRule {
                blocking: STANDARD_BLOCKERS.with(Capability::Coal),
                decay_rate: 1.0,
                ..SubstanceRule::fluid(Drift::Falling, Viscosity::new(0.0, 0.5, 0.8))
            },
            SubstanceKind::SulphurDioxide => SubstanceRule {
                cool: Some(CoolTransition {
                    threshold: -5.0,
                    target: CoolTarget::Entity(EntityKind::Sulphur),
                    rate: 1.0,
                    min_concentration: 80.0,
                }),
                ..SubstanceRule::fluid(Drift::Rising, Viscosity::new(0.0, 0.3, 0.66))
            },
            SubstanceKind::Sand => SubstanceRule {
                blocking: STANDARD_BLOCKERS.with(Capability::Coal),
                blocking_substances: &[SubstanceKind::MoltenSand],
                heat: Some(Transition {
                    threshold: 100.0,
                    target: SubstanceKind::MoltenSand,
                    rate: 1.0,
                }),
                ..SubstanceRule::fluid(Drift::Falling, Viscosity::new(0.0, 0.5, 1.0))
            },
            SubstanceKind::MoltenSand => SubstanceRule {
                blocking_substances: &[
                    SubstanceKind::Sand,
                    SubstanceKind::MoltenIron,
                    SubstanceKind::MoltenSteel,
                ],
                cool: Some(CoolTransition {
                    threshold: 5.0,
                    target: CoolTarget::Entity(EntityKind::Glass),
                    rate: 1.0,
                    min_concentration: 9.0,
                }),
                ..SubstanceRule::fluid(Drift::Falling, Viscosity::new(0.0, 0.5, 0.8))
            },
            SubstanceKind::MoltenIron => SubstanceRule {
                blocking_substances: &[
                    SubstanceKind::MoltenSteel,
                    SubstanceKind::MoltenSand,
                    SubstanceKind::Sand,
                ],
                cool: Some(CoolTransition {
                    threshold: 80.0,
                    target: CoolTarget::Entity(EntityKind::Iron),
                    rate: 1.0,
                    min_concentration: 0.0,
                }),
                ..SubstanceRule::fluid(Drift::Falling, Viscosity::new(0.0, 0.0, 1.0))
            },
            SubstanceKind::MoltenSteel => SubstanceRule {
                capacity: 240.0,
                decay_amount: 240.0,
                blocking_substances: &[
                    SubstanceKind::MoltenIron,
                    SubstanceKind::MoltenSand,
                    SubstanceKind::Sand,
                ],
                cool: Some(CoolTransition {
                    threshold: 90.0,
                    target: CoolTarget::Entity(EntityKind::Steel),
                    rate: 1.0,
                    min_concentration: 0.0,
                }),
                ..SubstanceRule::fluid(Drift::Falling, Viscosity::new(0.0, 0.0, 1.0))
            },
            SubstanceKind::Heat => SubstanceRule::thermal(150.0, 15.0),
            SubstanceKind::Cold => SubstanceRule::thermal(120.0, 12.0),
        }
    }
}

/// Vertical bias applied when a substance spreads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Drift {
    /// Spreads evenly to all neighbours.
    None,
    /// Prefers cells above.
    Rising,
    /// Prefers cells below.
    Falling,
}

/// Fractions retained by a cell when spreading in each direction class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viscosity {
    /// Retained fraction when spreading straight up or down.
    pub vertical: f64,
    /// Retained fraction when spreading diagonally.
    pub diagonal: f64,
    /// Retained fraction when spreading sideways.
    pub horizontal: f64,
}

impl Viscosity {
    /// Creates a viscosity profile.
    #[must_use]
    pub const fn new(vertical: f64, diagonal: f64, horizontal: f64) -> Self {
        Self {
            vertical,
            diagonal,
            horizontal,
        }
    }
}

/// Substance-to-substance conversion triggered by temperature.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Temperature at or above which the conversion runs.
    pub threshold: f64,
    /// Substance produced.
    pub target: SubstanceKind,
    /// Fraction of the quantity converted per pass.
    pub rate: f64,
}

/// Product of a cooling transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoolTarget {
    /// Condenses into another substance.
    Substance(SubstanceKind),
    /// Condenses into an entity spawned by the main thread.
    Entity(EntityKind),
}

/// Conversion triggered when a cell is cold enough.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoolTransition {
    /// Temperature at or below which the conversion runs.
    pub threshold: f64,
    /// Product of the conversion.
    pub target: CoolTarget,
    /// Fraction of the quantity converted per pass.
    pub rate: f64,
    /// Quantity required before the conversion starts.
    pub min_concentration: f64,
}

/// Immutable rule data of one substance kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubstanceRule {
    /// Largest quantity a cell may hold.
    pub capacity: f64,
    /// Quantity lost per decay step, or per flood fill step for steady-state kinds.
    pub decay_amount: f64,
    /// Multiplier applied to the decay amount each pass.
    pub decay_rate: f64,
    /// Retained fractions when spreading, if the substance is a fluid.
    pub viscosity: Option<Viscosity>,
    /// Vertical bias when spreading.
    pub drift: Drift,
    /// Dispersing substances diffuse and decay; the rest are flood filled.
    pub dispersing: bool,
    /// Entity capabilities that keep the substance out of a cell.
    pub blocking: CapabilitySet,
    /// Substances whose presence keeps this one out of a cell.
    pub blocking_substances: &'static [SubstanceKind],
    /// Conversion when hot.
    pub heat: Option<Transition>,
    /// Conversion when very hot.
    pub combustion: Option<Transition>,
    /// Conversion when cold.
    pub cool: Option<CoolTransition>,
}

impl SubstanceRule {
    const fn steady(capacity: f64, falloff: f64) -> Self {
        Self {
            capacity,
            decay_amount: falloff,
            decay_rate: 0.0,
            viscosity: None,
            drift: Drift::None,
            dispersing: false,
            blocking: STANDARD_BLOCKERS,
            blocking_substances: &[],
            heat: None,
            combustion: None,
            cool: None,
        }
    }

    const fn fluid(drift: Drift, viscosity: Viscosity) -> Self {
        Self {
            capacity: 120.0,
            decay_amount: 120.0,
            decay_rate: 0.0005,
            viscosity: Some(viscosity),
            drift,
            dispersing: true,
            blocking: STANDARD_BLOCKERS,
            blocking_substances: &[],
            heat: None,
            combustion: None,
            cool: None,
        }
    }

    const fn thermal(capacity: f64, decay_amount: f64) -> Self {
        Self {
            capacity,
            decay_amount,
            decay_rate: 1.0,
            viscosity: None,
            drift: Drift::None,
            dispersing: true,
            blocking: NON_MOLTEN_BLOCKERS,
            blocking_substances: &[],
            heat: None,
            combustion: None,
            cool: None,
        }
    }

    /// Reports whether the substance moves like a fluid.
    #[must_use]
    pub const fn is_fluid(&self) -> bool {
        self.viscosity.is_some()
    }

    /// Quantity removed from each cell per decay pass.
    #[must_use]
    pub fn decay_per_pass(&self) -> f64 {
        if self.dispersing {
            self.decay_amount * self.decay_rate
        } else {
            0.0
        }
    }
}

/// Dense grid of substance quantities indexed by cell and kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubstanceGrid {
    size: GridSize,
    quantities: Vec<f64>,
}

impl SubstanceGrid {
    /// Creates an empty grid.
    #[must_use]
    pub fn new(size: GridSize) -> Self {
        Self {
            size,
            quantities: vec![0.0; size.cell_count() * SUBSTANCE_COUNT],
        }
    }

    /// Dimensions of the grid.
    #[must_use]
    pub const fn size(&self) -> GridSize {
        self.size
    }

    /// Quantity of the kind in the cell; zero when out of bounds.
    #[must_use]
    pub fn get(&self, cell: CellCoord, kind: SubstanceKind) -> f64 {
        self.size
            .index(cell)
            .map_or(0.0, |index| self.at(index, kind))
    }

    /// Quantity of the kind at a row-major cell index.
    #[must_use]
    pub fn at(&self, index: usize, kind: SubstanceKind) -> f64 {
        self.quantities
            .get(index * SUBSTANCE_COUNT + kind.index())
            .copied()
            .unwrap_or(0.0)
    }

    /// Overwrites the quantity of the kind in the cell, clamped to be non-negative.
    pub fn set(&mut self, cell: CellCoord, kind: SubstanceKind, quantity: f64) {
        if let Some(index) = self.size.index(cell) {
            self.set_at(index, kind, quantity);
        }
    }

    /// Overwrites the quantity at a row-major cell index, clamped to be non-negative.
    pub fn set_at(&mut self, index: usize, kind: SubstanceKind, quantity: f64) {
        if let Some(slot) = self.quantities.get_mut(index * SUBSTANCE_COUNT + kind.index()) {
            *slot = quantity.max(0.0);
        }
    }

    /// Adds to the quantity at a row-major cell index, clamped to be non-negative.
    pub fn add_at(&mut self, index: usize, kind: SubstanceKind, delta: f64) {
        if let Some(slot) = self.quantities.get_mut(index * SUBSTANCE_COUNT + kind.index()) {
            *slot = (*slot + delta).max(0.0);
        }
    }

    /// Temperature of a cell: heat minus cold.
    #[must_use]
    pub fn temperature(&self, cell: CellCoord) -> f64 {
        self.get(cell, SubstanceKind::Heat) - self.get(cell, SubstanceKind::Cold)
    }

    /// Sum of the kind's quantity across all cells.
    #[must_use]
    pub fn total(&self, kind: SubstanceKind) -> f64 {
        self.quantities
            .iter()
            .skip(kind.index())
            .step_by(SUBSTANCE_COUNT)
            .sum()
    }
}
