//! Immutable per-kind defaults used by the entity factories.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use kiln_core::{
    ActionKind, ActionTiming, Capability, CapabilitySet, CellRectSize, EntityKind, SubstanceKind,
};

/// Goal of an agent that selects the substance weights used to score moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Roam without any substance preference.
    Wander,
    /// Head toward the colony field emitted by bases.
    Return,
    /// Head toward lit cells near the surface.
    Explore,
}

/// Weights used by the agent decision policy for one task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TaskWeights {
    /// Task the weights belong to.
    pub task: Task,
    /// Score every candidate starts from and is floored at.
    pub base: f64,
    /// Added when the candidate is the previously occupied cell.
    pub prev_position_penalty: f64,
    /// Added when the candidate continues a straight line.
    pub forward_movement_bonus: f64,
    /// Weight applied to the substance gradient, per substance.
    pub substances: &'static [(SubstanceKind, f64)],
}

impl TaskWeights {
    /// Weight applied to the gradient of the given substance.
    #[must_use]
    pub fn weight(&self, kind: SubstanceKind) -> f64 {
        self.substances
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map_or(0.0, |(_, weight)| *weight)
    }
}

/// Movement rules of an agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentProfile {
    /// Capabilities of entities the agent cannot move through.
    pub blocking: CapabilitySet,
    /// Segmented bodies never move diagonally.
    pub segmented: bool,
    /// Tasks the agent can perform; empty for vehicles driven by the player.
    pub tasks: &'static [TaskWeights],
}

impl AgentProfile {
    /// Weights for a task, if the agent knows it.
    #[must_use]
    pub fn task(&self, task: Task) -> Option<&TaskWeights> {
        self.tasks.iter().find(|weights| weights.task == task)
    }
}

/// Aiming and firing parameters of a turret.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurretProfile {
    /// Lowest aim angle.
    pub min_theta: f64,
    /// Highest aim angle.
    pub max_theta: f64,
    /// Angular acceleration applied per tick.
    pub theta_accel: f64,
    /// Largest angular velocity.
    pub max_theta_speed: f64,
    /// Turrets that snap straight to the bearing instead of slewing.
    pub snaps: bool,
    /// Projectile launched by each shot.
    pub projectile: EntityKind,
    /// Shots fired before a cooldown is queued, if the turret overheats.
    pub shots_till_cooldown: Option<u32>,
    /// Resources deducted from the owner for every shot.
    pub launch_cost: &'static [(EntityKind, f64)],
    /// Launch speed overriding the projectile default.
    pub launch_velocity: Option<f64>,
}

/// Trajectory and impact parameters of a projectile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BallisticProfile {
    /// Launch speed.
    pub velocity: f64,
    /// Damage applied to every entity hit.
    pub damage: f64,
    /// Capabilities of entities the projectile collides with.
    pub blocking: CapabilitySet,
    /// Piercing projectiles keep flying while they have hit points left.
    pub piercing: bool,
    /// Probability that a hit is ignored.
    pub miss_rate: f64,
}

/// Substance injected by an emitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmitterProfile {
    /// Substance injected.
    pub kind: SubstanceKind,
    /// Quantity injected on each refresh while active.
    pub quantity: f64,
    /// Ticks between refreshes.
    pub refresh_interval: Option<u64>,
    /// Whether the emitter starts emitting as soon as it is created.
    pub active: bool,
}

/// Ignition and burning parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlammableProfile {
    /// Temperature at which the entity catches fire.
    pub combustion_temp: f64,
    /// Burn time.
    pub fuel: Duration,
    /// Heat emitted while burning.
    pub heat_quantity: f64,
}

/// Melting parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeltableProfile {
    /// Temperature at which the entity melts.
    pub melt_temp: f64,
    /// Substance produced when it differs from the one already emitted.
    pub melt_kind: Option<SubstanceKind>,
    /// Quantity produced by melting an undamaged entity.
    pub heat_quantity: f64,
}

/// Detonation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExplosiveProfile {
    /// Half side of the blast square in cells.
    pub radius: u32,
    /// Damage dealt to every entity in the blast.
    pub damage: f64,
    /// Heat deposited into every blast cell.
    pub heat: f64,
    /// Age after which the explosive detonates on its own.
    pub timer: Option<Duration>,
}

/// How a generator produces power.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeneratorSource {
    /// Spun by fluid; produces only while the rotor turns.
    Turbine {
        /// Largest rotor speed.
        max_speed: f64,
    },
    /// Produces in proportion to the light in its cell.
    Solar,
}

/// Power production parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneratorProfile {
    /// Output at full speed or full light.
    pub power: f64,
    /// Production mechanism.
    pub source: GeneratorSource,
}

/// Carrying parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HolderProfile {
    /// Largest number of carried entities.
    pub max_hold: usize,
    /// Kinds that can be lifted.
    pub pickup: &'static [EntityKind],
}

/// Immutable defaults of an entity kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blueprint {
    /// Kind described by the blueprint.
    pub kind: EntityKind,
    /// Footprint size.
    pub size: CellRectSize,
    /// Starting hit points.
    pub hp: f64,
    /// Capabilities granted by the kind.
    pub capabilities: CapabilitySet,
    /// Timing of the actions the kind performs.
    pub actions: &'static [(ActionKind, ActionTiming)],
    /// Movement rules.
    pub agent: Option<AgentProfile>,
    /// Aiming rules.
    pub turret: Option<TurretProfile>,
    /// Trajectory rules.
    pub ballistic: Option<BallisticProfile>,
    /// Emission rules.
    pub emitter: Option<EmitterProfile>,
    /// Burning rules.
    pub flammable: Option<FlammableProfile>,
    /// Melting rules.
    pub meltable: Option<MeltableProfile>,
    /// Detonation rules.
    pub explosive: Option<ExplosiveProfile>,
    /// Power production.
    pub generator: Option<GeneratorProfile>,
    /// Power drawn, if the kind consumes power.
    pub power_consumed: Option<f64>,
    /// Carrying rules.
    pub holder: Option<HolderProfile>,
    /// Resource credited instead of the kind itself when collected.
    pub collected_as: Option<EntityKind>,
}

/// Fallback timing used for actions a blueprint does not list.
pub const DEFAULT_TIMING: ActionTiming = ActionTiming::immediate(Duration::from_millis(1));

impl Blueprint {
    const fn base(kind: EntityKind, hp: f64, capabilities: CapabilitySet) -> Self {
        Self {
            kind,
            size: CellRectSize::new(1, 1),
            hp,
            capabilities,
            actions: &[],
            agent: None,
            turret: None,
            ballistic: None,
            emitter: None,
            flammable: None,
            meltable: None,
            explosive: None,
            generator: None,
            power_consumed: None,
            holder: None,
            collected_as: None,
        }
    }

    /// Timing of an action performed by this kind.
    #[must_use]
    pub fn timing(&self, kind: ActionKind) -> ActionTiming {
        self.actions
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map_or(DEFAULT_TIMING, |(_, timing)| *timing)
    }
}

const fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

const fn caps(tags: &[Capability]) -> CapabilitySet {
    CapabilitySet::of(tags)
}

const RESOURCE: CapabilitySet = caps(&[Capability::Mineral, Capability::Collectable]);

const TILE_ACTIONS: &[(ActionKind, ActionTiming)] =
    &[(ActionKind::Die, ActionTiming::immediate(millis(2)))];

const AGENT_ACTIONS: &[(ActionKind, ActionTiming)] = &[
    (ActionKind::Move, ActionTiming::immediate(millis(41 * 4))),
    (ActionKind::MoveTurn, ActionTiming::immediate(millis(41 * 5))),
    (ActionKind::Turn, ActionTiming::immediate(millis(41 * 3))),
    (ActionKind::Pickup, ActionTiming::immediate(millis(41 * 4))),
    (ActionKind::Putdown, ActionTiming::immediate(millis(41 * 4))),
    (ActionKind::Die, ActionTiming::immediate(millis(41 * 2))),
];

const TRUCK_ACTIONS: &[(ActionKind, ActionTiming)] = &[
    (ActionKind::Move, ActionTiming::immediate(millis(41 * 6))),
    (ActionKind::MoveTurn, ActionTiming::immediate(millis(41 * 8))),
    (ActionKind::Turn, ActionTiming::immediate(millis(41 * 10))),
    (ActionKind::Pickup, ActionTiming::immediate(millis(41 * 4))),
    (ActionKind::Putdown, ActionTiming::immediate(millis(41 * 4))),
    (ActionKind::Die, ActionTiming::immediate(millis(41 * 2))),
];

const BASIC_TURRET_ACTIONS: &[(ActionKind, ActionTiming)] = &[
    (ActionKind::Shoot, ActionTiming::immediate(millis(1000))),
    (ActionKind::Die, ActionTiming::immediate(millis(2))),
];

const FAST_TURRET_ACTIONS: &[(ActionKind, ActionTiming)] = &[
    (ActionKind::Shoot, ActionTiming::immediate(millis(150))),
    (ActionKind::Cooldown, ActionTiming::immediate(millis(2000))),
    (ActionKind::Die, ActionTiming::immediate(millis(2))),
];

const MISSILE_TURRET_ACTIONS: &[(ActionKind, ActionTiming)] = &[
    (ActionKind::Shoot, ActionTiming::immediate(millis(4000))),
    (ActionKind::Die, ActionTiming::immediate(millis(2))),
];

const PROJECTILE_ACTIONS: &[(ActionKind, ActionTiming)] =
    &[(ActionKind::Die, ActionTiming::immediate(millis(1)))];

const DYNAMITE_ACTIONS: &[(ActionKind, ActionTiming)] =
    &[(ActionKind::Die, ActionTiming::deferred(millis(3000)))];

const AGENT_TASKS: &[TaskWeights] = &[
    TaskWeights {
        task: Task::Wander,
        base: 1.0,
        prev_position_penalty: -1.0,
        forward_movement_bonus: 2.0,
        substances: &[],
    },
    TaskWeights {
        task: Task::Return,
        base: 0.0,
        prev_position_penalty: -10.0,
        forward_movement_bonus: 0.0,
        substances: &[(SubstanceKind::Colony, 2.0), (SubstanceKind::Heat, -1.0)],
    },
    TaskWeights {
        task: Task::Explore,
        base: 1.0,
        prev_position_penalty: -5.0,
        forward_movement_bonus: 1.0,
        substances: &[(SubstanceKind::Light, 1.0), (SubstanceKind::Heat, -1.0)],
    },
];

const WALKER_BLOCKERS: CapabilitySet = caps(&[
    Capability::Terrain,
    Capability::Mineral,
    Capability::Coal,
    Capability::Structure,
    Capability::Agent,
]);

const TURRET_BASE: TurretProfile = TurretProfile {
    min_theta: 0.2,
    max_theta: std::f64::consts::PI - 0.2,
    theta_accel: 0.000_05,
    max_theta_speed: 0.04,
    snaps: false,
    projectile: EntityKind::Bullet,
    shots_till_cooldown: None,
    launch_cost: &[],
    launch_velocity: None,
};

/// Returns the blueprint of an entity kind.
#[must_use]
pub fn blueprint(kind: EntityKind) -> Blueprint {
    match kind {
        EntityKind::Dirt => Blueprint::base(
            kind,
            10.0,
            caps(&[Capability::Terrain, Capability::Collectable]),
        )
        .with_actions(TILE_ACTIONS),
        EntityKind::Stone => {
            Blueprint::base(kind, 100.0, caps(&[Capability::Terrain])).with_actions(TILE_ACTIONS)
        }
        EntityKind::Coal => Blueprint {
            emitter: Some(EmitterProfile {
                kind: SubstanceKind::Heat,
                quantity: 150.0,
                refresh_interval: Some(60),
                active: false,
            }),
            flammable: Some(FlammableProfile {
                combustion_temp: 125.0,
                fuel: millis(3 * 60 * 1000),
                heat_quantity: 150.0,
            }),
            collected_as: None,
            ..Blueprint::base(
                kind,
                10.0,
                caps(&[
                    Capability::Coal,
                    Capability::Flammable,
                    Capability::Collectable,
                    Capability::Emitter,
                ]),
            )
            .with_actions(TILE_ACTIONS)
        },
        EntityKind::HotCoal => Blueprint {
            emitter: Some(EmitterProfile {
                kind: SubstanceKind::Heat,
                quantity: 150.0,
                refresh_interval: Some(60),
                active: true,
            }),
            flammable: Some(FlammableProfile {
                combustion_temp: 125.0,
                fuel: millis(3 * 60 * 1000),
                heat_quantity: 150.0,
            }),
            collected_as: Some(EntityKind::Coal),
            ..Blueprint::base(
                kind,
                10.0,
                caps(&[
                    Capability::Flammable,
                    Capability::Collectable,
                    Capability::Emitter,
                ]),
            )
            .with_actions(TILE_ACTIONS)
        },
        EntityKind::Iron => Blueprint {
            emitter: Some(EmitterProfile {
                kind: SubstanceKind::MoltenIron,
                quantity: 0.0,
                refresh_interval: None,
                active: false,
            }),
            meltable: Some(MeltableProfile {
                melt_temp: 125.0,
                melt_kind: None,
                heat_quantity: 120.0,
            }),
            ..Blueprint::base(
                kind,
                120.0,
                RESOURCE
                    .with(Capability::Meltable)
                    .with(Capability::Emitter),
            )
            .with_actions(TILE_ACTIONS)
        },
        EntityKind::Steel => Blueprint::base(kind, 120.0, RESOURCE).with_actions(TILE_ACTIONS),
        EntityKind::Glass => Blueprint {
            emitter: Some(EmitterProfile {
                kind: SubstanceKind::MoltenSand,
                quantity: 0.0,
                refresh_interval: None,
                active: false,
            }),
            meltable: Some(MeltableProfile {
                melt_temp: 100.0,
                melt_kind: None,
                heat_quantity: 120.0,
            }),
            ..Blueprint::base(
                kind,
                10.0,
                RESOURCE
                    .with(Capability::Meltable)
                    .with(Capability::Emitter),
            )
            .with_actions(TILE_ACTIONS)
        },
        EntityKind::Silicon | EntityKind::Sulphur => {
            Blueprint::base(kind, 10.0, RESOURCE).with_actions(TILE_ACTIONS)
        }
        EntityKind::Ice => Blueprint {
            emitter: Some(EmitterProfile {
                kind: SubstanceKind::Cold,
                quantity: 120.0,
                refresh_interval: Some(60),
                active: true,
            }),
            meltable: Some(MeltableProfile {
                melt_temp: 12.0,
                melt_kind: Some(SubstanceKind::Water),
                heat_quantity: 120.0,
            }),
            ..Blueprint::base(
                kind,
                120.0,
                RESOURCE
                    .with(Capability::Meltable)
                    .with(Capability::Emitter),
            )
            .with_actions(TILE_ACTIONS)
        },
        EntityKind::Uranium => Blueprint {
            emitter: Some(EmitterProfile {
                kind: SubstanceKind::Heat,
                quantity: 125.0,
                refresh_interval: Some(60),
                active: true,
            }),
            ..Blueprint::base(kind, 100.0, RESOURCE.with(Capability::Emitter))
                .with_actions(TILE_ACTIONS)
        },
        EntityKind::Agent => Blueprint {
            actions: AGENT_ACTIONS,
            agent: Some(AgentProfile {
                blocking: WALKER_BLOCKERS,
                segmented: false,
                tasks: AGENT_TASKS,
            }),
            flammable: Some(FlammableProfile {
                combustion_temp: 125.0,
                fuel: millis(1000),
                heat_quantity: 0.0,
            }),
            holder: Some(HolderProfile {
                max_hold: 1,
                pickup: &[EntityKind::Dirt, EntityKind::Coal],
            }),
            ..Blueprint::base(kind, 10.0, caps(&[Capability::Agent, Capability::Flammable]))
        },
        EntityKind::Truck => Blueprint {
            size: CellRectSize::new(3, 3),
            actions: TRUCK_ACTIONS,
            agent: Some(AgentProfile {
                blocking: WALKER_BLOCKERS,
                segmented: true,
                tasks: &[],
            }),
            holder: Some(HolderProfile {
                max_hold: 9,
                pickup: &[
                    EntityKind::Dirt,
                    EntityKind::Dynamite,
                    EntityKind::Coal,
                    EntityKind::Iron,
                    EntityKind::Steel,
                ],
            }),
            ..Blueprint::base(kind, 200.0, caps(&[Capability::Agent]))
        },
        EntityKind::BasicTurret => Blueprint {
            actions: BASIC_TURRET_ACTIONS,
            turret: Some(TURRET_BASE),
            ..Blueprint::base(kind, 30.0, caps(&[Capability::Tower, Capability::Structure]))
        },
        EntityKind::FastTurret => Blueprint {
            size: CellRectSize::new(2, 2),
            actions: FAST_TURRET_ACTIONS,
            turret: Some(TurretProfile {
                shots_till_cooldown: Some(20),
                ..TURRET_BASE
            }),
            power_consumed: Some(1.0),
            ..Blueprint::base(
                kind,
                100.0,
                caps(&[
                    Capability::Tower,
                    Capability::Structure,
                    Capability::PowerConsumer,
                ]),
            )
        },
        EntityKind::MissileTurret => Blueprint {
            size: CellRectSize::new(3, 3),
            actions: MISSILE_TURRET_ACTIONS,
            turret: Some(TurretProfile {
                snaps: true,
                projectile: EntityKind::Missile,
                launch_cost: &[
                    (EntityKind::Iron, 0.1),
                    (EntityKind::Coal, 0.1),
                    (EntityKind::Sulphur, 0.1),
                ],
                launch_velocity: Some(150.0),
                ..TURRET_BASE
            }),
            ..Blueprint::base(kind, 120.0, caps(&[Capability::Tower, Capability::Structure]))
        },
        EntityKind::Bullet => Blueprint {
            size: CellRectSize::new(2, 1),
            actions: PROJECTILE_ACTIONS,
            ballistic: Some(BallisticProfile {
                velocity: 500.0,
                damage: 10.0,
                blocking: caps(&[
                    Capability::Terrain,
                    Capability::Mineral,
                    Capability::Coal,
                    Capability::Agent,
                    Capability::Turbine,
                    Capability::Ballistic,
                ]),
                piercing: true,
                miss_rate: 0.0,
            }),
            ..Blueprint::base(kind, 10.0, caps(&[Capability::Ballistic]))
        },
        EntityKind::Missile => Blueprint {
            size: CellRectSize::new(1, 2),
            actions: PROJECTILE_ACTIONS,
            ballistic: Some(BallisticProfile {
                velocity: 50.0,
                damage: 10.0,
                blocking: caps(&[
                    Capability::Terrain,
                    Capability::Mineral,
                    Capability::Coal,
                    Capability::Agent,
                    Capability::Turbine,
                    Capability::Structure,
                    Capability::Base,
                    Capability::Ballistic,
                ]),
                piercing: false,
                miss_rate: 0.0,
            }),
            holder: Some(HolderProfile {
                max_hold: 1,
                pickup: &[EntityKind::Dynamite],
            }),
            ..Blueprint::base(kind, 10.0, caps(&[Capability::Ballistic]))
        },
        EntityKind::Dynamite => Blueprint {
            actions: DYNAMITE_ACTIONS,
            explosive: Some(ExplosiveProfile {
                radius: 2,
                damage: 40.0,
                heat: 150.0,
                timer: None,
            }),
            ..Blueprint::base(
                kind,
                1.0,
                caps(&[Capability::Explosive, Capability::Collectable]),
            )
        },
        EntityKind::Base => Blueprint {
            size: CellRectSize::new(3, 3),
            emitter: Some(EmitterProfile {
                kind: SubstanceKind::Colony,
                quantity: 350.0,
                refresh_interval: None,
                active: true,
            }),
            ..Blueprint::base(kind, 1000.0, caps(&[Capability::Base, Capability::Emitter]))
                .with_actions(TILE_ACTIONS)
        },
        EntityKind::Turbine => Blueprint {
            size: CellRectSize::new(2, 2),
            generator: Some(GeneratorProfile {
                power: 5.0,
                source: GeneratorSource::Turbine { max_speed: 0.2 },
            }),
            ..Blueprint::base(kind, 60.0, caps(&[Capability::Turbine, Capability::Generator]))
                .with_actions(TILE_ACTIONS)
        },
        EntityKind::SolarPanel => Blueprint {
            size: CellRectSize::new(2, 2),
            generator: Some(GeneratorProfile {
                power: 10.0,
                source: GeneratorSource::Solar,
            }),
            ..Blueprint::base(kind, 60.0, caps(&[Capability::Generator]))
                .with_actions(TILE_ACTIONS)
        },
    }
}

impl Blueprint {
    const fn with_actions(self, actions: &'static [(ActionKind, ActionTiming)]) -> Self {
        Self { actions, ..self }
    }
}
