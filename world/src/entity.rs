//! Entity records and the per-capability component state they carry.

use std::time::Duration;

use glam::DVec2;

use kiln_core::{
    ActionQueue, CapabilitySet, CellCoord, CellRect, CellRectSize, EntityId, EntityKind, PlayerId,
    SubstanceKind,
};

use crate::blueprint::Task;

/// Decision state of a self-directed agent.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentState {
    /// Current goal.
    pub task: Task,
    /// Cell occupied before the latest move.
    pub prev_position: CellCoord,
    /// Time spent on the current task.
    pub time_on_task: Duration,
}

/// Aim controller state of a turret.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TurretState {
    /// Current angular velocity.
    pub theta_speed: f64,
    /// Current angular acceleration.
    pub theta_accel: f64,
    /// Entity being tracked.
    pub target: Option<EntityId>,
    /// Shots fired since the last cooldown.
    pub shots_since_cooldown: u32,
}

/// Closed-form trajectory state of a projectile.
#[derive(Clone, Debug, PartialEq)]
pub struct BallisticState {
    /// Time since launch.
    pub age: Duration,
    /// Launch position in cell space.
    pub origin: DVec2,
    /// Direction of travel at launch.
    pub initial_theta: f64,
    /// Launch speed.
    pub velocity: f64,
    /// Homing target, if any.
    pub target: Option<EntityId>,
}

/// Substance injection state of an emitter.
#[derive(Clone, Debug, PartialEq)]
pub struct EmitterState {
    /// Substance injected.
    pub kind: SubstanceKind,
    /// Quantity injected on refresh; zero means idle.
    pub quantity: f64,
    /// Ticks between refreshes.
    pub refresh_interval: Option<u64>,
}

/// Burning state of a flammable entity.
#[derive(Clone, Debug, PartialEq)]
pub struct FlammableState {
    /// Whether the entity is burning.
    pub on_fire: bool,
    /// Burn time left.
    pub fuel: Duration,
}

/// Countdown state of an explosive.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplosiveState {
    /// Time since the explosive was created.
    pub age: Duration,
    /// Age after which it detonates on its own.
    pub timer: Option<Duration>,
}

/// Output state of a generator.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GeneratorState {
    /// Power produced during the latest tick.
    pub power_generated: f64,
    /// Rotor speed reported by the substance field.
    pub speed: f64,
    /// Rotor angle.
    pub rotor: f64,
}

/// Supply state of a power consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumerState {
    /// Power drawn while running.
    pub power_needed: f64,
    /// Whether the latest allocation covered the demand.
    pub powered: bool,
}

/// Cargo of an entity that carries others.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct HolderState {
    /// Carried entities in pickup order.
    pub held: Vec<EntityId>,
}

/// Everything the world knows about a single entity.
///
/// Position, kind, and capabilities are indexed by the world and can only be
/// changed through it. Component state is plain data owned by the systems.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) kind: EntityKind,
    pub(crate) owner: PlayerId,
    pub(crate) position: CellCoord,
    pub(crate) size: CellRectSize,
    pub(crate) capabilities: CapabilitySet,
    pub(crate) actions: ActionQueue,
    pub(crate) carried_by: Option<EntityId>,
    theta: f64,
    hp: f64,
    /// Agent decision state.
    pub agent: Option<AgentState>,
    /// Turret aim state.
    pub turret: Option<TurretState>,
    /// Projectile trajectory state.
    pub ballistic: Option<BallisticState>,
    /// Emission state.
    pub emitter: Option<EmitterState>,
    /// Burning state.
    pub flammable: Option<FlammableState>,
    /// Detonation countdown.
    pub explosive: Option<ExplosiveState>,
    /// Power output.
    pub generator: Option<GeneratorState>,
    /// Power demand.
    pub consumer: Option<ConsumerState>,
    /// Cargo.
    pub holder: Option<HolderState>,
}

impl Entity {
    /// Creates an entity without any component state.
    ///
    /// The identifier is assigned when the entity is added to the world.
    #[must_use]
    pub fn new(
        kind: EntityKind,
        owner: PlayerId,
        position: CellCoord,
        size: CellRectSize,
        hp: f64,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            id: EntityId::new(0),
            kind,
            owner,
            position,
            size,
            capabilities,
            actions: ActionQueue::new(),
            carried_by: None,
            theta: 0.0,
            hp,
            agent: None,
            turret: None,
            ballistic: None,
            emitter: None,
            flammable: None,
            explosive: None,
            generator: None,
            consumer: None,
            holder: None,
        }
    }

    /// Identifier assigned by the world.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Kind of the entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Owning player.
    #[must_use]
    pub const fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Upper-left cell of the footprint.
    #[must_use]
    pub const fn position(&self) -> CellCoord {
        self.position
    }

    /// Footprint size.
    #[must_use]
    pub const fn size(&self) -> CellRectSize {
        self.size
    }

    /// Cells covered by the entity.
    #[must_use]
    pub const fn footprint(&self) -> CellRect {
        CellRect::from_origin_and_size(self.position, self.size)
    }

    /// Footprint centre in cell space.
    #[must_use]
    pub fn centre(&self) -> DVec2 {
        DVec2::new(
            f64::from(self.position.column()) + f64::from(self.size.width()) / 2.0,
            f64::from(self.position.row()) + f64::from(self.size.height()) / 2.0,
        )
    }

    /// Capability tags.
    #[must_use]
    pub const fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Pending actions.
    #[must_use]
    pub const fn actions(&self) -> &ActionQueue {
        &self.actions
    }

    /// Holder carrying this entity, if any.
    #[must_use]
    pub const fn carried_by(&self) -> Option<EntityId> {
        self.carried_by
    }

    /// Heading or aim angle in radians.
    #[must_use]
    pub const fn theta(&self) -> f64 {
        self.theta
    }

    /// Rotates the entity.
    pub fn set_theta(&mut self, theta: f64) {
        self.theta = theta;
    }

    /// Remaining hit points.
    #[must_use]
    pub const fn hp(&self) -> f64 {
        self.hp
    }

    /// Overwrites the hit points.
    pub fn set_hp(&mut self, hp: f64) {
        self.hp = hp;
    }
}
