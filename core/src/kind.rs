//! Entity kinds known to the simulation.

use serde::{Deserialize, Serialize};

/// Kind tag selecting an entity's blueprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Diggable soil block.
    Dirt,
    /// Solid rock block.
    Stone,
    /// Fuel block that burns and smelts ore.
    Coal,
    /// Coal that is currently burning.
    HotCoal,
    /// Iron ingot produced by cooling molten iron.
    Iron,
    /// Steel ingot produced by cooling molten steel.
    Steel,
    /// Glass produced by cooling molten sand.
    Glass,
    /// Silicon produced by smelting sand with coal.
    Silicon,
    /// Sulphur deposited by cooling sulphur dioxide.
    Sulphur,
    /// Ice block that melts into water.
    Ice,
    /// Radioactive block that emits heat.
    Uranium,
    /// Autonomous agent that follows substance gradients.
    Agent,
    /// Segmented hauler that carries blocks.
    Truck,
    /// Turret firing cheap bullets.
    BasicTurret,
    /// Turret firing bullets at a high rate.
    FastTurret,
    /// Turret launching homing missiles.
    MissileTurret,
    /// Piercing projectile.
    Bullet,
    /// Homing projectile carrying a warhead.
    Missile,
    /// Explosive charge.
    Dynamite,
    /// Collection point crediting resources to its owner.
    Base,
    /// Generator spun by flowing fluid.
    Turbine,
    /// Generator powered by light.
    SolarPanel,
}

impl EntityKind {
    /// Every entity kind in declaration order.
    pub const ALL: [EntityKind; 22] = [
        EntityKind::Dirt,
        EntityKind::Stone,
        EntityKind::Coal,
        EntityKind::HotCoal,
        EntityKind::Iron,
        EntityKind::Steel,
        EntityKind::Glass,
        EntityKind::Silicon,
        EntityKind::Sulphur,
        EntityKind::Ice,
        EntityKind::Uranium,
        EntityKind::Agent,
        EntityKind::Truck,
        EntityKind::BasicTurret,
        EntityKind::FastTurret,
        EntityKind::MissileTurret,
        EntityKind::Bullet,
        EntityKind::Missile,
        EntityKind::Dynamite,
        EntityKind::Base,
        EntityKind::Turbine,
        EntityKind::SolarPanel,
    ];

    /// Lowercase name used in level files and reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            EntityKind::Dirt => "dirt",
            EntityKind::Stone => "stone",
            EntityKind::Coal => "coal",
            EntityKind::HotCoal => "hot_coal",
            EntityKind::Iron => "iron",
            EntityKind::Steel => "steel",
            EntityKind::Glass => "glass",
            EntityKind::Silicon => "silicon",
            EntityKind::Sulphur => "sulphur",
            EntityKind::Ice => "ice",
            EntityKind::Uranium => "uranium",
            EntityKind::Agent => "agent",
            EntityKind::Truck => "truck",
            EntityKind::BasicTurret => "basic_turret",
            EntityKind::FastTurret => "fast_turret",
            EntityKind::MissileTurret => "missile_turret",
            EntityKind::Bullet => "bullet",
            EntityKind::Missile => "missile",
            EntityKind::Dynamite => "dynamite",
            EntityKind::Base => "base",
            EntityKind::Turbine => "turbine",
            EntityKind::SolarPanel => "solar_panel",
        }
    }
}
