//! Capability tags that select subsystems and blocking behavior.

use serde::{Deserialize, Serialize};

/// Tag attached to an entity that decides which subsystems process it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// Entity has a non-empty action queue and is stepped every tick.
    Actor,
    /// Entity moves on its own using the agent decision policy.
    Agent,
    /// Entity aims and fires projectiles.
    Tower,
    /// Entity follows a closed-form trajectory.
    Ballistic,
    /// Entity can ignite and burn.
    Flammable,
    /// Entity melts into a substance when hot enough.
    Meltable,
    /// Entity explodes when its timer elapses or it dies.
    Explosive,
    /// Entity produces power.
    Generator,
    /// Entity draws power.
    PowerConsumer,
    /// Entity injects a substance into its cell.
    Emitter,
    /// Entity can be collected by a base.
    Collectable,
    /// Entity collects resources for its owner.
    Base,
    /// Entity reacts with molten substances.
    Coal,
    /// Entity is part of the terrain.
    Terrain,
    /// Entity is a solid mineral block.
    Mineral,
    /// Entity is a built structure.
    Structure,
    /// Entity is spun by flowing fluid.
    Turbine,
}

impl Capability {
    /// Every capability in declaration order.
    pub const ALL: [Capability; 17] = [
        Capability::Actor,
        Capability::Agent,
        Capability::Tower,
        Capability::Ballistic,
        Capability::Flammable,
        Capability::Meltable,
        Capability::Explosive,
        Capability::Generator,
        Capability::PowerConsumer,
        Capability::Emitter,
        Capability::Collectable,
        Capability::Base,
        Capability::Coal,
        Capability::Terrain,
        Capability::Mineral,
        Capability::Structure,
        Capability::Turbine,
    ];

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Compact set of [`Capability`] tags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    /// Set containing no capabilities.
    pub const EMPTY: CapabilitySet = CapabilitySet(0);

    /// Creates a set from the provided tags.
    #[must_use]
    pub const fn of(tags: &[Capability]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < tags.len() {
            bits |= tags[index].bit();
            index += 1;
        }
        Self(bits)
    }

    /// Reports whether the set contains the tag.
    #[must_use]
    pub const fn contains(&self, tag: Capability) -> bool {
        self.0 & tag.bit() != 0
    }

    /// Reports whether the two sets share at least one tag.
    #[must_use]
    pub const fn intersects(&self, other: CapabilitySet) -> bool {
        self.0 & other.0 != 0
    }

    /// Reports whether the set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns the union of the two sets.
    #[must_use]
    pub const fn union(self, other: CapabilitySet) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the set with the tag added.
    #[must_use]
    pub const fn with(self, tag: Capability) -> Self {
        Self(self.0 | tag.bit())
    }

    /// Returns the set with the tag removed.
    #[must_use]
    pub const fn without(self, tag: Capability) -> Self {
        Self(self.0 & !tag.bit())
    }

    /// Adds or removes a tag in place.
    pub fn set(&mut self, tag: Capability, enabled: bool) {
        *self = if enabled {
            self.with(tag)
        } else {
            self.without(tag)
        };
    }

    /// Iterates over the tags in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL
            .iter()
            .copied()
            .filter(move |tag| self.contains(*tag))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::EMPTY, |set, tag| set.with(tag))
    }
}
