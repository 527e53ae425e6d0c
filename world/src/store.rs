//! Entity storage with capability and spatial indexes.

use std::collections::{BTreeMap, BTreeSet};

use kiln_core::{Capability, CapabilitySet, CellCoord, CellRect, EntityId, GridSize};

use crate::entity::Entity;

/// Owns every entity and keeps the capability index in sync.
#[derive(Clone, Debug, Default)]
pub(crate) struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    by_capability: BTreeMap<Capability, BTreeSet<EntityId>>,
    next_id: u32,
    reusable: BTreeSet<EntityId>,
    released: Vec<EntityId>,
}

impl EntityStore {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Picks the smallest reusable identifier or allocates a fresh one.
    pub(crate) fn allocate(&mut self) -> EntityId {
        if let Some(id) = self.reusable.pop_first() {
            return id;
        }
        let id = EntityId::new(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub(crate) fn insert(&mut self, entity: Entity) {
        let id = entity.id;
        for tag in entity.capabilities.iter() {
            let _ = self.by_capability.entry(tag).or_default().insert(id);
        }
        let _ = self.entities.insert(id, entity);
    }

    /// Removes the entity; its identifier becomes reusable after [`Self::release_ids`].
    pub(crate) fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        for tag in entity.capabilities.iter() {
            if let Some(ids) = self.by_capability.get_mut(&tag) {
                let _ = ids.remove(&id);
            }
        }
        self.released.push(id);
        Some(entity)
    }

    pub(crate) fn release_ids(&mut self) {
        self.reusable.extend(self.released.drain(..));
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub(crate) fn set_capabilities(&mut self, id: EntityId, capabilities: CapabilitySet) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        for tag in entity.capabilities.iter() {
            if !capabilities.contains(tag) {
                if let Some(ids) = self.by_capability.get_mut(&tag) {
                    let _ = ids.remove(&id);
                }
            }
        }
        for tag in capabilities.iter() {
            let _ = self.by_capability.entry(tag).or_default().insert(id);
        }
        entity.capabilities = capabilities;
    }

    pub(crate) fn with_capability(&self, tag: Capability) -> Vec<EntityId> {
        self.by_capability
            .get(&tag)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }
}

/// Per-cell sets of the entities whose footprint covers the cell.
#[derive(Clone, Debug)]
pub(crate) struct SpatialIndex {
    size: GridSize,
    cells: Vec<BTreeSet<EntityId>>,
}

impl SpatialIndex {
    pub(crate) fn new(size: GridSize) -> Self {
        Self {
            size,
            cells: vec![BTreeSet::new(); size.cell_count()],
        }
    }

    pub(crate) fn occupy(&mut self, id: EntityId, footprint: &CellRect) {
        for cell in footprint.cells() {
            if let Some(index) = self.size.index(cell) {
                let _ = self.cells[index].insert(id);
            }
        }
    }

    pub(crate) fn vacate(&mut self, id: EntityId, footprint: &CellRect) {
        for cell in footprint.cells() {
            if let Some(index) = self.size.index(cell) {
                let _ = self.cells[index].remove(&id);
            }
        }
    }

    pub(crate) fn at(&self, cell: CellCoord) -> impl Iterator<Item = EntityId> + '_ {
        self.size
            .index(cell)
            .and_then(|index| self.cells.get(index))
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }

    /// Distinct entities overlapping the rectangle, in ascending id order.
    pub(crate) fn within(&self, rect: &CellRect) -> BTreeSet<EntityId> {
        rect.cells().flat_map(|cell| self.at(cell)).collect()
    }
}
