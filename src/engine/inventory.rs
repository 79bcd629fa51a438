use std::collections::{HashMap, HashSet};

use ulid::Ulid;

use crate::model::{Spot, SpotType};

use super::EngineError;

/// Every spot of one facility, kept in layout order.
#[derive(Debug, Clone, Default)]
pub struct SpotInventory {
    spots: Vec<Spot>,
    /// spot id → index into `spots`
    index: HashMap<Ulid, usize>,
}

impl SpotInventory {
    /// Build the inventory from `(id, type)` pairs; position = index in the slice.
    pub fn new(layout: &[(Ulid, SpotType)]) -> Self {
        let mut spots = Vec::with_capacity(layout.len());
        let mut index = HashMap::with_capacity(layout.len());
        for (pos, (id, kind)) in layout.iter().enumerate() {
            index.insert(*id, pos);
            spots.push(Spot::new(*id, pos as u32, *kind));
        }
        Self { spots, index }
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Spot> {
        self.spots.iter()
    }

    /// Snapshot of free spots in layout order. Which spot a vehicle gets, and
    /// which spots a van may overflow into, both follow this order.
    pub fn list_available(&self) -> Vec<&Spot> {
        self.spots.iter().filter(|s| !s.is_occupied()).collect()
    }

    pub fn find_by_id(&self, id: &Ulid) -> Result<&Spot, EngineError> {
        self.index
            .get(id)
            .map(|&pos| &self.spots[pos])
            .ok_or(EngineError::SpotNotFound(*id))
    }

    fn position_of(&self, id: &Ulid) -> Result<usize, EngineError> {
        self.index.get(id).copied().ok_or(EngineError::SpotNotFound(*id))
    }

    /// Attach `vehicle_id` to one spot. Re-occupying by the same vehicle is a no-op.
    pub fn occupy(&mut self, id: Ulid, vehicle_id: Ulid) -> Result<(), EngineError> {
        self.occupy_all(&[id], vehicle_id)
    }

    /// Attach `vehicle_id` to every spot in `ids`, or to none of them.
    pub fn occupy_all(&mut self, ids: &[Ulid], vehicle_id: Ulid) -> Result<(), EngineError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let mut positions = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                return Err(EngineError::InvalidArgument("spot listed twice in one reservation"));
            }
            let pos = self.position_of(id)?;
            if let Some(holder) = self.spots[pos].occupant()
                && holder != vehicle_id
            {
                return Err(EngineError::SpotOccupied(*id));
            }
            positions.push(pos);
        }
        for pos in positions {
            self.spots[pos].attach(vehicle_id);
        }
        Ok(())
    }

    /// Clear occupancy of one spot and return it.
    pub fn release(&mut self, id: Ulid) -> Result<&Spot, EngineError> {
        let pos = self.position_of(&id)?;
        self.spots[pos].detach();
        Ok(&self.spots[pos])
    }

    /// Clear every spot in `ids`, or none of them if any id is unknown.
    pub fn release_all(&mut self, ids: &[Ulid]) -> Result<(), EngineError> {
        let positions = ids
            .iter()
            .map(|id| self.position_of(id))
            .collect::<Result<Vec<_>, _>>()?;
        for pos in positions {
            self.spots[pos].detach();
        }
        Ok(())
    }

    pub fn count_by_occupancy(&self, occupied: bool) -> usize {
        self.spots
            .iter()
            .filter(|s| s.is_occupied() == occupied)
            .count()
    }

    pub fn count_by_type(&self, kind: SpotType) -> usize {
        self.spots.iter().filter(|s| s.kind == kind).count()
    }
}
