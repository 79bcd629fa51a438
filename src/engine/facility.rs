use ulid::Ulid;

use crate::model::*;

use super::allocation::plan_release;
use super::directory::VehicleDirectory;
use super::inventory::SpotInventory;
use super::EngineError;

/// One facility: declared totals, spot inventory and the vehicles parked in it.
#[derive(Debug, Clone)]
pub struct FacilityState {
    pub id: Ulid,
    pub name: String,
    pub declared: DeclaredTotals,
    pub spots: SpotInventory,
    pub vehicles: VehicleDirectory,
}

impl FacilityState {
    pub fn new(id: Ulid, name: String, declared: DeclaredTotals, layout: &[(Ulid, SpotType)]) -> Self {
        Self {
            id,
            name,
            declared,
            spots: SpotInventory::new(layout),
            vehicles: VehicleDirectory::new(),
        }
    }

    /// Apply a committed vehicle event. Facility create/delete are handled by
    /// the engine, not here.
    ///
    /// Validation runs before anything is mutated, so an error leaves the
    /// state untouched.
    pub fn apply(&mut self, event: &Event) -> Result<(), EngineError> {
        match event {
            Event::VehicleParked {
                vehicle_id,
                license_plate,
                kind,
                spots,
                ..
            } => {
                if spots.is_empty() {
                    return Err(EngineError::InvalidArgument("empty reservation"));
                }
                self.spots.occupy_all(spots, *vehicle_id)?;
                self.vehicles.register(Vehicle {
                    id: *vehicle_id,
                    license_plate: license_plate.clone(),
                    kind: *kind,
                    reservation: Reservation::new(spots.clone()),
                });
                Ok(())
            }
            Event::VehicleUnparked { vehicle_id, .. } => {
                let vehicle = self
                    .vehicles
                    .get(vehicle_id)
                    .ok_or(EngineError::NotFound(*vehicle_id))?;
                let spots = plan_release(vehicle);
                self.spots.release_all(&spots)?;
                self.vehicles.remove(*vehicle_id)?;
                Ok(())
            }
            Event::FacilityCreated { .. } | Event::FacilityDeleted { .. } => Ok(()),
        }
    }

    pub fn spot_info(&self, id: &Ulid) -> Result<SpotInfo, EngineError> {
        self.spots.find_by_id(id).map(SpotInfo::from)
    }

    pub fn is_full(&self) -> bool {
        self.spots.count_by_occupancy(false) == 0
    }

    pub fn count_available(&self) -> usize {
        self.spots.count_by_occupancy(false)
    }

    pub fn count_occupied(&self) -> usize {
        self.spots.count_by_occupancy(true)
    }

    /// Spots currently held by a van, whatever the spot's own type.
    pub fn count_van_spots(&self) -> usize {
        self.spots
            .iter()
            .filter_map(|s| s.occupant())
            .filter_map(|vid| self.vehicles.get(&vid))
            .filter(|v| v.kind == VehicleType::Van)
            .count()
    }

    pub fn info(&self) -> FacilityInfo {
        FacilityInfo {
            id: self.id,
            name: self.name.clone(),
            declared: self.declared,
            actual: SpotCounts {
                motorcycle: self.spots.count_by_type(SpotType::Motorcycle),
                car: self.spots.count_by_type(SpotType::Car),
                van: self.spots.count_by_type(SpotType::Van),
            },
            spots: self.spots.iter().map(SpotInfo::from).collect(),
        }
    }

    pub fn summary(&self) -> FacilitySummary {
        FacilitySummary {
            id: self.id,
            name: self.name.clone(),
            spots: self.spots.len(),
            available: self.count_available(),
            occupied: self.count_occupied(),
        }
    }

    pub fn vehicle_info(&self, vehicle: &Vehicle) -> VehicleInfo {
        VehicleInfo {
            id: vehicle.id,
            facility_id: self.id,
            license_plate: vehicle.license_plate.clone(),
            kind: vehicle.kind,
            primary_spot: vehicle.reservation.primary(),
            linked_spot: vehicle.reservation.linked(),
            spots: vehicle.reservation.spots().to_vec(),
        }
    }

    /// Events that rebuild this facility from nothing.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(1 + self.vehicles.len());
        events.push(Event::FacilityCreated {
            id: self.id,
            name: self.name.clone(),
            declared: self.declared,
            spots: self.spots.iter().map(|s| (s.id, s.kind)).collect(),
        });
        let mut vehicles: Vec<&Vehicle> = self.vehicles.iter().collect();
        vehicles.sort_by_key(|v| v.id);
        for v in vehicles {
            events.push(Event::VehicleParked {
                facility_id: self.id,
                vehicle_id: v.id,
                license_plate: v.license_plate.clone(),
                kind: v.kind,
                spots: v.reservation.spots().to_vec(),
            });
        }
        events
    }
}
