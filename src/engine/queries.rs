use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError, FacilityState};

impl Engine {
    /// Run `f` against a facility under its read lock.
    async fn read_facility<T>(
        &self,
        id: Ulid,
        f: impl FnOnce(&FacilityState) -> T,
    ) -> Result<T, EngineError> {
        let fs = self.facility(&id)?;
        let guard = fs.read().await;
        Ok(f(&guard))
    }

    pub async fn find_facility(&self, id: Ulid) -> Result<FacilityInfo, EngineError> {
        self.read_facility(id, FacilityState::info).await
    }

    /// Every facility, ordered by id.
    pub async fn list_facilities(&self) -> Vec<FacilitySummary> {
        let mut ids: Vec<Ulid> = self.facilities.iter().map(|e| *e.key()).collect();
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            // Deleted between the listing and the read: skip it.
            if let Ok(summary) = self.read_facility(id, FacilityState::summary).await {
                out.push(summary);
            }
        }
        out
    }

    pub fn facility_count(&self) -> usize {
        self.facilities.len()
    }

    pub async fn is_full(&self, id: Ulid) -> Result<bool, EngineError> {
        self.read_facility(id, FacilityState::is_full).await
    }

    pub async fn count_available(&self, id: Ulid) -> Result<usize, EngineError> {
        self.read_facility(id, FacilityState::count_available).await
    }

    pub async fn count_occupied(&self, id: Ulid) -> Result<usize, EngineError> {
        self.read_facility(id, FacilityState::count_occupied).await
    }

    /// Spots currently held by vans, including car spots taken by an overflow.
    pub async fn count_van_spots(&self, id: Ulid) -> Result<usize, EngineError> {
        self.read_facility(id, FacilityState::count_van_spots).await
    }

    /// Spots in layout order, optionally only the free ones.
    pub async fn list_spots(
        &self,
        id: Ulid,
        available_only: bool,
    ) -> Result<Vec<SpotInfo>, EngineError> {
        self.read_facility(id, |fs| {
            fs.spots
                .iter()
                .filter(|s| !available_only || !s.is_occupied())
                .map(SpotInfo::from)
                .collect()
        })
        .await
    }

    /// Vehicles parked in a facility, ordered by the position of their primary spot.
    pub async fn list_vehicles(&self, id: Ulid) -> Result<Vec<VehicleInfo>, EngineError> {
        self.read_facility(id, |fs| {
            let mut vehicles: Vec<(u32, VehicleInfo)> = fs
                .vehicles
                .iter()
                .map(|v| {
                    let position = fs
                        .spots
                        .find_by_id(&v.reservation.primary())
                        .map(|s| s.position)
                        .unwrap_or(u32::MAX);
                    (position, fs.vehicle_info(v))
                })
                .collect();
            vehicles.sort_by_key(|(position, _)| *position);
            vehicles.into_iter().map(|(_, info)| info).collect()
        })
        .await
    }

    pub async fn find_vehicle(&self, license_plate: &str) -> Result<VehicleInfo, EngineError> {
        let facility_id = self
            .facility_for_plate(license_plate)
            .ok_or_else(|| EngineError::VehicleNotFound(license_plate.to_string()))?;
        let fs = self.facility(&facility_id)?;
        let guard = fs.read().await;
        let vehicle = guard.vehicles.find_by_license_plate(license_plate)?;
        Ok(guard.vehicle_info(vehicle))
    }
}
