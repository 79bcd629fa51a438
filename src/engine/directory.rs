use std::collections::HashMap;

use ulid::Ulid;

use crate::model::Vehicle;

use super::EngineError;

/// Vehicles currently parked in one facility.
#[derive(Debug, Clone, Default)]
pub struct VehicleDirectory {
    vehicles: HashMap<Ulid, Vehicle>,
    by_plate: HashMap<String, Ulid>,
}

impl VehicleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a vehicle, replacing any record with the same id.
    pub fn register(&mut self, vehicle: Vehicle) {
        if let Some(previous) = self.vehicles.get(&vehicle.id)
            && previous.license_plate != vehicle.license_plate
        {
            self.by_plate.remove(&previous.license_plate);
        }
        self.by_plate.insert(vehicle.license_plate.clone(), vehicle.id);
        self.vehicles.insert(vehicle.id, vehicle);
    }

    pub fn find_by_license_plate(&self, plate: &str) -> Result<&Vehicle, EngineError> {
        self.by_plate
            .get(plate)
            .and_then(|id| self.vehicles.get(id))
            .ok_or_else(|| EngineError::VehicleNotFound(plate.to_string()))
    }

    pub fn get(&self, id: &Ulid) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    pub fn remove(&mut self, id: Ulid) -> Result<Vehicle, EngineError> {
        let vehicle = self.vehicles.remove(&id).ok_or(EngineError::NotFound(id))?;
        if self.by_plate.get(&vehicle.license_plate) == Some(&id) {
            self.by_plate.remove(&vehicle.license_plate);
        }
        Ok(vehicle)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Reservation, VehicleType};

    fn vehicle(plate: &str) -> Vehicle {
        Vehicle {
            id: Ulid::new(),
            license_plate: plate.to_string(),
            kind: VehicleType::Car,
            reservation: Reservation::single(Ulid::new()),
        }
    }

    #[test]
    fn register_and_find_by_plate() {
        let mut dir = VehicleDirectory::new();
        let v = vehicle("ABC-123");
        dir.register(v.clone());
        assert_eq!(dir.find_by_license_plate("ABC-123").unwrap(), &v);
        assert_eq!(dir.get(&v.id), Some(&v));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn unknown_plate_is_not_found() {
        let dir = VehicleDirectory::new();
        let err = dir.find_by_license_plate("NOPE").unwrap_err();
        assert!(matches!(err, EngineError::VehicleNotFound(ref p) if p == "NOPE"));
    }

    #[test]
    fn register_overwrites_by_identity() {
        let mut dir = VehicleDirectory::new();
        let mut v = vehicle("OLD-1");
        dir.register(v.clone());
        v.license_plate = "NEW-1".into();
        dir.register(v.clone());
        assert_eq!(dir.len(), 1);
        assert!(dir.find_by_license_plate("OLD-1").is_err());
        assert_eq!(dir.find_by_license_plate("NEW-1").unwrap().id, v.id);
    }

    #[test]
    fn remove_twice_fails_second_time() {
        let mut dir = VehicleDirectory::new();
        let v = vehicle("XYZ-9");
        dir.register(v.clone());
        let removed = dir.remove(v.id).unwrap();
        assert_eq!(removed.license_plate, "XYZ-9");
        assert!(dir.is_empty());
        assert!(dir.find_by_license_plate("XYZ-9").is_err());
        assert!(matches!(dir.remove(v.id), Err(EngineError::NotFound(_))));
    }
}
