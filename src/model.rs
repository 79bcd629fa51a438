use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// What a spot was built for. Fixed at creation; allocation never changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpotType {
    Motorcycle,
    Car,
    Van,
}

impl SpotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotType::Motorcycle => "MOTORCYCLE",
            SpotType::Car => "CAR",
            SpotType::Van => "VAN",
        }
    }
}

impl fmt::Display for SpotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleType {
    Motorcycle,
    Car,
    Van,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Motorcycle => "MOTORCYCLE",
            VehicleType::Car => "CAR",
            VehicleType::Van => "VAN",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parking location.
///
/// Occupancy is stored once, as the occupant link, so "occupied" and
/// "has a vehicle" can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spot {
    pub id: Ulid,
    /// Layout index, 0-based and contiguous within a facility.
    pub position: u32,
    pub kind: SpotType,
    occupant: Option<Ulid>,
}

impl Spot {
    pub fn new(id: Ulid, position: u32, kind: SpotType) -> Self {
        Self {
            id,
            position,
            kind,
            occupant: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    pub fn occupant(&self) -> Option<Ulid> {
        self.occupant
    }

    /// True if `next` sits immediately after `self` in the layout.
    pub fn precedes(&self, next: &Spot) -> bool {
        next.position == self.position + 1
    }

    pub(crate) fn attach(&mut self, vehicle_id: Ulid) {
        self.occupant = Some(vehicle_id);
    }

    pub(crate) fn detach(&mut self) -> Option<Ulid> {
        self.occupant.take()
    }
}

/// The ordered group of spots a vehicle holds.
///
/// The first spot is the primary one handed back on park. The last one is the
/// spot the vehicle is linked to, handed back on unpark. Both are the same
/// spot unless a van overflowed into three spots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    spots: Vec<Ulid>,
}

impl Reservation {
    pub fn new(spots: Vec<Ulid>) -> Self {
        debug_assert!(!spots.is_empty(), "reservation must hold at least one spot");
        Self { spots }
    }

    pub fn single(spot: Ulid) -> Self {
        Self { spots: vec![spot] }
    }

    pub fn primary(&self) -> Ulid {
        self.spots[0]
    }

    pub fn linked(&self) -> Ulid {
        self.spots[self.spots.len() - 1]
    }

    pub fn spots(&self) -> &[Ulid] {
        &self.spots
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn is_overflow(&self) -> bool {
        self.spots.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vehicle {
    pub id: Ulid,
    pub license_plate: String,
    pub kind: VehicleType,
    pub reservation: Reservation,
}

/// Totals declared when a facility is created. Metadata only: nothing keeps
/// them in line with the actual layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredTotals {
    pub capacity: u32,
    pub motorcycle_spots: u32,
    pub car_spots: u32,
    pub van_spots: u32,
}

/// Facility description as supplied by an operator (request or seed file).
///
/// Omitted totals are filled in from the layout itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FacilityLayout {
    #[serde(default)]
    pub id: Option<Ulid>,
    pub name: String,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub motorcycle_spots: Option<u32>,
    #[serde(default)]
    pub car_spots: Option<u32>,
    #[serde(default)]
    pub van_spots: Option<u32>,
    pub spots: Vec<SpotType>,
}

impl FacilityLayout {
    pub fn declared(&self) -> DeclaredTotals {
        let count = |kind: SpotType| self.spots.iter().filter(|s| **s == kind).count() as u32;
        DeclaredTotals {
            capacity: self.capacity.unwrap_or(self.spots.len() as u32),
            motorcycle_spots: self
                .motorcycle_spots
                .unwrap_or_else(|| count(SpotType::Motorcycle)),
            car_spots: self.car_spots.unwrap_or_else(|| count(SpotType::Car)),
            van_spots: self.van_spots.unwrap_or_else(|| count(SpotType::Van)),
        }
    }
}

/// The WAL record format. One event is one atomic unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    FacilityCreated {
        id: Ulid,
        name: String,
        declared: DeclaredTotals,
        /// Layout order: index = position.
        spots: Vec<(Ulid, SpotType)>,
    },
    FacilityDeleted {
        id: Ulid,
    },
    VehicleParked {
        facility_id: Ulid,
        vehicle_id: Ulid,
        license_plate: String,
        kind: VehicleType,
        /// Primary first.
        spots: Vec<Ulid>,
    },
    VehicleUnparked {
        facility_id: Ulid,
        vehicle_id: Ulid,
    },
}

impl Event {
    pub fn facility_id(&self) -> Ulid {
        match self {
            Event::FacilityCreated { id, .. } | Event::FacilityDeleted { id } => *id,
            Event::VehicleParked { facility_id, .. }
            | Event::VehicleUnparked { facility_id, .. } => *facility_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpotInfo {
    pub id: Ulid,
    pub position: u32,
    #[serde(rename = "type")]
    pub kind: SpotType,
    pub occupied: bool,
    pub vehicle_id: Option<Ulid>,
}

impl From<&Spot> for SpotInfo {
    fn from(spot: &Spot) -> Self {
        Self {
            id: spot.id,
            position: spot.position,
            kind: spot.kind,
            occupied: spot.is_occupied(),
            vehicle_id: spot.occupant(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleInfo {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub license_plate: String,
    #[serde(rename = "type")]
    pub kind: VehicleType,
    pub primary_spot: Ulid,
    pub linked_spot: Ulid,
    pub spots: Vec<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacilityInfo {
    pub id: Ulid,
    pub name: String,
    #[serde(flatten)]
    pub declared: DeclaredTotals,
    /// Per-type totals of the layout as built, next to the declared ones.
    pub actual: SpotCounts,
    pub spots: Vec<SpotInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpotCounts {
    pub motorcycle: usize,
    pub car: usize,
    pub van: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacilitySummary {
    pub id: Ulid,
    pub name: String,
    pub spots: usize,
    pub available: usize,
    pub occupied: usize,
}

/// Outcome of a successful park.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub vehicle_id: Ulid,
    pub license_plate: String,
    #[serde(rename = "type")]
    pub kind: VehicleType,
    /// The primary spot.
    pub spot: SpotInfo,
    /// Every spot taken, primary first.
    pub spots: Vec<SpotInfo>,
}

/// Outcome of a successful unpark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    pub vehicle_id: Ulid,
    pub license_plate: String,
    #[serde(rename = "type")]
    pub kind: VehicleType,
    /// The spot the vehicle was linked to (last of its group).
    pub spot: SpotInfo,
    pub freed: Vec<SpotInfo>,
}
