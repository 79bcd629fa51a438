use ulid::Ulid;

use crate::model::VehicleType;

#[derive(Debug)]
pub enum EngineError {
    /// Facility or vehicle id.
    NotFound(Ulid),
    SpotNotFound(Ulid),
    VehicleNotFound(String),
    NoAvailableSpot(VehicleType),
    AlreadyExists(Ulid),
    AlreadyParked(String),
    SpotOccupied(Ulid),
    FacilityInUse(Ulid),
    InvalidArgument(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Stable error code reported to protocol clients.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_)
            | EngineError::SpotNotFound(_)
            | EngineError::VehicleNotFound(_) => "not_found",
            EngineError::NoAvailableSpot(_) => "no_available_spot",
            EngineError::AlreadyExists(_)
            | EngineError::AlreadyParked(_)
            | EngineError::SpotOccupied(_)
            | EngineError::FacilityInUse(_) => "conflict",
            EngineError::InvalidArgument(_) => "invalid",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "internal",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == "not_found"
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::SpotNotFound(id) => write!(f, "spot not found: {id}"),
            EngineError::VehicleNotFound(plate) => {
                write!(f, "no vehicle parked with license plate {plate}")
            }
            EngineError::NoAvailableSpot(kind) => {
                write!(f, "no available spot for vehicle type {kind}")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::AlreadyParked(plate) => {
                write!(f, "vehicle {plate} is already parked")
            }
            EngineError::SpotOccupied(id) => write!(f, "spot {id} is already occupied"),
            EngineError::FacilityInUse(id) => {
                write!(f, "cannot delete facility {id}: vehicles still parked")
            }
            EngineError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
