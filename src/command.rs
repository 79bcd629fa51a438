use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{FacilityLayout, VehicleType};

/// One protocol request: a single JSON object per line, discriminated by `op`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateFacility(FacilityLayout),
    DeleteFacility {
        facility_id: Ulid,
    },
    GetFacility {
        facility_id: Ulid,
    },
    ListFacilities,
    Park {
        facility_id: Ulid,
        license_plate: String,
        #[serde(rename = "type")]
        kind: VehicleType,
    },
    Unpark {
        license_plate: String,
    },
    IsFull {
        facility_id: Ulid,
    },
    CountAvailable {
        facility_id: Ulid,
    },
    CountOccupied {
        facility_id: Ulid,
    },
    CountVanSpots {
        facility_id: Ulid,
    },
    ListSpots {
        facility_id: Ulid,
        #[serde(default)]
        available_only: bool,
    },
    ListVehicles {
        facility_id: Ulid,
    },
    FindVehicle {
        license_plate: String,
    },
    Compact,
}

pub fn parse_request(line: &str) -> Result<Request, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CommandError::Empty);
    }
    serde_json::from_str(line).map_err(|e| CommandError::Parse(e.to_string()))
}

#[derive(Debug)]
pub enum CommandError {
    Parse(String),
    Empty,
    LineTooLong(usize),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Parse(s) => write!(f, "parse error: {s}"),
            CommandError::Empty => write!(f, "empty request"),
            CommandError::LineTooLong(max) => write!(f, "request line exceeds {max} bytes"),
        }
    }
}

impl std::error::Error for CommandError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// `{"ok":true,"result":...}` or `{"ok":false,"error":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

impl From<&EngineError> for Reply {
    fn from(e: &EngineError) -> Self {
        Reply::failure(e.code(), e.to_string())
    }
}

impl From<&CommandError> for Reply {
    fn from(e: &CommandError) -> Self {
        Reply::failure("bad_request", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpotType;

    const FID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_park() {
        let line = format!(
            r#"{{"op":"park","facility_id":"{FID}","license_plate":"VAN-001","type":"VAN"}}"#
        );
        let req = parse_request(&line).unwrap();
        match req {
            Request::Park {
                facility_id,
                license_plate,
                kind,
            } => {
                assert_eq!(facility_id.to_string(), FID);
                assert_eq!(license_plate, "VAN-001");
                assert_eq!(kind, VehicleType::Van);
            }
            _ => panic!("expected Park, got {req:?}"),
        }
    }

    #[test]
    fn parse_create_facility_carries_layout() {
        let line = r#"{"op":"create_facility","name":"North","spots":["MOTORCYCLE","CAR","VAN"]}"#;
        let req = parse_request(line).unwrap();
        match req {
            Request::CreateFacility(layout) => {
                assert_eq!(layout.name, "North");
                assert_eq!(layout.id, None);
                assert_eq!(
                    layout.spots,
                    vec![SpotType::Motorcycle, SpotType::Car, SpotType::Van]
                );
            }
            _ => panic!("expected CreateFacility, got {req:?}"),
        }
    }

    #[test]
    fn parse_unit_ops_and_defaults() {
        assert_eq!(parse_request(r#"{"op":"list_facilities"}"#).unwrap(), Request::ListFacilities);
        assert_eq!(parse_request(r#" {"op":"compact"} "#).unwrap(), Request::Compact);
        let req = parse_request(&format!(r#"{{"op":"list_spots","facility_id":"{FID}"}}"#)).unwrap();
        assert!(matches!(req, Request::ListSpots { available_only: false, .. }));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(parse_request("   "), Err(CommandError::Empty)));
        assert!(matches!(parse_request("not json"), Err(CommandError::Parse(_))));
        assert!(matches!(parse_request(r#"{"op":"teleport"}"#), Err(CommandError::Parse(_))));
        // Vehicle type names are case-sensitive.
        let line = format!(
            r#"{{"op":"park","facility_id":"{FID}","license_plate":"A","type":"van"}}"#
        );
        assert!(matches!(parse_request(&line), Err(CommandError::Parse(_))));
        // Missing field.
        assert!(matches!(parse_request(r#"{"op":"unpark"}"#), Err(CommandError::Parse(_))));
    }

    #[test]
    fn reply_shapes() {
        let ok = serde_json::to_value(Reply::success(serde_json::json!(3))).unwrap();
        assert_eq!(ok, serde_json::json!({"ok": true, "result": 3}));

        let err = Reply::from(&EngineError::NoAvailableSpot(VehicleType::Car));
        assert_eq!(err.error_code(), Some("no_available_spot"));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["ok"], serde_json::json!(false));
        assert!(value.get("result").is_none());
        assert_eq!(
            value["error"]["message"],
            serde_json::json!("no available spot for vehicle type CAR")
        );

        let bad = Reply::from(&CommandError::Empty);
        assert_eq!(bad.error_code(), Some("bad_request"));
    }
}
