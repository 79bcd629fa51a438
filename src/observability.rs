use std::net::SocketAddr;

use crate::command::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: requests executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "parkade_commands_total";

/// Histogram: request latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "parkade_command_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "parkade_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "parkade_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "parkade_connections_rejected_total";

/// Gauge: facilities loaded.
pub const FACILITIES_ACTIVE: &str = "parkade_facilities_active";

/// Gauge: occupied spots. Labels: facility.
pub const SPOTS_OCCUPIED: &str = "parkade_spots_occupied";

// ── Domain ──────────────────────────────────────────────────────

/// Counter: successful parks. Labels: type.
pub const VEHICLES_PARKED_TOTAL: &str = "parkade_vehicles_parked_total";

/// Counter: successful unparks. Labels: type.
pub const VEHICLES_UNPARKED_TOTAL: &str = "parkade_vehicles_unparked_total";

/// Counter: parks refused for lack of a suitable spot. Labels: type.
pub const PARK_REJECTED_TOTAL: &str = "parkade_park_rejected_total";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkade_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkade_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "parkade_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a request.
pub fn command_label(request: &Request) -> &'static str {
    match request {
        Request::CreateFacility(_) => "create_facility",
        Request::DeleteFacility { .. } => "delete_facility",
        Request::GetFacility { .. } => "get_facility",
        Request::ListFacilities => "list_facilities",
        Request::Park { .. } => "park",
        Request::Unpark { .. } => "unpark",
        Request::IsFull { .. } => "is_full",
        Request::CountAvailable { .. } => "count_available",
        Request::CountOccupied { .. } => "count_occupied",
        Request::CountVanSpots { .. } => "count_van_spots",
        Request::ListSpots { .. } => "list_spots",
        Request::ListVehicles { .. } => "list_vehicles",
        Request::FindVehicle { .. } => "find_vehicle",
        Request::Compact => "compact",
    }
}
