use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::command::{parse_request, CommandError, Reply, Request};
use crate::engine::{Engine, EngineError};
use crate::limits::MAX_REQUEST_LINE_LEN;
use crate::observability;

fn reply_with<T: Serialize>(result: Result<T, EngineError>) -> Reply {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(json) => Reply::success(json),
            Err(e) => Reply::failure("internal", e.to_string()),
        },
        Err(e) => Reply::from(&e),
    }
}

/// Run one request against the engine.
pub async fn execute(engine: &Engine, request: Request) -> Reply {
    match request {
        Request::CreateFacility(layout) => reply_with(engine.create_facility(layout).await),
        Request::DeleteFacility { facility_id } => reply_with(
            engine
                .delete_facility(facility_id)
                .await
                .map(|()| serde_json::json!({ "deleted": facility_id })),
        ),
        Request::GetFacility { facility_id } => {
            reply_with(engine.find_facility(facility_id).await)
        }
        Request::ListFacilities => reply_with(Ok(engine.list_facilities().await)),
        Request::Park {
            facility_id,
            license_plate,
            kind,
        } => reply_with(engine.park(facility_id, license_plate, kind).await),
        Request::Unpark { license_plate } => reply_with(engine.unpark(&license_plate).await),
        Request::IsFull { facility_id } => reply_with(engine.is_full(facility_id).await),
        Request::CountAvailable { facility_id } => {
            reply_with(engine.count_available(facility_id).await)
        }
        Request::CountOccupied { facility_id } => {
            reply_with(engine.count_occupied(facility_id).await)
        }
        Request::CountVanSpots { facility_id } => {
            reply_with(engine.count_van_spots(facility_id).await)
        }
        Request::ListSpots {
            facility_id,
            available_only,
        } => reply_with(engine.list_spots(facility_id, available_only).await),
        Request::ListVehicles { facility_id } => {
            reply_with(engine.list_vehicles(facility_id).await)
        }
        Request::FindVehicle { license_plate } => {
            reply_with(engine.find_vehicle(&license_plate).await)
        }
        Request::Compact => reply_with(engine.compact_wal().await),
    }
}

async fn handle_line(engine: &Engine, line: &str) -> Reply {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(e) => {
            metrics::counter!(observability::COMMANDS_TOTAL, "command" => "invalid", "status" => "bad_request")
                .increment(1);
            return Reply::from(&e);
        }
    };
    let label = observability::command_label(&request);
    let started = Instant::now();
    let reply = execute(engine, request).await;
    metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
        .record(started.elapsed().as_secs_f64());
    let status = reply.error_code().unwrap_or("ok").to_string();
    metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => status)
        .increment(1);
    reply
}

/// Serve newline-delimited JSON requests until the peer disconnects.
///
/// Each request line gets exactly one reply line, in order. An overlong line
/// is answered with `bad_request` and ends the connection.
pub async fn process_connection<S>(stream: S, engine: Arc<Engine>) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    serve_lines(stream, engine, MAX_REQUEST_LINE_LEN).await
}

async fn serve_lines<S>(
    stream: S,
    engine: Arc<Engine>,
    max_line_len: usize,
) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(max_line_len));
    while let Some(frame) = framed.next().await {
        let (reply, close) = match frame {
            Ok(line) => (handle_line(&engine, &line).await, false),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let e = CommandError::LineTooLong(max_line_len);
                (Reply::from(&e), true)
            }
            Err(e) => return Err(e),
        };
        let encoded = serde_json::to_string(&reply)
            .map_err(|e| LinesCodecError::Io(io::Error::other(e)))?;
        framed.send(encoded).await?;
        if close {
            debug!("closing connection after overlong request line");
            break;
        }
    }
    Ok(())
}
